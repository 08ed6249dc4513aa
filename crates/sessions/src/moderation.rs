use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use linkvend_core::{TransactionId, UserId};

use crate::map::Expire;

/// Per-moderator rejection conversation.
///
/// A single state (`AwaitingRejectionReason`): the session exists while the
/// moderator is typing the reason and is consumed on submission. It carries
/// where the outcome has to be reported, nothing else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationSession {
    pub moderator_id: UserId,
    pub transaction_id: TransactionId,
    pub target_user_id: UserId,
    /// Transport reference of the notification that triggered the rejection,
    /// so the collaborator can mark it with the final outcome.
    pub notification_ref: String,
    pub last_active: DateTime<Utc>,
}

impl ModerationSession {
    pub fn open(
        moderator_id: UserId,
        transaction_id: TransactionId,
        target_user_id: UserId,
        notification_ref: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            moderator_id,
            transaction_id,
            target_user_id,
            notification_ref: notification_ref.into(),
            last_active: at,
        }
    }
}

impl Expire for ModerationSession {
    fn last_active(&self) -> DateTime<Utc> {
        self.last_active
    }
}
