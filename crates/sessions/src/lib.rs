//! Ephemeral conversation state, one session per actor.
//!
//! Sessions coordinate calls into the catalog, ledger, bank and registry but
//! hold no claim on any of them: evicting a session releases nothing, because
//! nothing was ever held. Only explicit confirm/approve/reject actions touch
//! inventory or ledger rows.

pub mod map;
pub mod moderation;
pub mod purchase;

pub use map::{Expire, SessionMap};
pub use moderation::ModerationSession;
pub use purchase::{PurchaseSession, PurchaseState};
