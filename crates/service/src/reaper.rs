//! Background session reaper.
//!
//! Sweeps the session maps on a fixed tick and evicts conversations idle
//! longer than the configured TTL. Eviction drops ephemeral state only;
//! pending ledger rows and banked links are untouched.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::Utc;

use crate::fulfillment::Fulfillment;

pub struct ReaperHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl ReaperHandle {
    /// Request graceful shutdown and wait for the reaper to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

#[derive(Debug)]
pub struct SessionReaper;

impl SessionReaper {
    /// Spawn the reaper thread. It sweeps every `tick` until the handle
    /// asks it to stop.
    pub fn spawn(fulfillment: Arc<Fulfillment>, tick: Duration) -> ReaperHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let join = thread::Builder::new()
            .name("session-reaper".to_string())
            .spawn(move || reaper_loop(&fulfillment, &shutdown_rx, tick))
            .expect("failed to spawn session reaper thread");

        ReaperHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        }
    }
}

fn reaper_loop(fulfillment: &Fulfillment, shutdown_rx: &mpsc::Receiver<()>, tick: Duration) {
    loop {
        match shutdown_rx.recv_timeout(tick) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                tracing::debug!("session reaper stopping");
                return;
            }
            Err(RecvTimeoutError::Timeout) => {
                fulfillment.reap_sessions(Utc::now());
            }
        }
    }
}
