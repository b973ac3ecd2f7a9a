// src/reload/mod.rs

//! Live-reload signalling.
//!
//! [`ReloadNotifier`] fans a [`ReloadMessage`] out to every subscriber that
//! is connected at the time of the call. The dev server subscribes once per
//! browser connection.

pub mod server;

use std::path::PathBuf;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use crate::types::ReloadKind;

pub use server::DevServer;

/// Buffered messages per subscriber before a slow client starts lagging.
const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReloadMessage {
    pub kind: ReloadKind,
    /// Files the rebuild wrote; used by clients to pick stylesheets.
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ReloadNotifier {
    tx: broadcast::Sender<ReloadMessage>,
}

impl Default for ReloadNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ReloadNotifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReloadMessage> {
        self.tx.subscribe()
    }

    pub fn client_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Deliver to every current subscriber; returns how many received it.
    pub fn notify(&self, kind: ReloadKind, paths: Vec<PathBuf>) -> usize {
        let message = ReloadMessage { kind, paths };
        match self.tx.send(message) {
            Ok(receivers) => {
                debug!(?kind, receivers, "reload sent");
                receivers
            }
            Err(_) => {
                debug!(?kind, "reload dropped; no connected clients");
                0
            }
        }
    }
}
