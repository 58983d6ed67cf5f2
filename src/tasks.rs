//! Recurring background tasks: the message poll loop and the coarser
//! roster refresh loop.
//!
//! Both are plain sleep loops. The poll cadence doubles as the retry
//! cadence for transient failures; nothing is retried eagerly and a
//! failed tick never mutates engine state.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::sync::{FetchOutcome, SyncEngine};
use crate::transport::{ConversationSummary, PeerSummary, RoomSummary, SharedTransport};

/// Fires [`SyncEngine::poll`] at a fixed cadence. Overlap is prevented by
/// the engine's per-kind in-flight guard: a tick that finds a poll still
/// outstanding is a no-op. Runs until the task is dropped.
pub async fn poll_loop(engine: Arc<SyncEngine>, interval: Duration) {
    let mut consecutive_failures = 0u32;
    loop {
        tokio::time::sleep(interval).await;
        match engine.poll() {
            Ok(FetchOutcome::Applied(stats)) => {
                if consecutive_failures > 0 {
                    crate::clog!("poll: recovered after {} failed tick(s)", consecutive_failures);
                    consecutive_failures = 0;
                }
                if stats.inserted > 0 {
                    crate::clog!("poll: {} new message(s)", stats.inserted);
                }
            }
            Ok(FetchOutcome::Busy) => {
                crate::clog!("poll: previous tick still in flight, skipping");
            }
            Ok(FetchOutcome::Idle) | Ok(FetchOutcome::Stale) => {}
            Err(e) => {
                consecutive_failures += 1;
                // Log the first failure and then every tenth so a dead
                // server does not flood the log at poll cadence.
                if consecutive_failures == 1 || consecutive_failures % 10 == 0 {
                    crate::clog!("poll failed (attempt {}): {}", consecutive_failures, e);
                }
            }
        }
    }
}

/// Snapshot of the side lists, refreshed independently of message state.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    pub peers: Vec<PeerSummary>,
    pub rooms: Vec<RoomSummary>,
    pub conversations: Vec<ConversationSummary>,
}

/// Latest roster snapshot, shared between the refresh loop and front ends.
#[derive(Default)]
pub struct RosterCache {
    inner: Mutex<Roster>,
}

impl RosterCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Roster {
        self.inner.lock().unwrap().clone()
    }

    fn replace(&self, roster: Roster) {
        *self.inner.lock().unwrap() = roster;
    }
}

/// Refreshes peers, rooms, and conversations at a coarse cadence. Failures
/// leave the previous snapshot in place.
pub async fn roster_loop(transport: SharedTransport, cache: Arc<RosterCache>, interval: Duration) {
    loop {
        match refresh_roster(&transport) {
            Ok(roster) => cache.replace(roster),
            Err(e) => crate::clog!("roster refresh failed: {}", e),
        }
        tokio::time::sleep(interval).await;
    }
}

fn refresh_roster(
    transport: &SharedTransport,
) -> Result<Roster, crate::transport::ClientError> {
    Ok(Roster {
        peers: transport.list_peers()?,
        rooms: transport.list_rooms()?,
        conversations: transport.list_conversations()?,
    })
}
