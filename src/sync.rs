//! Incremental message synchronization engine.
//!
//! Reconciles two independent fetch mechanisms into one consistent
//! timeline per conversation: backward pagination over `beforeTs`
//! (`load_latest` / `load_more`) and forward polling over `sinceTs`
//! (`poll`). Both converge on [`MessageStore::upsert`], which is the
//! single serialization point for ordering.
//!
//! ## Session fencing
//!
//! Switching conversations bumps a session epoch. Every fetch captures the
//! epoch before its transport call and re-checks it under the lock before
//! applying the result; a mismatch means the user switched conversations
//! while the fetch was outstanding, and the result is discarded rather
//! than written into the wrong timeline. There is no transport-level
//! abort; stale results are rendered inert instead.
//!
//! ## Watermarks
//!
//! `poll_since` is the forward high-water mark. It only moves via
//! last-writer-wins-by-max, so out-of-order completions of concurrent
//! fetches can never rewind it. The backward cursor (`oldest_ts`) lives in
//! the store and only retreats.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::broadcast;

use crate::message::{Conversation, Message};
use crate::store::MessageStore;
use crate::transport::{ClientError, SharedTransport};

/// Page size for the latest-window and backward-pagination fetches.
pub const LOAD_PAGE_SIZE: u32 = 50;
/// Larger poll page so bursts are absorbed in one tick.
pub const POLL_PAGE_SIZE: u32 = 200;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Current wall-clock time in milliseconds since the UNIX epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Events broadcast to front ends whenever shared state moved.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    ConversationOpened { title: String },
    TimelineUpdated { inserted: usize },
}

/// What a fetch operation applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyStats {
    /// Entries the transport returned (after boundary validation).
    pub fetched: usize,
    /// Entries not previously in the store.
    pub inserted: usize,
    /// Whether the store changed at all (inserts or overwrites).
    pub changed: bool,
}

/// Result of a fetch operation that did not fail at the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The batch was applied to the active session.
    Applied(ApplyStats),
    /// No conversation is active; nothing to do.
    Idle,
    /// A fetch of the same kind is already outstanding; this one was
    /// skipped rather than allowed to race it.
    Busy,
    /// The session changed while the fetch was in flight; the result was
    /// discarded without touching the store or watermarks.
    Stale,
}

/// Result of [`SyncEngine::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// Empty input after trimming; declined silently.
    Declined,
    NoConversation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchKind {
    LoadLatest = 0,
    LoadMore = 1,
    Poll = 2,
}

#[derive(Default)]
struct SessionState {
    epoch: u64,
    conversation: Option<Conversation>,
    store: MessageStore,
    poll_since: u64,
    in_flight: [bool; 3],
}

/// Cursors captured atomically when a fetch begins.
struct FetchTicket {
    epoch: u64,
    conversation: Conversation,
    poll_since: u64,
    oldest_ts: Option<u64>,
}

/// Owns all mutable session state behind one lock. The lock is never held
/// across a transport call; fetches capture their cursors, do I/O
/// unlocked, then re-acquire and re-check the epoch before applying.
pub struct SyncEngine {
    transport: SharedTransport,
    state: Mutex<SessionState>,
    events: broadcast::Sender<EngineEvent>,
}

impl SyncEngine {
    pub fn new(transport: SharedTransport) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            transport,
            state: Mutex::new(SessionState::default()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Make `conversation` the active session: new epoch, empty store,
    /// watermark reset. Any fetch still in flight for the previous session
    /// will find the epoch changed and discard its result.
    pub fn activate(&self, conversation: Conversation) -> u64 {
        let mut st = self.state.lock().unwrap();
        st.epoch += 1;
        st.store.clear();
        st.poll_since = 0;
        st.conversation = Some(conversation);
        st.in_flight = [false; 3];
        st.epoch
    }

    /// Activate `conversation` and pull its most recent window.
    pub fn open(&self, conversation: Conversation) -> Result<FetchOutcome, ClientError> {
        let title = conversation.title.clone();
        self.activate(conversation);
        let _ = self.events.send(EngineEvent::ConversationOpened { title });
        self.load_latest()
    }

    /// Fetch the most recent window and anchor the polling watermark.
    ///
    /// The upper bound is `now + 1` so a message stamped in the same
    /// millisecond as the call is not excluded. With a non-empty batch the
    /// watermark anchors on the newest revision seen; with nothing to
    /// anchor on it falls forward to `now` so the first poll does not
    /// re-request all of history.
    pub fn load_latest(&self) -> Result<FetchOutcome, ClientError> {
        let ticket = match self.begin(FetchKind::LoadLatest) {
            Ok(t) => t,
            Err(outcome) => return Ok(outcome),
        };
        let before_ts = now_ms() + 1;
        let result = self
            .transport
            .list_messages(&ticket.conversation, before_ts, LOAD_PAGE_SIZE);

        let mut st = self.state.lock().unwrap();
        if st.epoch != ticket.epoch {
            return Ok(FetchOutcome::Stale);
        }
        st.in_flight[FetchKind::LoadLatest as usize] = false;
        let batch = result?;
        let outcome = st.store.upsert(&batch);
        let candidate = batch.iter().map(Message::watermark).max().unwrap_or(0);
        st.poll_since = if candidate > 0 { candidate } else { now_ms() };
        drop(st);

        let stats = ApplyStats {
            fetched: batch.len(),
            inserted: outcome.inserted,
            changed: outcome.changed,
        };
        if stats.changed {
            let _ = self.events.send(EngineEvent::TimelineUpdated {
                inserted: stats.inserted,
            });
        }
        Ok(FetchOutcome::Applied(stats))
    }

    /// Backward pagination: fetch the page before the oldest loaded
    /// message. Leaves the polling watermark untouched; this cursor only
    /// retreats. `ApplyStats::inserted` tells the caller whether any
    /// history remained.
    pub fn load_more(&self) -> Result<FetchOutcome, ClientError> {
        let ticket = match self.begin(FetchKind::LoadMore) {
            Ok(t) => t,
            Err(outcome) => return Ok(outcome),
        };
        let before_ts = ticket.oldest_ts.unwrap_or_else(|| now_ms() + 1);
        let result = self
            .transport
            .list_messages(&ticket.conversation, before_ts, LOAD_PAGE_SIZE);

        let mut st = self.state.lock().unwrap();
        if st.epoch != ticket.epoch {
            return Ok(FetchOutcome::Stale);
        }
        st.in_flight[FetchKind::LoadMore as usize] = false;
        let batch = result?;
        let outcome = st.store.upsert(&batch);
        drop(st);

        let stats = ApplyStats {
            fetched: batch.len(),
            inserted: outcome.inserted,
            changed: outcome.changed,
        };
        if stats.changed {
            let _ = self.events.send(EngineEvent::TimelineUpdated {
                inserted: stats.inserted,
            });
        }
        Ok(FetchOutcome::Applied(stats))
    }

    /// Forward incremental fetch from the polling watermark. The watermark
    /// is raised by max-merge and never lowered; an empty response leaves
    /// it where it was.
    pub fn poll(&self) -> Result<FetchOutcome, ClientError> {
        let ticket = match self.begin(FetchKind::Poll) {
            Ok(t) => t,
            Err(outcome) => return Ok(outcome),
        };
        let result =
            self.transport
                .poll_messages(&ticket.conversation, ticket.poll_since, POLL_PAGE_SIZE);

        let mut st = self.state.lock().unwrap();
        if st.epoch != ticket.epoch {
            return Ok(FetchOutcome::Stale);
        }
        st.in_flight[FetchKind::Poll as usize] = false;
        let batch = result?;
        let outcome = st.store.upsert(&batch.messages);
        st.poll_since = st.poll_since.max(batch.max_ts);
        drop(st);

        let stats = ApplyStats {
            fetched: batch.messages.len(),
            inserted: outcome.inserted,
            changed: outcome.changed,
        };
        if stats.changed {
            let _ = self.events.send(EngineEvent::TimelineUpdated {
                inserted: stats.inserted,
            });
        }
        Ok(FetchOutcome::Applied(stats))
    }

    /// Post a message to the active conversation. Empty input is declined
    /// silently. The echoed outbound row arrives via the next `poll`.
    pub fn send(&self, content: &str) -> Result<SendOutcome, ClientError> {
        let content = content.trim();
        if content.is_empty() {
            return Ok(SendOutcome::Declined);
        }
        let conversation = {
            let st = self.state.lock().unwrap();
            match &st.conversation {
                Some(c) => c.clone(),
                None => return Ok(SendOutcome::NoConversation),
            }
        };
        self.transport.send_message(&conversation, content)?;
        Ok(SendOutcome::Sent)
    }

    /// Snapshot of the active timeline in display order.
    pub fn timeline(&self) -> Vec<Message> {
        self.state.lock().unwrap().store.ordered()
    }

    pub fn conversation(&self) -> Option<Conversation> {
        self.state.lock().unwrap().conversation.clone()
    }

    pub fn poll_since(&self) -> u64 {
        self.state.lock().unwrap().poll_since
    }

    pub fn oldest_ts(&self) -> Option<u64> {
        self.state.lock().unwrap().store.oldest_ts()
    }

    pub fn epoch(&self) -> u64 {
        self.state.lock().unwrap().epoch
    }

    /// Capture cursors and claim the in-flight slot for `kind`, or report
    /// why the fetch cannot start.
    fn begin(&self, kind: FetchKind) -> Result<FetchTicket, FetchOutcome> {
        let mut st = self.state.lock().unwrap();
        let conversation = match &st.conversation {
            Some(c) => c.clone(),
            None => return Err(FetchOutcome::Idle),
        };
        if st.in_flight[kind as usize] {
            return Err(FetchOutcome::Busy);
        }
        st.in_flight[kind as usize] = true;
        Ok(FetchTicket {
            epoch: st.epoch,
            conversation,
            poll_since: st.poll_since,
            oldest_ts: st.store.oldest_ts(),
        })
    }
}
