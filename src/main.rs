//! Terminal front end for the lanchat sync engine.
//!
//! All state lives in the engine; this binary only picks a conversation,
//! prints the timeline as it changes, and feeds stdin lines to `send`.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use lanchat_client::clog;
use lanchat_client::config::Cli;
use lanchat_client::message::{Conversation, Direction, Message};
use lanchat_client::sync::{EngineEvent, SendOutcome, SyncEngine};
use lanchat_client::tasks::{poll_loop, roster_loop, RosterCache};
use lanchat_client::transport::{HttpTransport, SharedTransport};
use lanchat_client::{logging, transport};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init();

    clog!("lanchat-client starting");
    clog!("  server: {}", cli.server);

    let transport: SharedTransport = Arc::new(HttpTransport::new(&cli.server));
    let engine = Arc::new(SyncEngine::new(Arc::clone(&transport)));

    let conversation = match pick_conversation(&cli, &transport) {
        Some(c) => c,
        None => {
            clog!("no conversation to open; pass --room or --peer");
            std::process::exit(1);
        }
    };

    let events = engine.subscribe();
    tokio::spawn(print_timeline_updates(Arc::clone(&engine), events));

    match engine.open(conversation) {
        Ok(_) => {}
        // Leave the watermark at zero; the poll loop picks up from there
        // once the server is reachable again.
        Err(e) => clog!("initial load failed: {}", e),
    }

    let roster = Arc::new(RosterCache::new());
    tokio::spawn(poll_loop(
        Arc::clone(&engine),
        Duration::from_millis(cli.poll_interval_ms),
    ));
    tokio::spawn(roster_loop(
        Arc::clone(&transport),
        Arc::clone(&roster),
        Duration::from_secs(cli.roster_interval_secs),
    ));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        match engine.send(&line) {
            Ok(SendOutcome::Sent) => {
                // Pull the echoed outbound row promptly instead of waiting
                // for the next poll tick.
                if let Err(e) = engine.poll() {
                    clog!("refresh after send failed: {}", e);
                }
            }
            Ok(SendOutcome::Declined) => {}
            Ok(SendOutcome::NoConversation) => clog!("no active conversation"),
            Err(e) => clog!("send failed: {}", e),
        }
    }
}

/// Resolve the conversation to open: explicit --room/--peer (title from the
/// roster when available), otherwise the server's most recent conversation.
fn pick_conversation(cli: &Cli, transport: &SharedTransport) -> Option<Conversation> {
    if let Some(room_id) = &cli.room {
        let title = transport
            .list_rooms()
            .ok()
            .and_then(|rooms| {
                rooms
                    .into_iter()
                    .find(|r| &r.room_id == room_id)
                    .and_then(|r| r.room_name)
            })
            .unwrap_or_else(|| room_id.clone());
        return Some(Conversation::room(room_id.clone(), title));
    }
    if let Some(peer_id) = &cli.peer {
        let title = transport
            .list_peers()
            .ok()
            .and_then(|peers| {
                peers
                    .into_iter()
                    .find(|p| &p.node_id == peer_id)
                    .and_then(|p| p.name)
            })
            .unwrap_or_else(|| peer_id.clone());
        return Some(Conversation::private(peer_id.clone(), title));
    }

    let summaries = match transport.list_conversations() {
        Ok(s) => s,
        Err(e) => {
            clog!("could not list conversations: {}", e);
            return None;
        }
    };
    summaries
        .iter()
        .max_by_key(|c| c.last_msg_ts)
        .and_then(transport::ConversationSummary::to_conversation)
}

/// Print messages as the engine's timeline grows. Tracks the last printed
/// sort position so only the new tail is written on each update.
async fn print_timeline_updates(
    engine: Arc<SyncEngine>,
    mut events: tokio::sync::broadcast::Receiver<EngineEvent>,
) {
    let mut last_printed: Option<(u64, String)> = None;
    loop {
        match events.recv().await {
            Ok(EngineEvent::ConversationOpened { title }) => {
                println!("--- {title} ---");
                last_printed = None;
            }
            Ok(EngineEvent::TimelineUpdated { .. }) => {
                for m in engine.timeline() {
                    let key = (m.ts, m.msg_id.clone());
                    if last_printed.as_ref().is_some_and(|last| key <= *last) {
                        continue;
                    }
                    print_message(&m);
                    last_printed = Some(key);
                }
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
            Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
        }
    }
}

fn print_message(m: &Message) {
    let who = match m.direction {
        Direction::Outbound => "me".to_string(),
        Direction::Inbound => m
            .from_name
            .clone()
            .or_else(|| m.from_node_id.as_deref().map(logging::node_id))
            .unwrap_or_default(),
    };
    let status = match m.status {
        Some(s) => format!(" [{}]", s.as_str()),
        None => String::new(),
    };
    println!("[{}] {}: {}{}", fmt_time(m.ts), who, m.content, status);
}

/// Clock-of-day portion of a millisecond timestamp, for display only.
fn fmt_time(ts_ms: u64) -> String {
    if ts_ms == 0 {
        return "--:--:--".to_string();
    }
    let secs = ts_ms / 1000;
    let time = secs % 86400;
    format!("{:02}:{:02}:{:02}", time / 3600, (time % 3600) / 60, time % 60)
}
