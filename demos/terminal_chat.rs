//! # Terminal Chat Example
//!
//! Joins a QuickChat room over WebSocket and bridges it to the terminal:
//!
//! 1. Validate the username and room id
//! 2. Open the session (validate, join, heartbeat, reconnect)
//! 3. Print messages and presence updates
//! 4. Send every stdin line as a chat message
//! 5. Leave the room on `/leave`, Ctrl+C, or end of input
//!
//! ## Running
//!
//! ```sh
//! QUICKCHAT_SERVER_URL=ws://localhost:3000/ws cargo run --example terminal_chat -- alice 42
//! ```

use quickchat_client::{
    ChatClient, ChatConfig, ChatEvent, ChatIdentity, NavigationGuard, Navigator,
    WebSocketConnector,
};
use tokio::io::{AsyncBufReadExt, BufReader};

/// A terminal has no history stack; leaving just ends the program.
#[derive(Debug, Default)]
struct TerminalNavigator;

impl Navigator for TerminalNavigator {
    fn confirm(&self, prompt: &str) -> bool {
        println!("{prompt} (leaving)");
        true
    }

    fn trap_history(&self) {}

    fn navigate_to_entry(&self) {
        println!("left the room");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Set `RUST_LOG=quickchat_client=debug` for protocol traces.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    // ── Identity ────────────────────────────────────────────────────
    let mut args = std::env::args().skip(1);
    let username = args.next().unwrap_or_else(|| "rustacean".to_owned());
    let room = args.next().unwrap_or_else(|| "1".to_owned());
    let identity = ChatIdentity::new(&username, &room)?;

    // ── Open ────────────────────────────────────────────────────────
    let config = ChatConfig::from_env();
    let (mut client, mut events) = match ChatClient::open(WebSocketConnector::new(), config, identity)
    {
        Ok(opened) => opened,
        Err(e) => {
            if let Some(failure) = e.as_failure() {
                eprintln!("{failure} [{}]", failure.recovery());
            }
            return Err(e.into());
        }
    };
    let guard = NavigationGuard::new(TerminalNavigator);
    guard.install();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    // ── Event loop ──────────────────────────────────────────────────
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    ChatEvent::SessionEstablished(session) => {
                        println!("joined room #{} as {} (session {})",
                            session.room_id, session.username, session.short_id());
                    }
                    ChatEvent::Message(msg) => println!("<{}> {}", msg.username, msg.text),
                    ChatEvent::RoomStats(stats) => {
                        let users: Vec<&str> = stats.active_users.iter().map(String::as_str).collect();
                        println!("* {} online: {}", stats.user_count, users.join(", "));
                    }
                    ChatEvent::Reconnecting { attempt, delay } => {
                        println!("* connection lost, retry {attempt} in {}s", delay.as_secs());
                    }
                    ChatEvent::Failed(failure) => {
                        eprintln!("{failure} [{}]", failure.recovery());
                        break;
                    }
                    ChatEvent::Left => break,
                    _ => {}
                }
            }

            line = lines.next_line() => {
                match line? {
                    Some(line) if line.trim() == "/leave" => {
                        guard.leave(&mut client).await?;
                        break;
                    }
                    Some(line) => {
                        if let Err(e) = client.send_message(&line) {
                            eprintln!("! {e}");
                        }
                    }
                    None => {
                        guard.leave(&mut client).await?;
                        break;
                    }
                }
            }

            _ = tokio::signal::ctrl_c() => {
                guard.leave(&mut client).await?;
                break;
            }
        }
    }

    client.shutdown().await;
    Ok(())
}
