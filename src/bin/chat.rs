use std::{collections::HashSet, time::Duration};

use monadssenger::{
    config::ClientConfig,
    db::ROOM_PRESETS,
    identity::Identity,
    store::HttpStore,
    sync::{ChatHandle, Mode, Notice, RoomView},
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let config = ClientConfig::load()?;
    let store = HttpStore::new(&config.server_url, Duration::from_secs(config.timeout_secs))?;
    let identity = Identity::random();

    println!("You are: {} ({})", identity.username, identity.user_color);
    println!("Rooms: {}. Type /room <name> to switch, /quit to leave.", ROOM_PRESETS.join(", "));

    let mut chat = ChatHandle::spawn(store, identity, config.room);
    let mut view = chat.view();
    let mut screen = Screen::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match line.trim() {
                    "/quit" => break,
                    command if command.starts_with("/room ") => {
                        chat.switch_room(command.trim_start_matches("/room ").trim());
                    }
                    _ => {
                        chat.input();
                        chat.send(line);
                    }
                }
            }
            changed = view.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = view.borrow_and_update().clone();
                screen.render(&snapshot);
            }
            Some(notice) = chat.next_notice() => match notice {
                Notice::RateLimited => println!("! Slow down! You're sending messages too quickly."),
                Notice::Rejected(reason) => println!("! Not sent: {reason}"),
                Notice::Offline => println!("! Server unreachable, chatting locally from now on."),
            },
        }
    }

    chat.shutdown().await;
    Ok(())
}

/// Prints only what is new since the last render.
#[derive(Default)]
struct Screen {
    room: String,
    printed: HashSet<String>,
    typing: Vec<String>,
}

impl Screen {
    fn render(&mut self, view: &RoomView) {
        if view.room != self.room {
            self.room = view.room.clone();
            self.printed.clear();
            println!("== #{} ==", view.room);
        }

        for message in &view.messages {
            // a confirmed send comes back under the server's id
            let key = format!("{}|{}|{}", message.username, message.created_at, message.text);
            if self.printed.insert(key) {
                let time = message.created_at.time();
                println!(
                    "[{:02}:{:02}] {}: {}",
                    time.hour(),
                    time.minute(),
                    message.username,
                    message.text
                );
            }
        }

        let typing: Vec<_> = view.typing.iter().map(|t| t.username.clone()).collect();
        if typing != self.typing {
            if !typing.is_empty() {
                let verb = if typing.len() == 1 { "is" } else { "are" };
                println!("... {} {verb} typing", typing.join(", "));
            }
            self.typing = typing;
        }

        if view.mode == Mode::Disconnected {
            self.typing.clear();
        }
    }
}
