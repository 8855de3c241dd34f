//! Line-oriented chat over the ring: messages are addressed to keys and land
//! on whichever node owns the key.

use crate::chord::node::ReceiveCallback;
use crate::network::node::ChordPeer;
use bytes::Bytes;
use chrono::Local;
use log::{info, warn};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send { key: String, text: String },
    Lookup { key: String },
    Info,
    Quit,
}

pub const HELP: &str = "commands: send <key> <text> | lookup <key> | info | quit";

impl Command {
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let (verb, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim_start();
        match verb {
            "send" => {
                let (key, text) = rest
                    .split_once(char::is_whitespace)
                    .ok_or_else(|| "usage: send <key> <text>".to_string())?;
                Ok(Command::Send {
                    key: key.to_string(),
                    text: text.trim_start().to_string(),
                })
            }
            "lookup" if !rest.is_empty() && !rest.contains(char::is_whitespace) => {
                Ok(Command::Lookup {
                    key: rest.to_string(),
                })
            }
            "lookup" => Err("usage: lookup <key>".to_string()),
            "info" => Ok(Command::Info),
            "quit" | "exit" => Ok(Command::Quit),
            other => Err(format!("unknown command {:?}; {}", other, HELP)),
        }
    }
}

/// Prints every received message with the local time.
pub fn printing_callback() -> ReceiveCallback {
    Arc::new(|message: Bytes| {
        println!(
            "[{}] {}",
            Local::now().format("%H:%M:%S"),
            String::from_utf8_lossy(&message)
        );
    })
}

/// Reads commands from stdin until `quit`, end of input, or shutdown.
pub async fn run_chat(peer: &ChordPeer) {
    let shutdown = peer.shutdown_token();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{}", HELP);

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => line,
        };
        let line = match line {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read stdin: {}", e);
                break;
            }
        };

        match Command::parse(&line) {
            Ok(Command::Send { key, text }) => match peer.send(&key, Bytes::from(text)).await {
                Ok(owner) => info!("delivered to {}", owner),
                Err(e) => warn!("send failed: {}", e),
            },
            Ok(Command::Lookup { key }) => match peer.lookup(&key).await {
                Ok(owner) => println!("{} -> {}", key, owner),
                Err(e) => warn!("lookup failed: {}", e),
            },
            Ok(Command::Info) => print!("{}", peer.snapshot().await),
            Ok(Command::Quit) => break,
            Err(usage) => println!("{}", usage),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(
            Command::parse("send alice hello there").unwrap(),
            Command::Send {
                key: "alice".into(),
                text: "hello there".into()
            }
        );
        assert_eq!(
            Command::parse("  lookup bob ").unwrap(),
            Command::Lookup { key: "bob".into() }
        );
        assert_eq!(Command::parse("info").unwrap(), Command::Info);
        assert_eq!(Command::parse("quit").unwrap(), Command::Quit);
    }

    #[test]
    fn rejects_incomplete_commands() {
        assert!(Command::parse("send alice").is_err());
        assert!(Command::parse("lookup").is_err());
        assert!(Command::parse("lookup a b").is_err());
        assert!(Command::parse("dance").is_err());
    }
}
