//! Terminal chat between two Parley peers.
//!
//! ```text
//! chat server <port> [config.json]
//! chat client <host> <port> [config.json]
//! ```
//!
//! Each line typed is submitted: it becomes a question when it's your
//! turn to ask, or the answer when you owe one. Incoming questions get a
//! read receipt a few seconds after they arrive.

use std::path::Path;
use std::time::Duration;

use parley::prelude::*;
use rand::Rng;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Read receipts go out after a random delay in this range, in seconds.
const READ_DELAY_SECS: std::ops::RangeInclusive<f64> = 1.0..=5.0;

const USAGE: &str = "usage: chat server <port> [config.json]\n       chat client <host> <port> [config.json]";

enum Role {
    Server { port: u16 },
    Client { host: String, port: u16 },
}

struct Args {
    role: Role,
    config: Option<String>,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Args, String> {
    let parse_port = |s: Option<String>| -> Result<u16, String> {
        let s = s.ok_or("missing port")?;
        s.parse().map_err(|_| format!("invalid port: {s}"))
    };

    let role = match args.next().as_deref() {
        Some("server") => Role::Server {
            port: parse_port(args.next())?,
        },
        Some("client") => {
            let host = args.next().ok_or("missing host")?;
            Role::Client {
                host,
                port: parse_port(args.next())?,
            }
        }
        _ => return Err("expected `server` or `client`".into()),
    };

    Ok(Args {
        role,
        config: args.next(),
    })
}

fn load_config(
    path: Option<&str>,
    default_name: &str,
) -> Result<PeerConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(Path::new(path))?;
            Ok(serde_json::from_str(&raw)?)
        }
        None => Ok(PeerConfig {
            name: default_name.to_string(),
            ..PeerConfig::default()
        }),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chat=info,parley_transport=info,parley_turn=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}\n{USAGE}");
            std::process::exit(2);
        }
    };

    let mut peer = match &args.role {
        Role::Server { port } => {
            let config = load_config(args.config.as_deref(), "server")?;
            let name = config.name.clone();
            eprintln!("[{name}] waiting for a peer on port {port}");
            Peer::builder()
                .config(config)
                .serve(&format!("0.0.0.0:{port}"))
                .await?
        }
        Role::Client { host, port } => {
            let config = load_config(args.config.as_deref(), "client")?;
            Peer::builder()
                .config(config)
                .connect_host(host, *port)
                .await?
        }
    };
    eprintln!("connected to {}", peer.peer_addr());

    let mut events = peer.events()?;
    let handle = peer.handle();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => {
                let Some(line) = line? else {
                    stdin_open = false;
                    peer.close().await?;
                    continue;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match peer.submit(line).await {
                    Ok(Submitted::Request(id)) => println!("sent {id}, waiting for a response"),
                    Ok(Submitted::Response(id)) => println!("answered {id}"),
                    Ok(Submitted::Rejected { awaiting }) => {
                        println!("still waiting for a response to {awaiting}")
                    }
                    Err(e) => println!("send failed: {e}"),
                }
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                if !show(event, &handle) {
                    break;
                }
            }
        }
    }

    Ok(())
}

/// Prints one event. Returns `false` once the conversation is over.
fn show(event: PeerEvent, handle: &TurnHandle) -> bool {
    match event {
        PeerEvent::Request(message) => {
            let id = message.id();
            println!("> {}", message.text());
            println!("(your answer to {id})");
            schedule_read_receipt(handle.clone(), id);
        }
        PeerEvent::Ack(id) => println!("{id} delivered"),
        PeerEvent::ReadReceipt(id) => println!("{id} read"),
        PeerEvent::Response(message) => {
            println!("< {}", message.text());
            println!("(your turn)");
        }
        PeerEvent::UnexpectedResponse { message, .. } => {
            println!("unexpected response for {}: {}", message.id(), message.text());
        }
        PeerEvent::Notice(notice) => println!("{notice}"),
        PeerEvent::Disconnected(reason) => {
            println!("{reason}");
            return false;
        }
    }
    true
}

fn schedule_read_receipt(handle: TurnHandle, id: MessageId) {
    let delay = Duration::from_secs_f64(rand::rng().random_range(READ_DELAY_SECS));
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if let Err(e) = handle.send_read_receipt(id).await {
            tracing::debug!(message_id = %id, error = %e, "read receipt not sent");
        }
    });
}
