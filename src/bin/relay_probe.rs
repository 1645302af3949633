//! Relay Probe CLI Tool
//!
//! A headless client that joins a relay, walks in a circle sending MOVE once
//! per interval, optionally says one chat line, and logs everything the
//! server sends back.
//!
//! Usage:
//!   relay-probe [--server <addr>] [--name <name>] [--moves <n>] [--chat <text>]
//!
//! Examples:
//!   relay-probe --server 127.0.0.1:7777 --name Alice
//!   relay-probe --name Bob --moves 30 --chat "hello from bob"

use std::time::{Duration, Instant};

use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use relay_server::client::RelayClient;
use relay_server::protocol::{Position, ServerMessage};
use relay_server::DEFAULT_PORT;

/// CLI arguments
struct Args {
    /// Server address
    server: String,
    /// Display name to join with
    name: String,
    /// Number of MOVE messages to send before leaving
    moves: u32,
    /// Delay between moves
    interval_ms: u64,
    /// Radius of the walked circle
    radius: f32,
    /// Optional chat line sent after joining
    chat: Option<String>,
    /// Verbose output
    verbose: bool,
}

fn parse_args() -> Result<Args, String> {
    let args: Vec<String> = std::env::args().collect();

    let mut server = format!("127.0.0.1:{}", DEFAULT_PORT);
    let mut name = "probe".to_string();
    let mut moves: u32 = 10;
    let mut interval_ms: u64 = 1000;
    let mut radius: f32 = 5.0;
    let mut chat: Option<String> = None;
    let mut verbose = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--server" | "-s" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing value for --server".to_string());
                }
                server = args[i].clone();
            }
            "--name" | "-n" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing value for --name".to_string());
                }
                name = args[i].clone();
            }
            "--moves" | "-m" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing value for --moves".to_string());
                }
                moves = args[i]
                    .parse()
                    .map_err(|_| format!("Invalid moves value: {}", args[i]))?;
            }
            "--interval-ms" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing value for --interval-ms".to_string());
                }
                interval_ms = args[i]
                    .parse()
                    .map_err(|_| format!("Invalid interval: {}", args[i]))?;
            }
            "--radius" | "-r" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing value for --radius".to_string());
                }
                radius = args[i]
                    .parse()
                    .map_err(|_| format!("Invalid radius: {}", args[i]))?;
            }
            "--chat" | "-c" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing value for --chat".to_string());
                }
                chat = Some(args[i].clone());
            }
            "--verbose" | "-v" => {
                verbose = true;
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            arg => {
                return Err(format!("Unknown argument: {}", arg));
            }
        }
        i += 1;
    }

    Ok(Args {
        server,
        name,
        moves,
        interval_ms,
        radius,
        chat,
        verbose,
    })
}

fn print_help() {
    println!(
        r#"
Relay Probe

Joins a relay server as a headless player and logs the traffic it sees.

USAGE:
    relay-probe [OPTIONS]

OPTIONS:
    -s, --server <ADDR>      Server address (default: 127.0.0.1:{port})
    -n, --name <NAME>        Display name (default: probe)
    -m, --moves <N>          MOVE messages to send before leaving (default: 10)
        --interval-ms <MS>   Delay between moves (default: 1000)
    -r, --radius <R>         Radius of the walked circle (default: 5)
    -c, --chat <TEXT>        Send one chat line after joining
    -v, --verbose            Enable verbose output
    -h, --help               Print this help message
"#,
        port = DEFAULT_PORT
    );
}

#[tokio::main]
async fn main() {
    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
    };

    let log_level = if args.verbose {
        Level::TRACE
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set subscriber: {}", e);
    }

    if let Err(e) = run_probe(&args).await {
        error!("Probe failed: {}", e);
        std::process::exit(1);
    }
}

async fn run_probe(args: &Args) -> relay_server::Result<()> {
    info!("Connecting to {}", args.server);
    let mut client = RelayClient::connect(args.server.as_str()).await?;

    let (player_id, spawn) = client.join(&args.name).await?;
    info!("Joined as '{}' with id {} at {}", args.name, player_id, spawn);

    if let Some(text) = &args.chat {
        client.send_chat(text).await?;
    }

    let interval = Duration::from_millis(args.interval_ms);
    for step in 0..args.moves {
        let angle = step as f32 * std::f32::consts::TAU / 16.0;
        let position = Position::new(args.radius * angle.cos(), 0.0, args.radius * angle.sin());
        client.send_move(position).await?;

        // Log whatever arrives until the next move is due
        let deadline = Instant::now() + interval;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match client.recv_timeout(remaining).await? {
                Some(message) => log_message(&message),
                None => break,
            }
        }
    }

    client.leave().await?;
    info!("Left after {} moves", args.moves);
    Ok(())
}

fn log_message(message: &ServerMessage) {
    match message {
        ServerMessage::LoginResult {
            player_id,
            position,
        } => info!("Login result: id {} at {}", player_id, position),
        ServerMessage::SpawnPlayer {
            player_id,
            position,
        } => info!("Player {} spawned at {}", player_id, position),
        ServerMessage::DespawnPlayer { player_id } => info!("Player {} left", player_id),
        ServerMessage::Move {
            player_id,
            position,
        } => info!("Player {} moved to {}", player_id, position),
        ServerMessage::Chat { player_id, text } => info!("[{}] {}", player_id, text),
    }
}
