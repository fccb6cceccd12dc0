//! Club chat terminal client.
//!
//! # Usage
//!
//! ```bash
//! # Chat in room 42 of club 7; type lines to send, /help for commands
//! clubchat --token "$JWT" chat 7 42
//!
//! # List the rooms of club 7
//! clubchat --token "$JWT" rooms 7
//!
//! # Create a room
//! clubchat --token "$JWT" create-room 7 "Sunday run" --kind MEMBER
//! ```

use std::{
    io::{self, Write},
    time::Duration,
};

use chrono::{Local, Utc};
use clap::{Parser, Subcommand};
use clubchat_app::Runtime;
use clubchat_cli::{NetworkDriver, Transcript};
use clubchat_client::{
    ConnectionConfig, SessionConfig, SystemEnv,
    transport::{ApiClient, DEFAULT_API_BASE, DEFAULT_WS_BASE, Endpoints},
};
use clubchat_proto::{ClubId, CreateRoomRequest};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Club chat terminal client
#[derive(Parser, Debug)]
#[command(name = "clubchat")]
#[command(about = "Terminal client for club chat rooms")]
#[command(version)]
struct Args {
    /// Bearer token (JWT) issued by the club backend
    #[arg(long, env = "CLUBCHAT_TOKEN", hide_env_values = true)]
    token: String,

    /// REST API base URL
    #[arg(long, default_value = DEFAULT_API_BASE)]
    api_url: String,

    /// WebSocket base URL
    #[arg(long, default_value = DEFAULT_WS_BASE)]
    ws_url: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Open a chat room interactively
    Chat {
        /// Club id; with ROOM, opens the room right away
        club: Option<String>,

        /// Room id
        room: Option<String>,

        /// Seconds allowed to open the socket and finish the handshake
        #[arg(long, default_value = "5")]
        connect_timeout: u64,

        /// Seconds between reconnect attempts
        #[arg(long, default_value = "3")]
        reconnect_delay: u64,

        /// Give up after this many consecutive failures
        #[arg(long)]
        max_reconnects: Option<u32>,

        /// Milliseconds before members are refetched after someone enters
        /// or leaves
        #[arg(long, default_value = "500")]
        member_refresh: u64,
    },

    /// List the chat rooms of a club
    Rooms {
        /// Club id
        club: String,
    },

    /// Create a chat room
    CreateRoom {
        /// Club id
        club: String,

        /// Room name
        name: String,

        /// Image URL
        #[arg(long)]
        image_url: Option<String>,

        /// Room type
        #[arg(long, default_value = CreateRoomRequest::DEFAULT_KIND)]
        kind: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    // stdout carries the transcript
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();

    let endpoints = Endpoints::new(&args.api_url, &args.ws_url)?;

    match args.command {
        Cmd::Chat {
            club,
            room,
            connect_timeout,
            reconnect_delay,
            max_reconnects,
            member_refresh,
        } => {
            let chat_url = endpoints.chat_url(&args.token);
            let host = chat_url.host_str().unwrap_or("localhost").to_string();
            let config = SessionConfig {
                connection: ConnectionConfig {
                    connect_timeout: Duration::from_secs(connect_timeout),
                    reconnect_delay: Duration::from_secs(reconnect_delay),
                    max_reconnect_attempts: max_reconnects,
                    host,
                    ..ConnectionConfig::default()
                },
                member_refresh_delay: Duration::from_millis(member_refresh),
            };
            chat(endpoints, &args.token, config, club.zip(room)).await
        },
        Cmd::Rooms { club } => {
            let api = ApiClient::new(endpoints, &args.token)?;
            let directory = api.list_rooms(&ClubId::new(club)).await?;

            let mut out = io::stdout().lock();
            writeln!(out, "{}", directory.club_name)?;
            for room in &directory.chat_rooms {
                writeln!(out, "{:>6}  {}", room.id, room.name)?;
            }
            Ok(())
        },
        Cmd::CreateRoom { club, name, image_url, kind } => {
            let api = ApiClient::new(endpoints, &args.token)?;
            let mut request = CreateRoomRequest::new(name).with_kind(kind);
            if let Some(url) = image_url {
                request = request.with_image_url(url);
            }
            api.create_room(&ClubId::new(club), &request).await?;

            writeln!(io::stdout().lock(), "created {}", request.name)?;
            Ok(())
        },
    }
}

async fn chat(
    endpoints: Endpoints,
    token: &str,
    config: SessionConfig,
    open: Option<(String, String)>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut driver = NetworkDriver::new(endpoints, token, config.connection.connect_timeout)?;
    if let Some((club, room)) = open {
        driver.inject_line(format!("/open {club} {room}"));
    }
    driver.read_stdin();
    let drain = driver.drain();

    let runtime = Runtime::new(driver, SystemEnv, config, Some(token));
    let mut snapshots = runtime.subscribe();
    let printer = tokio::spawn(async move {
        let mut transcript = Transcript::new(Local);
        loop {
            let snapshot = snapshots.borrow_and_update().clone();
            let rendered = transcript.render(&snapshot, Utc::now(), &mut io::stdout().lock());
            if let Err(error) = rendered {
                tracing::warn!(%error, "transcript output failed");
                break;
            }
            if snapshots.changed().await.is_err() {
                break;
            }
        }
    });

    tracing::info!("chat session starting");
    runtime.run().await?;
    drain.wait().await;
    printer.await?;
    Ok(())
}
