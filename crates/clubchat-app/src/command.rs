//! Typed-line commands.
//!
//! Lines starting with `/` are commands; anything else is a message for the
//! open room. A leading `//` escapes the slash.

use clubchat_client::RoomTarget;
use clubchat_proto::ClubId;

/// Usage text for `/help`.
pub const HELP: &str = "\
/open <club> <room>    open a chat room
/close                 leave the open room
/rooms [club]          list the rooms of a club (default: the open room's club)
/create <club> <name>  create a room
/members               refresh the member list
/quit                  exit";

/// Parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Open (or switch to) a room.
    Open {
        /// Room to open.
        target: RoomTarget,
    },
    /// Close the open room.
    Close,
    /// List the rooms of a club.
    Rooms {
        /// Club to list; the open room's club when omitted.
        club: Option<ClubId>,
    },
    /// Create a room.
    Create {
        /// Owning club.
        club: ClubId,
        /// Room name (may contain spaces).
        name: String,
    },
    /// Refresh the member list.
    Members,
    /// Show usage.
    Help,
    /// Exit.
    Quit,
    /// Send a message to the open room.
    Message {
        /// Text as typed.
        text: String,
    },
    /// Unrecognized command.
    Unknown {
        /// The line as typed.
        input: String,
    },
    /// Known command with bad arguments.
    InvalidArgs {
        /// Command name without the slash.
        command: &'static str,
        /// What is wrong.
        error: &'static str,
    },
}

/// Parse one input line.
pub fn parse(input: &str) -> Command {
    let line = input.trim_end_matches(['\r', '\n']);

    if let Some(escaped) = line.strip_prefix("//") {
        return Command::Message { text: format!("/{escaped}") };
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Command::Message { text: line.to_string() };
    };

    let mut words = rest.split_whitespace();
    let name = words.next().unwrap_or_default();
    let args: Vec<&str> = words.collect();

    match name {
        "open" | "join" => match args.as_slice() {
            [club, room] => Command::Open { target: RoomTarget::new(*club, *room) },
            _ => Command::InvalidArgs { command: "open", error: "usage: /open <club> <room>" },
        },
        "close" | "leave" => Command::Close,
        "rooms" => match args.as_slice() {
            [] => Command::Rooms { club: None },
            [club] => Command::Rooms { club: Some(ClubId::new(club)) },
            _ => Command::InvalidArgs { command: "rooms", error: "usage: /rooms [club]" },
        },
        "create" => match args.as_slice() {
            [club, name @ ..] if !name.is_empty() => {
                Command::Create { club: ClubId::new(club), name: name.join(" ") }
            },
            _ => {
                Command::InvalidArgs { command: "create", error: "usage: /create <club> <name>" }
            },
        },
        "members" => Command::Members,
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        _ => Command::Unknown { input: line.to_string() },
    }
}
