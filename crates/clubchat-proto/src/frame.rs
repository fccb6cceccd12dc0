//! STOMP 1.2 text frames.
//!
//! A frame on the wire is:
//!
//! ```text
//! COMMAND EOL
//! *(header EOL)
//! EOL
//! *OCTET NUL
//! ```
//!
//! where EOL is `\n` or `\r\n`. A text message consisting only of EOLs is a
//! heart-beat, surfaced as [`Inbound::HeartBeat`].
//!
//! # Invariants
//!
//! - Header values are escaped (`\\`, `\n`, `\r`, `\c`) in every frame except
//!   `CONNECT` and `CONNECTED`, which STOMP 1.2 exempts for backwards
//!   compatibility.
//! - When a header repeats, the first occurrence wins.
//! - `content-length`, when present, bounds the body exactly and must be
//!   followed by the NUL terminator.

use std::fmt;

use crate::errors::{ProtocolError, Result};

/// STOMP frame command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Client handshake.
    Connect,
    /// Alternative client handshake (STOMP 1.2).
    Stomp,
    /// Server handshake reply.
    Connected,
    /// Client publishes to a destination.
    Send,
    /// Client subscribes to a destination.
    Subscribe,
    /// Client cancels a subscription.
    Unsubscribe,
    /// Client acknowledges a message.
    Ack,
    /// Client rejects a message.
    Nack,
    /// Client opens a transaction.
    Begin,
    /// Client commits a transaction.
    Commit,
    /// Client aborts a transaction.
    Abort,
    /// Client closes the session gracefully.
    Disconnect,
    /// Server delivers a message for a subscription.
    Message,
    /// Server confirms a client frame carrying a `receipt` header.
    Receipt,
    /// Server reports an error; the server closes the connection after it.
    Error,
}

impl Command {
    /// Wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Stomp => "STOMP",
            Self::Connected => "CONNECTED",
            Self::Send => "SEND",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Ack => "ACK",
            Self::Nack => "NACK",
            Self::Begin => "BEGIN",
            Self::Commit => "COMMIT",
            Self::Abort => "ABORT",
            Self::Disconnect => "DISCONNECT",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
        }
    }

    /// Parse a command line.
    pub fn parse(line: &str) -> Result<Self> {
        let command = match line {
            "CONNECT" => Self::Connect,
            "STOMP" => Self::Stomp,
            "CONNECTED" => Self::Connected,
            "SEND" => Self::Send,
            "SUBSCRIBE" => Self::Subscribe,
            "UNSUBSCRIBE" => Self::Unsubscribe,
            "ACK" => Self::Ack,
            "NACK" => Self::Nack,
            "BEGIN" => Self::Begin,
            "COMMIT" => Self::Commit,
            "ABORT" => Self::Abort,
            "DISCONNECT" => Self::Disconnect,
            "MESSAGE" => Self::Message,
            "RECEIPT" => Self::Receipt,
            "ERROR" => Self::Error,
            other => return Err(ProtocolError::UnknownCommand(other.to_string())),
        };
        Ok(command)
    }

    /// Whether header values of this command use STOMP 1.2 escaping.
    fn escapes_headers(self) -> bool {
        !matches!(self, Self::Connect | Self::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of decoding one transport message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Keep-alive EOL(s) with no frame.
    HeartBeat,
    /// A complete frame.
    Frame(Frame),
}

/// A STOMP frame with a UTF-8 body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame command.
    pub command: Command,
    /// Headers in wire order (unescaped).
    pub headers: Vec<(String, String)>,
    /// Frame body (may be empty).
    pub body: String,
}

impl Frame {
    /// Create a frame with no headers and an empty body.
    pub fn new(command: Command) -> Self {
        Self { command, headers: Vec::new(), body: String::new() }
    }

    /// Append a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Replace the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// `CONNECT` frame for the given virtual host and heart-beat offer.
    pub fn connect(host: &str, heart_beat: &str) -> Self {
        Self::new(Command::Connect)
            .with_header("accept-version", "1.2")
            .with_header("host", host)
            .with_header("heart-beat", heart_beat)
    }

    /// `SUBSCRIBE` frame with automatic acknowledgement.
    pub fn subscribe(id: &str, destination: &str) -> Self {
        Self::new(Command::Subscribe)
            .with_header("id", id)
            .with_header("destination", destination)
            .with_header("ack", "auto")
    }

    /// `UNSUBSCRIBE` frame for a subscription id.
    pub fn unsubscribe(id: &str) -> Self {
        Self::new(Command::Unsubscribe).with_header("id", id)
    }

    /// `SEND` frame carrying a JSON body.
    pub fn send_json(destination: &str, body: impl Into<String>) -> Self {
        Self::new(Command::Send)
            .with_header("destination", destination)
            .with_header("content-type", "application/json")
            .with_body(body)
    }

    /// `DISCONNECT` frame requesting a receipt.
    pub fn disconnect(receipt: &str) -> Self {
        Self::new(Command::Disconnect).with_header("receipt", receipt)
    }

    /// Value of the first header named `name`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
    }

    /// Value of a header the command requires.
    pub fn require_header(&self, name: &'static str) -> Result<&str> {
        self.header(name)
            .ok_or(ProtocolError::MissingHeader { command: self.command.as_str(), header: name })
    }

    /// Encode to wire text, including the NUL terminator.
    ///
    /// A `content-length` header is added for non-empty bodies unless one is
    /// already present.
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');

        let escape = self.command.escapes_headers();
        for (name, value) in &self.headers {
            push_header_part(&mut out, name, escape);
            out.push(':');
            push_header_part(&mut out, value, escape);
            out.push('\n');
        }

        if !self.body.is_empty() && self.header("content-length").is_none() {
            out.push_str("content-length:");
            out.push_str(&self.body.len().to_string());
            out.push('\n');
        }

        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Decode one transport message.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::UnknownCommand` for an unrecognized command line
    /// - `ProtocolError::MalformedHeader` / `InvalidEscape` for bad headers
    /// - `ProtocolError::InvalidContentLength` when the length is unusable
    /// - `ProtocolError::MissingTerminator` when the NUL octet is absent
    pub fn decode(text: &str) -> Result<Inbound> {
        let text = text.trim_start_matches(['\r', '\n']);
        if text.is_empty() {
            return Ok(Inbound::HeartBeat);
        }

        let (command_line, mut rest) = next_line(text).ok_or(ProtocolError::MissingTerminator)?;
        let command = Command::parse(command_line)?;

        let mut headers = Vec::new();
        loop {
            let (line, after) = next_line(rest).ok_or(ProtocolError::MissingTerminator)?;
            rest = after;
            if line.is_empty() {
                break;
            }

            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| ProtocolError::MalformedHeader(line.to_string()))?;

            if command.escapes_headers() {
                headers.push((unescape(name)?, unescape(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        let content_length =
            headers.iter().find(|(name, _)| name == "content-length").map(|(_, v)| v.as_str());

        let body = match content_length {
            Some(raw) => {
                let len: usize = raw
                    .trim()
                    .parse()
                    .map_err(|_| ProtocolError::InvalidContentLength(raw.to_string()))?;
                let body = rest
                    .get(..len)
                    .ok_or_else(|| ProtocolError::InvalidContentLength(raw.to_string()))?;
                if rest.as_bytes().get(len) != Some(&0) {
                    return Err(ProtocolError::MissingTerminator);
                }
                body
            },
            None => {
                let end = rest.find('\0').ok_or(ProtocolError::MissingTerminator)?;
                &rest[..end]
            },
        };

        Ok(Inbound::Frame(Self { command, headers, body: body.to_string() }))
    }
}

/// Split off one line, accepting both `\n` and `\r\n`.
fn next_line(text: &str) -> Option<(&str, &str)> {
    let idx = text.find('\n')?;
    let line = &text[..idx];
    let line = line.strip_suffix('\r').unwrap_or(line);
    Some((line, &text[idx + 1..]))
}

fn push_header_part(out: &mut String, raw: &str, escape: bool) {
    if !escape {
        out.push_str(raw);
        return;
    }
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            c => out.push(c),
        }
    }
}

fn unescape(raw: &str) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            Some('\\') => out.push('\\'),
            _ => return Err(ProtocolError::InvalidEscape(raw.to_string())),
        }
    }
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn decode_frame(text: &str) -> Frame {
        match Frame::decode(text).unwrap() {
            Inbound::Frame(frame) => frame,
            Inbound::HeartBeat => unreachable!("expected a frame"),
        }
    }

    #[test]
    fn decode_server_message() {
        let text = "MESSAGE\nsubscription:sub-0\nmessage-id:42\ndestination:/sub/ws/chat/rooms/7\n\n{\"a\":1}\0";
        let frame = decode_frame(text);

        assert_eq!(frame.command, Command::Message);
        assert_eq!(frame.header("subscription"), Some("sub-0"));
        assert_eq!(frame.header("destination"), Some("/sub/ws/chat/rooms/7"));
        assert_eq!(frame.body, "{\"a\":1}");
    }

    #[test]
    fn lone_eol_is_heart_beat() {
        assert_eq!(Frame::decode("\n").unwrap(), Inbound::HeartBeat);
        assert_eq!(Frame::decode("\r\n\r\n").unwrap(), Inbound::HeartBeat);
    }

    #[test]
    fn leading_heart_beats_are_skipped() {
        let frame = decode_frame("\n\nCONNECTED\nversion:1.2\n\n\0");
        assert_eq!(frame.command, Command::Connected);
        assert_eq!(frame.header("version"), Some("1.2"));
    }

    #[test]
    fn crlf_line_endings() {
        let frame = decode_frame("RECEIPT\r\nreceipt-id:77\r\n\r\n\0");
        assert_eq!(frame.header("receipt-id"), Some("77"));
    }

    #[test]
    fn escaped_headers_round_trip() {
        let frame = Frame::new(Command::Send)
            .with_header("destination", "/app/message")
            .with_header("note", "a:b\\c\nd")
            .with_body("x");

        let wire = frame.encode();
        assert!(wire.contains("note:a\\cb\\\\c\\nd\n"));
        assert_eq!(decode_frame(&wire).header("note"), Some("a:b\\c\nd"));
    }

    #[test]
    fn connect_headers_are_not_escaped() {
        let wire = Frame::connect("localhost:8082", "10000,10000").encode();
        assert!(wire.starts_with("CONNECT\naccept-version:1.2\nhost:localhost:8082\n"));
    }

    #[test]
    fn first_repeated_header_wins() {
        let frame = decode_frame("MESSAGE\nfoo:first\nfoo:second\n\n\0");
        assert_eq!(frame.header("foo"), Some("first"));
    }

    #[test]
    fn content_length_bounds_body() {
        let frame = decode_frame("MESSAGE\ncontent-length:3\n\na\0b\0");
        assert_eq!(frame.body, "a\0b");
    }

    #[test]
    fn content_length_is_added_on_encode() {
        let wire = Frame::send_json("/app/message", "{}").encode();
        assert!(wire.contains("content-length:2\n"));
    }

    #[test]
    fn reject_missing_terminator() {
        assert_eq!(
            Frame::decode("MESSAGE\nfoo:bar\n\nbody"),
            Err(ProtocolError::MissingTerminator)
        );
        assert_eq!(Frame::decode("MESSAGE"), Err(ProtocolError::MissingTerminator));
    }

    #[test]
    fn reject_unknown_command() {
        assert!(matches!(Frame::decode("HELLO\n\n\0"), Err(ProtocolError::UnknownCommand(_))));
    }

    #[test]
    fn reject_invalid_escape() {
        assert!(matches!(
            Frame::decode("MESSAGE\nfoo:a\\tb\n\n\0"),
            Err(ProtocolError::InvalidEscape(_))
        ));
    }

    #[test]
    fn reject_oversized_content_length() {
        assert!(matches!(
            Frame::decode("MESSAGE\ncontent-length:99\n\nab\0"),
            Err(ProtocolError::InvalidContentLength(_))
        ));
    }

    #[test]
    fn require_header_reports_command() {
        let frame = Frame::new(Command::Message);
        assert_eq!(
            frame.require_header("subscription"),
            Err(ProtocolError::MissingHeader { command: "MESSAGE", header: "subscription" })
        );
    }
}
