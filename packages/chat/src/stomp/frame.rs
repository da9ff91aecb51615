//! STOMP frame codec.
//!
//! Wire format: `COMMAND\nheader:value\n...\n\nBODY\0`. Header values are not
//! escaped, so colons and newlines inside values are not supported.

use std::collections::BTreeMap;

use crate::error::FrameError;

/// Keep-alive sent by the client and accepted from the server
pub const HEARTBEAT: &str = "\n";

/// STOMP commands used by the chat protocol
pub mod command {
    pub const CONNECT: &str = "CONNECT";
    pub const CONNECTED: &str = "CONNECTED";
    pub const SUBSCRIBE: &str = "SUBSCRIBE";
    pub const SEND: &str = "SEND";
    pub const MESSAGE: &str = "MESSAGE";
    pub const ERROR: &str = "ERROR";
    pub const DISCONNECT: &str = "DISCONNECT";
}

/// One STOMP protocol unit
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame {
    pub command: String,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

/// Result of decoding one WebSocket payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// Empty payload or bare EOLs
    Heartbeat,
    Frame(Frame),
}

impl Frame {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    /// Add a header, builder style
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set the body, builder style
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Look up a header value
    pub fn get(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    /// Serialize to the wire format
    pub fn encode(&self) -> String {
        encode(&self.command, &self.headers, &self.body)
    }

    /// `CONNECT` advertising STOMP 1.2 and a symmetric heart-beat contract
    pub fn connect(heartbeat_millis: u128) -> Self {
        Self::new(command::CONNECT)
            .header("accept-version", "1.2")
            .header("heart-beat", format!("{heartbeat_millis},{heartbeat_millis}"))
    }

    pub fn subscribe(id: impl Into<String>, destination: impl Into<String>) -> Self {
        Self::new(command::SUBSCRIBE)
            .header("id", id)
            .header("destination", destination)
    }

    /// `SEND` with a JSON body
    pub fn send_json(destination: impl Into<String>, json: impl Into<String>) -> Self {
        Self::new(command::SEND)
            .header("destination", destination)
            .header("content-type", "application/json")
            .body(json)
    }

    pub fn disconnect() -> Self {
        Self::new(command::DISCONNECT)
    }
}

/// Serialize a frame: command line, `key:value` lines, blank line, body, NUL.
pub fn encode(command: &str, headers: &BTreeMap<String, String>, body: &str) -> String {
    let mut out = String::with_capacity(command.len() + body.len() + 16 * (headers.len() + 1));
    out.push_str(command);
    out.push('\n');
    for (key, value) in headers {
        out.push_str(key);
        out.push(':');
        out.push_str(value);
        out.push('\n');
    }
    out.push('\n');
    out.push_str(body);
    out.push('\0');
    out
}

/// Decode one WebSocket payload.
///
/// Leading EOLs are heart-beats and are skipped; a payload made only of EOLs
/// decodes to [`Decoded::Heartbeat`]. Header keys keep their first value.
pub fn decode(raw: &str) -> Result<Decoded, FrameError> {
    let mut cursor = Cursor::new(raw);
    cursor.skip_eols();

    let mut state = ParseState::Command;
    let mut frame = Frame::default();

    loop {
        match state {
            ParseState::Command => match cursor.next_line() {
                None => return Ok(Decoded::Heartbeat),
                Some("") => return Err(FrameError::MissingCommand),
                Some(line) => {
                    frame.command = line.to_string();
                    state = ParseState::Headers;
                }
            },
            ParseState::Headers => match cursor.next_line() {
                // Frame ended without a body
                None => return Ok(Decoded::Frame(frame)),
                Some("") => state = ParseState::Body,
                Some(line) => {
                    let (key, value) = match line.split_once(':') {
                        Some((key, value)) if !key.is_empty() => (key, value),
                        _ => return Err(FrameError::MalformedHeader(line.to_string())),
                    };
                    frame
                        .headers
                        .entry(key.to_string())
                        .or_insert_with(|| value.to_string());
                }
            },
            ParseState::Body => {
                frame.body = cursor.take_body().to_string();
                return Ok(Decoded::Frame(frame));
            }
        }
    }
}

enum ParseState {
    Command,
    Headers,
    Body,
}

/// Forward-only reader over a frame payload
struct Cursor<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn skip_eols(&mut self) {
        let rest = self.rest();
        let trimmed = rest.trim_start_matches(|c: char| c == '\n' || c == '\r');
        self.pos += rest.len() - trimmed.len();
    }

    /// Next line without its EOL (`\n` or `\r\n`).
    ///
    /// Returns `None` at the end of the frame: end of input or a NUL. A NUL is
    /// never consumed.
    fn next_line(&mut self) -> Option<&'a str> {
        let rest = self.rest();
        if rest.is_empty() || rest.starts_with('\0') {
            return None;
        }

        let end = rest
            .find(|c: char| c == '\n' || c == '\0')
            .unwrap_or(rest.len());
        self.pos += end;
        if rest[end..].starts_with('\n') {
            self.pos += 1;
        }

        let line = &rest[..end];
        Some(line.strip_suffix('\r').unwrap_or(line))
    }

    /// Everything up to (not including) the NUL terminator
    fn take_body(&mut self) -> &'a str {
        let rest = self.rest();
        let end = rest.find('\0').unwrap_or(rest.len());
        self.pos += end;
        &rest[..end]
    }
}
