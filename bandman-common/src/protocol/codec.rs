//! Framing for the line protocol
//!
//! [`WireCodec`] decodes one line per item (the `\n` and any trailing `\r`
//! removed) and encodes either a raw line or a structured [`Reply`]. List
//! replies are framed by a sentinel line, never by a length prefix.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec};

use super::{wire, ALREADY_IN, END, END_EVENTS, END_SONGS, ERROR, NOT_OK, OK};
use crate::error::Error;
use crate::models::{Event, Song};

/// Longest line accepted unless configured otherwise
pub const DEFAULT_MAX_LINE_LENGTH: usize = 4096;

/// Server response to one command
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Ok,
    NotOk,
    AlreadyIn,
    /// Malformed payload
    Error,
    /// Performer names, closed by `end`
    Performers(Vec<String>),
    /// Song rows, closed by `endsongs`
    Songs(Vec<Song>),
    /// Event rows, closed by `endevents`
    Events(Vec<Event>),
}

impl Reply {
    /// Lines this reply puts on the wire, sentinel included
    pub fn lines(&self) -> Vec<String> {
        match self {
            Reply::Ok => vec![OK.to_string()],
            Reply::NotOk => vec![NOT_OK.to_string()],
            Reply::AlreadyIn => vec![ALREADY_IN.to_string()],
            Reply::Error => vec![ERROR.to_string()],
            Reply::Performers(names) => names
                .iter()
                .cloned()
                .chain(std::iter::once(END.to_string()))
                .collect(),
            Reply::Songs(songs) => songs
                .iter()
                .map(wire::song_row)
                .chain(std::iter::once(END_SONGS.to_string()))
                .collect(),
            Reply::Events(events) => events
                .iter()
                .map(wire::event_row)
                .chain(std::iter::once(END_EVENTS.to_string()))
                .collect(),
        }
    }
}

/// Line codec shared by the server session and the client
#[derive(Debug, Clone)]
pub struct WireCodec {
    lines: LinesCodec,
}

impl WireCodec {
    pub fn new() -> Self {
        Self::with_max_length(DEFAULT_MAX_LINE_LENGTH)
    }

    /// Lines longer than `max_length` bytes fail decoding
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max_length),
        }
    }
}

impl Default for WireCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for WireCodec {
    type Item = String;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, Error> {
        Ok(self.lines.decode(src)?)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>, Error> {
        Ok(self.lines.decode_eof(src)?)
    }
}

/// An embedded line break would put more than one line on the wire
fn single_line(line: &str) -> Result<(), Error> {
    if line.contains(['\n', '\r']) {
        return Err(Error::Protocol(format!(
            "refusing to send '{}': contains a line break",
            line.escape_debug()
        )));
    }
    Ok(())
}

impl Encoder<String> for WireCodec {
    type Error = Error;

    fn encode(&mut self, line: String, dst: &mut BytesMut) -> Result<(), Error> {
        single_line(&line)?;
        Ok(self.lines.encode(line, dst)?)
    }
}

impl Encoder<&str> for WireCodec {
    type Error = Error;

    fn encode(&mut self, line: &str, dst: &mut BytesMut) -> Result<(), Error> {
        single_line(line)?;
        Ok(self.lines.encode(line, dst)?)
    }
}

impl Encoder<Reply> for WireCodec {
    type Error = Error;

    fn encode(&mut self, reply: Reply, dst: &mut BytesMut) -> Result<(), Error> {
        let lines = reply.lines();
        for line in &lines {
            single_line(line)?;
        }
        for line in lines {
            self.lines.encode(line, dst)?;
        }
        Ok(())
    }
}
