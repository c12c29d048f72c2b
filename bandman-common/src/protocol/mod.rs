//! BandManager line protocol
//!
//! Every protocol unit is one UTF-8 line terminated by `\n`. The entry
//! handshake selects guest or authenticated mode, after which the client
//! sends one command line at a time, optionally followed by a payload line.
//!
//! ```text
//! client -> guest | noguest
//! [noguest] client -> <username>
//!           client -> <password>
//!           server -> ok | notok
//! ```

pub mod codec;
pub mod wire;

pub use codec::{Reply, WireCodec, DEFAULT_MAX_LINE_LENGTH};

/// Success token
pub const OK: &str = "ok";
/// Generic rejection token (authentication failure, missing entity, denied mutation)
pub const NOT_OK: &str = "notok";
/// Duplicate-name rejection for `add_*`
pub const ALREADY_IN: &str = "alreadyin";
/// Malformed payload
pub const ERROR: &str = "error";

/// Sentinel closing a `getbands` listing
pub const END: &str = "end";
/// Sentinel closing a `show_songs` listing
pub const END_SONGS: &str = "endsongs";
/// Sentinel closing a `show_events` listing
pub const END_EVENTS: &str = "endevents";

/// First line sent by a client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handshake {
    /// Browse without credentials
    Guest,
    /// Username and password lines follow
    NoGuest,
}

impl Handshake {
    pub fn parse(line: &str) -> Option<Self> {
        match line {
            "guest" => Some(Handshake::Guest),
            "noguest" => Some(Handshake::NoGuest),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Handshake::Guest => "guest",
            Handshake::NoGuest => "noguest",
        }
    }
}

/// Command lines accepted once a session is active
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// List performer names, then `end`
    GetBands,
    /// Performer line follows; song rows, then `endsongs`
    ShowSongs,
    /// Performer line follows; event rows, then `endevents`
    ShowEvents,
    /// Performer line follows; guest selection, no reply
    ShowGuest,
    /// Song payload follows; `ok` or `alreadyin`
    AddSong,
    /// Event payload follows; `ok` or `alreadyin`
    AddEvent,
    /// Song name follows; `ok` or `notok`
    RemoveSong,
    /// Event name follows; `ok` or `notok`
    RemoveEvent,
    /// Log out, connection ends
    Back,
    /// Connection ends
    Close,
    /// Connection ends and the service stops
    Quit,
}

impl Command {
    /// Parse a command line; `None` for anything unrecognized
    pub fn parse(line: &str) -> Option<Self> {
        let command = match line {
            "getbands" => Command::GetBands,
            "show_songs" => Command::ShowSongs,
            "show_events" => Command::ShowEvents,
            "show_guest" => Command::ShowGuest,
            "add_song" => Command::AddSong,
            "add_event" => Command::AddEvent,
            "remove_song" => Command::RemoveSong,
            "remove_event" => Command::RemoveEvent,
            "back" => Command::Back,
            "close" => Command::Close,
            "quit" => Command::Quit,
            _ => return None,
        };
        Some(command)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Command::GetBands => "getbands",
            Command::ShowSongs => "show_songs",
            Command::ShowEvents => "show_events",
            Command::ShowGuest => "show_guest",
            Command::AddSong => "add_song",
            Command::AddEvent => "add_event",
            Command::RemoveSong => "remove_song",
            Command::RemoveEvent => "remove_event",
            Command::Back => "back",
            Command::Close => "close",
            Command::Quit => "quit",
        }
    }

    /// Whether the command is followed by one payload line
    pub fn has_payload(&self) -> bool {
        !matches!(
            self,
            Command::GetBands | Command::Back | Command::Close | Command::Quit
        )
    }

    /// Whether the command ends the connection
    pub fn is_terminal(&self) -> bool {
        matches!(self, Command::Back | Command::Close | Command::Quit)
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
