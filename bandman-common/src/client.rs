//! Protocol client
//!
//! Speaks the line protocol to a BandManager server. Used by the `bandman`
//! command line front-end and by the server's integration tests.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::Framed;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{Event, Song};
use crate::protocol::{
    wire, Command, Handshake, WireCodec, ALREADY_IN, END, END_EVENTS, END_SONGS, ERROR, NOT_OK,
    OK,
};

/// Default wait for any single server line
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Status token answering a mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    NotOk,
    AlreadyIn,
    /// Server rejected the payload as malformed
    Error,
}

impl Outcome {
    pub fn parse(line: &str) -> Result<Self> {
        match line {
            OK => Ok(Outcome::Ok),
            NOT_OK => Ok(Outcome::NotOk),
            ALREADY_IN => Ok(Outcome::AlreadyIn),
            ERROR => Ok(Outcome::Error),
            other => Err(Error::Protocol(format!("unexpected reply '{}'", other))),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok)
    }

    /// Wire token for this outcome
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Ok => OK,
            Outcome::NotOk => NOT_OK,
            Outcome::AlreadyIn => ALREADY_IN,
            Outcome::Error => ERROR,
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One client connection, from handshake to `back`/`close`/`quit`
pub struct Client {
    framed: Framed<TcpStream, WireCodec>,
    read_timeout: Duration,
}

impl Client {
    async fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self {
            framed: Framed::new(stream, WireCodec::new()),
            read_timeout: DEFAULT_READ_TIMEOUT,
        })
    }

    /// Open a guest session (read-only browsing)
    pub async fn connect_guest(addr: impl ToSocketAddrs) -> Result<Self> {
        let mut client = Self::connect(addr).await?;
        client.send_line(Handshake::Guest.as_str()).await?;
        Ok(client)
    }

    /// Open an authenticated session for `username`
    pub async fn connect_login(
        addr: impl ToSocketAddrs,
        username: &str,
        password: &str,
    ) -> Result<Self> {
        wire::check_field("username", username)?;
        wire::check_field("password", password)?;
        let mut client = Self::connect(addr).await?;
        client.send_line(Handshake::NoGuest.as_str()).await?;
        client.send_line(username).await?;
        client.send_line(password).await?;
        match client.read_line().await?.as_str() {
            OK => Ok(client),
            NOT_OK => Err(Error::AuthenticationFailed),
            other => Err(Error::Protocol(format!("unexpected login reply '{}'", other))),
        }
    }

    /// Change how long a single reply line may take
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Send one raw protocol line
    pub async fn send_line(&mut self, line: &str) -> Result<()> {
        debug!(line, "->");
        self.framed.send(line).await
    }

    /// Read one raw protocol line
    pub async fn read_line(&mut self) -> Result<String> {
        match tokio::time::timeout(self.read_timeout, self.framed.next()).await {
            Err(_) => Err(Error::Timeout),
            Ok(None) => Err(Error::ConnectionClosed),
            Ok(Some(line)) => {
                let line = line?;
                debug!(line = line.as_str(), "<-");
                Ok(line)
            }
        }
    }

    /// Read lines up to (not including) `sentinel`, never past it
    async fn read_until(&mut self, sentinel: &str) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        loop {
            let line = self.read_line().await?;
            if line == sentinel {
                return Ok(lines);
            }
            lines.push(line);
        }
    }

    async fn command(&mut self, command: Command, payload: Option<&str>) -> Result<()> {
        self.send_line(command.as_str()).await?;
        if let Some(payload) = payload {
            self.send_line(payload).await?;
        }
        Ok(())
    }

    async fn outcome(&mut self, command: Command, payload: &str) -> Result<Outcome> {
        self.command(command, Some(payload)).await?;
        Outcome::parse(&self.read_line().await?)
    }

    /// All performer names known to the server
    pub async fn get_bands(&mut self) -> Result<Vec<String>> {
        self.command(Command::GetBands, None).await?;
        self.read_until(END).await
    }

    /// Songs of `performer`; an empty name asks for the guest selection
    pub async fn show_songs(&mut self, performer: &str) -> Result<Vec<Song>> {
        check_listing_target(performer)?;
        self.command(Command::ShowSongs, Some(performer)).await?;
        self.read_until(END_SONGS)
            .await?
            .iter()
            .map(|row| wire::parse_song_row(row, performer))
            .collect()
    }

    /// Events of `performer`; an empty name asks for the guest selection
    pub async fn show_events(&mut self, performer: &str) -> Result<Vec<Event>> {
        check_listing_target(performer)?;
        self.command(Command::ShowEvents, Some(performer)).await?;
        self.read_until(END_EVENTS)
            .await?
            .iter()
            .map(|row| wire::parse_event_row(row, performer))
            .collect()
    }

    /// Guest performer selection (`show_guest`); the server sends no reply
    pub async fn select_performer(&mut self, performer: &str) -> Result<()> {
        wire::check_field("performer", performer)?;
        self.command(Command::ShowGuest, Some(performer)).await
    }

    pub async fn add_song(&mut self, song: &Song) -> Result<Outcome> {
        wire::check_song(song)?;
        self.outcome(Command::AddSong, &wire::song_payload(song)).await
    }

    pub async fn add_event(&mut self, event: &Event) -> Result<Outcome> {
        wire::check_event(event)?;
        self.outcome(Command::AddEvent, &wire::event_payload(event)).await
    }

    pub async fn remove_song(&mut self, name: &str) -> Result<Outcome> {
        wire::check_field("song name", name)?;
        self.outcome(Command::RemoveSong, name).await
    }

    pub async fn remove_event(&mut self, name: &str) -> Result<Outcome> {
        wire::check_field("event name", name)?;
        self.outcome(Command::RemoveEvent, name).await
    }

    /// Log out; the server ends the connection
    pub async fn back(self) -> Result<()> {
        self.finish(Command::Back).await
    }

    /// End the connection
    pub async fn close(self) -> Result<()> {
        self.finish(Command::Close).await
    }

    /// Ask the server to stop the whole service
    pub async fn quit(self) -> Result<()> {
        self.finish(Command::Quit).await
    }

    /// Send a terminal command and wait for the server to hang up
    async fn finish(mut self, command: Command) -> Result<()> {
        self.command(command, None).await?;
        loop {
            match self.read_line().await {
                Ok(line) => debug!(line = line.as_str(), "Discarding line after {}", command),
                Err(Error::ConnectionClosed) => return Ok(()),
                Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::ConnectionReset => {
                    return Ok(())
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn check_listing_target(performer: &str) -> Result<()> {
    if performer.is_empty() {
        return Ok(());
    }
    wire::check_field("performer", performer)
}
