//! bandman - command line client for the BandManager server
//!
//! Each invocation opens one session (a login when `--user` is given, a guest
//! session otherwise), runs one command and closes the connection.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use bandman_common::client::{Client, Outcome};
use bandman_common::config::DEFAULT_PORT;
use bandman_common::protocol::wire::is_wire_safe;
use bandman_common::{Error, Event, Song};

#[derive(Parser, Debug)]
#[command(name = "bandman")]
#[command(about = "BandManager catalog client")]
#[command(version)]
struct Cli {
    /// Server address
    #[arg(long, env = "BANDMAN_ADDR", default_value_t = default_addr())]
    addr: String,

    /// Band account to log in as; omit to browse as a guest
    #[arg(short, long, env = "BANDMAN_USER")]
    user: Option<String>,

    /// Password for --user
    #[arg(short, long, env = "BANDMAN_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug, PartialEq)]
enum CliCommand {
    /// List every performer with a catalog
    Bands,
    /// List a performer's songs (own catalog when logged in)
    Songs { performer: Option<String> },
    /// List a performer's events (own catalog when logged in)
    Events { performer: Option<String> },
    /// Add a song to your catalog
    AddSong {
        name: String,
        /// Duration in seconds
        length: f64,
        bpm: u32,
        #[arg(long)]
        author: Option<String>,
    },
    /// Add an event to your catalog
    AddEvent {
        name: String,
        date: String,
        #[arg(value_name = "TYPE")]
        kind: String,
        #[arg(long)]
        place: Option<String>,
    },
    /// Remove a song from your catalog
    RemoveSong { name: String },
    /// Remove an event from your catalog
    RemoveEvent { name: String },
    /// Ask the server to stop
    Shutdown,
}

/// How long `shutdown` waits for the listener to go away
const STOP_POLL_ATTEMPTS: u32 = 20;
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Whether `addr` stops accepting connections within the polling window
///
/// A stopping server drops its listener before draining sessions, so a
/// refused connection means the quit was accepted.
async fn server_stopped(addr: &str, attempts: u32, interval: Duration) -> bool {
    for _ in 0..attempts {
        if tokio::net::TcpStream::connect(addr).await.is_err() {
            return true;
        }
        tokio::time::sleep(interval).await;
    }
    false
}

fn default_addr() -> String {
    format!("127.0.0.1:{}", DEFAULT_PORT)
}

#[derive(Serialize)]
struct OutcomeReport<'a> {
    command: &'a str,
    outcome: &'a str,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    cli.validate()?;
    cli.run().await
}

impl Cli {
    /// Reject values the line protocol cannot carry
    fn validate(&self) -> Result<()> {
        let mut fields: Vec<&str> = Vec::new();
        if let Some(user) = &self.user {
            fields.push(user);
        }
        match &self.command {
            CliCommand::AddSong { name, author, .. } => {
                fields.push(name);
                fields.extend(author.as_deref());
            }
            CliCommand::AddEvent {
                name,
                date,
                kind,
                place,
            } => {
                fields.extend([name.as_str(), date.as_str(), kind.as_str()]);
                fields.extend(place.as_deref());
            }
            CliCommand::RemoveSong { name } | CliCommand::RemoveEvent { name } => {
                fields.push(name)
            }
            _ => {}
        }
        if let Some(bad) = fields.into_iter().find(|f| !is_wire_safe(f)) {
            bail!("'{}' cannot be sent: values must be non-empty and contain no spaces", bad);
        }
        if let CliCommand::AddSong { length, .. } = &self.command {
            if !length.is_finite() || *length < 0.0 {
                bail!("song length must be a non-negative number of seconds");
            }
        }
        Ok(())
    }

    async fn connect(&self) -> Result<Client> {
        match &self.user {
            Some(user) => {
                let password = self.password.as_deref().unwrap_or_default();
                match Client::connect_login(self.addr.as_str(), user, password).await {
                    Err(Error::AuthenticationFailed) => {
                        bail!("login refused for '{}'", user)
                    }
                    other => other.with_context(|| format!("Failed to connect to {}", self.addr)),
                }
            }
            None => Client::connect_guest(self.addr.as_str())
                .await
                .with_context(|| format!("Failed to connect to {}", self.addr)),
        }
    }

    /// Performer written into add payloads; the server scopes it to the login
    fn performer(&self) -> Result<&str> {
        self.user
            .as_deref()
            .context("adding to a catalog requires --user")
    }

    async fn run(&self) -> Result<()> {
        let mut client = self.connect().await?;

        let outcome = match &self.command {
            CliCommand::Bands => {
                let bands = client.get_bands().await?;
                self.print_list(&bands, |band| band.clone())?;
                None
            }
            CliCommand::Songs { performer } => {
                let performer = self.listing_target(performer.as_deref());
                let songs = client.show_songs(performer).await?;
                self.print_list(&songs, |s| {
                    format!("{}\t{}\t{}s\t{} bpm", s.name, s.author, s.length, s.bpm)
                })?;
                None
            }
            CliCommand::Events { performer } => {
                let performer = self.listing_target(performer.as_deref());
                let events = client.show_events(performer).await?;
                self.print_list(&events, |e| {
                    format!("{}\t{}\t{}\t{}", e.name, e.place, e.date, e.kind)
                })?;
                None
            }
            CliCommand::AddSong {
                name,
                length,
                bpm,
                author,
            } => {
                let song = Song::new(name, author.clone(), *length, *bpm, self.performer()?);
                Some(("add-song", client.add_song(&song).await?))
            }
            CliCommand::AddEvent {
                name,
                date,
                kind,
                place,
            } => {
                let event = Event::new(name, place.clone(), date, kind, self.performer()?);
                Some(("add-event", client.add_event(&event).await?))
            }
            CliCommand::RemoveSong { name } => {
                Some(("remove-song", client.remove_song(name).await?))
            }
            CliCommand::RemoveEvent { name } => {
                Some(("remove-event", client.remove_event(name).await?))
            }
            CliCommand::Shutdown => {
                client.quit().await?;
                if !server_stopped(&self.addr, STOP_POLL_ATTEMPTS, STOP_POLL_INTERVAL).await {
                    bail!(
                        "{} is still accepting connections; its quit policy refused the shutdown",
                        self.addr
                    );
                }
                println!("Server at {} stopped", self.addr);
                return Ok(());
            }
        };

        client.close().await?;
        match outcome {
            Some((command, outcome)) => self.print_outcome(command, outcome),
            None => Ok(()),
        }
    }

    /// Logged-in sessions always list their own catalog
    fn listing_target<'a>(&'a self, performer: Option<&'a str>) -> &'a str {
        performer.or(self.user.as_deref()).unwrap_or_default()
    }

    fn print_list<T: Serialize>(&self, items: &[T], line: impl Fn(&T) -> String) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(items)?);
        } else {
            for item in items {
                println!("{}", line(item));
            }
        }
        Ok(())
    }

    fn print_outcome(&self, command: &str, outcome: Outcome) -> Result<()> {
        if self.json {
            let report = OutcomeReport {
                command,
                outcome: outcome.as_str(),
            };
            println!("{}", serde_json::to_string(&report)?);
        } else {
            println!("{}", outcome);
        }
        if outcome.is_ok() {
            Ok(())
        } else {
            bail!("{} answered '{}'", command, outcome)
        }
    }
}
