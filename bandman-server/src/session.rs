//! Per-connection session state machine
//!
//! ```text
//! Connected --guest--> GuestActive { selected }
//! Connected --noguest--> Authenticating --ok--> AuthenticatedActive { performer }
//!                                       --notok--> Closed
//! *Active --back | close | quit--> Closed
//! ```
//!
//! A session reads one command line at a time and answers it before reading
//! the next. Listings are fetched from the repository per request and never
//! kept beyond the command that asked for them.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use bandman_common::config::{QuitPolicy, ServerConfig};
use bandman_common::credentials::CredentialStore;
use bandman_common::protocol::{wire, Command, Handshake, Reply, WireCodec};
use bandman_common::repository::{AddOutcome, RemoveOutcome, Repository};
use bandman_common::Error;

/// Connection-independent limits applied to every session
#[derive(Debug, Clone)]
pub struct SessionPolicy {
    pub quit_policy: QuitPolicy,
    pub operators: Vec<String>,
    /// `None` waits forever for the next line
    pub idle_timeout: Option<Duration>,
    pub max_line_length: usize,
}

impl SessionPolicy {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            quit_policy: config.quit_policy,
            operators: config.operators.clone(),
            idle_timeout: config.idle_timeout(),
            max_line_length: config.max_line_length,
        }
    }
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self::from_config(&ServerConfig::default())
    }
}

/// Everything a session borrows from the service
pub struct SessionContext {
    pub repository: Arc<dyn Repository>,
    pub credentials: Arc<dyn CredentialStore>,
    pub policy: SessionPolicy,
    /// Service-wide shutdown signal; a permitted `quit` fires it
    pub shutdown: CancellationToken,
}

impl SessionContext {
    pub fn new(
        repository: Arc<dyn Repository>,
        credentials: Arc<dyn CredentialStore>,
        policy: SessionPolicy,
    ) -> Self {
        Self {
            repository,
            credentials,
            policy,
            shutdown: CancellationToken::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the handshake line
    Connected,
    /// Reading username and password
    Authenticating,
    /// Browsing without credentials; `selected` is the last performer asked for
    GuestActive { selected: Option<String> },
    /// Logged in; every command is scoped to `performer`
    AuthenticatedActive { performer: String },
    Closed,
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Client logged out with `back`
    Back,
    /// Client sent `close`, or a `quit` it was not allowed to issue
    Close,
    /// Client stopped the service
    Quit,
    AuthenticationFailed,
    /// Unrecognized handshake or unreadable line
    ProtocolViolation,
    /// Peer hung up
    Disconnected,
    /// No line within the idle timeout
    TimedOut,
    /// Service shutdown closed the connection
    Shutdown,
    /// Transport error
    Failed,
}

/// Anything that stops the command loop before a terminal command
enum Interrupt {
    Closed,
    Shutdown,
    TimedOut,
    Failed(Error),
}

impl From<Error> for Interrupt {
    fn from(err: Error) -> Self {
        Interrupt::Failed(err)
    }
}

type Step<T> = std::result::Result<T, Interrupt>;

pub struct Session<S> {
    id: Uuid,
    framed: Framed<S, WireCodec>,
    state: SessionState,
    ctx: Arc<SessionContext>,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, ctx: Arc<SessionContext>) -> Self {
        let codec = WireCodec::with_max_length(ctx.policy.max_line_length);
        Self {
            id: Uuid::new_v4(),
            framed: Framed::new(stream, codec),
            state: SessionState::Connected,
            ctx,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Drive the session until the connection ends
    pub async fn run(mut self) -> SessionEnd {
        let end = match self.drive().await {
            Ok(end) => end,
            Err(Interrupt::Closed) => SessionEnd::Disconnected,
            Err(Interrupt::Shutdown) => SessionEnd::Shutdown,
            Err(Interrupt::TimedOut) => {
                info!("Idle timeout, dropping connection");
                SessionEnd::TimedOut
            }
            Err(Interrupt::Failed(Error::Protocol(reason))) => {
                warn!("Protocol violation: {}", reason);
                SessionEnd::ProtocolViolation
            }
            Err(Interrupt::Failed(e)) => {
                warn!("Session aborted: {}", e);
                SessionEnd::Failed
            }
        };
        self.state = SessionState::Closed;
        debug!(?end, "Session ended");
        end
    }

    async fn drive(&mut self) -> Step<SessionEnd> {
        let handshake = self.next_line().await?;
        match Handshake::parse(&handshake) {
            Some(Handshake::Guest) => {
                info!("Guest session started");
                self.state = SessionState::GuestActive { selected: None };
            }
            Some(Handshake::NoGuest) => {
                if let Some(end) = self.authenticate().await? {
                    return Ok(end);
                }
            }
            None => {
                warn!(line = handshake.as_str(), "Unrecognized handshake");
                self.reply(Reply::Error).await?;
                self.state = SessionState::Closed;
                return Ok(SessionEnd::ProtocolViolation);
            }
        }

        loop {
            let line = self.next_line().await?;
            let Some(command) = Command::parse(&line) else {
                debug!(line = line.as_str(), "Ignoring unknown command");
                continue;
            };
            debug!(%command, "Dispatching");
            if let Some(end) = self.dispatch(command).await? {
                self.state = SessionState::Closed;
                return Ok(end);
            }
        }
    }

    /// Returns the end reason when authentication fails
    async fn authenticate(&mut self) -> Step<Option<SessionEnd>> {
        self.state = SessionState::Authenticating;
        let username = self.next_line().await?;
        let password = self.next_line().await?;

        if self.ctx.credentials.verify(&username, &password) {
            info!(performer = username.as_str(), "Authenticated");
            self.reply(Reply::Ok).await?;
            self.state = SessionState::AuthenticatedActive {
                performer: username,
            };
            return Ok(None);
        }

        warn!(username = username.as_str(), "Authentication failed");
        self.reply(Reply::NotOk).await?;
        self.state = SessionState::Closed;
        self.await_hangup().await;
        Ok(Some(SessionEnd::AuthenticationFailed))
    }

    /// After a failed login the peer is expected to hang up; swallow anything
    /// it still sends until it does, times out, or the service stops
    async fn await_hangup(&mut self) {
        while let Ok(line) = self.next_line().await {
            debug!(line = line.as_str(), "Ignoring line after failed login");
        }
    }

    async fn dispatch(&mut self, command: Command) -> Step<Option<SessionEnd>> {
        match command {
            Command::GetBands => {
                let performers = self.ctx.repository.list_performers().await;
                self.reply(Reply::Performers(performers)).await?;
            }
            Command::ShowSongs => {
                let requested = self.next_line().await?;
                let songs = match self.read_scope(&requested) {
                    Some(performer) => self.ctx.repository.list_songs(&performer).await,
                    None => Vec::new(),
                };
                self.reply(Reply::Songs(songs)).await?;
            }
            Command::ShowEvents => {
                let requested = self.next_line().await?;
                let events = match self.read_scope(&requested) {
                    Some(performer) => self.ctx.repository.list_events(&performer).await,
                    None => Vec::new(),
                };
                self.reply(Reply::Events(events)).await?;
            }
            Command::ShowGuest => {
                let requested = self.next_line().await?;
                match &mut self.state {
                    SessionState::GuestActive { selected } if !requested.is_empty() => {
                        debug!(performer = requested.as_str(), "Guest selected performer");
                        *selected = Some(requested);
                    }
                    _ => debug!("Ignoring show_guest outside guest browsing"),
                }
            }
            Command::AddSong => {
                let payload = self.next_line().await?;
                let reply = self.add_song(&payload).await;
                self.reply(reply).await?;
            }
            Command::AddEvent => {
                let payload = self.next_line().await?;
                let reply = self.add_event(&payload).await;
                self.reply(reply).await?;
            }
            Command::RemoveSong => {
                let name = self.next_line().await?;
                let reply = match self.write_scope(command) {
                    Some(performer) => {
                        removal_reply(self.ctx.repository.remove_song(&performer, &name).await)
                    }
                    None => Reply::NotOk,
                };
                self.reply(reply).await?;
            }
            Command::RemoveEvent => {
                let name = self.next_line().await?;
                let reply = match self.write_scope(command) {
                    Some(performer) => {
                        removal_reply(self.ctx.repository.remove_event(&performer, &name).await)
                    }
                    None => Reply::NotOk,
                };
                self.reply(reply).await?;
            }
            Command::Back => {
                info!("Client logged out");
                return Ok(Some(SessionEnd::Back));
            }
            Command::Close => {
                info!("Client closed connection");
                return Ok(Some(SessionEnd::Close));
            }
            Command::Quit => return Ok(Some(self.quit())),
        }
        Ok(None)
    }

    async fn add_song(&self, payload: &str) -> Reply {
        let Some(performer) = self.write_scope(Command::AddSong) else {
            return Reply::NotOk;
        };
        let song = match wire::parse_song_payload(payload) {
            Ok(song) => song,
            Err(e) => {
                debug!("Rejecting song payload: {}", e);
                return Reply::Error;
            }
        };
        if song.performer != performer {
            debug!(claimed = song.performer.as_str(), "Reassigning song to session performer");
        }
        let song = song.owned_by(&performer);
        addition_reply(self.ctx.repository.add_song(&song).await)
    }

    async fn add_event(&self, payload: &str) -> Reply {
        let Some(performer) = self.write_scope(Command::AddEvent) else {
            return Reply::NotOk;
        };
        let event = match wire::parse_event_payload(payload) {
            Ok(event) => event,
            Err(e) => {
                debug!("Rejecting event payload: {}", e);
                return Reply::Error;
            }
        };
        if event.performer != performer {
            debug!(claimed = event.performer.as_str(), "Reassigning event to session performer");
        }
        let event = event.owned_by(&performer);
        addition_reply(self.ctx.repository.add_event(&event).await)
    }

    /// Performer a listing is served for
    ///
    /// Authenticated sessions only ever see their own catalog. Guests get the
    /// performer they name, which also becomes their selection; an empty line
    /// falls back to the current selection.
    fn read_scope(&mut self, requested: &str) -> Option<String> {
        match &mut self.state {
            SessionState::AuthenticatedActive { performer } => {
                if !requested.is_empty() && requested != performer.as_str() {
                    debug!(requested, "Listing restricted to own catalog");
                }
                Some(performer.clone())
            }
            SessionState::GuestActive { selected } => {
                if !requested.is_empty() {
                    *selected = Some(requested.to_string());
                }
                selected.clone()
            }
            _ => None,
        }
    }

    /// Performer a mutation applies to; guests may not mutate
    fn write_scope(&self, command: Command) -> Option<String> {
        match &self.state {
            SessionState::AuthenticatedActive { performer } => Some(performer.clone()),
            _ => {
                warn!(%command, "Refusing catalog change from guest session");
                None
            }
        }
    }

    fn identity(&self) -> Option<&str> {
        match &self.state {
            SessionState::AuthenticatedActive { performer } => Some(performer.as_str()),
            _ => None,
        }
    }

    fn quit(&self) -> SessionEnd {
        let policy = &self.ctx.policy;
        if policy
            .quit_policy
            .permits(self.identity(), &policy.operators)
        {
            info!(performer = ?self.identity(), "Service shutdown requested");
            self.ctx.shutdown.cancel();
            SessionEnd::Quit
        } else {
            warn!(
                performer = ?self.identity(),
                policy = ?policy.quit_policy,
                "Shutdown not permitted, closing connection only"
            );
            SessionEnd::Close
        }
    }

    async fn next_line(&mut self) -> Step<String> {
        let shutdown = self.ctx.shutdown.clone();
        let idle_timeout = self.ctx.policy.idle_timeout;
        let framed = &mut self.framed;

        let read = async move {
            match idle_timeout {
                Some(limit) => tokio::time::timeout(limit, framed.next())
                    .await
                    .map_err(|_| Interrupt::TimedOut),
                None => Ok(framed.next().await),
            }
        };

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => Err(Interrupt::Shutdown),
            read = read => match read? {
                Some(Ok(line)) => Ok(line),
                Some(Err(e)) => Err(Interrupt::Failed(e)),
                None => Err(Interrupt::Closed),
            },
        }
    }

    async fn reply(&mut self, reply: Reply) -> Step<()> {
        self.framed.send(reply).await?;
        Ok(())
    }
}

fn addition_reply(outcome: AddOutcome) -> Reply {
    match outcome {
        AddOutcome::Added => Reply::Ok,
        AddOutcome::Duplicate => Reply::AlreadyIn,
        AddOutcome::Unavailable => Reply::NotOk,
    }
}

fn removal_reply(outcome: RemoveOutcome) -> Reply {
    match outcome {
        RemoveOutcome::Removed => Reply::Ok,
        RemoveOutcome::NotFound | RemoveOutcome::Unavailable => Reply::NotOk,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bandman_common::credentials::StaticCredentials;
    use bandman_common::repository::MemoryRepository;
    use bandman_common::Song;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf};
    use tokio::task::JoinHandle;

    struct Peer {
        lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
        writer: WriteHalf<DuplexStream>,
        session: JoinHandle<SessionEnd>,
        ctx: Arc<SessionContext>,
    }

    impl Peer {
        async fn send(&mut self, line: &str) {
            self.writer.write_all(format!("{}\n", line).as_bytes()).await.unwrap();
        }

        async fn hang_up(&mut self) {
            self.writer.shutdown().await.unwrap();
        }

        async fn recv(&mut self) -> Option<String> {
            self.lines.next_line().await.unwrap()
        }

        async fn finish(self) -> SessionEnd {
            self.session.await.unwrap()
        }
    }

    fn context(policy: SessionPolicy) -> Arc<SessionContext> {
        let credentials = StaticCredentials::parse("SkyGround groove\nBassaNuova bossa\n");
        Arc::new(SessionContext::new(
            Arc::new(MemoryRepository::new()),
            Arc::new(credentials),
            policy,
        ))
    }

    fn start(ctx: Arc<SessionContext>) -> Peer {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let session = tokio::spawn(Session::new(server, ctx.clone()).run());
        let (read, writer) = tokio::io::split(client);
        Peer {
            lines: BufReader::new(read).lines(),
            writer,
            session,
            ctx,
        }
    }

    async fn login(ctx: Arc<SessionContext>, user: &str, password: &str) -> Peer {
        let mut peer = start(ctx);
        peer.send("noguest").await;
        peer.send(user).await;
        peer.send(password).await;
        assert_eq!(peer.recv().await.as_deref(), Some("ok"));
        peer
    }

    #[tokio::test]
    async fn test_login_and_close() {
        let mut peer = login(context(SessionPolicy::default()), "SkyGround", "groove").await;
        peer.send("close").await;
        assert_eq!(peer.recv().await, None);
        assert_eq!(peer.finish().await, SessionEnd::Close);
    }

    #[tokio::test]
    async fn test_wrong_password_replies_notok_and_waits_for_hangup() {
        let mut peer = start(context(SessionPolicy::default()));
        peer.send("noguest").await;
        peer.send("SkyGround").await;
        peer.send("wrong").await;
        assert_eq!(peer.recv().await.as_deref(), Some("notok"));

        // Commands after a failed login are not served
        peer.send("getbands").await;
        peer.hang_up().await;
        assert_eq!(peer.recv().await, None);
        assert_eq!(peer.finish().await, SessionEnd::AuthenticationFailed);
    }

    #[tokio::test]
    async fn test_unknown_user_reads_password_line_too() {
        let mut peer = start(context(SessionPolicy::default()));
        peer.send("noguest").await;
        peer.send("Nobody").await;
        peer.send("whatever").await;
        assert_eq!(peer.recv().await.as_deref(), Some("notok"));
    }

    #[tokio::test]
    async fn test_unrecognized_handshake() {
        let mut peer = start(context(SessionPolicy::default()));
        peer.send("hello").await;
        assert_eq!(peer.recv().await.as_deref(), Some("error"));
        assert_eq!(peer.recv().await, None);
        assert_eq!(peer.finish().await, SessionEnd::ProtocolViolation);
    }

    #[tokio::test]
    async fn test_add_song_twice_then_list() {
        let mut peer = login(context(SessionPolicy::default()), "SkyGround", "groove").await;
        peer.send("add_song").await;
        peer.send("Trouble JoseJames 3.29 89 SkyGround").await;
        assert_eq!(peer.recv().await.as_deref(), Some("ok"));
        peer.send("add_song").await;
        peer.send("Trouble JoseJames 3.29 89 SkyGround").await;
        assert_eq!(peer.recv().await.as_deref(), Some("alreadyin"));

        peer.send("show_songs").await;
        peer.send("SkyGround").await;
        assert_eq!(peer.recv().await.as_deref(), Some("Trouble JoseJames 3.29 89"));
        assert_eq!(peer.recv().await.as_deref(), Some("endsongs"));
    }

    #[tokio::test]
    async fn test_authenticated_add_is_reassigned_to_session_performer() {
        let ctx = context(SessionPolicy::default());
        let mut peer = login(ctx.clone(), "SkyGround", "groove").await;
        peer.send("add_song").await;
        peer.send("Crazy ScaryPockets 2.44 98 BassaNuova").await;
        assert_eq!(peer.recv().await.as_deref(), Some("ok"));

        assert!(ctx.repository.list_songs("BassaNuova").await.is_empty());
        assert_eq!(ctx.repository.list_songs("SkyGround").await.len(), 1);
    }

    #[tokio::test]
    async fn test_authenticated_listing_restricted_to_own_catalog() {
        let ctx = context(SessionPolicy::default());
        ctx.repository
            .add_song(&Song::new("Mortiz", None, 3.45, 90, "BassaNuova"))
            .await;
        let mut peer = login(ctx, "SkyGround", "groove").await;
        peer.send("show_songs").await;
        peer.send("BassaNuova").await;
        assert_eq!(peer.recv().await.as_deref(), Some("endsongs"));
    }

    #[tokio::test]
    async fn test_malformed_payload_keeps_session_alive() {
        let mut peer = login(context(SessionPolicy::default()), "SkyGround", "groove").await;
        peer.send("add_song").await;
        peer.send("OnlyAName").await;
        assert_eq!(peer.recv().await.as_deref(), Some("error"));
        peer.send("add_event").await;
        peer.send("Gig Somewhere 1-1-2025").await;
        assert_eq!(peer.recv().await.as_deref(), Some("error"));

        peer.send("getbands").await;
        assert_eq!(peer.recv().await.as_deref(), Some("end"));
    }

    #[tokio::test]
    async fn test_oversize_line_aborts_without_reply() {
        let policy = SessionPolicy {
            max_line_length: 16,
            ..SessionPolicy::default()
        };
        let mut peer = login(context(policy), "SkyGround", "groove").await;
        peer.send("add_song").await;
        peer.send("A_very_long_song_name Someone 1.0 90 SkyGround").await;
        assert_eq!(peer.recv().await, None);
        assert_eq!(peer.finish().await, SessionEnd::ProtocolViolation);
    }

    #[tokio::test]
    async fn test_unknown_command_is_silently_ignored() {
        let mut peer = login(context(SessionPolicy::default()), "SkyGround", "groove").await;
        peer.send("dance").await;
        peer.send("getbands").await;
        assert_eq!(peer.recv().await.as_deref(), Some("end"));
    }

    #[tokio::test]
    async fn test_remove_song_boundary() {
        let mut peer = login(context(SessionPolicy::default()), "SkyGround", "groove").await;
        peer.send("remove_song").await;
        peer.send("Crazy").await;
        assert_eq!(peer.recv().await.as_deref(), Some("notok"));

        peer.send("add_song").await;
        peer.send("Crazy ScaryPockets 2.44 98 SkyGround").await;
        assert_eq!(peer.recv().await.as_deref(), Some("ok"));

        peer.send("remove_song").await;
        peer.send("Crazy").await;
        assert_eq!(peer.recv().await.as_deref(), Some("ok"));
        peer.send("remove_song").await;
        peer.send("Crazy").await;
        assert_eq!(peer.recv().await.as_deref(), Some("notok"));
    }

    #[tokio::test]
    async fn test_guest_cannot_mutate_before_or_after_selection() {
        let ctx = context(SessionPolicy::default());
        let mut peer = start(ctx.clone());
        peer.send("guest").await;

        peer.send("add_song").await;
        peer.send("Intruder Someone 1.0 100 SkyGround").await;
        assert_eq!(peer.recv().await.as_deref(), Some("notok"));

        peer.send("show_guest").await;
        peer.send("SkyGround").await;
        peer.send("add_event").await;
        peer.send("Gig Club 1-1-2025 Concerto SkyGround").await;
        assert_eq!(peer.recv().await.as_deref(), Some("notok"));
        peer.send("remove_song").await;
        peer.send("Intruder").await;
        assert_eq!(peer.recv().await.as_deref(), Some("notok"));

        assert!(ctx.repository.list_performers().await.is_empty());
    }

    #[tokio::test]
    async fn test_guest_reads_any_performer_and_falls_back_to_selection() {
        let ctx = context(SessionPolicy::default());
        ctx.repository
            .add_song(&Song::new("Mortiz", Some("RenouxSanchez".into()), 3.45, 90, "BassaNuova"))
            .await;
        let mut peer = start(ctx);
        peer.send("guest").await;

        // Nothing selected yet: an empty performer line yields only the sentinel
        peer.send("show_songs").await;
        peer.send("").await;
        assert_eq!(peer.recv().await.as_deref(), Some("endsongs"));

        peer.send("show_guest").await;
        peer.send("BassaNuova").await;
        peer.send("show_songs").await;
        peer.send("").await;
        assert_eq!(peer.recv().await.as_deref(), Some("Mortiz RenouxSanchez 3.45 90"));
        assert_eq!(peer.recv().await.as_deref(), Some("endsongs"));

        peer.send("show_events").await;
        peer.send("SkyGround").await;
        assert_eq!(peer.recv().await.as_deref(), Some("endevents"));
    }

    #[tokio::test]
    async fn test_guest_quit_refused_under_default_policy() {
        let mut peer = start(context(SessionPolicy::default()));
        peer.send("guest").await;
        peer.send("quit").await;
        assert_eq!(peer.recv().await, None);
        assert!(!peer.ctx.shutdown.is_cancelled());
        assert_eq!(peer.finish().await, SessionEnd::Close);
    }

    #[tokio::test]
    async fn test_authenticated_quit_fires_shutdown() {
        let mut peer = login(context(SessionPolicy::default()), "BassaNuova", "bossa").await;
        peer.send("quit").await;
        assert_eq!(peer.recv().await, None);
        assert!(peer.ctx.shutdown.is_cancelled());
        assert_eq!(peer.finish().await, SessionEnd::Quit);
    }

    #[tokio::test]
    async fn test_operators_policy() {
        let policy = SessionPolicy {
            quit_policy: QuitPolicy::Operators,
            operators: vec!["BassaNuova".to_string()],
            ..SessionPolicy::default()
        };
        let ctx = context(policy);

        let mut peer = login(ctx.clone(), "SkyGround", "groove").await;
        peer.send("quit").await;
        assert_eq!(peer.finish().await, SessionEnd::Close);
        assert!(!ctx.shutdown.is_cancelled());

        let mut peer = login(ctx.clone(), "BassaNuova", "bossa").await;
        peer.send("quit").await;
        assert_eq!(peer.finish().await, SessionEnd::Quit);
        assert!(ctx.shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn test_back_ends_session() {
        let mut peer = start(context(SessionPolicy::default()));
        peer.send("guest").await;
        peer.send("back").await;
        assert_eq!(peer.recv().await, None);
        assert_eq!(peer.finish().await, SessionEnd::Back);
    }

    #[tokio::test]
    async fn test_peer_disconnect() {
        let mut peer = start(context(SessionPolicy::default()));
        peer.send("guest").await;
        peer.hang_up().await;
        assert_eq!(peer.finish().await, SessionEnd::Disconnected);
    }

    #[tokio::test]
    async fn test_shutdown_closes_idle_session() {
        let mut peer = start(context(SessionPolicy::default()));
        peer.send("guest").await;
        peer.ctx.shutdown.cancel();
        assert_eq!(peer.recv().await, None);
        assert_eq!(peer.finish().await, SessionEnd::Shutdown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timeout() {
        let policy = SessionPolicy {
            idle_timeout: Some(Duration::from_secs(10)),
            ..SessionPolicy::default()
        };
        let mut peer = start(context(policy));
        peer.send("guest").await;
        assert_eq!(peer.recv().await, None);
        assert_eq!(peer.finish().await, SessionEnd::TimedOut);
    }

    #[tokio::test]
    async fn test_state_starts_connected() {
        let (_client, server) = tokio::io::duplex(1024);
        let session = Session::new(server, context(SessionPolicy::default()));
        assert_eq!(session.state(), &SessionState::Connected);
    }
}
