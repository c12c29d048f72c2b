//! Integration tests for the BandManager server
//!
//! Runs a real server on a loopback port and drives it with the protocol
//! client:
//! - Login and guest handshakes
//! - Catalog listing, addition and removal
//! - Sentinel framing of listings
//! - Service shutdown via `quit`
//! - SQLite-backed persistence across restarts

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use bandman_common::client::{Client, Outcome};
use bandman_common::config::{QuitPolicy, ServerConfig};
use bandman_common::credentials::StaticCredentials;
use bandman_common::db::init_database;
use bandman_common::repository::{MemoryRepository, Repository, SqliteRepository};
use bandman_common::{Error, Event, Song};
use bandman_server::Server;

const ACCOUNTS: &str = "SkyGround groove\nBassaNuova bossa\n";

struct TestServer {
    addr: SocketAddr,
    handle: JoinHandle<bandman_common::Result<()>>,
}

impl TestServer {
    async fn stop(self) {
        self.handle.abort();
        let _ = self.handle.await;
    }
}

fn test_config(quit_policy: QuitPolicy) -> ServerConfig {
    ServerConfig {
        bind: "127.0.0.1".parse().unwrap(),
        port: 0,
        quit_policy,
        shutdown_grace_secs: 1,
        ..ServerConfig::default()
    }
}

/// Start a server on a free loopback port
async fn start_server(repository: Arc<dyn Repository>, quit_policy: QuitPolicy) -> TestServer {
    let server = Server::bind(
        &test_config(quit_policy),
        repository,
        Arc::new(StaticCredentials::parse(ACCOUNTS)),
    )
    .await
    .expect("Failed to bind test server");
    let addr = server.local_addr().unwrap();
    let handle = tokio::spawn(server.run());
    TestServer { addr, handle }
}

async fn start_memory_server() -> TestServer {
    start_server(Arc::new(MemoryRepository::new()), QuitPolicy::Authenticated).await
}

async fn start_sqlite_server(path: &Path) -> TestServer {
    let pool = init_database(path).await.expect("Failed to open database");
    start_server(Arc::new(SqliteRepository::new(pool)), QuitPolicy::Authenticated).await
}

async fn login(addr: SocketAddr, user: &str, password: &str) -> Client {
    Client::connect_login(addr, user, password)
        .await
        .expect("Login failed")
        .with_read_timeout(Duration::from_secs(5))
}

async fn guest(addr: SocketAddr) -> Client {
    Client::connect_guest(addr)
        .await
        .expect("Guest connect failed")
        .with_read_timeout(Duration::from_secs(5))
}

fn song(name: &str, performer: &str) -> Song {
    Song::new(name, Some("Jobim".to_string()), 215.5, 120, performer)
}

fn event(name: &str, performer: &str) -> Event {
    Event::new(name, Some("Lisbon".to_string()), "2025-07-14", "festival", performer)
}

#[tokio::test]
async fn test_login_add_and_list_songs() {
    let server = start_memory_server().await;
    let mut client = login(server.addr, "SkyGround", "groove").await;

    assert_eq!(client.add_song(&song("Wave", "SkyGround")).await.unwrap(), Outcome::Ok);
    assert_eq!(client.add_song(&song("Corcovado", "SkyGround")).await.unwrap(), Outcome::Ok);

    let songs = client.show_songs("SkyGround").await.unwrap();
    let names: Vec<_> = songs.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["Wave", "Corcovado"]);
    assert_eq!(songs[0].author, "Jobim");
    assert_eq!(songs[0].length, 215.5);
    assert_eq!(songs[0].bpm, 120);
    assert_eq!(songs[0].performer, "SkyGround");

    assert_eq!(client.get_bands().await.unwrap(), vec!["SkyGround".to_string()]);

    client.close().await.unwrap();
    server.stop().await;
}

#[tokio::test]
async fn test_duplicate_names_are_already_in() {
    let server = start_memory_server().await;
    let mut client = login(server.addr, "SkyGround", "groove").await;

    assert_eq!(client.add_song(&song("Wave", "SkyGround")).await.unwrap(), Outcome::Ok);
    assert_eq!(
        client.add_song(&song("Wave", "SkyGround")).await.unwrap(),
        Outcome::AlreadyIn
    );
    assert_eq!(client.add_event(&event("Jazz_Fest", "SkyGround")).await.unwrap(), Outcome::Ok);
    assert_eq!(
        client.add_event(&event("Jazz_Fest", "SkyGround")).await.unwrap(),
        Outcome::AlreadyIn
    );

    assert_eq!(client.show_songs("SkyGround").await.unwrap().len(), 1);
    assert_eq!(client.show_events("SkyGround").await.unwrap().len(), 1);

    client.close().await.unwrap();
    server.stop().await;
}

#[tokio::test]
async fn test_same_name_allowed_for_different_performers() {
    let server = start_memory_server().await;

    let mut sky = login(server.addr, "SkyGround", "groove").await;
    assert_eq!(sky.add_song(&song("Wave", "SkyGround")).await.unwrap(), Outcome::Ok);
    sky.close().await.unwrap();

    let mut bassa = login(server.addr, "BassaNuova", "bossa").await;
    assert_eq!(bassa.add_song(&song("Wave", "BassaNuova")).await.unwrap(), Outcome::Ok);
    assert_eq!(
        bassa.get_bands().await.unwrap(),
        vec!["BassaNuova".to_string(), "SkyGround".to_string()]
    );
    bassa.close().await.unwrap();

    server.stop().await;
}

#[tokio::test]
async fn test_wrong_password_is_rejected() {
    let server = start_memory_server().await;

    let result = Client::connect_login(server.addr, "SkyGround", "wrong").await;
    assert!(matches!(result, Err(Error::AuthenticationFailed)));

    let result = Client::connect_login(server.addr, "Nobody", "groove").await;
    assert!(matches!(result, Err(Error::AuthenticationFailed)));

    // Rejected logins leave the service usable
    let client = login(server.addr, "SkyGround", "groove").await;
    client.close().await.unwrap();
    server.stop().await;
}

#[tokio::test]
async fn test_remove_only_touches_own_catalog() {
    let server = start_memory_server().await;

    let mut sky = login(server.addr, "SkyGround", "groove").await;
    sky.add_song(&song("Wave", "SkyGround")).await.unwrap();
    sky.add_event(&event("Jazz_Fest", "SkyGround")).await.unwrap();
    sky.close().await.unwrap();

    let mut bassa = login(server.addr, "BassaNuova", "bossa").await;
    assert_eq!(bassa.remove_song("Wave").await.unwrap(), Outcome::NotOk);
    assert_eq!(bassa.remove_event("Jazz_Fest").await.unwrap(), Outcome::NotOk);
    bassa.close().await.unwrap();

    let mut sky = login(server.addr, "SkyGround", "groove").await;
    assert_eq!(sky.remove_song("Wave").await.unwrap(), Outcome::Ok);
    assert_eq!(sky.remove_song("Wave").await.unwrap(), Outcome::NotOk);
    assert_eq!(sky.remove_event("Jazz_Fest").await.unwrap(), Outcome::Ok);
    assert!(sky.show_songs("SkyGround").await.unwrap().is_empty());
    assert!(sky.show_events("SkyGround").await.unwrap().is_empty());
    assert!(sky.get_bands().await.unwrap().is_empty());
    sky.close().await.unwrap();

    server.stop().await;
}

#[tokio::test]
async fn test_guest_browses_but_cannot_modify() {
    let server = start_memory_server().await;

    let mut sky = login(server.addr, "SkyGround", "groove").await;
    sky.add_song(&song("Wave", "SkyGround")).await.unwrap();
    sky.add_event(&event("Jazz_Fest", "SkyGround")).await.unwrap();
    sky.close().await.unwrap();

    let mut visitor = guest(server.addr).await;
    assert_eq!(visitor.get_bands().await.unwrap(), vec!["SkyGround".to_string()]);
    assert_eq!(visitor.show_songs("SkyGround").await.unwrap().len(), 1);
    assert_eq!(visitor.show_events("SkyGround").await.unwrap().len(), 1);
    assert!(visitor.show_songs("BassaNuova").await.unwrap().is_empty());

    assert_eq!(visitor.add_song(&song("Intruder", "SkyGround")).await.unwrap(), Outcome::NotOk);
    assert_eq!(visitor.remove_song("Wave").await.unwrap(), Outcome::NotOk);

    visitor.select_performer("SkyGround").await.unwrap();
    assert_eq!(visitor.show_songs("").await.unwrap().len(), 1);
    visitor.close().await.unwrap();

    let mut sky = login(server.addr, "SkyGround", "groove").await;
    let names: Vec<_> = sky
        .show_songs("SkyGround")
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.name)
        .collect();
    assert_eq!(names, vec!["Wave".to_string()]);
    sky.close().await.unwrap();

    server.stop().await;
}

#[tokio::test]
async fn test_omitted_author_and_place_default_to_unknown() {
    let server = start_memory_server().await;
    let mut client = login(server.addr, "SkyGround", "groove").await;

    let anonymous = Song::new("Improv", None, 60.0, 90, "SkyGround");
    assert_eq!(client.add_song(&anonymous).await.unwrap(), Outcome::Ok);
    let undecided = Event::new("Tour", None, "TBD", "concert", "SkyGround");
    assert_eq!(client.add_event(&undecided).await.unwrap(), Outcome::Ok);

    let songs = client.show_songs("SkyGround").await.unwrap();
    assert_eq!(songs[0].author, "unknown");
    let events = client.show_events("SkyGround").await.unwrap();
    assert_eq!(events[0].place, "unknown");

    client.close().await.unwrap();
    server.stop().await;
}

#[tokio::test]
async fn test_raw_listing_ends_with_sentinel() {
    let server = start_memory_server().await;
    let mut client = login(server.addr, "SkyGround", "groove").await;
    client.add_song(&song("Wave", "SkyGround")).await.unwrap();

    client.send_line("show_songs").await.unwrap();
    client.send_line("SkyGround").await.unwrap();
    assert_eq!(client.read_line().await.unwrap(), "Wave Jobim 215.5 120");
    assert_eq!(client.read_line().await.unwrap(), "endsongs");

    client.send_line("show_events").await.unwrap();
    client.send_line("SkyGround").await.unwrap();
    assert_eq!(client.read_line().await.unwrap(), "endevents");

    client.send_line("getbands").await.unwrap();
    assert_eq!(client.read_line().await.unwrap(), "SkyGround");
    assert_eq!(client.read_line().await.unwrap(), "end");

    client.send_line("add_song").await.unwrap();
    client.send_line("Broken song").await.unwrap();
    assert_eq!(client.read_line().await.unwrap(), "error");

    // Session survives the malformed payload
    assert_eq!(client.show_songs("SkyGround").await.unwrap().len(), 1);

    client.close().await.unwrap();
    server.stop().await;
}

#[tokio::test]
async fn test_unsendable_values_are_refused_before_the_wire() {
    let server = start_memory_server().await;
    let mut client = login(server.addr, "SkyGround", "groove").await;

    let smuggled = Song::new("Wave", Some("Jobim".to_string()), 1.0, 1, "Sky\nquit");
    assert!(matches!(client.add_song(&smuggled).await, Err(Error::Protocol(_))));
    assert!(matches!(
        client.add_event(&event("Jazz Fest", "SkyGround")).await,
        Err(Error::Protocol(_))
    ));
    assert!(matches!(client.remove_song("a\nquit").await, Err(Error::Protocol(_))));
    assert!(matches!(client.show_songs("x\nquit").await, Err(Error::Protocol(_))));
    assert!(matches!(client.send_line("getbands\nquit").await, Err(Error::Protocol(_))));
    assert!(matches!(
        Client::connect_login(server.addr, "Sky\nquit", "groove").await,
        Err(Error::Protocol(_))
    ));

    // Nothing reached the server: session and service are still up
    assert!(client.show_songs("SkyGround").await.unwrap().is_empty());
    client.close().await.unwrap();
    assert!(!server.handle.is_finished());

    server.stop().await;
}

#[tokio::test]
async fn test_concurrent_sessions() {
    let server = start_memory_server().await;
    let addr = server.addr;

    let mut tasks = Vec::new();
    for i in 0..8 {
        tasks.push(tokio::spawn(async move {
            let mut client = login(addr, "SkyGround", "groove").await;
            let outcome = client
                .add_song(&song(&format!("Track{}", i), "SkyGround"))
                .await
                .unwrap();
            client.close().await.unwrap();
            outcome
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap(), Outcome::Ok);
    }

    let mut visitor = guest(addr).await;
    assert_eq!(visitor.show_songs("SkyGround").await.unwrap().len(), 8);
    visitor.close().await.unwrap();

    server.stop().await;
}

#[tokio::test]
async fn test_quit_stops_the_service() {
    let server = start_memory_server().await;
    let addr = server.addr;

    let client = login(addr, "SkyGround", "groove").await;
    client.quit().await.unwrap();

    let stopped = tokio::time::timeout(Duration::from_secs(5), server.handle)
        .await
        .expect("Server did not stop after quit")
        .unwrap();
    assert!(stopped.is_ok());

    assert!(tokio::net::TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_quit_closes_other_active_sessions() {
    let server = start_memory_server().await;
    let addr = server.addr;

    let mut bystander = guest(addr).await;
    assert!(bystander.get_bands().await.unwrap().is_empty());

    let client = login(addr, "SkyGround", "groove").await;
    client.quit().await.unwrap();

    match bystander.read_line().await {
        Err(Error::ConnectionClosed) => {}
        Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::ConnectionReset => {}
        other => panic!("Bystander still connected: {:?}", other),
    }

    tokio::time::timeout(Duration::from_secs(5), server.handle)
        .await
        .expect("Server did not stop after quit")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_guest_quit_only_closes_own_connection() {
    let server = start_memory_server().await;

    let visitor = guest(server.addr).await;
    visitor.quit().await.unwrap();

    // Still accepting
    let client = login(server.addr, "SkyGround", "groove").await;
    client.close().await.unwrap();
    assert!(!server.handle.is_finished());

    server.stop().await;
}

#[tokio::test]
async fn test_sqlite_catalog_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("catalog.db");

    let server = start_sqlite_server(&db_path).await;
    let mut client = login(server.addr, "SkyGround", "groove").await;
    assert_eq!(client.add_song(&song("Wave", "SkyGround")).await.unwrap(), Outcome::Ok);
    assert_eq!(client.add_event(&event("Jazz_Fest", "SkyGround")).await.unwrap(), Outcome::Ok);
    client.quit().await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), server.handle)
        .await
        .expect("Server did not stop after quit")
        .unwrap()
        .unwrap();

    let server = start_sqlite_server(&db_path).await;
    let mut client = login(server.addr, "SkyGround", "groove").await;
    assert_eq!(
        client.add_song(&song("Wave", "SkyGround")).await.unwrap(),
        Outcome::AlreadyIn
    );
    let events = client.show_events("SkyGround").await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].place, "Lisbon");
    assert_eq!(events[0].kind, "festival");
    client.close().await.unwrap();

    server.stop().await;
}
