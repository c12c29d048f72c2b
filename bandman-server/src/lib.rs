//! bandman-server library
//!
//! Session state machine and connection acceptor for the BandManager line
//! protocol. The binary in `main.rs` wires them to configuration, logging,
//! the credential store and a repository.

pub mod logging;
pub mod server;
pub mod session;

pub use server::Server;
pub use session::{Session, SessionContext, SessionEnd, SessionPolicy, SessionState};
