//! FIX 4.2 session acceptor and wire codec.
//!
//! [`message`] implements C1 (framing/checksum) and C2 (typed message schema).
//! [`acceptor`] implements C3: the TCP listener, per-connection session state,
//! and dispatch of inbound application messages into the lifecycle engine.

mod acceptor;
pub mod message;

pub use acceptor::{run_fix_acceptor, SessionHandle, SessionRegistry};
