//! # Hrpc
//!
//! A multiplexed client connection for the `hrpc` binary protocol.
//!
//! ## Architecture
//!
//! One [`Connection`] owns one socket. Callers issue any number of concurrent
//! calls through it; each gets a process-unique id and a [`PendingCall`] future.
//! A single pump task reads responses and routes them back by id, so the server
//! may answer in any order.
//!
//! ## Wire Format
//!
//! - **Handshake**: `"hrpc"`, version byte `3`, `[HeaderLen: u32]`, header.
//! - **Request**: `[TotalLen: u32][CallId: u32][Method: text][Count: i32][Value...]`
//! - **Response**: `[CallId: u32][Flag: u8][Size: u32]`, then `Size - 9` payload bytes.
//!
//! Values use the [`hwire`] codec.
//!
//! ## Failure Model
//!
//! Remote exceptions, timeouts and undecodable payloads fail one call. Transport
//! errors and protocol violations close the connection and fail every call
//! still pending. Nothing is retried.

pub mod call;
pub mod config;
pub mod connection;
pub mod error;
pub mod flag;
pub mod frame;
pub mod handshake;
pub mod invocation;
pub mod ops;
pub mod pending;
pub mod transport;


pub use call::PendingCall;
pub use config::DEFAULT_RPC_TIMEOUT;
pub use config::RemoteIdentity;
pub use connection::Connection;
pub use connection::ConnectionEvent;
pub use connection::Events;
pub use connection::State;
pub use error::Error;
pub use error::Result;
pub use flag::ResponseFlag;
pub use invocation::Invocation;
pub use transport::Dialer;
pub use transport::MemoryDialer;
pub use transport::TcpDialer;

pub use hwire::Value;
