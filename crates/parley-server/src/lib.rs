//! Parley server library.
//!
//! Parley coordinates real-time mediation meetings over a newline-delimited
//! TCP text protocol: authenticated users create, join and leave meetings,
//! exchange chat messages, request speaking rights, and vote in polls, while
//! the server fans out notifications to every affected connection.
//!
//! # Architecture
//!
//! ```text
//! Server (accept loop, bounded by a connection semaphore)
//! └── one connection task per accepted socket
//!     ├── reader: line → command dispatch (synchronous per connection)
//!     └── writer: drains the connection's outbound channel
//! SessionRegistry (owned by the server, injected into every task)
//! EntityStore (trait seam; MemoryStore ships in-process)
//! ```
//!
//! # Key design decisions
//!
//! - **No global state**: the registry and store are constructed once in
//!   `main` and passed into every connection task.
//! - **Single writer per socket**: all outbound lines, direct replies and
//!   fanout pushes alike, go through the connection's mpsc channel, which
//!   keeps per-connection ordering FIFO.
//! - **Store calls are the critical sections**: every [`store::EntityStore`]
//!   operation is atomic, which is what makes vote replacement and meeting
//!   close idempotency safe under concurrency.
//!
//! # Modules
//!
//! - [`config`] - service configuration from environment
//! - [`store`] - entity store trait and in-memory implementation
//! - [`registry`] - live-connection table and notification fanout
//! - [`connection`] - per-connection read/write loop and cleanup
//! - [`commands`] - command parsing, preconditions and handlers

pub mod commands;
pub mod config;
pub mod connection;
pub mod errors;
pub mod model;
pub mod registry;
pub mod server;
pub mod store;
