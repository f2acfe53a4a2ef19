//! Tus Mockd Library
//!
//! In-process mock of a tus resumable-upload endpoint, for tests that need
//! wire-level upload semantics without a real backend.
//!
//! # Features
//!
//! - **Creation extension**: `POST /files/` allocates an upload of a declared
//!   length and hands back its location
//! - **Status**: `HEAD /files/{id}` reports declared length and received offset
//! - **Append**: `PATCH /files/{id}` validates offset alignment, rejects stale
//!   writers with `409`, and advances the offset atomically
//! - **Pluggable storage**: records live in an asynchronous key-value store
//!   abstraction; the bundled backend is in-memory
//! - **Observable**: mutations are published through an emitter so harnesses
//!   can await activity instead of polling
//!
//! # Example
//!
//! ```no_run
//! use tus_mockd::{config::Config, server::Server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut config = Config::default();
//!     config.server.address = "127.0.0.1:0".into();
//!     let server = Server::new(config).await?;
//!     println!("mock listening on {}", server.local_addr());
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod delay;
pub mod emitter;
pub mod id;
pub mod protocol;
pub mod server;
pub mod store;

// Re-export commonly used types
pub use config::Config;
pub use server::Server;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
