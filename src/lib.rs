//! B2 Relay Library
//!
//! Stateless HTTP upload relay in front of Backblaze B2.
//!
//! # Features
//!
//! - **Single-shot uploads**: a whole file in one request
//! - **Large files**: one part per request, the caller carries `fileId` forward
//! - **Fail fast**: malformed or undersized chunks never reach B2
//! - **Stateless**: every request authorizes against B2 afresh; nothing is kept between requests
//!
//! # Example
//!
//! ```no_run
//! use b2_relay::{config::Config, server::Server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let server = Server::bind(config).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod b2;
pub mod config;
pub mod envelope;
pub mod logging;
pub mod metrics;
pub mod server;
pub mod upload;

// Re-export commonly used types
pub use config::Config;
pub use server::Server;
pub use upload::{UploadOrchestrator, UploadOutcome, UploadRequest};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
