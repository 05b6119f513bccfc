//! Core notification stream infrastructure.
//!
//! The backend pushes notifications over a single long-lived Server-Sent-Events
//! (SSE) response. Because the request needs custom headers (bearer auth), the
//! wire protocol is parsed by hand instead of relying on a ready-made
//! `EventSource`-style client.
//!
//! # Architecture
//!
//! - [`parse`]: pure SSE frame parsing over a growing byte buffer
//! - [`config::Config`]: connection timings and the reconnection strategy
//! - [`Client`]: the façade owning at most one connection session at a time,
//!   multiplexed across any number of registered listeners
//!
//! A session starts only after the first listener has been registered for a
//! short coalescing delay (absorbing subscribe/unsubscribe churn from UI
//! remounts), and is torn down only after the registry has stayed empty past a
//! grace period.
//!
//! # Example
//!
//! ```ignore
//! let client = Client::new(base_url, Arc::new(token_provider), Config::default())?;
//!
//! let subscription = client.connect(|notification| {
//!     println!("{}: {}", notification.title, notification.message);
//! });
//!
//! // Later: drop the subscription (or call `subscription.unsubscribe()`).
//! ```

pub mod config;
pub mod error;
pub mod manager;
pub mod parse;
pub(crate) mod session;

pub use config::{Config, ReconnectConfig};
pub use error::StreamError;
pub use manager::{Client, Subscription};
pub use parse::{Frame, flush_frame, parse_frames};
pub use session::ConnectionState;
