//! Connection session: one authenticated streaming request and its read loop.
//!
//! A session is a background task spawned by the [`manager`](super::manager).
//! It owns the physical connection for its whole lifetime: it performs the
//! authenticated request, feeds response bytes through the frame parser,
//! routes frames back to the manager for dispatch, and reconnects with
//! exponential backoff when the stream fails or ends. Stopping is cooperative
//! via a [`CancellationToken`]; a fired token is never treated as a transport
//! failure.

use std::sync::Arc;

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff as _;
use bytes::BytesMut;
use futures::StreamExt as _;
use reqwest::header;
use secrecy::ExposeSecret as _;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use super::error::StreamError;
use super::manager::ClientInner;
use super::parse::{flush_frame, parse_frames};
use crate::error::Error;

/// Connection state tracking.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected
    Disconnected,
    /// Attempting to connect
    Connecting,
    /// Successfully connected and reading frames
    Connected,
}

impl ConnectionState {
    /// Check if the connection is currently active.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// How one connection attempt's read phase ended.
enum StreamEnd {
    /// Cancellation token fired; no reconnect.
    Cancelled,
    /// Server closed the stream; reconnect without an error callback.
    Ended,
    /// Read error; error listeners were already notified, reconnect.
    Failed,
}

/// Long-lived driver for the notification stream connection.
///
/// Runs until cancelled, until no token is available, or until the configured
/// maximum number of reconnect attempts is exceeded. Clears its slot in the
/// manager on the way out so a later 0→1 listener transition can start fresh.
pub(crate) async fn run_session(
    inner: Arc<ClientInner>,
    cancel: CancellationToken,
    generation: u64,
) {
    let mut backoff: ExponentialBackoff = inner.config().reconnect.clone().into();
    let mut attempt = 0_u32;

    loop {
        if cancel.is_cancelled() {
            break;
        }

        // Missing token is a caller configuration problem, not a transient
        // fault: log it and bail without a retry, an error callback, or a
        // state transition.
        let Some(token) = inner.tokens().access_token() else {
            tracing::warn!("no access token available, notification stream not started");
            break;
        };
        inner.set_state(ConnectionState::Connecting);

        let request = inner
            .http()
            .get(inner.stream_url())
            .header(header::ACCEPT, "text/event-stream")
            .header(header::CACHE_CONTROL, "no-cache")
            .bearer_auth(token.expose_secret());

        let response = tokio::select! {
            () = cancel.cancelled() => break,
            response = request.send() => response,
        };

        match response {
            Ok(response) if response.status().is_success() => {
                tracing::info!(url = %inner.stream_url(), "notification stream established");
                attempt = 0;
                inner.set_state(ConnectionState::Connected);

                match read_stream(&inner, &cancel, response, &mut backoff).await {
                    StreamEnd::Cancelled => break,
                    StreamEnd::Ended | StreamEnd::Failed => {}
                }
            }
            Ok(response) => {
                let error = Error::from(StreamError::InvalidStatus(response.status()));
                tracing::warn!(status = %response.status(), "notification stream request rejected");
                inner.dispatch_error(&error);
            }
            Err(e) => {
                if cancel.is_cancelled() {
                    break;
                }
                let error = Error::from(StreamError::Connection(e));
                tracing::warn!(error = %error, "notification stream connection failed");
                inner.dispatch_error(&error);
            }
        }

        attempt = attempt.saturating_add(1);
        if let Some(max) = inner.config().reconnect.max_attempts
            && attempt >= max
        {
            tracing::error!(attempts = max, "max stream reconnect attempts exceeded");
            break;
        }

        inner.set_state(ConnectionState::Disconnected);
        let delay = backoff
            .next_backoff()
            .unwrap_or(inner.config().reconnect.max_backoff);
        tracing::debug!(
            attempt,
            delay = ?delay,
            "notification stream reconnecting after backoff"
        );
        tokio::select! {
            () = cancel.cancelled() => break,
            () = sleep(delay) => {}
        }
    }

    inner.finish_session(generation);
    inner.set_state(ConnectionState::Disconnected);
}

/// Drive the read loop for one established connection.
async fn read_stream(
    inner: &Arc<ClientInner>,
    cancel: &CancellationToken,
    response: reqwest::Response,
    backoff: &mut ExponentialBackoff,
) -> StreamEnd {
    let mut body = Box::pin(response.bytes_stream());
    let mut buffer = BytesMut::new();

    loop {
        let chunk = tokio::select! {
            () = cancel.cancelled() => return StreamEnd::Cancelled,
            chunk = body.next() => chunk,
        };

        match chunk {
            Some(Ok(bytes)) => {
                buffer.extend_from_slice(&bytes);
                let (frames, consumed) = parse_frames(&buffer);
                let _consumed = buffer.split_to(consumed);
                for frame in &frames {
                    // Any parsed frame is proof of a live connection.
                    backoff.reset();
                    inner.route_frame(frame);
                }
            }
            Some(Err(e)) => {
                if cancel.is_cancelled() {
                    return StreamEnd::Cancelled;
                }
                let error = Error::from(StreamError::Connection(e));
                tracing::warn!(error = %error, "notification stream read failed");
                inner.dispatch_error(&error);
                return StreamEnd::Failed;
            }
            None => {
                // Server closed the stream. A final frame may be buffered
                // without its blank-line terminator.
                if let Some(frame) = flush_frame(&buffer) {
                    backoff.reset();
                    inner.route_frame(&frame);
                }
                tracing::info!("notification stream ended");
                return StreamEnd::Ended;
            }
        }
    }
}
