//! Bearer-token supply for the stream connection.
//!
//! Token acquisition and refresh happen elsewhere in the application; the
//! stream client only needs to ask "what is the current token, if any" at the
//! moment it opens a connection. [`TokenProvider`] is that seam, so tests and
//! applications with rotating tokens can inject their own source.

use secrecy::SecretString;

/// Source of the current bearer token.
///
/// Returning `None` means the caller is not authenticated; the stream client
/// treats that as a precondition failure and does not attempt to connect.
pub trait TokenProvider: Send + Sync + 'static {
    /// The current access token, if one is available.
    fn access_token(&self) -> Option<SecretString>;
}

/// Token provider backed by a fixed token.
///
/// Suitable for tools and tests where the token never rotates. Applications
/// with refresh flows should implement [`TokenProvider`] over their own token
/// storage instead.
#[derive(Clone)]
pub struct StaticToken {
    token: SecretString,
}

impl StaticToken {
    #[must_use]
    pub fn new<S: Into<String>>(token: S) -> Self {
        Self {
            token: SecretString::from(token.into()),
        }
    }
}

impl TokenProvider for StaticToken {
    fn access_token(&self) -> Option<SecretString> {
        Some(self.token.clone())
    }
}

impl<F> TokenProvider for F
where
    F: Fn() -> Option<SecretString> + Send + Sync + 'static,
{
    fn access_token(&self) -> Option<SecretString> {
        self()
    }
}
