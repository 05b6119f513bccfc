#![cfg_attr(doc, doc = include_str!("../README.md"))]

pub mod auth;
pub mod error;
pub mod sse;
pub mod types;

use crate::error::Error;

pub type Result<T> = std::result::Result<T, Error>;

pub use crate::auth::{StaticToken, TokenProvider};
pub use crate::sse::{Client, Subscription};
pub use crate::types::Notification;
