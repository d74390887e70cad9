//! Access to the Nihemart backend REST API

pub mod authorized;
pub mod client;
pub mod jwt;
pub mod retry;
pub mod session;

pub use authorized::AuthorizedClient;
pub use client::{BackendClient, BackendError, BackendReply};
pub use retry::{Backoff, RetryPolicy, Retryable};
pub use session::{MemorySessionStore, SessionStore};
