//! Owner sessions: HS256 bearer tokens and, in `mock-api` builds, the internal
//! session endpoint that issues them.

#[cfg(feature = "mock-api")]
pub mod handlers;
pub mod service;

pub use service::{Claims, TokenService};
