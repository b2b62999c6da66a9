//! Deriv brokerage over its JSON WebSocket API.

mod client;
mod wire;

pub use client::{DerivClient, DerivSettings};
