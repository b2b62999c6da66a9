//! Gateway: HTTP endpoint for Telegram webhook delivery plus a health probe.

mod server;

pub use server::{app, serve, GatewayState, WEBHOOK_PATH, WEBHOOK_SECRET_HEADER};
