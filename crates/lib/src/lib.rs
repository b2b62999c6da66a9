//! Teletrader core library: Telegram trading bot for the Deriv brokerage with an LLM assistant.
//!
//! The [`bot`] router is the center; [`deriv`], [`assistant`] and [`channels`] are the
//! collaborators it is wired to in [`service`].

pub mod assistant;
pub mod bot;
pub mod channels;
pub mod config;
pub mod deriv;
pub mod gateway;
pub mod init;
pub mod llm;
pub mod market;
pub mod service;
pub mod tools;
