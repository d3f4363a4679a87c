//! Core domain + application logic for the release relay bot.
//!
//! This crate is intentionally framework-agnostic. Telegram and GitHub live
//! behind ports (traits) implemented in adapter crates.

pub mod batch;
pub mod config;
pub mod domain;
pub mod errors;
pub mod fetch;
pub mod formatting;
pub mod logging;
pub mod messaging;
pub mod ports;
pub mod progress;
pub mod queue;
pub mod security;
pub mod service;
pub mod transfer;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::{Error, Result};
