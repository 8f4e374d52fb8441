//! Ticket Sniper Library
//!
//! Timed ticket acquisition for a browser-driven ticketing site: waits for
//! the sale start, retries the purchase flow with backoff, and can watch
//! search results to trigger attempts when tickets turn buyable.

pub mod acquisition;
pub mod cli;
pub mod config;
pub mod driver;
pub mod error;
pub mod monitor;
pub mod schedule;
pub mod selection;
pub mod site;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
