//! Process start-up helpers: configuration loading and logging.

pub mod config;
pub mod duration;
pub mod logging;
