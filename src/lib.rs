pub mod cancel;
pub mod commands;
pub mod config;
pub mod counters;
pub mod executor;
pub mod formatters;
pub mod output;
pub mod parsers;
pub mod progress;
pub mod query;
pub mod session;
pub mod transport;
