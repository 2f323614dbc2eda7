//! Live monitoring client for a honeypot event feed.
//!
//! Polls a collector's event API on a fixed interval, holds the result as
//! an atomically-replaceable snapshot, and derives summary statistics and
//! chart-ready aggregates from it for an external rendering layer.

pub mod aggregate;
pub mod config;
pub mod export;
pub mod feed;
pub mod monitor;
pub mod scheduler;
pub mod store;
