//! Greedy block builder for proposer-builder separation.
//!
//! The crate has two halves. [`tasks::block`] merges pool transactions and
//! bundles into a block, highest price first, under a cooperative interrupt.
//! [`tasks::relay`] talks to relays: it tracks which validator proposes each
//! slot, fetches bids and submits built blocks.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![deny(unused_must_use, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

#[macro_use]
mod macros;

/// Fixture loaders for backtesting.
pub mod backtest;

/// Configuration for the builder and its relay clients.
pub mod config;

/// Constants used in the builder.
pub mod constants;

/// Shared data types.
pub mod primitives;

/// Healthcheck server.
pub mod service;

/// Metrics recorder for the builder's counters and histograms.
pub mod telemetry;

/// Block building and relay tasks.
pub mod tasks;

/// Utilities for testing the builder.
pub mod test_utils;

/// Small helpers.
pub mod utils;

