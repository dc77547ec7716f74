//! # Engine Module
//!
//! This module implements the scheduling engine that drives a pool of external
//! simulation processes to completion.
//!
//! ## Overview
//!
//! The engine tracks every managed job through its lifecycle (queued, running,
//! errored, finished), launches jobs under a concurrency budget, retries
//! failures up to a bounded budget, and reports progress while doing so. A run
//! executes on its own thread so the caller can keep querying live state.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Run mode, batch size, retry budget and polling interval
//! - **Job Pool** ([`pool`]) - Ordered job collection, directory nesting and status queries
//! - **State Tracking** ([`state`]) - Per-job bookkeeping and run summaries
//! - **Progress Monitoring** ([`progress`]) - Callback-based progress reporting
//! - **Error Handling** ([`error`]) - Precondition failures surfaced to callers
//!
//! Failures of the jobs themselves are never raised as errors; they are
//! absorbed into the retry bookkeeping and observable through status queries.

pub mod config;
pub mod error;
pub mod pool;
pub mod progress;
pub(crate) mod scheduler;
pub mod state;
