//! # Workflows Module
//!
//! High-level entry points for users of the library.
//!
//! - **Process Runner** ([`runner`]) - Manages a set of simulation processes,
//!   e.g. a free-energy calculation at multiple lambda values, and runs them in
//!   the background in serial or in parallel with automatic retries.

pub mod runner;
