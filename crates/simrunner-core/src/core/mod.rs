//! # Core Module
//!
//! The building blocks the scheduler is made of, with no scheduling policy of
//! their own.
//!
//! - **Processes** ([`process`]) - The [`JobHandle`](process::JobHandle) trait and
//!   the engine-backed implementation
//! - **Models** ([`models`]) - Job lifecycle states and status snapshots
//! - **File I/O** ([`io`]) - Job manifests in TOML and CSV status reports

pub mod io;
pub mod models;
pub mod process;
