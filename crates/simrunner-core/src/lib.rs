//! # simrunner Core Library
//!
//! A library for launching, monitoring and retrying pools of long-running
//! molecular-dynamics engine processes (AMBER, GROMACS, OpenMM, SOMD), such as
//! the lambda windows of an alchemical free-energy calculation.
//!
//! ## Architectural Philosophy
//!
//! The library follows a strict three-layer architecture:
//!
//! - **[`core`]: The Foundation.** The [`JobHandle`](core::process::JobHandle)
//!   process abstraction, the concrete engine process, job status models and
//!   file I/O (job manifests, status reports).
//!
//! - **[`engine`]: The Logic Core.** The stateful scheduling layer: the
//!   [`JobPool`](engine::pool::JobPool) with its per-job bookkeeping, the
//!   serial and parallel retry drivers, configuration and error types.
//!
//! - **[`workflows`]: The Public API.** The
//!   [`ProcessRunner`](workflows::runner::ProcessRunner) facade that ties the
//!   pool and the scheduler together behind add/remove/query/start/kill/wait.

pub mod core;
pub mod engine;
pub mod workflows;
