//! Provides input/output for the files a runner consumes and produces.
//!
//! Job manifests describe which engine runs to launch and where; status
//! reports record how each of them ended.

pub mod manifest;
pub mod report;
