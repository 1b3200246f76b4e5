//! Statistics module
//!
//! Lock-free run statistics tracking using atomic operations.

mod atomic;

pub use atomic::{RunStats, RunStatsSnapshot};
