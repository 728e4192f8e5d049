//! Background Tasks Module
//!
//! Contains background tasks that run periodically during server operation.
//!
//! # Tasks
//! - Expiry sweeper: purges expired in-process cache entries and rate-limit windows

mod cleanup;

pub use cleanup::{spawn_sweeper, Sweep, SweeperHandle};
