//! Entity contracts and value types shared by the data-access layer.
//!
//! # Responsibility
//! - Define the identity contract every persistable type implements.
//! - Provide the paged result value handed to presentation layers.
//! - Host the sample school entities used by services and tests.
//!
//! # Invariants
//! - Entities are plain data; no field access triggers I/O.

use std::time::{SystemTime, UNIX_EPOCH};

pub mod entity;
pub mod paged;
pub mod school;

/// Current wall-clock time in Unix epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
