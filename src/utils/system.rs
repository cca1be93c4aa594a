// src/utils/system.rs: System functions

use sysinfo::System;


/// Determines the thread count passed through to the external tools.
///
/// # Arguments
///
/// * `requested` - Explicit `--num_threads`, used as-is when given.
///
/// # Returns
///
/// usize threads; the physical core count when not requested, at least 1
pub fn detect_threads(requested: Option<usize>) -> usize {
    match requested {
        Some(threads) => threads,
        None => System::physical_core_count().unwrap_or(1).max(1),
    }
}
