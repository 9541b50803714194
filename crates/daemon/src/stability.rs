//! Settle check for staged files.
//!
//! The extraction tool writes staged files in place, so a file is only safe to
//! transcode once its size stops changing across the settle window.

use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;

/// Result of a settle check on a staged file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StabilityResult {
    /// Size unchanged across the window.
    Stable,
    /// Size changed; the file is still being written.
    Unstable {
        initial_size: u64,
        current_size: u64,
    },
}

impl StabilityResult {
    pub fn is_stable(&self) -> bool {
        matches!(self, StabilityResult::Stable)
    }
}

/// Wait `settle`, then compare the file's size with `initial_size`.
///
/// Errors if the file disappeared or cannot be stat'ed after the wait.
pub async fn check_stability(
    path: &Path,
    initial_size: u64,
    settle: Duration,
) -> Result<StabilityResult, std::io::Error> {
    sleep(settle).await;

    let current_size = tokio::fs::metadata(path).await?.len();
    Ok(compare_sizes(initial_size, current_size))
}

#[inline]
pub fn compare_sizes(initial_size: u64, current_size: u64) -> StabilityResult {
    if initial_size == current_size {
        StabilityResult::Stable
    } else {
        StabilityResult::Unstable {
            initial_size,
            current_size,
        }
    }
}
