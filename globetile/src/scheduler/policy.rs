//! Retry policy for tiles whose fetch failed.
//!
//! Level-zero failures are reported to the caller and never retried
//! automatically. Deeper tiles stay in `ERROR` until the policy allows another
//! attempt; delays are counted in frames since the scheduler has no clock of
//! its own.
//!
//! # Example
//!
//! ```
//! use globetile::scheduler::RetryPolicy;
//!
//! let policy = RetryPolicy::fixed(3, 30);
//! assert_eq!(policy.delay_for_attempt(1), Some(30));
//! assert_eq!(policy.delay_for_attempt(3), None);
//! ```

use std::fmt;
use std::str::FromStr;

// =============================================================================
// Retry Policy Constants
// =============================================================================

/// Default number of attempts, including the first one.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Default delay between attempts, in frames.
pub const DEFAULT_RETRY_DELAY_FRAMES: u64 = 30;

/// Default cap for exponential backoff, in frames.
pub const DEFAULT_MAX_DELAY_FRAMES: u64 = 600;

/// Default multiplier for exponential backoff.
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// How a failed tile is retried.
#[derive(Clone, Debug, PartialEq)]
pub enum RetryPolicy {
    /// Failed tiles stay in `ERROR` until reset.
    None,

    /// Fixed number of attempts with a constant delay between them.
    Fixed {
        /// Maximum number of attempts (including the initial attempt).
        max_attempts: u32,
        /// Frames to wait before retrying.
        delay_frames: u64,
    },

    /// Delay multiplied after each failure, up to a cap.
    ExponentialBackoff {
        /// Maximum number of attempts (including the initial attempt).
        max_attempts: u32,
        /// Delay after the first failure, in frames.
        initial_delay_frames: u64,
        /// Maximum delay, in frames.
        max_delay_frames: u64,
        /// Multiplier applied after each failure.
        multiplier: f64,
    },
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY_FRAMES)
    }
}

impl RetryPolicy {
    /// Creates a fixed retry policy.
    pub fn fixed(max_attempts: u32, delay_frames: u64) -> Self {
        Self::Fixed {
            max_attempts,
            delay_frames,
        }
    }

    /// Creates an exponential backoff policy starting at `initial_delay_frames`.
    pub fn exponential(max_attempts: u32, initial_delay_frames: u64) -> Self {
        Self::ExponentialBackoff {
            max_attempts,
            initial_delay_frames,
            max_delay_frames: DEFAULT_MAX_DELAY_FRAMES,
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }

    /// Frames to wait before the next attempt.
    ///
    /// # Arguments
    ///
    /// * `attempt` - Number of attempts already made (1 after the first failure)
    ///
    /// # Returns
    ///
    /// `None` when no more attempts are allowed.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<u64> {
        match self {
            Self::None => None,
            Self::Fixed {
                max_attempts,
                delay_frames,
            } => (attempt < *max_attempts).then_some(*delay_frames),
            Self::ExponentialBackoff {
                max_attempts,
                initial_delay_frames,
                max_delay_frames,
                multiplier,
            } => {
                if attempt >= *max_attempts {
                    return None;
                }
                let factor = multiplier.powi(attempt.saturating_sub(1) as i32);
                let delay = (*initial_delay_frames as f64 * factor).min(*max_delay_frames as f64);
                Some(delay as u64)
            }
        }
    }

    /// Maximum number of attempts for this policy.
    pub fn max_attempts(&self) -> u32 {
        match self {
            Self::None => 1,
            Self::Fixed { max_attempts, .. } => *max_attempts,
            Self::ExponentialBackoff { max_attempts, .. } => *max_attempts,
        }
    }

    /// Short name used in configuration files.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Fixed { .. } => "fixed",
            Self::ExponentialBackoff { .. } => "exponential",
        }
    }

    /// Same policy kind with a different attempt count.
    pub fn with_max_attempts(self, attempts: u32) -> Self {
        match self {
            Self::None => Self::None,
            Self::Fixed { delay_frames, .. } => Self::fixed(attempts, delay_frames),
            Self::ExponentialBackoff {
                initial_delay_frames,
                max_delay_frames,
                multiplier,
                ..
            } => Self::ExponentialBackoff {
                max_attempts: attempts,
                initial_delay_frames,
                max_delay_frames,
                multiplier,
            },
        }
    }

    /// Same policy kind with a different base delay.
    pub fn with_delay_frames(self, frames: u64) -> Self {
        match self {
            Self::None => Self::None,
            Self::Fixed { max_attempts, .. } => Self::fixed(max_attempts, frames),
            Self::ExponentialBackoff {
                max_attempts,
                max_delay_frames,
                multiplier,
                ..
            } => Self::ExponentialBackoff {
                max_attempts,
                initial_delay_frames: frames,
                max_delay_frames,
                multiplier,
            },
        }
    }

    /// Base delay in frames (0 for [`RetryPolicy::None`]).
    pub fn base_delay_frames(&self) -> u64 {
        match self {
            Self::None => 0,
            Self::Fixed { delay_frames, .. } => *delay_frames,
            Self::ExponentialBackoff {
                initial_delay_frames,
                ..
            } => *initial_delay_frames,
        }
    }
}

impl fmt::Display for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Fixed {
                max_attempts,
                delay_frames,
            } => write!(f, "fixed({} attempts, {} frames)", max_attempts, delay_frames),
            Self::ExponentialBackoff {
                max_attempts,
                initial_delay_frames,
                ..
            } => write!(
                f,
                "exponential({} attempts, from {} frames)",
                max_attempts, initial_delay_frames
            ),
        }
    }
}

impl FromStr for RetryPolicy {
    type Err = String;

    /// Parses a policy kind with default parameters.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "fixed" => Ok(Self::default()),
            "exponential" => Ok(Self::exponential(
                DEFAULT_RETRY_ATTEMPTS,
                DEFAULT_RETRY_DELAY_FRAMES,
            )),
            other => Err(format!("unknown retry policy '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_default_is_fixed() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), DEFAULT_RETRY_ATTEMPTS);
        assert_eq!(policy.delay_for_attempt(1), Some(DEFAULT_RETRY_DELAY_FRAMES));
    }

    #[test]
    fn test_retry_policy_none() {
        let policy = RetryPolicy::None;
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(policy.delay_for_attempt(1), None);
    }

    #[test]
    fn test_retry_policy_fixed() {
        let policy = RetryPolicy::fixed(3, 10);
        assert_eq!(policy.delay_for_attempt(1), Some(10));
        assert_eq!(policy.delay_for_attempt(2), Some(10));
        assert_eq!(policy.delay_for_attempt(3), None);
    }

    #[test]
    fn test_retry_policy_exponential() {
        let policy = RetryPolicy::ExponentialBackoff {
            max_attempts: 4,
            initial_delay_frames: 5,
            max_delay_frames: 100,
            multiplier: 2.0,
        };
        assert_eq!(policy.delay_for_attempt(1), Some(5));
        assert_eq!(policy.delay_for_attempt(2), Some(10));
        assert_eq!(policy.delay_for_attempt(3), Some(20));
        assert_eq!(policy.delay_for_attempt(4), None);
    }

    #[test]
    fn test_retry_policy_exponential_respects_cap() {
        let policy = RetryPolicy::ExponentialBackoff {
            max_attempts: 20,
            initial_delay_frames: 10,
            max_delay_frames: 50,
            multiplier: 3.0,
        };
        assert_eq!(policy.delay_for_attempt(10), Some(50));
    }

    #[test]
    fn test_with_builders_keep_kind() {
        let policy = RetryPolicy::exponential(2, 4)
            .with_max_attempts(5)
            .with_delay_frames(8);
        assert_eq!(policy.kind(), "exponential");
        assert_eq!(policy.max_attempts(), 5);
        assert_eq!(policy.base_delay_frames(), 8);
        assert_eq!(RetryPolicy::None.with_max_attempts(4), RetryPolicy::None);
    }

    #[test]
    fn test_from_str() {
        assert_eq!("none".parse::<RetryPolicy>().unwrap(), RetryPolicy::None);
        assert_eq!("Fixed".parse::<RetryPolicy>().unwrap(), RetryPolicy::default());
        assert!("sometimes".parse::<RetryPolicy>().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(RetryPolicy::None.to_string(), "none");
        assert_eq!(RetryPolicy::fixed(2, 7).to_string(), "fixed(2 attempts, 7 frames)");
    }
}
