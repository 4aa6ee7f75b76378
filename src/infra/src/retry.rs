// Copyright 2025 OpenObserve Inc.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use std::time::Duration;

use rand::Rng;

/// Retry schedule as data: the policy answers, per attempt index, whether to
/// try again and how long to wait first.
#[derive(Debug, Clone, Default)]
pub enum RetryPolicy {
    /// Never retry.
    #[default]
    None,
    /// Fixed interval, bounded count.
    Simple { total_retries: u32, interval: Duration },
    /// One delay per retry, exhausted when the list runs out.
    Custom { intervals: Vec<Duration> },
    /// Custom with a uniform random jitter added to each delay.
    Jittered {
        intervals: Vec<Duration>,
        jitter_max_ms: u64,
    },
}

impl RetryPolicy {
    /// The schedule the managed dispatcher uses for streaming attempts.
    pub fn managed_streaming() -> Self {
        RetryPolicy::Jittered {
            intervals: config::STREAMING_RETRY_DELAYS.to_vec(),
            jitter_max_ms: config::STREAMING_JITTER_MAX_MS,
        }
    }

    /// `Some(delay)` to retry after `delay`, `None` to stop. `attempt` is the
    /// zero-based index of the attempt that just failed.
    pub fn move_next(&self, attempt: u32) -> Option<Duration> {
        match self {
            RetryPolicy::None => None,
            RetryPolicy::Simple {
                total_retries,
                interval,
            } => (attempt <= *total_retries).then_some(*interval),
            RetryPolicy::Custom { intervals } => intervals.get(attempt as usize).copied(),
            RetryPolicy::Jittered {
                intervals,
                jitter_max_ms,
            } => intervals.get(attempt as usize).map(|d| {
                let jitter = if *jitter_max_ms == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..*jitter_max_ms)
                };
                *d + Duration::from_millis(jitter)
            }),
        }
    }

    /// Attempt budget of the managed streaming loop: one attempt per delay
    /// entry, the trailing delay unused.
    pub fn max_attempts(&self) -> usize {
        match self {
            RetryPolicy::None => 1,
            RetryPolicy::Simple { total_retries, .. } => *total_retries as usize + 1,
            RetryPolicy::Custom { intervals } | RetryPolicy::Jittered { intervals, .. } => {
                intervals.len().max(1)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_never_retries() {
        assert_eq!(RetryPolicy::None.move_next(0), None);
    }

    #[test]
    fn test_simple() {
        let policy = RetryPolicy::Simple {
            total_retries: 2,
            interval: Duration::from_millis(10),
        };
        assert_eq!(policy.move_next(0), Some(Duration::from_millis(10)));
        assert_eq!(policy.move_next(2), Some(Duration::from_millis(10)));
        assert_eq!(policy.move_next(3), None);
    }

    #[test]
    fn test_custom_boundary() {
        let policy = RetryPolicy::Custom {
            intervals: vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
            ],
        };
        assert_eq!(policy.move_next(0), Some(Duration::from_secs(1)));
        assert_eq!(policy.move_next(1), Some(Duration::from_secs(2)));
        assert_eq!(policy.move_next(2), Some(Duration::from_secs(4)));
        assert_eq!(policy.move_next(3), None);
    }

    #[test]
    fn test_jittered_within_bounds() {
        let policy = RetryPolicy::Jittered {
            intervals: vec![Duration::from_secs(1)],
            jitter_max_ms: 1000,
        };
        for _ in 0..50 {
            let delay = policy.move_next(0).unwrap();
            assert!(delay >= Duration::from_secs(1));
            assert!(delay < Duration::from_secs(2));
        }
        assert_eq!(policy.move_next(1), None);
    }
}
