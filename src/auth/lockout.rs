//! Login Lockout Policy
//! Mission: Throttle credential guessing with a timed per-account lock

use chrono::{DateTime, Duration, Utc};

/// Default failed attempts before an account locks.
pub const DEFAULT_THRESHOLD: u32 = 5;
/// Default lock window in minutes.
pub const DEFAULT_WINDOW_MINS: i64 = 15;

/// Lockout state for an account at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockState {
    /// Attempts below the threshold, or a previous lock has elapsed.
    Open { attempts: u32 },
    /// Attempts reached the threshold and the window has not elapsed.
    Locked { until: DateTime<Utc> },
}

impl LockState {
    /// Minutes until the lock clears, rounded up, at least 1.
    pub fn remaining_minutes(&self, now: DateTime<Utc>) -> i64 {
        match self {
            LockState::Open { .. } => 0,
            LockState::Locked { until } => {
                let secs = (*until - now).num_seconds().max(0);
                (secs + 59) / 60
            }
        }
    }
}

/// Evaluate the stored counter and lock timestamp. An expired lock reads as
/// OPEN with zero attempts; the stale counter is discarded.
pub fn evaluate(
    failed_attempts: u32,
    locked_until: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> LockState {
    match locked_until {
        Some(until) if until > now => LockState::Locked { until },
        Some(_) => LockState::Open { attempts: 0 },
        None => LockState::Open {
            attempts: failed_attempts,
        },
    }
}

/// Compute the successor state after one more failed attempt. The caller is
/// expected to have reloaded `failed_attempts`/`locked_until` from the store
/// immediately before calling, so concurrent failures are not overwritten.
pub fn after_failure(
    failed_attempts: u32,
    locked_until: Option<DateTime<Utc>>,
    threshold: u32,
    window: Duration,
    now: DateTime<Utc>,
) -> LockState {
    let attempts = match evaluate(failed_attempts, locked_until, now) {
        // An attempt against an already-locked account never reaches here;
        // the login handler rejects before checking the password.
        LockState::Locked { until } => return LockState::Locked { until },
        LockState::Open { attempts } => attempts + 1,
    };

    if attempts >= threshold {
        LockState::Locked {
            until: now + window,
        }
    } else {
        LockState::Open { attempts }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_below_threshold() {
        let now = Utc::now();
        for prior in 0..4 {
            let state = after_failure(prior, None, 5, Duration::minutes(15), now);
            assert_eq!(
                state,
                LockState::Open {
                    attempts: prior + 1
                }
            );
        }
    }

    #[test]
    fn test_fifth_failure_locks() {
        let now = Utc::now();
        let state = after_failure(4, None, 5, Duration::minutes(15), now);
        match state {
            LockState::Locked { until } => assert_eq!(until, now + Duration::minutes(15)),
            other => panic!("expected lock, got {other:?}"),
        }
    }

    #[test]
    fn test_expired_lock_reads_open_and_counter_resets() {
        let now = Utc::now();
        let stale_lock = Some(now - Duration::minutes(1));

        assert_eq!(evaluate(5, stale_lock, now), LockState::Open { attempts: 0 });

        // A failure after an expired lock starts counting from 1 again
        let state = after_failure(5, stale_lock, 5, Duration::minutes(15), now);
        assert_eq!(state, LockState::Open { attempts: 1 });
    }

    #[test]
    fn test_active_lock_holds() {
        let now = Utc::now();
        let until = now + Duration::minutes(10);
        assert_eq!(evaluate(5, Some(until), now), LockState::Locked { until });
    }

    #[test]
    fn test_remaining_minutes_rounds_up() {
        let now = Utc::now();
        let state = LockState::Locked {
            until: now + Duration::seconds(61),
        };
        assert_eq!(state.remaining_minutes(now), 2);

        let open = LockState::Open { attempts: 3 };
        assert_eq!(open.remaining_minutes(now), 0);
    }
}
