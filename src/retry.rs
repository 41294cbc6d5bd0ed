//! Fixed-delay retry for blocking network calls.
//!
//! Both the certificate probe and the alert sink retry with a fixed pause
//! between attempts. The pause goes through a [`Sleeper`] so tests can run
//! without actually blocking.

use std::fmt::Display;
use std::time::Duration;
use tracing::warn;

/// Blocks the calling thread between attempts.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Production sleeper backed by [`std::thread::sleep`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

impl<S: Sleeper + ?Sized> Sleeper for &S {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// How many times to try an operation and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one. Never zero.
    pub max_attempts: u32,
    /// Pause between two consecutive attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Single attempt, no pause.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Runs `op` until it succeeds or the attempts are used up.
    ///
    /// `op` receives the 1-based attempt number. Every failure is logged
    /// with that number under `label`. On exhaustion the last error is
    /// returned together with the number of attempts made.
    pub fn run<T, E, F>(&self, sleeper: &dyn Sleeper, label: &str, mut op: F) -> Result<T, (u32, E)>
    where
        E: Display,
        F: FnMut(u32) -> Result<T, E>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) => {
                    warn!(
                        target_name = %label,
                        attempt,
                        max_attempts,
                        error = %err,
                        "attempt failed"
                    );
                    if attempt >= max_attempts {
                        return Err((attempt, err));
                    }
                    sleeper.sleep(self.delay);
                    attempt += 1;
                }
            }
        }
    }
}

/// Records requested pauses instead of sleeping.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingSleeper {
    slept: std::sync::Mutex<Vec<Duration>>,
}

#[cfg(test)]
impl RecordingSleeper {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Every pause requested so far, in order.
    pub(crate) fn pauses(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_succeeds_after_transient_failures() {
        let sleeper = RecordingSleeper::new();
        let policy = RetryPolicy::new(3, Duration::from_secs(2));

        let result: Result<u32, (u32, String)> = policy.run(&sleeper, "op", |attempt| {
            if attempt < 3 {
                Err(format!("failure {}", attempt))
            } else {
                Ok(attempt)
            }
        });

        assert_eq!(result.unwrap(), 3);
        assert_eq!(sleeper.pauses(), vec![Duration::from_secs(2); 2]);
    }

    #[test]
    fn test_exhaustion_returns_last_error() {
        let sleeper = RecordingSleeper::new();
        let policy = RetryPolicy::new(3, Duration::from_millis(5));

        let result: Result<(), (u32, String)> =
            policy.run(&sleeper, "op", |attempt| Err(format!("failure {}", attempt)));

        let (attempts, err) = result.unwrap_err();
        assert_eq!(attempts, 3);
        assert_eq!(err, "failure 3");
        // No pause after the final attempt
        assert_eq!(sleeper.pauses().len(), 2);
    }

    #[test]
    fn test_zero_attempts_still_tries_once() {
        let sleeper = RecordingSleeper::new();
        let policy = RetryPolicy {
            max_attempts: 0,
            delay: Duration::ZERO,
        };
        let mut calls = 0;

        let _: Result<(), (u32, &str)> = policy.run(&sleeper, "op", |_| {
            calls += 1;
            Err("nope")
        });

        assert_eq!(calls, 1);
        assert!(sleeper.pauses().is_empty());
    }

    #[test]
    fn test_no_retry() {
        let policy = RetryPolicy::no_retry();
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.delay, Duration::ZERO);
    }
}
