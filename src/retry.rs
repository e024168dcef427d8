/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use crate::config::Config;
use crate::error::{self, Error, ErrorKind};
use crate::interrupt::Interrupter;
use std::cmp;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// How often a backoff sleep checks the interrupter.
const INTERRUPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Bounded-attempt retry with exponential backoff.
///
/// Errors that are interrupted, non-recoverable, or on the abort list
/// propagate immediately. Backoff sleeps end early when the interrupter
/// fires, surfacing an interrupted error.
#[derive(Clone)]
pub(crate) struct Retrier {
    max_attempts: u32,
    base_delay: Duration,
    abort_kinds: Vec<ErrorKind>,
    interrupter: Arc<dyn Interrupter>,
}

impl fmt::Debug for Retrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retrier")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("abort_kinds", &self.abort_kinds)
            .field("interrupter", &"<interrupter>")
            .finish()
    }
}

impl Retrier {
    pub(crate) fn new(config: &Config, interrupter: Arc<dyn Interrupter>) -> Self {
        Self {
            max_attempts: config.max_attempts(),
            base_delay: config.base_delay(),
            abort_kinds: Vec::new(),
            interrupter,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_abort_kinds(mut self, kinds: Vec<ErrorKind>) -> Self {
        self.abort_kinds = kinds;
        self
    }

    /// Execute `op`, retrying recoverable failures until the attempt budget
    /// is exhausted.
    pub(crate) async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let mut attempt: u32 = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if self.abort_kinds.contains(err.kind())
                        || err.is_interrupted()
                        || !err.is_recoverable()
                        || attempt >= self.max_attempts
                    {
                        return Err(err);
                    }
                    let delay = self.base_delay * 2u32.saturating_pow(attempt - 1);
                    tracing::debug!(
                        "attempt {attempt}/{} failed ({err}), retrying in {delay:?}",
                        self.max_attempts
                    );
                    self.interruptible_sleep(delay).await?;
                    attempt += 1;
                }
            }
        }
    }

    /// Sleep for `total`, waking early with an interrupted error if the
    /// interrupter fires.
    async fn interruptible_sleep(&self, total: Duration) -> Result<(), Error> {
        let deadline = Instant::now() + total;
        loop {
            if let Some(reason) = self.interrupter.reason() {
                return Err(error::interrupted(reason));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            tokio::time::sleep(cmp::min(deadline - now, INTERRUPT_POLL_INTERVAL)).await;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::interrupt::NeverInterrupted;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    fn retrier(max_attempts: u32, base_delay: Duration) -> Retrier {
        let config = Config::builder()
            .max_attempts(max_attempts)
            .base_delay(base_delay)
            .build();
        Retrier::new(&config, Arc::new(NeverInterrupted))
    }

    #[tokio::test(start_paused = true)]
    async fn retries_recoverable_until_success() {
        let attempts = AtomicU32::new(0);
        let result = retrier(3, Duration::from_millis(100))
            .run(|| async {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Error::new(ErrorKind::BrokerFetch, "503"))
                } else {
                    Ok(42u32)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_is_exponential() {
        let attempts = AtomicU32::new(0);
        let start = Instant::now();
        let result: Result<(), Error> = retrier(3, Duration::from_millis(100))
            .run(|| async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(Error::new(ErrorKind::S3Transport, "timeout"))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        // 100ms + 200ms of backoff between the three attempts
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn non_recoverable_propagates_immediately() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), Error> = retrier(5, Duration::from_millis(100))
            .run(|| async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(Error::new(ErrorKind::S3Permanent, "403"))
            })
            .await;
        assert_eq!(result.unwrap_err().kind(), &ErrorKind::S3Permanent);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn abort_kinds_propagate_immediately() {
        let config = Config::builder()
            .max_attempts(5)
            .base_delay(Duration::from_millis(10))
            .build();
        let retrier = Retrier::new(&config, Arc::new(NeverInterrupted))
            .with_abort_kinds(vec![ErrorKind::ConsistencyMismatch]);
        let attempts = AtomicU32::new(0);
        let result: Result<(), Error> = retrier
            .run(|| async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(Error::new(ErrorKind::ConsistencyMismatch, "digest != etag"))
            })
            .await;
        assert_eq!(result.unwrap_err().kind(), &ErrorKind::ConsistencyMismatch);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn interrupter_ends_backoff_early() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let config = Config::builder()
            .max_attempts(3)
            .base_delay(Duration::from_secs(3600))
            .build();
        let retrier = Retrier::new(
            &config,
            Arc::new(move || {
                flag.load(Ordering::SeqCst)
                    .then(|| "user requested stop".to_string())
            }),
        );
        let result: Result<(), Error> = retrier
            .run(|| {
                // fire the interrupter once the first attempt has failed
                fired.store(true, Ordering::SeqCst);
                async { Err(Error::new(ErrorKind::S3Transport, "reset")) }
            })
            .await;
        let err = result.unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::Interrupted);
    }

    #[tokio::test(start_paused = true)]
    async fn interrupted_error_not_retried() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), Error> = retrier(5, Duration::from_millis(10))
            .run(|| async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(error::interrupted("stop"))
            })
            .await;
        assert!(result.unwrap_err().is_interrupted());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
