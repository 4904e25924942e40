// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use super::{LockDescriptor, LockPrimitive};

/// Waits between two lock attempts.
pub trait RetryWait {
    /// Block for `interval`. Returns `false` if the wait was cancelled.
    fn wait(&self, interval: Duration) -> bool;
}

/// Sleeps the current thread. Cannot be cancelled.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadSleep;

impl RetryWait for ThreadSleep {
    fn wait(&self, interval: Duration) -> bool {
        std::thread::sleep(interval);
        true
    }
}

/// A wait that can be interrupted from another thread.
#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel all current and future waits on this token.
    pub fn cancel(&self) {
        let (cancelled, condvar) = &*self.inner;
        *cancelled.lock() = true;
        condvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.0.lock()
    }
}

impl RetryWait for CancellationToken {
    fn wait(&self, interval: Duration) -> bool {
        let deadline = Instant::now() + interval;
        let (cancelled, condvar) = &*self.inner;
        let mut cancelled = cancelled.lock();
        while !*cancelled {
            if condvar.wait_until(&mut cancelled, deadline).timed_out() {
                break;
            }
        }
        !*cancelled
    }
}

/// Try `primitive` at most `retry_count` times, waiting `interval` between two failed
/// attempts. There is no wait after the last attempt. Returns `false` if every attempt failed
/// or the wait was cancelled.
pub fn lock_with_retries<P: LockPrimitive + ?Sized>(
    primitive: &mut P,
    retry_count: u32,
    interval: Duration,
    waiter: &impl RetryWait,
) -> bool {
    for attempt in 1..=retry_count {
        if primitive.try_acquire_once() {
            return true;
        }
        debug!(attempt, retry_count, "lock attempt failed");
        if attempt < retry_count && !waiter.wait(interval) {
            debug!(attempt, "lock wait cancelled");
            return false;
        }
    }
    false
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockState {
    Idle,
    Attempting,
    Acquired,
    Failed,
}

/// A [`LockPrimitive`] acquired with bounded retries.
pub struct RetryingLock<P: LockPrimitive, W: RetryWait = ThreadSleep> {
    descriptor: LockDescriptor,
    primitive: P,
    waiter: W,
    state: LockState,
}

impl<P: LockPrimitive> RetryingLock<P> {
    pub fn new(descriptor: LockDescriptor, primitive: P) -> Self {
        Self::with_waiter(descriptor, primitive, ThreadSleep)
    }
}

impl<P: LockPrimitive, W: RetryWait> RetryingLock<P, W> {
    pub fn with_waiter(descriptor: LockDescriptor, primitive: P, waiter: W) -> Self {
        Self {
            descriptor,
            primitive,
            waiter,
            state: LockState::Idle,
        }
    }

    pub fn descriptor(&self) -> &LockDescriptor {
        &self.descriptor
    }

    pub fn state(&self) -> LockState {
        self.state
    }

    pub fn is_locked(&self) -> bool {
        self.state == LockState::Acquired
    }

    /// Acquire the lock with the retry configuration of the descriptor. Returns `true`
    /// immediately if the lock is already held.
    pub fn lock_with_retries(&mut self) -> bool {
        if self.state == LockState::Acquired {
            return true;
        }
        self.state = LockState::Attempting;
        let options = self.descriptor.options;
        let acquired = lock_with_retries(
            &mut self.primitive,
            options.retry_count,
            options.retry_interval,
            &self.waiter,
        );
        if acquired {
            info!(lock = %self.descriptor, "lock acquired");
            self.state = LockState::Acquired;
        } else {
            warn!(
                lock = %self.descriptor,
                attempts = options.retry_count,
                "not able to acquire the lock"
            );
            self.state = LockState::Failed;
        }
        acquired
    }

    /// Acquire the lock and release it when the returned guard is dropped.
    pub fn lock(&mut self) -> Option<LockGuard<'_>> {
        if !self.lock_with_retries() {
            return None;
        }
        Some(LockGuard {
            descriptor: &self.descriptor,
            primitive: &mut self.primitive,
            state: &mut self.state,
        })
    }

    /// Release the lock if held.
    pub fn release(&mut self) {
        if self.state == LockState::Acquired {
            self.primitive.release();
            info!(lock = %self.descriptor, "lock released");
        }
        self.state = LockState::Idle;
    }
}

impl<P: LockPrimitive, W: RetryWait> Drop for RetryingLock<P, W> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Proof that a lock is held. Releases the lock on drop.
pub struct LockGuard<'a> {
    descriptor: &'a LockDescriptor,
    primitive: &'a mut dyn LockPrimitive,
    state: &'a mut LockState,
}

impl LockGuard<'_> {
    pub fn descriptor(&self) -> &LockDescriptor {
        self.descriptor
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.primitive.release();
        *self.state = LockState::Idle;
        info!(lock = %self.descriptor, "lock released");
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::lock::LockUsage;
    use crate::options::LockOptions;

    /// Fails the first `failures` attempts, then succeeds.
    struct FlakyPrimitive {
        failures: u32,
        attempts: u32,
        held: bool,
        releases: u32,
    }

    impl FlakyPrimitive {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                attempts: 0,
                held: false,
                releases: 0,
            }
        }
    }

    impl LockPrimitive for FlakyPrimitive {
        fn try_acquire_once(&mut self) -> bool {
            self.attempts += 1;
            self.held = self.attempts > self.failures;
            self.held
        }

        fn release(&mut self) {
            if self.held {
                self.releases += 1;
            }
            self.held = false;
        }
    }

    /// Records the requested waits instead of sleeping.
    #[derive(Default)]
    struct RecordingWait {
        waits: RefCell<Vec<Duration>>,
        cancel_after: Option<usize>,
    }

    impl RetryWait for RecordingWait {
        fn wait(&self, interval: Duration) -> bool {
            let mut waits = self.waits.borrow_mut();
            waits.push(interval);
            self.cancel_after.map_or(true, |n| waits.len() <= n)
        }
    }

    const T: Duration = Duration::from_secs(5);

    #[test]
    fn test_always_failing() {
        let mut primitive = FlakyPrimitive::new(u32::MAX);
        let waiter = RecordingWait::default();
        assert!(!lock_with_retries(&mut primitive, 3, T, &waiter));
        assert_eq!(primitive.attempts, 3);
        // no wait after the last attempt
        assert_eq!(waiter.waits.borrow().iter().sum::<Duration>(), 2 * T);
    }

    #[test]
    fn test_second_attempt_succeeds() {
        let mut primitive = FlakyPrimitive::new(1);
        let waiter = RecordingWait::default();
        assert!(lock_with_retries(&mut primitive, 3, T, &waiter));
        assert_eq!(primitive.attempts, 2);
        assert_eq!(*waiter.waits.borrow(), vec![T]);
    }

    #[test]
    fn test_first_attempt_succeeds() {
        let mut primitive = FlakyPrimitive::new(0);
        let waiter = RecordingWait::default();
        assert!(lock_with_retries(&mut primitive, 1, T, &waiter));
        assert!(waiter.waits.borrow().is_empty());
    }

    #[test]
    fn test_zero_attempts() {
        let mut primitive = FlakyPrimitive::new(0);
        assert!(!lock_with_retries(&mut primitive, 0, T, &RecordingWait::default()));
        assert_eq!(primitive.attempts, 0);
    }

    #[test]
    fn test_cancelled_wait() {
        let mut primitive = FlakyPrimitive::new(u32::MAX);
        let waiter = RecordingWait {
            cancel_after: Some(0),
            ..Default::default()
        };
        assert!(!lock_with_retries(&mut primitive, 3, T, &waiter));
        // cancellation is not retried
        assert_eq!(primitive.attempts, 1);
    }

    #[test]
    fn test_cancellation_token() {
        let token = CancellationToken::new();
        assert!(token.wait(Duration::from_millis(1)));

        let waiter = token.clone();
        let handle = std::thread::spawn(move || waiter.wait(Duration::from_secs(600)));
        std::thread::sleep(Duration::from_millis(20));
        token.cancel();
        assert!(!handle.join().unwrap());
        assert!(token.is_cancelled());
        assert!(!token.wait(Duration::from_secs(600)));
    }

    fn descriptor(retry_count: u32) -> LockDescriptor {
        LockDescriptor::new(
            "t1",
            LockUsage::Metadata,
            LockOptions {
                retry_count,
                retry_interval: T,
            },
        )
    }

    #[test]
    fn test_retrying_lock_states() {
        let mut lock =
            RetryingLock::with_waiter(descriptor(2), FlakyPrimitive::new(5), RecordingWait::default());
        assert_eq!(lock.state(), LockState::Idle);
        assert!(lock.lock().is_none());
        assert_eq!(lock.state(), LockState::Failed);
        assert_eq!(lock.primitive.attempts, 2);

        // attempts 3 and 4 fail, attempt 6 succeeds
        assert!(!lock.lock_with_retries());
        assert!(lock.lock_with_retries());
        assert!(lock.is_locked());
        // already held: no new attempt
        assert!(lock.lock_with_retries());
        assert_eq!(lock.primitive.attempts, 6);

        lock.release();
        assert_eq!(lock.state(), LockState::Idle);
        assert_eq!(lock.primitive.releases, 1);
        lock.release();
        assert_eq!(lock.primitive.releases, 1);
    }

    #[test]
    fn test_lock_guard() {
        let mut lock =
            RetryingLock::with_waiter(descriptor(3), FlakyPrimitive::new(1), RecordingWait::default());
        {
            let guard = lock.lock().unwrap();
            assert_eq!(guard.descriptor().to_string(), "t1/meta");
        }
        assert_eq!(lock.state(), LockState::Idle);
        assert_eq!(lock.primitive.releases, 1);
        assert_eq!(*lock.waiter.waits.borrow(), vec![T]);
    }
}
