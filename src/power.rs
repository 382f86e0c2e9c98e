use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    thread,
    time::{Duration, Instant},
};

use log::{debug, warn};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy)]
struct Hold {
    generation: u64,
    expires: Instant,
}

#[derive(Debug, Default)]
struct Locks {
    next_generation: u64,
    held: HashMap<String, Hold>,
}

/// Hands out wake locks. A lock is held until its guard drops or its
/// timeout passes, whichever comes first.
#[derive(Debug, Clone, Default)]
pub struct PowerManager {
    locks: Arc<Mutex<Locks>>,
}

impl PowerManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// takes the lock named `tag` for at most `timeout`
    pub fn acquire(&self, tag: &str, timeout: Duration) -> Result<WakeLock> {
        let now = Instant::now();
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks.held.get(tag).is_some_and(|hold| hold.expires > now) {
            return Err(Error::WakeLockHeld(tag.to_string()));
        }
        locks.next_generation += 1;
        let generation = locks.next_generation;
        locks.held.insert(
            tag.to_string(),
            Hold {
                generation,
                expires: now + timeout,
            },
        );
        debug!("acquired wake lock {tag} for {timeout:?}");
        Ok(WakeLock {
            tag: tag.to_string(),
            generation,
            locks: Arc::clone(&self.locks),
        })
    }

    #[must_use]
    pub fn is_held(&self, tag: &str) -> bool {
        let now = Instant::now();
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .held
            .get(tag)
            .is_some_and(|hold| hold.expires > now)
    }

    #[must_use]
    pub fn held_count(&self) -> usize {
        let now = Instant::now();
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .held
            .values()
            .filter(|hold| hold.expires > now)
            .count()
    }

    /// blocks until no lock is held or `limit` passes, returns true if all were released
    pub fn wait_released(&self, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        while self.held_count() > 0 {
            if Instant::now() >= deadline {
                warn!("gave up waiting for {} wake lock(s)", self.held_count());
                return false;
            }
            thread::sleep(Duration::from_millis(10));
        }
        true
    }
}

/// Released on drop. Dropping a lock that already timed out and was taken
/// again leaves the newer holder alone.
#[derive(Debug)]
pub struct WakeLock {
    tag: String,
    generation: u64,
    locks: Arc<Mutex<Locks>>,
}

impl WakeLock {
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }
}

impl Drop for WakeLock {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .held
            .get(&self.tag)
            .is_some_and(|hold| hold.generation == self.generation)
        {
            locks.held.remove(&self.tag);
            debug!("released wake lock {}", self.tag);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TAG: &str = "test:lock";

    #[test]
    fn guard_releases_on_drop() {
        let power = PowerManager::new();
        let lock = power.acquire(TAG, Duration::from_secs(60)).unwrap();
        assert_eq!(lock.tag(), TAG);
        assert!(power.is_held(TAG));
        drop(lock);
        assert!(!power.is_held(TAG));
        assert_eq!(power.held_count(), 0);
    }

    #[test]
    fn lock_is_exclusive_while_held() {
        let power = PowerManager::new();
        let _lock = power.acquire(TAG, Duration::from_secs(60)).unwrap();
        assert!(matches!(
            power.acquire(TAG, Duration::from_secs(60)),
            Err(Error::WakeLockHeld(_))
        ));
        assert!(power.acquire("test:other", Duration::from_secs(60)).is_ok());
    }

    #[test]
    fn lock_expires_after_timeout() {
        let power = PowerManager::new();
        let stale = power.acquire(TAG, Duration::from_millis(20)).unwrap();
        thread::sleep(Duration::from_millis(40));
        assert!(!power.is_held(TAG));

        let fresh = power.acquire(TAG, Duration::from_secs(60)).unwrap();
        // the stale guard must not release the fresh one
        drop(stale);
        assert!(power.is_held(TAG));
        drop(fresh);
        assert!(!power.is_held(TAG));
    }

    #[test]
    fn released_even_when_unwinding() {
        let power = PowerManager::new();
        let cloned = power.clone();
        let result = thread::spawn(move || {
            let _lock = cloned.acquire(TAG, Duration::from_secs(60)).unwrap();
            panic!("handler failed");
        })
        .join();
        assert!(result.is_err());
        assert!(!power.is_held(TAG));
    }

    #[test]
    fn wait_released_returns_once_free() {
        let power = PowerManager::new();
        let lock = power.acquire(TAG, Duration::from_secs(60)).unwrap();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            drop(lock);
        });
        assert!(power.wait_released(Duration::from_secs(5)));
        handle.join().unwrap();
        assert!(power.wait_released(Duration::ZERO));
    }

    #[test]
    fn wait_released_gives_up_at_the_limit() {
        let power = PowerManager::new();
        let _lock = power.acquire(TAG, Duration::from_secs(60)).unwrap();
        assert!(!power.wait_released(Duration::from_millis(20)));
    }
}
