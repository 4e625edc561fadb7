//! Lock helpers that survive a panicked holder.
//!
//! A reader thread that panics while holding a session lock must not wedge
//! the registry for every other session, so poisoned guards are recovered
//! and a warning is logged.

use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::RwLock;
use std::sync::RwLockReadGuard;
use std::sync::RwLockWriteGuard;

use tracing::warn;

pub fn rwlock_read_or_recover<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| {
        warn!(kind = "rwlock_read", "recovering from poisoned lock");
        poisoned.into_inner()
    })
}

pub fn rwlock_write_or_recover<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| {
        warn!(kind = "rwlock_write", "recovering from poisoned lock");
        poisoned.into_inner()
    })
}

pub fn mutex_lock_or_recover<T>(lock: &Mutex<T>) -> MutexGuard<'_, T> {
    lock.lock().unwrap_or_else(|poisoned| {
        warn!(kind = "mutex", "recovering from poisoned lock");
        poisoned.into_inner()
    })
}
