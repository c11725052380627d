//! Poison-tolerant access to cache state.
//!
//! Poisoned guards are recovered and logged; entries may be stale afterwards.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

pub(crate) fn read<'a, T>(lock: &'a RwLock<T>, op: &'static str) -> RwLockReadGuard<'a, T> {
    lock.read().unwrap_or_else(|poisoned| recover(poisoned, op, "read"))
}

pub(crate) fn write<'a, T>(lock: &'a RwLock<T>, op: &'static str) -> RwLockWriteGuard<'a, T> {
    lock.write().unwrap_or_else(|poisoned| recover(poisoned, op, "write"))
}

fn recover<G>(poisoned: PoisonError<G>, op: &'static str, mode: &'static str) -> G {
    warn!(
        target: "djedi::cache",
        op,
        lock_mode = mode,
        "Recovered from poisoned cache lock"
    );
    poisoned.into_inner()
}
