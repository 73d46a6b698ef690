pub mod logging;

use std::sync::{Mutex, MutexGuard};

/// Locks a component mutex, recovering the guard if a callback panicked while
/// holding it. Component state stays consistent between statements, so the
/// data is still usable.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
