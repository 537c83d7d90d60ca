use std::sync::{Mutex, OnceLock};

/// Global lock for working-directory changes in tests.
/// Spawns resolve the child's working directory from the current directory, so
/// any test that calls `set_current_dir` (or asserts on it) holds this lock.
pub static CWD_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

pub fn cwd_lock() -> std::sync::MutexGuard<'static, ()> {
    CWD_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
