use fs2::FileExt;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Held for the life of the process. Two limiters on one sink would fight
/// each other's writes and read them as user overrides.
#[derive(Debug)]
pub struct InstanceLock {
    file: File,
}

impl InstanceLock {
    /// Try to become the only running limiter.
    /// Returns Ok(None) if another instance holds the lock.
    pub fn try_acquire(path: &Path) -> std::io::Result<Option<Self>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?;

        if file.try_lock_exclusive().is_err() {
            return Ok(None);
        }

        // PID is informational; the OS lock is what counts
        file.set_len(0)?;
        write!(file, "{}", std::process::id())?;
        Ok(Some(Self { file }))
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
