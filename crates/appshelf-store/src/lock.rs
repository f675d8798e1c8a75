//! Cross-process storage lock built on `flock(2)` via `fs2`.
//!
//! Each [`StorageLock`] opens its own descriptor on the lock file, so two
//! handles exclude each other whether they live in different processes or
//! in different threads of the same one.  A mutex inside the handle
//! serializes acquire/release calls made on that handle.
//!
//! The lock is not reentrant: acquiring the same handle twice without a
//! release in between is not detected.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use fs2::FileExt;

use crate::error::{Result, StoreError};

pub struct StorageLock {
    path: PathBuf,
    single_use: bool,
    file: Mutex<Option<File>>,
}

impl StorageLock {
    /// Open (creating if needed) the lock file at `path`.  A `single_use`
    /// lock closes itself when released.
    pub fn open(path: &Path, single_use: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            single_use,
            file: Mutex::new(Some(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Block until the lock is held exclusively.
    pub fn acquire(&self) -> Result<()> {
        let file = self.file();
        let file = file.as_ref().ok_or(StoreError::LockClosed)?;
        FileExt::lock_exclusive(file)?;
        Ok(())
    }

    pub fn release(&self) -> Result<()> {
        let mut file = self.file();
        FileExt::unlock(file.as_ref().ok_or(StoreError::LockClosed)?)?;

        if self.single_use {
            file.take();
        }
        Ok(())
    }

    /// Close the descriptor.  Closing twice is a no-op.
    pub fn close(&self) {
        self.file().take();
    }

    pub fn is_closed(&self) -> bool {
        self.file().is_none()
    }

    /// Acquire the lock for the lifetime of the returned guard.
    pub fn lock(&self) -> Result<StorageLockGuard<'_>> {
        self.acquire()?;
        Ok(StorageLockGuard {
            lock: self,
            released: false,
        })
    }

    fn file(&self) -> MutexGuard<'_, Option<File>> {
        // the Option<File> stays valid whatever a panicking holder did
        self.file.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Holds a [`StorageLock`] until released or dropped.
pub struct StorageLockGuard<'a> {
    lock: &'a StorageLock,
    released: bool,
}

impl StorageLockGuard<'_> {
    /// Release explicitly, surfacing any OS error.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.lock.release()
    }
}

impl Drop for StorageLockGuard<'_> {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = self.lock.release() {
                tracing::error!(path = %self.lock.path.display(), "failed to release storage lock: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{mpsc, Arc};
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn single_use_lock_closes_on_release() {
        let dir = tempfile::tempdir().unwrap();
        let lock = StorageLock::open(&dir.path().join("x.lock"), true).unwrap();

        lock.acquire().unwrap();
        lock.release().unwrap();
        assert!(lock.is_closed());
        assert!(matches!(lock.acquire(), Err(StoreError::LockClosed)));
        assert!(matches!(lock.release(), Err(StoreError::LockClosed)));

        lock.close();
        lock.close();
    }

    #[test]
    fn reusable_lock_stays_open() {
        let dir = tempfile::tempdir().unwrap();
        let lock = StorageLock::open(&dir.path().join("x.lock"), false).unwrap();

        for _ in 0..3 {
            let guard = lock.lock().unwrap();
            guard.release().unwrap();
        }
        assert!(!lock.is_closed());

        lock.close();
        assert!(matches!(lock.lock(), Err(StoreError::LockClosed)));
    }

    #[test]
    fn independent_handles_exclude_each_other() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.lock");

        let first = StorageLock::open(&path, true).unwrap();
        let guard = first.lock().unwrap();

        let acquired = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = mpsc::channel();
        let waiter = {
            let path = path.clone();
            let acquired = Arc::clone(&acquired);
            thread::spawn(move || {
                let second = StorageLock::open(&path, true).unwrap();
                let guard = second.lock().unwrap();
                acquired.store(true, Ordering::SeqCst);
                drop(guard);
                done_tx.send(()).unwrap();
            })
        };

        thread::sleep(Duration::from_millis(200));
        assert!(!acquired.load(Ordering::SeqCst));

        drop(guard);
        done_rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert!(acquired.load(Ordering::SeqCst));
        waiter.join().unwrap();
        assert!(first.is_closed());
    }
}
