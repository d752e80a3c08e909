//! Named read/write coordination, scoped to one repository instance.

use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Any number of concurrent readers, or exactly one writer, never both.
///
/// Identity is per instance: two independent repositories each own their
/// own `Lock` and never contend. Guards may be held across awaits, which
/// is what lets a long DAG traversal observe a consistent snapshot while
/// blocking a pending writer.
#[derive(Debug)]
pub struct Lock {
    name: String,
    inner: RwLock<()>,
}

impl Lock {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: RwLock::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, ()> {
        tracing::trace!(lock = %self.name, "acquiring read lock");
        self.inner.read().await
    }

    pub async fn write(&self) -> RwLockWriteGuard<'_, ()> {
        tracing::trace!(lock = %self.name, "acquiring write lock");
        self.inner.write().await
    }
}
