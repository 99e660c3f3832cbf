use std::sync::Arc;

use tokio::sync::RwLock;

/// A value that is only ever replaced as a whole.
///
/// Writers build the next value off to the side and `install` it in one
/// step, so readers see either the previous value or the new one, never a
/// value under construction. `load` hands out a shared handle; holding it
/// does not block the next install.
pub struct Snapshot<T> {
    current: RwLock<Arc<T>>,
}

impl<T> Snapshot<T> {
    pub fn new(initial: T) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
        }
    }

    pub async fn load(&self) -> Arc<T> {
        Arc::clone(&*self.current.read().await)
    }

    pub async fn install(&self, next: T) {
        *self.current.write().await = Arc::new(next);
    }
}

impl<T: Default> Default for Snapshot<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
