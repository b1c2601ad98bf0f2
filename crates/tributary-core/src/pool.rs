//! Generic free-list used by the event, path and queue pools
//!
//! Pools are owned by a single coordinator and touched only by the thread
//! driving its dispatch, so no synchronization is involved.

/// Bounded free-list of reusable values
#[derive(Debug)]
pub struct ObjectPool<T> {
    items: Vec<T>,
    max_size: usize,
}

impl<T> ObjectPool<T> {
    /// Create a pool retaining at most `max_size` spare values (0 means unbounded)
    pub fn new(max_size: usize) -> Self {
        Self {
            items: Vec::new(),
            max_size,
        }
    }

    /// Take a spare value, or build one with `create` if the pool is empty
    pub fn get_or(&mut self, create: impl FnOnce() -> T) -> T {
        self.items.pop().unwrap_or_else(create)
    }

    /// Take a spare value if one is held
    pub fn take(&mut self) -> Option<T> {
        self.items.pop()
    }

    /// Return a value to the pool
    ///
    /// Returns `false` when the pool is full and the value was dropped instead.
    /// Callers are responsible for resetting the value first.
    pub fn release(&mut self, item: T) -> bool {
        if self.max_size != 0 && self.items.len() >= self.max_size {
            return false;
        }
        self.items.push(item);
        true
    }

    /// Number of spare values currently held
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether no spare values are held
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Maximum number of spare values retained
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Drop every spare value
    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T> Default for ObjectPool<T> {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_creates_when_empty() {
        let mut pool: ObjectPool<Vec<u8>> = ObjectPool::new(2);
        let v = pool.get_or(|| Vec::with_capacity(7));
        assert!(v.capacity() >= 7);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_release_then_get_reuses() {
        let mut pool = ObjectPool::new(2);
        pool.release(String::from("kept"));
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.get_or(String::new), "kept");
        assert!(pool.is_empty());
    }

    #[test]
    fn test_release_respects_capacity() {
        let mut pool = ObjectPool::new(1);
        assert!(pool.release(1));
        assert!(!pool.release(2));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_zero_capacity_is_unbounded() {
        let mut pool = ObjectPool::new(0);
        for i in 0..100 {
            assert!(pool.release(i));
        }
        assert_eq!(pool.len(), 100);
        pool.clear();
        assert!(pool.is_empty());
    }
}
