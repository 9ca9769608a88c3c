use core::cell::Cell;

use critical_section::Mutex;

/// A cell which can be shared between threads and interrupt handlers
///
/// All accesses happen inside a critical section, so the contained value is always read or
/// written as a whole.
#[derive(Debug)]
pub struct AtomicCell<T: Copy> {
    inner: Mutex<Cell<T>>,
}

impl<T: Copy> AtomicCell<T> {
    /// Create a new AtomicCell holding `value`
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(Cell::new(value)),
        }
    }

    /// Read the current value
    pub fn load(&self) -> T {
        critical_section::with(|cs| self.inner.borrow(cs).get())
    }

    /// Replace the current value
    pub fn store(&self, value: T) {
        critical_section::with(|cs| self.inner.borrow(cs).set(value))
    }

    /// Replace the current value, returning the previous one
    pub fn swap(&self, value: T) -> T {
        critical_section::with(|cs| self.inner.borrow(cs).replace(value))
    }

    /// Update the value in place with `f`, returning the new value
    pub fn update(&self, f: impl FnOnce(T) -> T) -> T {
        critical_section::with(|cs| {
            let cell = self.inner.borrow(cs);
            let new = f(cell.get());
            cell.set(new);
            new
        })
    }
}

impl<T: Copy + Default> AtomicCell<T> {
    /// Read the current value and leave the default value in its place
    pub fn take(&self) -> T {
        self.swap(T::default())
    }
}

impl<T: Copy + Default> Default for AtomicCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_leaves_default() {
        let cell = AtomicCell::new(Some(3u8));
        assert_eq!(Some(3), cell.take());
        assert_eq!(None, cell.load());
    }

    #[test]
    fn test_update() {
        let cell = AtomicCell::new(5u32);
        assert_eq!(7, cell.update(|v| v + 2));
        assert_eq!(7, cell.swap(1));
        assert_eq!(1, cell.load());
    }
}
