use std::collections::VecDeque;
use std::fmt;

/// Bounded buffer that evicts the oldest entry on overflow.
pub struct CircularQueue<T> {
    deque: VecDeque<T>,
    capacity: usize,
}

impl<T: fmt::Debug> fmt::Debug for CircularQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.deque.fmt(f)
    }
}

impl<T> CircularQueue<T> {
    #[inline]
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            deque: VecDeque::with_capacity(cap),
            capacity: cap.max(1),
        }
    }

    #[inline]
    pub fn push(&mut self, item: T) -> Option<T> {
        let poped = if self.is_full() {
            self.deque.pop_back()
        } else {
            None
        };

        self.deque.push_front(item);

        poped
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.deque.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.deque.is_empty()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.deque.len() == self.capacity
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn clear(&mut self) {
        self.deque.clear()
    }

    /// Keeps only the `keep` newest entries.
    #[inline]
    pub fn retain_newest(&mut self, keep: usize) {
        self.deque.truncate(keep)
    }

    #[inline]
    pub fn newest(&self) -> Option<&T> {
        self.deque.front()
    }

    /// Oldest first.
    #[inline]
    pub fn asc_iter(&self) -> impl Iterator<Item = &'_ T> {
        self.deque.iter().rev()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_evicts_the_oldest() {
        let mut q = CircularQueue::with_capacity(3);
        for i in 0..4 {
            q.push(i);
        }

        assert!(q.is_full());
        assert_eq!(q.asc_iter().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(q.newest(), Some(&3));
    }

    #[test]
    fn retain_newest_drops_from_the_old_end() {
        let mut q = CircularQueue::with_capacity(5);
        for i in 0..5 {
            q.push(i);
        }
        q.retain_newest(2);

        assert_eq!(q.asc_iter().copied().collect::<Vec<_>>(), vec![3, 4]);
    }
}
