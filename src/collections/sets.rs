use std::collections::VecDeque;

/// Double ended queue whose elements are unique. Membership checks are
/// linear; we expect few elements, such as the reactions listening to one
/// stream.
#[derive(Debug, Clone)]
pub struct DequeSet<T: Eq> {
    inner: VecDeque<T>,
}

impl<T: Eq> Default for DequeSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Eq> DequeSet<T> {
    pub fn new() -> Self {
        Self{ inner: VecDeque::new() }
    }

    #[inline]
    pub fn pop_front(&mut self) -> Option<T> {
        self.inner.pop_front()
    }

    #[inline]
    pub fn push_back(&mut self, to_push: T) {
        if !self.contains(&to_push) {
            self.inner.push_back(to_push);
        }
    }

    #[inline]
    pub fn contains(&self, element: &T) -> bool {
        self.inner.iter().any(|e| e == element)
    }

    /// Removes the element if present. Returns whether it was.
    pub fn remove(&mut self, element: &T) -> bool {
        match self.inner.iter().position(|e| e == element) {
            Some(index) => {
                self.inner.remove(index);
                true
            },
            None => false,
        }
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.inner.iter()
    }

    #[inline]
    pub fn clear(&mut self) {
        self.inner.clear();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deque_set_keeps_elements_unique() {
        let mut set = DequeSet::new();
        set.push_back(1);
        set.push_back(2);
        set.push_back(1);
        assert_eq!(set.len(), 2);
        assert!(set.remove(&1));
        assert!(!set.remove(&1));
        assert_eq!(set.pop_front(), Some(2));
        assert!(set.is_empty());
    }
}
