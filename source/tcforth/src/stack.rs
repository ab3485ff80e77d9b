use alloc::vec::Vec;

/// A fixed-capacity LIFO stack.
pub struct Stack<T: Copy> {
    items: Vec<T>,
    capacity: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StackError {
    StackEmpty,
    StackFull,
}

impl<T: Copy> Stack<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            capacity,
        }
    }

    #[inline]
    pub fn push(&mut self, item: T) -> Result<(), StackError> {
        if self.items.len() >= self.capacity {
            return Err(StackError::StackFull);
        }
        self.items.push(item);
        Ok(())
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn try_pop(&mut self) -> Result<T, StackError> {
        self.pop().ok_or(StackError::StackEmpty)
    }

    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        self.items.pop()
    }

    #[inline]
    pub fn try_peek(&self) -> Result<T, StackError> {
        self.peek().ok_or(StackError::StackEmpty)
    }

    #[inline]
    pub fn peek(&self) -> Option<T> {
        self.items.last().copied()
    }

    /// Peek at the item `n` slots below the top (0 is the top).
    #[inline]
    pub fn try_peek_back_n(&self, n: usize) -> Result<T, StackError> {
        let len = self.items.len();
        if n >= len {
            return Err(StackError::StackEmpty);
        }
        Ok(self.items[len - 1 - n])
    }

    /// Items from the bottom of the stack to the top.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    #[inline]
    pub fn clear(&mut self) {
        self.items.clear();
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
