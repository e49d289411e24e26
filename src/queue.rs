//! # FIFO Queue
//!
//! Buffer backing every [`crate::Connection`]. Dequeue advances a read cursor
//! instead of shifting the backing storage; once the cursor passes half of the
//! backing length the consumed prefix is dropped. A long-lived queue under
//! sustained throughput therefore stays proportional to its live contents.

use crate::error::QueueError;

/// First-in, first-out queue with amortized O(1) enqueue and dequeue.
///
/// # Example
///
/// ```rust
/// use fbpweave::Queue;
///
/// let mut queue = Queue::new();
/// queue.enqueue(1);
/// queue.enqueue(2);
/// assert_eq!(queue.dequeue(), Ok(1));
/// assert_eq!(queue.len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct Queue<T> {
  /// Backing storage. Slots before `cursor` have been taken.
  items: Vec<Option<T>>,
  /// Index of the next item to dequeue.
  cursor: usize,
}

impl<T> Queue<T> {
  /// Creates an empty queue.
  pub fn new() -> Self {
    Self {
      items: Vec::new(),
      cursor: 0,
    }
  }

  /// Creates an empty queue with room for `capacity` items before reallocating.
  pub fn with_capacity(capacity: usize) -> Self {
    Self {
      items: Vec::with_capacity(capacity),
      cursor: 0,
    }
  }

  /// Appends `value` to the tail.
  pub fn enqueue(&mut self, value: T) {
    self.items.push(Some(value));
  }

  /// Removes and returns the head.
  ///
  /// # Errors
  ///
  /// Returns [`QueueError::Empty`] when there is nothing to dequeue.
  pub fn dequeue(&mut self) -> Result<T, QueueError> {
    let value = self
      .items
      .get_mut(self.cursor)
      .and_then(Option::take)
      .ok_or(QueueError::Empty)?;
    self.cursor += 1;
    if self.cursor * 2 > self.items.len() {
      self.compact();
    }
    Ok(value)
  }

  /// Returns a reference to the head without removing it.
  pub fn peek(&self) -> Option<&T> {
    self.items.get(self.cursor).and_then(Option::as_ref)
  }

  /// Number of items waiting to be dequeued.
  pub fn len(&self) -> usize {
    self.items.len() - self.cursor
  }

  /// Returns `true` if no item is waiting.
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Drops every pending item.
  pub fn clear(&mut self) {
    self.items.clear();
    self.cursor = 0;
  }

  /// Length of the backing storage, consumed prefix included.
  #[cfg(test)]
  pub(crate) fn backing_len(&self) -> usize {
    self.items.len()
  }

  fn compact(&mut self) {
    self.items.drain(..self.cursor);
    self.cursor = 0;
  }
}

impl<T> Default for Queue<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T> Extend<T> for Queue<T> {
  fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
    self.items.extend(iter.into_iter().map(Some));
  }
}
