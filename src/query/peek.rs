// src/query/peek.rs

use crate::error::Result;

/// A fallible cursor with single-item lookahead
///
/// `try_peek` pulls at most one item from the underlying cursor and keeps it
/// until `dequeue` removes it, so repeated peeks are idempotent.
pub struct PeekQueue<T, I> {
    cursor: I,
    peeked: Option<T>,
    finished: bool,
}

impl<T, I> PeekQueue<T, I>
where
    I: Iterator<Item = Result<T>>,
{
    pub fn new(cursor: I) -> Self {
        Self {
            cursor,
            peeked: None,
            finished: false,
        }
    }

    /// Look at the next item without consuming it
    ///
    /// `Ok(None)` means the cursor is exhausted. An error is returned once and
    /// is not cached; the caller decides whether to drop the queue.
    pub fn try_peek(&mut self) -> Result<Option<&T>> {
        if self.peeked.is_none() && !self.finished {
            match self.cursor.next() {
                Some(item) => self.peeked = Some(item?),
                None => self.finished = true,
            }
        }
        Ok(self.peeked.as_ref())
    }

    /// The item held by the last successful peek, if any
    pub fn peeked(&self) -> Option<&T> {
        self.peeked.as_ref()
    }

    /// Remove and return the peeked item
    pub fn dequeue(&mut self) -> Option<T> {
        self.peeked.take()
    }

    pub fn is_finished(&self) -> bool {
        self.finished && self.peeked.is_none()
    }
}
