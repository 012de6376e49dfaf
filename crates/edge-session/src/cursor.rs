//! Resume cursor shared between the session task and its handle.

use parking_lot::Mutex;
use std::sync::Arc;

/// Last sequence position the server reported for this listener.
///
/// Never moves backwards. Survives reconnects for the lifetime of the
/// listener; persisting it across restarts is left to the caller.
#[derive(Debug, Clone, Default)]
pub struct ResumeCursor {
    inner: Arc<Mutex<Option<i64>>>,
}

impl ResumeCursor {
    pub fn new(initial: Option<i64>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(initial)),
        }
    }

    pub fn get(&self) -> Option<i64> {
        *self.inner.lock()
    }

    /// Move the cursor to `seq` if that is ahead of the current position.
    ///
    /// Returns whether the cursor moved.
    pub fn advance(&self, seq: i64) -> bool {
        let mut current = self.inner.lock();
        match *current {
            Some(existing) if existing >= seq => false,
            _ => {
                *current = Some(seq);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_never_moves_backwards() {
        let cursor = ResumeCursor::new(None);
        assert_eq!(cursor.get(), None);

        assert!(cursor.advance(10));
        assert!(!cursor.advance(5));
        assert!(!cursor.advance(10));
        assert!(cursor.advance(11));
        assert_eq!(cursor.get(), Some(11));
    }

    #[test]
    fn test_clones_share_position() {
        let cursor = ResumeCursor::new(Some(3));
        let view = cursor.clone();
        cursor.advance(9);
        assert_eq!(view.get(), Some(9));
    }
}
