use crate::{
    error::{StoreError, StoreResult},
    modlist::ModList,
};

#[derive(Debug, Default)]
pub struct UndoBuffer {
    snapshot: Option<ModList>,
}

impl UndoBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, list: ModList) {
        self.snapshot = Some(list);
    }

    /// Same as `push`, but hands back what was held so a failed restore can
    /// put it back.
    pub fn replace(&mut self, list: ModList) -> Option<ModList> {
        self.snapshot.replace(list)
    }

    pub fn pop(&mut self) -> StoreResult<ModList> {
        self.snapshot.take().ok_or(StoreError::NothingToUndo)
    }

    pub fn can_undo(&self) -> bool {
        self.snapshot.is_some()
    }

    #[cfg(test)]
    pub fn peek(&self) -> Option<&ModList> {
        self.snapshot.as_ref()
    }

    pub(crate) fn restore_previous(&mut self, previous: Option<ModList>) {
        self.snapshot = previous;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(ids: &[&str]) -> ModList {
        ids.iter().copied().collect()
    }

    #[test]
    fn starts_empty() {
        let mut buffer = UndoBuffer::new();
        assert!(!buffer.can_undo());
        assert!(matches!(buffer.pop(), Err(StoreError::NothingToUndo)));
    }

    #[test]
    fn push_overwrites_previous_snapshot() {
        let mut buffer = UndoBuffer::new();
        buffer.push(list(&["first"]));
        buffer.push(list(&["second"]));
        assert_eq!(buffer.peek(), Some(&list(&["second"])));
        assert_eq!(buffer.pop().unwrap(), list(&["second"]));
    }

    #[test]
    fn pop_consumes_the_snapshot() {
        let mut buffer = UndoBuffer::new();
        buffer.push(list(&["a"]));
        assert!(buffer.can_undo());
        buffer.pop().unwrap();
        assert!(!buffer.can_undo());
        assert!(matches!(buffer.pop(), Err(StoreError::NothingToUndo)));
    }

    #[test]
    fn replace_returns_previous() {
        let mut buffer = UndoBuffer::new();
        assert_eq!(buffer.replace(list(&["a"])), None);
        assert_eq!(buffer.replace(list(&["b"])), Some(list(&["a"])));
        buffer.restore_previous(Some(list(&["a"])));
        assert_eq!(buffer.peek(), Some(&list(&["a"])));
    }
}
