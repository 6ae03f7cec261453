use crate::{
    active::ActiveList,
    error::{StoreError, StoreResult},
    modlist::ModList,
    savefile,
    slots::{SlotStore, SlotSummary},
    undo::UndoBuffer,
};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    Restored,
    NotSet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndoOutcome {
    Undone,
    Nothing,
}

#[derive(Debug)]
pub struct StateController<A: ActiveList> {
    store: SlotStore,
    undo: UndoBuffer,
    active: A,
}

impl<A: ActiveList> StateController<A> {
    pub fn new(store: SlotStore, active: A) -> Self {
        Self {
            store,
            undo: UndoBuffer::new(),
            active,
        }
    }

    pub fn store(&self) -> &SlotStore {
        &self.store
    }

    pub fn active(&self) -> &A {
        &self.active
    }

    pub fn active_list(&self) -> StoreResult<ModList> {
        self.active.get_active()
    }

    pub fn backup_current(&mut self, index: u32) -> StoreResult<()> {
        let list = self.active.get_active()?;
        self.store.backup(index, &list)
    }

    /// Stores the mod list a save was made with, leaving the active list alone.
    pub fn backup_from_save(&mut self, index: u32, save: &Path) -> StoreResult<usize> {
        self.store.check_index(index)?;
        let list = savefile::extract_mod_list(save)?;
        self.store.backup(index, &list)?;
        Ok(list.len())
    }

    pub fn restore(&mut self, index: u32) -> StoreResult<RestoreOutcome> {
        if !self.store.is_set(index)? {
            return Ok(RestoreOutcome::NotSet);
        }
        let current = self.active.get_active()?;
        let target = self.store.load(index)?;
        self.apply_with_undo(current, &target)?;
        Ok(RestoreOutcome::Restored)
    }

    /// Makes a save's mod list active. Undoable like a restore.
    pub fn import_save(&mut self, save: &Path) -> StoreResult<usize> {
        let target = savefile::extract_mod_list(save)?;
        let current = self.active.get_active()?;
        self.apply_with_undo(current, &target)?;
        Ok(target.len())
    }

    pub fn undo(&mut self) -> StoreResult<UndoOutcome> {
        if !self.undo.can_undo() {
            return Ok(UndoOutcome::Nothing);
        }
        let list = self.undo.pop()?;
        if let Err(err) = self.active.set_active(&list) {
            self.undo.push(list);
            return Err(err);
        }
        Ok(UndoOutcome::Undone)
    }

    pub fn can_undo(&self) -> bool {
        self.undo.can_undo()
    }

    #[cfg(test)]
    pub fn undo_snapshot(&self) -> Option<&ModList> {
        self.undo.peek()
    }

    pub fn rename(&mut self, index: u32, name: &str) -> StoreResult<()> {
        self.store.check_index(index)?;
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(StoreError::EmptyName);
        }
        self.store.rename(index, trimmed)
    }

    pub fn name_for(&self, index: u32) -> StoreResult<String> {
        self.store.display_name(index)
    }

    pub fn slots(&self) -> StoreResult<Vec<SlotSummary>> {
        self.store.summaries()
    }

    fn apply_with_undo(&mut self, current: ModList, target: &ModList) -> StoreResult<()> {
        let previous = self.undo.replace(current);
        if let Err(err) = self.active.set_active(target) {
            self.undo.restore_previous(previous);
            return Err(err);
        }
        Ok(())
    }
}
