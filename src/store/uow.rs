//! Unit of work: an all-or-nothing scope over the store.

use tokio::sync::MutexGuard;
use tracing::debug;

use super::{Record, StoreError, Tables, WriteOp};
use crate::model::Id;

type Undo = Box<dyn FnOnce(&mut Tables) + Send>;

/// An open, exclusive scope over the ledger tables.
///
/// Writes apply immediately and are journaled. Dropping the scope without a
/// successful [`commit`](Self::commit) replays the journal backwards, restoring
/// every row touched by the scope. Early returns through `?` therefore roll back.
pub struct UnitOfWork<'a> {
    tables: MutexGuard<'a, Tables>,
    journal: Vec<Undo>,
    committed: bool,
}

impl<'a> UnitOfWork<'a> {
    pub(super) fn new(tables: MutexGuard<'a, Tables>) -> Self {
        Self {
            tables,
            journal: Vec::new(),
            committed: false,
        }
    }

    pub fn get<T: Record>(&self, id: Id) -> Option<T> {
        T::table(&self.tables).rows.get(&id).cloned()
    }

    /// All rows matching `filter`, in id order.
    pub fn select<T: Record>(&self, filter: impl Fn(&T) -> bool) -> Vec<T> {
        T::table(&self.tables)
            .rows
            .values()
            .filter(|row| filter(row))
            .cloned()
            .collect()
    }

    pub fn first<T: Record>(&self, filter: impl Fn(&T) -> bool) -> Option<T> {
        T::table(&self.tables)
            .rows
            .values()
            .find(|row| filter(row))
            .cloned()
    }

    /// Store a new row and return it with its assigned id.
    pub fn insert<T: Record>(&mut self, mut row: T) -> Result<T, StoreError> {
        self.tables.trip(Some(T::ENTITY), WriteOp::Insert)?;
        row.check_references(&self.tables)?;

        let table = T::table_mut(&mut self.tables);
        table.last_id += 1;
        let id = table.last_id;
        row.assign_id(id);
        table.rows.insert(id, row.clone());

        self.journal.push(Box::new(move |tables| {
            T::table_mut(tables).rows.remove(&id);
        }));
        Ok(row)
    }

    /// Overwrite an existing row.
    pub fn update<T: Record>(&mut self, row: &T) -> Result<(), StoreError> {
        self.tables.trip(Some(T::ENTITY), WriteOp::Update)?;
        let id = row.id();
        if T::APPEND_ONLY {
            return Err(StoreError::Immutable {
                entity: T::ENTITY,
                id,
            });
        }
        row.check_references(&self.tables)?;

        let previous = T::table_mut(&mut self.tables)
            .rows
            .get_mut(&id)
            .map(|stored| std::mem::replace(stored, row.clone()))
            .ok_or(StoreError::RowNotFound {
                entity: T::ENTITY,
                id,
            })?;

        self.journal.push(Box::new(move |tables| {
            T::table_mut(tables).rows.insert(id, previous);
        }));
        Ok(())
    }

    /// Remove a row and return it.
    pub fn delete<T: Record>(&mut self, id: Id) -> Result<T, StoreError> {
        self.tables.trip(Some(T::ENTITY), WriteOp::Delete)?;
        if T::APPEND_ONLY {
            return Err(StoreError::Immutable {
                entity: T::ENTITY,
                id,
            });
        }

        let removed = T::table_mut(&mut self.tables)
            .rows
            .remove(&id)
            .ok_or(StoreError::RowNotFound {
                entity: T::ENTITY,
                id,
            })?;

        let restored = removed.clone();
        self.journal.push(Box::new(move |tables| {
            T::table_mut(tables).rows.insert(id, restored);
        }));
        Ok(removed)
    }

    /// Make every write of this scope permanent. On failure the scope is rolled back.
    pub fn commit(mut self) -> Result<(), StoreError> {
        self.tables.trip(None, WriteOp::Commit)?;
        self.journal.clear();
        self.committed = true;
        Ok(())
    }

    /// Discard every write of this scope.
    pub fn rollback(self) {}
}

impl Drop for UnitOfWork<'_> {
    fn drop(&mut self) {
        if self.committed || self.journal.is_empty() {
            return;
        }
        let writes = self.journal.len();
        while let Some(undo) = self.journal.pop() {
            undo(&mut *self.tables);
        }
        debug!(writes, "unit of work rolled back");
    }
}
