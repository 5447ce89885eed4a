//! One-shot write failures for exercising rollback paths.

use super::{StoreError, WriteOp};
use crate::model::Entity;

/// Fails the first write matching `entity` and `op` once `skip` matches have passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Fault {
    entity: Option<Entity>,
    op: WriteOp,
    skip: usize,
}

impl Fault {
    pub(crate) fn on(entity: Entity, op: WriteOp) -> Self {
        Self {
            entity: Some(entity),
            op,
            skip: 0,
        }
    }

    pub(crate) fn on_commit() -> Self {
        Self {
            entity: None,
            op: WriteOp::Commit,
            skip: 0,
        }
    }

    /// Let the first `skip` matching writes succeed.
    pub(crate) fn after(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }
}

#[derive(Debug, Default)]
pub(crate) struct Faults {
    armed: Option<Fault>,
}

impl Faults {
    pub(super) fn arm(&mut self, fault: Fault) {
        self.armed = Some(fault);
    }

    pub(super) fn trip(&mut self, entity: Option<Entity>, op: WriteOp) -> Result<(), StoreError> {
        let Some(fault) = self.armed.as_mut() else {
            return Ok(());
        };
        if fault.entity != entity || fault.op != op {
            return Ok(());
        }
        if fault.skip > 0 {
            fault.skip -= 1;
            return Ok(());
        }
        self.armed = None;
        Err(StoreError::Injected { op })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_once_after_skipping() {
        let mut faults = Faults::default();
        faults.arm(Fault::on(Entity::Client, WriteOp::Update).after(1));

        assert!(faults.trip(Some(Entity::Client), WriteOp::Insert).is_ok());
        assert!(faults.trip(Some(Entity::Client), WriteOp::Update).is_ok());
        assert!(faults.trip(Some(Entity::Client), WriteOp::Update).is_err());
        assert!(faults.trip(Some(Entity::Client), WriteOp::Update).is_ok());
    }

    #[test]
    fn unarmed_never_trips() {
        let mut faults = Faults::default();
        assert!(faults.trip(None, WriteOp::Commit).is_ok());
    }
}
