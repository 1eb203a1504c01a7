//! In-memory record of entities this process created

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::model::{EntityId, EntityKind, FixtureEntity};

/// Shared between the seeder and the cleaner so cleanup can target exactly
/// what the suite created, not only what matches a naming rule.
#[derive(Debug, Default)]
pub struct FixtureLedger {
    entries: Mutex<HashMap<(EntityKind, EntityId), FixtureEntity>>,
}

impl FixtureLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entity: &FixtureEntity) {
        let mut entity = entity.clone();
        entity.created_by_suite = true;
        self.entries.lock().insert(entity.key(), entity);
    }

    pub fn contains(&self, kind: EntityKind, id: &EntityId) -> bool {
        self.entries.lock().contains_key(&(kind, id.clone()))
    }

    pub fn forget(&self, kind: EntityKind, id: &EntityId) {
        self.entries.lock().remove(&(kind, id.clone()));
    }

    /// Entries of one kind, highest id first.
    pub fn of_kind(&self, kind: EntityKind) -> Vec<FixtureEntity> {
        let mut out: Vec<FixtureEntity> = self
            .entries
            .lock()
            .values()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.id.cmp(&a.id));
        out
    }

    pub fn kinds(&self) -> Vec<EntityKind> {
        let mut kinds: Vec<EntityKind> = self.entries.lock().keys().map(|(k, _)| *k).collect();
        kinds.sort();
        kinds.dedup();
        kinds
    }

    /// Flag `entity` as suite-created when the ledger knows it.
    pub fn mark(&self, mut entity: FixtureEntity) -> FixtureEntity {
        if self.contains(entity.kind, &entity.id) {
            entity.created_by_suite = true;
        }
        entity
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
