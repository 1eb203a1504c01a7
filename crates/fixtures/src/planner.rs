//! Cleanup planning and execution
//!
//! Planning is pure: filter to fixtures, then order sales before plants
//! before categories, and child categories before their parents. Execution is
//! best-effort: a failed delete is logged and recorded, never raised.

use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::client::FixtureClient;
use crate::ledger::FixtureLedger;
use crate::model::{EntityId, EntityKind, FixtureEntity, Role};
use crate::tagger::EntityTagger;

/// Ordered deletions
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleanupPlan {
    pub steps: Vec<FixtureEntity>,
}

impl CleanupPlan {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.steps.iter().map(|e| e.name.as_str()).collect()
    }
}

#[derive(Debug, Clone)]
pub struct CleanupPlanner {
    tagger: EntityTagger,
}

impl CleanupPlanner {
    pub fn new(tagger: EntityTagger) -> Self {
        Self { tagger }
    }

    pub fn tagger(&self) -> &EntityTagger {
        &self.tagger
    }

    pub fn plan_deletion(&self, entities: Vec<FixtureEntity>) -> CleanupPlan {
        let mut by_kind: HashMap<EntityKind, Vec<FixtureEntity>> = HashMap::new();
        for entity in entities {
            if self.tagger.is_test_fixture(&entity) {
                by_kind.entry(entity.kind).or_default().push(entity);
            }
        }

        let mut kinds: Vec<EntityKind> = by_kind.keys().copied().collect();
        kinds.sort_by_key(|k| k.deletion_rank());

        let mut steps = Vec::new();
        for kind in kinds {
            let mut group = by_kind.remove(&kind).unwrap_or_default();
            dedup_by_id(&mut group);
            match kind {
                EntityKind::Category => steps.extend(children_first(group)),
                _ => {
                    group.sort_by(|a, b| b.id.cmp(&a.id));
                    steps.extend(group);
                }
            }
        }
        CleanupPlan { steps }
    }
}

fn dedup_by_id(group: &mut Vec<FixtureEntity>) {
    let mut seen: HashMap<EntityId, usize> = HashMap::new();
    let mut out: Vec<FixtureEntity> = Vec::with_capacity(group.len());
    for entity in group.drain(..) {
        match seen.get(&entity.id) {
            Some(&i) => {
                // Keep whichever copy knows more.
                let kept = &mut out[i];
                kept.created_by_suite |= entity.created_by_suite;
                if kept.parent_ref.is_none() {
                    kept.parent_ref = entity.parent_ref;
                }
            }
            None => {
                seen.insert(entity.id.clone(), out.len());
                out.push(entity);
            }
        }
    }
    *group = out;
}

/// Topological order over `parent_ref`, leaves first, highest id first among
/// ready nodes. Without any parent links this is plain id-descending order.
fn children_first(group: Vec<FixtureEntity>) -> Vec<FixtureEntity> {
    let index: HashMap<EntityId, usize> = group
        .iter()
        .enumerate()
        .map(|(i, e)| (e.id.clone(), i))
        .collect();

    // Pending children per node, counting only children inside the plan.
    let mut pending = vec![0usize; group.len()];
    let parent_of: Vec<Option<usize>> = group
        .iter()
        .map(|e| {
            e.parent_ref
                .as_ref()
                .and_then(|p| index.get(p).copied())
                .filter(|&p| group[p].id != e.id)
        })
        .collect();
    for parent in parent_of.iter().flatten() {
        pending[*parent] += 1;
    }

    let mut ready: BinaryHeap<(EntityId, usize)> = group
        .iter()
        .enumerate()
        .filter(|(i, _)| pending[*i] == 0)
        .map(|(i, e)| (e.id.clone(), i))
        .collect();

    let mut emitted = vec![false; group.len()];
    let mut order = Vec::with_capacity(group.len());
    while let Some((_, i)) = ready.pop() {
        emitted[i] = true;
        order.push(i);
        if let Some(p) = parent_of[i] {
            pending[p] -= 1;
            if pending[p] == 0 {
                ready.push((group[p].id.clone(), p));
            }
        }
    }

    // Anything left sits on a parent cycle.
    let mut stuck: Vec<usize> = (0..group.len()).filter(|i| !emitted[*i]).collect();
    if !stuck.is_empty() {
        warn!(count = stuck.len(), "category parent links form a cycle; deleting by id");
        stuck.sort_by(|a, b| group[*b].id.cmp(&group[*a].id));
        order.extend(stuck);
    }

    let mut slots: Vec<Option<FixtureEntity>> = group.into_iter().map(Some).collect();
    order.into_iter().filter_map(|i| slots[i].take()).collect()
}

/// Why a single deletion did not go through
#[derive(Debug, Clone, Serialize)]
pub struct CleanupFailure {
    pub entity: FixtureEntity,
    pub status: Option<u16>,
    pub reason: String,
}

impl std::fmt::Display for CleanupFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (status {}): {}", self.entity, status, self.reason),
            None => write!(f, "{}: {}", self.entity, self.reason),
        }
    }
}

/// Outcome of executing a plan or a sweep
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    pub deleted: Vec<FixtureEntity>,
    /// 404: someone else got there first
    pub already_gone: Vec<FixtureEntity>,
    /// 409: still referenced, left in place
    pub blocked: Vec<FixtureEntity>,
    pub failed: Vec<CleanupFailure>,
    /// Listing or auth problems that narrowed the sweep
    pub warnings: Vec<String>,
}

impl CleanupReport {
    pub fn merge(&mut self, other: CleanupReport) {
        self.deleted.extend(other.deleted);
        self.already_gone.extend(other.already_gone);
        self.blocked.extend(other.blocked);
        self.failed.extend(other.failed);
        self.warnings.extend(other.warnings);
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.warnings.is_empty()
    }

    pub fn attempted(&self) -> usize {
        self.deleted.len() + self.already_gone.len() + self.blocked.len() + self.failed.len()
    }
}

/// Runs plans against the backend
#[derive(Debug, Clone)]
pub struct Cleaner {
    client: FixtureClient,
    planner: CleanupPlanner,
    ledger: Arc<FixtureLedger>,
    page_size: u32,
    settle_delay: Duration,
}

impl Cleaner {
    pub fn new(
        client: FixtureClient,
        planner: CleanupPlanner,
        ledger: Arc<FixtureLedger>,
        page_size: u32,
        settle_delay: Duration,
    ) -> Self {
        Self {
            client,
            planner,
            ledger,
            page_size,
            settle_delay,
        }
    }

    pub fn planner(&self) -> &CleanupPlanner {
        &self.planner
    }

    /// Delete each planned entity as admin; never stops early.
    pub async fn execute(&self, plan: &CleanupPlan) -> CleanupReport {
        let mut report = CleanupReport::default();

        for entity in &plan.steps {
            let path = entity.kind.item_path(&entity.id);
            match self.client.delete(Role::Admin, &path).await {
                Ok(response) if response.is_success() => {
                    debug!(%entity, "deleted");
                    self.ledger.forget(entity.kind, &entity.id);
                    report.deleted.push(entity.clone());
                }
                Ok(response) if response.is_not_found() => {
                    debug!(%entity, "already gone");
                    self.ledger.forget(entity.kind, &entity.id);
                    report.already_gone.push(entity.clone());
                }
                Ok(response) if response.is_conflict() => {
                    debug!(%entity, "still referenced, skipping");
                    report.blocked.push(entity.clone());
                }
                Ok(response) => {
                    let failure = CleanupFailure {
                        entity: entity.clone(),
                        status: Some(response.status),
                        reason: response.text,
                    };
                    warn!("cleanup failed for {}", failure);
                    report.failed.push(failure);
                }
                Err(e) => {
                    let failure = CleanupFailure {
                        entity: entity.clone(),
                        status: None,
                        reason: e.to_string(),
                    };
                    warn!("cleanup failed for {}", failure);
                    report.failed.push(failure);
                }
            }
        }

        report
    }

    /// Remote records plus ledger entries for `kinds`, marked and deduplicated.
    async fn gather(&self, kinds: &[EntityKind], report: &mut CleanupReport) -> Vec<FixtureEntity> {
        let mut kinds = kinds.to_vec();
        kinds.sort_by_key(|k| k.deletion_rank());
        kinds.dedup();

        let mut entities = Vec::new();
        for kind in kinds {
            match self.client.list_entities(Role::Admin, kind, self.page_size).await {
                Ok(listed) => {
                    debug!(%kind, count = listed.len(), "listed for cleanup");
                    entities.extend(listed.into_iter().map(|e| self.ledger.mark(e)));
                }
                Err(e) => {
                    let message = format!("could not list {kind} records: {e}");
                    warn!("{}", message);
                    report.warnings.push(message);
                }
            }
            entities.extend(self.ledger.of_kind(kind));
        }
        entities
    }

    /// Plan for `kinds` without deleting anything.
    pub async fn preview(&self, kinds: &[EntityKind]) -> (CleanupPlan, CleanupReport) {
        let mut report = CleanupReport::default();
        let entities = self.gather(kinds, &mut report).await;
        (self.planner.plan_deletion(entities), report)
    }

    /// List, plan and delete every fixture of the given kinds.
    pub async fn sweep(&self, kinds: &[EntityKind]) -> CleanupReport {
        if kinds.is_empty() {
            return CleanupReport::default();
        }
        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }

        let (plan, mut report) = self.preview(kinds).await;
        if plan.is_empty() {
            debug!(?kinds, "nothing to clean up");
            return report;
        }

        info!(?kinds, count = plan.len(), "cleaning up test fixtures");
        report.merge(self.execute(&plan).await);
        info!(
            deleted = report.deleted.len(),
            already_gone = report.already_gone.len(),
            blocked = report.blocked.len(),
            failed = report.failed.len(),
            "cleanup finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tagger::TaggingConfig;
    use EntityKind::{Category, Plant, Sale};

    fn planner() -> CleanupPlanner {
        CleanupPlanner::new(EntityTagger::new(&TaggingConfig::default()).unwrap())
    }

    #[test]
    fn child_category_goes_before_parent() {
        let parent = FixtureEntity::new(Category, 40, "API_Parent");
        let child = FixtureEntity::new(Category, 41, "API_Child").with_parent(40);

        let plan = planner().plan_deletion(vec![parent.clone(), child.clone()]);
        assert_eq!(plan.names(), vec!["API_Child", "API_Parent"]);

        // Parent created after the child (higher id) still goes last.
        let late_parent = FixtureEntity::new(Category, 90, "API_Parent");
        let early_child = FixtureEntity::new(Category, 12, "API_Child").with_parent(90);
        let plan = planner().plan_deletion(vec![late_parent, early_child]);
        assert_eq!(plan.names(), vec!["API_Child", "API_Parent"]);
    }

    #[test]
    fn deep_tree_is_leaves_first() {
        let a = FixtureEntity::new(Category, 1, "sort_A");
        let b = FixtureEntity::new(Category, 50, "sort_B").with_parent(1);
        let c = FixtureEntity::new(Category, 7, "sort_C").with_parent(50);
        let d = FixtureEntity::new(Category, 30, "sort_D");

        let plan = planner().plan_deletion(vec![a, b, c, d]);
        let names = plan.names();
        let pos = |n: &str| names.iter().position(|x| *x == n).unwrap();
        assert!(pos("sort_C") < pos("sort_B"));
        assert!(pos("sort_B") < pos("sort_A"));
        assert_eq!(names.len(), 4);
    }

    #[test]
    fn without_links_order_is_id_descending() {
        let plan = planner().plan_deletion(vec![
            FixtureEntity::new(Category, 3, "plants_01"),
            FixtureEntity::new(Category, 9, "plants_02"),
            FixtureEntity::new(Category, 5, "plants_03"),
        ]);
        assert_eq!(plan.names(), vec!["plants_02", "plants_03", "plants_01"]);
    }

    #[test]
    fn kinds_are_ordered_sales_plants_categories() {
        let plan = planner().plan_deletion(vec![
            FixtureEntity::new(Category, 2, "API_Cat"),
            FixtureEntity::new(Plant, 3, "API_Plant_1"),
            FixtureEntity::new(Sale, 4, "API_Plant_1"),
        ]);
        let kinds: Vec<EntityKind> = plan.steps.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![Sale, Plant, Category]);
    }

    #[test]
    fn non_fixtures_are_filtered_out() {
        let plan = planner().plan_deletion(vec![
            FixtureEntity::new(Category, 2, "Flowers"),
            FixtureEntity::new(Category, 3, "Herbs"),
            FixtureEntity::new(Plant, 3, "Rose"),
        ]);
        assert_eq!(plan.names(), vec!["Herbs"]);
    }

    #[test]
    fn cycles_terminate() {
        let a = FixtureEntity::new(Category, 1, "sort_A").with_parent(2);
        let b = FixtureEntity::new(Category, 2, "sort_B").with_parent(1);
        let leaf = FixtureEntity::new(Category, 3, "sort_C");
        let plan = planner().plan_deletion(vec![a, b, leaf]);
        assert_eq!(plan.names(), vec!["sort_C", "sort_B", "sort_A"]);
    }

    #[test]
    fn duplicates_from_listing_and_ledger_merge() {
        let listed = FixtureEntity::new(Plant, 8, "Rose");
        let recorded = FixtureEntity::new(Plant, 8, "Rose").created();
        let plan = planner().plan_deletion(vec![listed, recorded]);
        assert_eq!(plan.len(), 1);
        assert!(plan.steps[0].created_by_suite);
    }
}
