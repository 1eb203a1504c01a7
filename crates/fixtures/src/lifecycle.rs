//! Scenario lifecycle: cleanup and seeding around each scenario
//!
//! For the tags of a scenario the coordinator sweeps every `cleanup_before`
//! kind in a single pass, then runs the bound seed actions in table order.
//! After the scenario it sweeps the `cleanup_after` kinds together with
//! whatever this process created, and never fails doing so.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::auth::AuthSessionStore;
use crate::client::FixtureClient;
use crate::config::FixtureConfig;
use crate::error::FixtureResult;
use crate::hooks::{HookTable, TagSet};
use crate::ledger::FixtureLedger;
use crate::model::{EntityId, EntityKind, FixtureEntity};
use crate::planner::{Cleaner, CleanupPlanner, CleanupReport};
use crate::seed::{NameGenerator, SeedOrchestrator};
use crate::tagger::EntityTagger;

/// Entities seeded for one scenario, reachable by alias or name.
#[derive(Debug, Clone, Default)]
pub struct ScenarioFixtures {
    entities: Vec<FixtureEntity>,
    aliases: HashMap<String, usize>,
    created: HashSet<(EntityKind, EntityId)>,
}

impl ScenarioFixtures {
    /// Add `entity` unless already present; the alias points at the single copy.
    pub fn insert(&mut self, alias: Option<String>, entity: FixtureEntity) {
        let index = match self.entities.iter().position(|e| e.key() == entity.key()) {
            Some(index) => index,
            None => {
                self.entities.push(entity);
                self.entities.len() - 1
            }
        };
        if let Some(alias) = alias {
            self.aliases.insert(alias, index);
        }
    }

    /// Look up by alias first, then by the latest entity with that name.
    pub fn get(&self, key: &str) -> Option<&FixtureEntity> {
        match self.aliases.get(key) {
            Some(&index) => self.entities.get(index),
            None => self.entities.iter().rev().find(|e| e.name == key),
        }
    }

    /// Whether the entity under `key` was created for this scenario rather
    /// than found on the backend.
    pub fn was_created(&self, key: &str) -> bool {
        self.get(key).map_or(false, |e| self.created.contains(&e.key()))
    }

    fn note_created(&mut self, entity: &FixtureEntity) {
        self.created.insert(entity.key());
    }

    pub fn entities(&self) -> &[FixtureEntity] {
        &self.entities
    }

    pub fn of_kind(&self, kind: EntityKind) -> impl Iterator<Item = &FixtureEntity> {
        self.entities.iter().filter(move |e| e.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

pub struct LifecycleCoordinator {
    client: FixtureClient,
    cleaner: Cleaner,
    seeder: SeedOrchestrator,
    hooks: HookTable,
    ledger: Arc<FixtureLedger>,
}

impl LifecycleCoordinator {
    /// Wire up client, cleaner and seeder sharing one session store and ledger.
    pub fn from_config(config: &FixtureConfig) -> FixtureResult<Self> {
        config.validate()?;

        let sessions = Arc::new(AuthSessionStore::new());
        let client = FixtureClient::new(config, sessions)?;
        let ledger = Arc::new(FixtureLedger::new());

        let planner = CleanupPlanner::new(EntityTagger::new(&config.tagging)?);
        let cleaner = Cleaner::new(
            client.clone(),
            planner,
            ledger.clone(),
            config.cleanup.page_size,
            Duration::from_millis(config.cleanup.settle_delay_ms),
        );
        let seeder = SeedOrchestrator::new(
            client.clone(),
            ledger.clone(),
            NameGenerator::new(config.seeding.worker_tag.clone()),
            config.cleanup.page_size,
        );

        let hooks = match &config.hooks_file {
            Some(path) => HookTable::load(path)?,
            None => HookTable::builtin()?,
        };

        Ok(Self {
            client,
            cleaner,
            seeder,
            hooks,
            ledger,
        })
    }

    pub fn with_hooks(mut self, hooks: HookTable) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn client(&self) -> &FixtureClient {
        &self.client
    }

    pub fn cleaner(&self) -> &Cleaner {
        &self.cleaner
    }

    pub fn seeder(&self) -> &SeedOrchestrator {
        &self.seeder
    }

    pub fn hooks(&self) -> &HookTable {
        &self.hooks
    }

    pub fn ledger(&self) -> &Arc<FixtureLedger> {
        &self.ledger
    }

    /// Sweep, then seed, for the bindings matching `tags`.
    pub async fn before_scenario(&self, tags: &TagSet) -> FixtureResult<ScenarioFixtures> {
        let mut sweep_kinds: Vec<EntityKind> = Vec::new();
        for binding in self.hooks.bindings_for(tags) {
            for kind in &binding.cleanup_before {
                if !sweep_kinds.contains(kind) {
                    sweep_kinds.push(*kind);
                }
            }
        }

        if !sweep_kinds.is_empty() {
            let report = self.cleaner.sweep(&sweep_kinds).await;
            if !report.is_clean() {
                warn!(
                    failed = report.failed.len(),
                    warnings = report.warnings.len(),
                    "pre-scenario cleanup incomplete"
                );
            }
        }

        let mut fixtures = ScenarioFixtures::default();
        for binding in self.hooks.bindings_for(tags) {
            for action in &binding.seed {
                if let Some(alias) = action.condition() {
                    if !fixtures.was_created(alias) {
                        debug!(tag = %binding.tag, alias, "dependency already existed, skipping seed");
                        continue;
                    }
                }
                for (alias, spec) in action.expand() {
                    let known: Vec<EntityId> =
                        self.ledger.of_kind(spec.kind).into_iter().map(|e| e.id).collect();
                    let (ancestors, entity) = self.seeder.ensure_lineage(&spec).await?;
                    for ancestor in ancestors {
                        fixtures.insert(None, ancestor);
                    }
                    if entity.created_by_suite && !known.contains(&entity.id) {
                        fixtures.note_created(&entity);
                    }
                    fixtures.insert(alias, entity);
                }
            }
        }

        if !fixtures.is_empty() {
            info!(%tags, seeded = fixtures.len(), "fixtures ready");
        }
        Ok(fixtures)
    }

    /// Sweep the `cleanup_after` kinds plus every kind this process created.
    pub async fn after_scenario(&self, tags: &TagSet) -> CleanupReport {
        let mut kinds: Vec<EntityKind> = self
            .hooks
            .bindings_for(tags)
            .flat_map(|b| b.cleanup_after.iter().copied())
            .collect();
        kinds.extend(self.ledger.kinds());
        kinds.sort();
        kinds.dedup();

        let report = self.cleaner.sweep(&kinds).await;
        for failure in &report.failed {
            warn!("left behind: {}", failure);
        }
        report
    }

    /// Run `body` between the before and after hooks of `tags`.
    ///
    /// The after hook runs even if seeding fails or `body` panics; a panic is
    /// resumed once cleanup is done.
    pub async fn run_scenario<F, Fut, T>(&self, tags: &TagSet, body: F) -> FixtureResult<T>
    where
        F: FnOnce(ScenarioFixtures) -> Fut,
        Fut: Future<Output = T>,
    {
        let run_id = Uuid::new_v4();
        let span = info_span!("scenario", %run_id, %tags);

        async move {
            let outcome = match self.before_scenario(tags).await {
                Ok(fixtures) => AssertUnwindSafe(async move { body(fixtures).await })
                    .catch_unwind()
                    .await
                    .map(Ok),
                Err(e) => Ok(Err(e)),
            };

            let report = self.after_scenario(tags).await;
            info!(
                deleted = report.deleted.len(),
                failed = report.failed.len(),
                "scenario finished"
            );

            match outcome {
                Ok(result) => result,
                Err(panic) => std::panic::resume_unwind(panic),
            }
        }
        .instrument(span)
        .await
    }

    /// Install one dispatching before hook and one after hook on `registry`.
    pub fn register(self: Arc<Self>, registry: &mut dyn HookRegistry) {
        let before = self.clone();
        registry.register_before(
            TagFilter::Any,
            Arc::new(move |tags: TagSet| {
                let coordinator = before.clone();
                async move { coordinator.before_scenario(&tags).await }.boxed()
            }),
        );

        let after = self;
        registry.register_after(
            TagFilter::Any,
            Arc::new(move |tags: TagSet| {
                let coordinator = after.clone();
                async move { coordinator.after_scenario(&tags).await }.boxed()
            }),
        );
    }
}

impl std::fmt::Debug for LifecycleCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleCoordinator")
            .field("client", &self.client)
            .field("hooks", &self.hooks.len())
            .field("ledger", &self.ledger.len())
            .finish()
    }
}

/// Which scenarios a host hook fires for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagFilter {
    Any,
    Tag(String),
}

impl TagFilter {
    pub fn matches(&self, tags: &TagSet) -> bool {
        match self {
            TagFilter::Any => true,
            TagFilter::Tag(tag) => tags.contains(tag),
        }
    }
}

pub type BeforeHook = Arc<dyn Fn(TagSet) -> BoxFuture<'static, FixtureResult<ScenarioFixtures>> + Send + Sync>;
pub type AfterHook = Arc<dyn Fn(TagSet) -> BoxFuture<'static, CleanupReport> + Send + Sync>;

/// The test host's hook registration surface.
pub trait HookRegistry {
    fn register_before(&mut self, filter: TagFilter, hook: BeforeHook);
    fn register_after(&mut self, filter: TagFilter, hook: AfterHook);
}
