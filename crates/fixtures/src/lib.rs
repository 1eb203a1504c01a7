//! Nursery fixture lifecycle manager
//!
//! This crate keeps the plant-nursery E2E suite's shared backend in a known
//! state around each scenario:
//! - Authenticates once per role and shares the token between concurrent callers
//! - Classifies remote records as test fixtures or protected seed data
//! - Deletes fixtures in an order the backend's foreign keys accept
//! - Seeds category/plant/sale hierarchies idempotently
//! - Polls eventually-consistent state (such as table sort order) with a bound
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   LifecycleCoordinator                      │
//! │    ├── before_scenario(tags) -> ScenarioFixtures            │
//! │    ├── after_scenario(tags)  -> CleanupReport               │
//! │    └── run_scenario(tags, body)                             │
//! ├──────────────────────────────┬──────────────────────────────┤
//! │  HookTable (YAML)            │  Cleaner                     │
//! │    tag -> cleanup_before     │    gather -> CleanupPlanner  │
//! │           seed actions       │           -> DELETE as admin │
//! │           cleanup_after      │  SeedOrchestrator            │
//! │                              │    ensure(FixtureSpec)       │
//! ├──────────────────────────────┴──────────────────────────────┤
//! │  FixtureClient (retry, per-role bearer auth)                │
//! │    └── AuthSessionStore (single-flight login per role)      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Poller + ConvergenceQuery (SortConvergence over a driver)  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod hooks;
pub mod ledger;
pub mod lifecycle;
pub mod model;
pub mod planner;
pub mod poller;
pub mod seed;
pub mod sort;
pub mod tagger;

pub use auth::AuthSessionStore;
pub use client::{ApiResponse, FixtureClient, RequestOptions};
pub use config::FixtureConfig;
pub use error::{FixtureError, FixtureResult};
pub use hooks::{HookBinding, HookTable, SeedAction, TagSet};
pub use ledger::FixtureLedger;
pub use lifecycle::{HookRegistry, LifecycleCoordinator, ScenarioFixtures, TagFilter};
pub use model::{EntityId, EntityKind, FixtureEntity, Role};
pub use planner::{Cleaner, CleanupPlan, CleanupPlanner, CleanupReport};
pub use poller::{ConvergenceQuery, Converged, ConvergenceTimeout, PollBounds, Poller};
pub use seed::{FixtureSpec, Identity, NameGenerator, NameSpec, SeedOrchestrator};
pub use sort::{ColumnDriver, ColumnKind, SortConvergence, SortOrder};
pub use tagger::{EntityTagger, TaggingConfig};
