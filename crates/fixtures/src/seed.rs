//! Idempotent fixture seeding
//!
//! `ensure` looks for an existing record matching the spec's identity before
//! creating anything, so running the same seed twice leaves one record.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use rand::Rng;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, info};

use crate::client::{ApiResponse, FixtureClient, RequestOptions};
use crate::error::{FixtureError, FixtureResult};
use crate::ledger::FixtureLedger;
use crate::model::{EntityId, EntityKind, FixtureEntity, Role};

const DEFAULT_PLANT_PRICE: f64 = 100.0;
const DEFAULT_PLANT_QUANTITY: i64 = 25;
const DEFAULT_SALE_QUANTITY: i64 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NameSpec {
    Literal(String),
    /// Fresh name: prefix, optional worker tag, random digits
    Generated { generated: String },
}

impl Default for NameSpec {
    fn default() -> Self {
        NameSpec::Literal(String::new())
    }
}

impl NameSpec {
    pub fn literal(&self) -> Option<&str> {
        match self {
            NameSpec::Literal(name) => Some(name),
            NameSpec::Generated { .. } => None,
        }
    }
}

impl std::fmt::Display for NameSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NameSpec::Literal(name) => f.write_str(name),
            NameSpec::Generated { generated } => write!(f, "{generated}*"),
        }
    }
}

/// Which existing record satisfies a spec
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Identity {
    /// Same literal name, and same parent when the spec has one
    #[default]
    Name,
    /// Any plant with stock on hand
    InStock,
    /// Any root category, preferring one with the spec's literal name
    AnyRoot,
    /// Any record of the kind
    Any,
}

/// Abstract description of a fixture the scenario needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureSpec {
    pub kind: EntityKind,
    #[serde(default)]
    pub name: NameSpec,
    #[serde(default)]
    pub parent: Option<Box<FixtureSpec>>,
    #[serde(default)]
    pub identity: Identity,
    #[serde(default)]
    pub price: Option<f64>,
    /// Stock for plants, sold quantity for sales
    #[serde(default)]
    pub quantity: Option<i64>,
}

impl FixtureSpec {
    fn base(kind: EntityKind, name: NameSpec) -> Self {
        Self {
            kind,
            name,
            parent: None,
            identity: Identity::Name,
            price: None,
            quantity: None,
        }
    }

    pub fn category(name: impl Into<String>) -> Self {
        Self::base(EntityKind::Category, NameSpec::Literal(name.into()))
    }

    pub fn generated_category(prefix: impl Into<String>) -> Self {
        Self::base(EntityKind::Category, NameSpec::Generated { generated: prefix.into() })
    }

    pub fn plant(name: impl Into<String>, category: FixtureSpec) -> Self {
        Self::base(EntityKind::Plant, NameSpec::Literal(name.into())).under(category)
    }

    pub fn generated_plant(prefix: impl Into<String>, category: FixtureSpec) -> Self {
        Self::base(EntityKind::Plant, NameSpec::Generated { generated: prefix.into() }).under(category)
    }

    pub fn sale(plant: FixtureSpec, quantity: i64) -> Self {
        let mut spec = Self::base(EntityKind::Sale, NameSpec::default()).under(plant);
        spec.identity = Identity::Any;
        spec.quantity = Some(quantity);
        spec
    }

    pub fn under(mut self, parent: FixtureSpec) -> Self {
        self.parent = Some(Box::new(parent));
        self
    }

    pub fn identity(mut self, identity: Identity) -> Self {
        self.identity = identity;
        self
    }

    pub fn price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn quantity(mut self, quantity: i64) -> Self {
        self.quantity = Some(quantity);
        self
    }

    /// Human-readable label used in errors and logs
    pub fn describe(&self) -> String {
        match self.kind {
            EntityKind::Sale => match &self.parent {
                Some(plant) => format!("sale of {}", plant.describe()),
                None => "sale".to_string(),
            },
            kind => format!("{} '{}'", kind, self.name),
        }
    }

    pub fn validate(&self) -> FixtureResult<()> {
        let parent_kind = self.parent.as_ref().map(|p| p.kind);
        match self.kind {
            EntityKind::Category => {
                if parent_kind.map_or(false, |k| k != EntityKind::Category) {
                    return Err(FixtureError::InvalidSpec(format!(
                        "{}: a category's parent must be a category",
                        self.describe()
                    )));
                }
            }
            EntityKind::Plant => {
                if parent_kind != Some(EntityKind::Category) {
                    return Err(FixtureError::InvalidSpec(format!(
                        "{}: a plant needs a category parent",
                        self.describe()
                    )));
                }
            }
            EntityKind::Sale => {
                if parent_kind != Some(EntityKind::Plant) {
                    return Err(FixtureError::InvalidSpec(
                        "a sale needs a plant parent".to_string(),
                    ));
                }
            }
        }

        if self.kind != EntityKind::Sale && self.name.literal().map_or(false, |n| n.trim().is_empty()) {
            return Err(FixtureError::InvalidSpec(format!("{} spec has an empty name", self.kind)));
        }
        match (self.identity, self.kind) {
            (Identity::InStock, kind) if kind != EntityKind::Plant => {
                return Err(FixtureError::InvalidSpec(format!(
                    "{}: in_stock identity only applies to plants",
                    self.describe()
                )));
            }
            (Identity::AnyRoot, kind) if kind != EntityKind::Category => {
                return Err(FixtureError::InvalidSpec(format!(
                    "{}: any_root identity only applies to categories",
                    self.describe()
                )));
            }
            _ => {}
        }

        match &self.parent {
            Some(parent) => parent.validate(),
            None => Ok(()),
        }
    }
}

/// Unique names for fresh fixtures
#[derive(Debug, Default)]
pub struct NameGenerator {
    worker_tag: Option<String>,
    issued: Mutex<HashSet<String>>,
}

impl NameGenerator {
    pub fn new(worker_tag: Option<String>) -> Self {
        Self {
            worker_tag: worker_tag.filter(|t| !t.is_empty()),
            issued: Mutex::new(HashSet::new()),
        }
    }

    /// `prefix` + worker tag + four random digits, never repeated in this process.
    pub fn generate(&self, prefix: &str) -> String {
        let tag = self.worker_tag.as_deref().unwrap_or("");
        let mut issued = self.issued.lock();
        let mut rng = rand::thread_rng();

        for _ in 0..100 {
            let name = format!("{prefix}{tag}{}", rng.gen_range(1000..10000));
            if issued.insert(name.clone()) {
                return name;
            }
        }
        // Four digits are running out for this prefix; widen.
        loop {
            let name = format!("{prefix}{tag}{}", rng.gen_range(10_000..100_000_000u64));
            if issued.insert(name.clone()) {
                return name;
            }
        }
    }

    fn resolve(&self, name: &NameSpec) -> String {
        match name {
            NameSpec::Literal(name) => name.clone(),
            NameSpec::Generated { generated } => self.generate(generated),
        }
    }
}

/// Id of the record that owns `entity` (parent category, category of a plant,
/// plant of a sale), when the backend reported it.
fn owner_id(entity: &FixtureEntity) -> Option<EntityId> {
    let nested = |field: &str| {
        entity
            .attributes
            .get(field)
            .and_then(|v| v.get("id"))
            .and_then(|id| serde_json::from_value::<EntityId>(id.clone()).ok())
    };
    match entity.kind {
        EntityKind::Category => entity.parent_ref.clone(),
        EntityKind::Plant => nested("category"),
        EntityKind::Sale => nested("plant"),
    }
}

pub struct SeedOrchestrator {
    client: FixtureClient,
    ledger: Arc<FixtureLedger>,
    names: NameGenerator,
    page_size: u32,
}

impl SeedOrchestrator {
    pub fn new(
        client: FixtureClient,
        ledger: Arc<FixtureLedger>,
        names: NameGenerator,
        page_size: u32,
    ) -> Self {
        Self {
            client,
            ledger,
            names,
            page_size,
        }
    }

    pub fn names(&self) -> &NameGenerator {
        &self.names
    }

    /// Return a record satisfying `spec`, creating it (and its parents) if needed.
    pub async fn ensure(&self, spec: &FixtureSpec) -> FixtureResult<FixtureEntity> {
        self.ensure_lineage(spec).await.map(|(_, entity)| entity)
    }

    /// Like `ensure`, also returning the ancestors resolved on the way, root first.
    pub fn ensure_lineage<'a>(
        &'a self,
        spec: &'a FixtureSpec,
    ) -> BoxFuture<'a, FixtureResult<(Vec<FixtureEntity>, FixtureEntity)>> {
        async move {
            spec.validate()?;

            // Reuse-anything identities are checked before touching parents so a
            // hit does not leave a fresh parent chain behind.
            if spec.identity != Identity::Name {
                if let Some(found) = self.find_existing(spec, None).await? {
                    debug!(fixture = %spec.describe(), %found, "reusing existing record");
                    return Ok((Vec::new(), found));
                }
            }

            let (ancestors, parent) = match &spec.parent {
                Some(parent_spec) => {
                    let (mut ancestors, parent) = self.ensure_lineage(parent_spec).await?;
                    ancestors.push(parent.clone());
                    (ancestors, Some(parent))
                }
                None => (Vec::new(), None),
            };

            // Nameless sales have nothing to match on and are always created.
            let named = spec.name.literal().map_or(false, |n| !n.is_empty());
            if spec.identity == Identity::Name && named {
                if let Some(found) = self.find_existing(spec, parent.as_ref()).await? {
                    debug!(fixture = %spec.describe(), %found, "reusing existing record");
                    return Ok((ancestors, found));
                }
            }

            let created = self.create(spec, parent.as_ref()).await?;
            Ok((ancestors, created))
        }
        .boxed()
    }

    /// Ensure each spec in order; the first failure stops the run.
    pub async fn ensure_all(&self, specs: &[FixtureSpec]) -> FixtureResult<Vec<FixtureEntity>> {
        let mut out = Vec::with_capacity(specs.len());
        for spec in specs {
            out.push(self.ensure(spec).await?);
        }
        Ok(out)
    }

    async fn find_existing(
        &self,
        spec: &FixtureSpec,
        parent: Option<&FixtureEntity>,
    ) -> FixtureResult<Option<FixtureEntity>> {
        let candidates = self
            .client
            .list_entities(Role::Admin, spec.kind, self.page_size)
            .await
            .map_err(|e| self.seed_error(spec, e))?;
        let mut candidates: Vec<FixtureEntity> =
            candidates.into_iter().map(|c| self.ledger.mark(c)).collect();
        // Prefer what this run created.
        candidates.sort_by_key(|c| !c.created_by_suite);

        let parent_id = parent.map(|p| &p.id);
        let literal = spec.name.literal();

        let found = match spec.identity {
            Identity::Name => {
                let Some(name) = literal else {
                    return Ok(None);
                };
                candidates.into_iter().find(|c| {
                    c.name == name
                        && match c.kind {
                            EntityKind::Category => c.parent_ref.as_ref() == parent_id,
                            _ => match owner_id(c) {
                                Some(owner) => parent_id.map_or(true, |p| *p == owner),
                                None => true,
                            },
                        }
                })
            }
            Identity::InStock => candidates
                .into_iter()
                .find(|c| c.quantity().map_or(false, |q| q > 0)),
            Identity::AnyRoot => {
                let roots: Vec<FixtureEntity> = candidates.into_iter().filter(|c| c.is_root()).collect();
                let named = literal.and_then(|n| roots.iter().position(|c| c.name == n));
                match named {
                    Some(i) => roots.into_iter().nth(i),
                    None => roots.into_iter().next(),
                }
            }
            Identity::Any => candidates.into_iter().next(),
        };
        Ok(found)
    }

    async fn create(
        &self,
        spec: &FixtureSpec,
        parent: Option<&FixtureEntity>,
    ) -> FixtureResult<FixtureEntity> {
        let name = self.names.resolve(&spec.name);
        let label = match spec.kind {
            EntityKind::Sale => spec.describe(),
            kind => format!("{kind} '{name}'"),
        };

        let response = match (spec.kind, parent) {
            (EntityKind::Category, parent) => {
                let parent_ref = parent.map(|p| json!({ "id": p.id }));
                self.client
                    .post_json(Role::Admin, "/categories", json!({ "name": name, "parent": parent_ref }))
                    .await
            }
            (EntityKind::Plant, Some(category)) => {
                let body = json!({
                    "name": name,
                    "price": spec.price.unwrap_or(DEFAULT_PLANT_PRICE),
                    "quantity": spec.quantity.unwrap_or(DEFAULT_PLANT_QUANTITY),
                });
                self.client
                    .post_json(Role::Admin, &format!("/plants/category/{}", category.id), body)
                    .await
            }
            (EntityKind::Sale, Some(plant)) => {
                let options = RequestOptions::new()
                    .as_role(Role::Admin)
                    .query("quantity", spec.quantity.unwrap_or(DEFAULT_SALE_QUANTITY));
                self.client
                    .request(Method::POST, &format!("/sales/plant/{}", plant.id), options)
                    .await
            }
            (kind, None) => {
                return Err(FixtureError::InvalidSpec(format!("{kind} '{name}' has no parent to attach to")))
            }
        }
        .map_err(|e| self.seed_error(spec, e))?;

        let mut entity = self.decode_created(&label, spec.kind, response)?;
        if entity.kind == EntityKind::Sale && entity.name.is_empty() {
            if let Some(plant) = parent {
                entity.name = plant.name.clone();
            }
        }
        if entity.name.is_empty() {
            entity.name = name;
        }
        if entity.kind == EntityKind::Category && entity.parent_ref.is_none() {
            entity.parent_ref = parent.map(|p| p.id.clone());
        }

        entity.created_by_suite = true;
        self.ledger.record(&entity);
        info!("seeded {}", entity);
        Ok(entity)
    }

    fn decode_created(
        &self,
        label: &str,
        kind: EntityKind,
        response: ApiResponse,
    ) -> FixtureResult<FixtureEntity> {
        if !response.is_success() {
            error!(fixture = label, status = response.status, "seeding rejected by backend");
            return Err(FixtureError::SeedFailure {
                fixture: label.to_string(),
                status: response.status,
                body: response.text,
            });
        }
        kind.decode(response.body.clone()).map_err(|e| FixtureError::SeedFailure {
            fixture: label.to_string(),
            status: response.status,
            body: format!("unreadable create response ({e}): {}", response.text),
        })
    }

    fn seed_error(&self, spec: &FixtureSpec, err: FixtureError) -> FixtureError {
        match err {
            FixtureError::BackendRejection { status, body } => FixtureError::SeedFailure {
                fixture: spec.describe(),
                status,
                body,
            },
            other => {
                error!(fixture = %spec.describe(), "seeding failed: {}", other);
                other
            }
        }
    }
}
