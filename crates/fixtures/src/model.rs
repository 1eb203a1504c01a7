//! Fixture entities and the backend's wire records

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{FixtureError, FixtureResult};

/// Backend role a request is made as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    #[serde(alias = "user")]
    StandardUser,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => f.write_str("admin"),
            Role::StandardUser => f.write_str("user"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = FixtureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "user" | "standard_user" | "standard" => Ok(Role::StandardUser),
            other => Err(FixtureError::InvalidSpec(format!("unknown role: {other}"))),
        }
    }
}

/// Identifier assigned by the backend. Integers sort before strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    Int(i64),
    Str(String),
}

impl EntityId {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            EntityId::Int(n) => Some(*n),
            EntityId::Str(s) => s.parse().ok(),
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Int(n) => write!(f, "{n}"),
            EntityId::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for EntityId {
    fn from(n: i64) -> Self {
        EntityId::Int(n)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        EntityId::Str(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Category,
    Plant,
    Sale,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [EntityKind::Category, EntityKind::Plant, EntityKind::Sale];

    /// Position in a cleanup run: dependents go first.
    pub fn deletion_rank(self) -> u8 {
        match self {
            EntityKind::Sale => 0,
            EntityKind::Plant => 1,
            EntityKind::Category => 2,
        }
    }

    /// Collection path used for `DELETE {collection}/{id}`.
    pub fn collection(self) -> &'static str {
        match self {
            EntityKind::Category => "/categories",
            EntityKind::Plant => "/plants",
            EntityKind::Sale => "/sales",
        }
    }

    /// Path of the listing endpoint read during sweeps and seeding.
    pub fn listing_path(self) -> &'static str {
        match self {
            EntityKind::Category => "/categories/page",
            EntityKind::Plant => "/plants",
            EntityKind::Sale => "/sales",
        }
    }

    pub fn item_path(self, id: &EntityId) -> String {
        format!("{}/{}", self.collection(), id)
    }

    /// Decode one record of this kind from a JSON value.
    pub fn decode(self, value: serde_json::Value) -> FixtureResult<FixtureEntity> {
        let entity = match self {
            EntityKind::Category => {
                let record: CategoryRecord = serde_json::from_value(value.clone())?;
                record.into_entity(value)
            }
            EntityKind::Plant => {
                let record: PlantRecord = serde_json::from_value(value.clone())?;
                record.into_entity(value)
            }
            EntityKind::Sale => {
                let record: SaleRecord = serde_json::from_value(value.clone())?;
                record.into_entity(value)
            }
        };
        Ok(entity)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Category => f.write_str("category"),
            EntityKind::Plant => f.write_str("plant"),
            EntityKind::Sale => f.write_str("sale"),
        }
    }
}

impl std::str::FromStr for EntityKind {
    type Err = FixtureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "category" | "categories" => Ok(EntityKind::Category),
            "plant" | "plants" => Ok(EntityKind::Plant),
            "sale" | "sales" => Ok(EntityKind::Sale),
            other => Err(FixtureError::InvalidSpec(format!("unknown entity kind: {other}"))),
        }
    }
}

/// A remote record created or observed during a test run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureEntity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub name: String,
    /// Parent of the same kind (categories only).
    pub parent_ref: Option<EntityId>,
    /// True when this process created the record.
    pub created_by_suite: bool,
    /// Raw record as returned by the backend.
    #[serde(default)]
    pub attributes: serde_json::Value,
}

impl FixtureEntity {
    pub fn new(kind: EntityKind, id: impl Into<EntityId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            name: name.into(),
            parent_ref: None,
            created_by_suite: false,
            attributes: serde_json::Value::Null,
        }
    }

    pub fn with_parent(mut self, parent: impl Into<EntityId>) -> Self {
        self.parent_ref = Some(parent.into());
        self
    }

    pub fn created(mut self) -> Self {
        self.created_by_suite = true;
        self
    }

    /// Ledger key.
    pub fn key(&self) -> (EntityKind, EntityId) {
        (self.kind, self.id.clone())
    }

    pub fn quantity(&self) -> Option<i64> {
        self.attributes.get("quantity").and_then(|q| q.as_i64())
    }

    pub fn is_root(&self) -> bool {
        self.parent_ref.is_none()
    }
}

impl fmt::Display for FixtureEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} #{} '{}'", self.kind, self.id, self.name)
    }
}

/// Reference to another record, as nested in backend JSON (`{"id": 3, ...}`).
#[derive(Debug, Clone, Deserialize)]
pub struct RecordRef {
    pub id: EntityId,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRecord {
    pub id: EntityId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub parent: Option<RecordRef>,
    #[serde(default)]
    pub parent_id: Option<EntityId>,
}

impl CategoryRecord {
    fn into_entity(self, raw: serde_json::Value) -> FixtureEntity {
        let parent_ref = self.parent.map(|p| p.id).or(self.parent_id);
        FixtureEntity {
            id: self.id,
            kind: EntityKind::Category,
            name: self.name,
            parent_ref,
            created_by_suite: false,
            attributes: raw,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlantRecord {
    pub id: EntityId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub category: Option<RecordRef>,
}

impl PlantRecord {
    fn into_entity(self, raw: serde_json::Value) -> FixtureEntity {
        FixtureEntity {
            id: self.id,
            kind: EntityKind::Plant,
            name: self.name,
            parent_ref: None,
            created_by_suite: false,
            attributes: raw,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SaleRecord {
    pub id: EntityId,
    #[serde(default)]
    pub plant: Option<RecordRef>,
    #[serde(default)]
    pub quantity: Option<i64>,
}

impl SaleRecord {
    fn into_entity(self, raw: serde_json::Value) -> FixtureEntity {
        // Sales are named after the plant they sold.
        let name = self.plant.and_then(|p| p.name).unwrap_or_default();
        FixtureEntity {
            id: self.id,
            kind: EntityKind::Sale,
            name,
            parent_ref: None,
            created_by_suite: false,
            attributes: raw,
        }
    }
}

/// A list endpoint body: either a page object or a bare array.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Listing<T> {
    Paged(Page<T>),
    Bare(Vec<T>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    #[serde(default)]
    pub total_elements: Option<u64>,
    #[serde(default)]
    pub total_pages: Option<u64>,
}

impl<T> Listing<T> {
    pub fn into_items(self) -> Vec<T> {
        match self {
            Listing::Paged(page) => page.content,
            Listing::Bare(items) => items,
        }
    }
}

impl<T: DeserializeOwned> Listing<T> {
    /// Parse a listing body and flatten it to its items.
    pub fn items_from_value(value: serde_json::Value) -> FixtureResult<Vec<T>> {
        let listing: Listing<T> = serde_json::from_value(value)?;
        Ok(listing.into_items())
    }
}
