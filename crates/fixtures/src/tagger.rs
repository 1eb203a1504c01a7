//! Classifying remote records as test fixtures
//!
//! A record is a fixture when this process created it or when its name
//! matches one of the configured rules. Records whose integer id is below the
//! protected threshold are reference data and are never fixtures.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{FixtureError, FixtureResult};
use crate::model::{EntityKind, FixtureEntity};

/// How a rule matches a record name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameRule {
    Prefix(String),
    Suffix(String),
    /// Deny-list of exact names
    Exact(Vec<String>),
    /// Regular expression, matched anywhere unless anchored
    Pattern(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagRule {
    /// Kinds the rule applies to; empty means every kind
    #[serde(default)]
    pub kinds: Vec<EntityKind>,
    #[serde(flatten)]
    pub rule: NameRule,
}

impl TagRule {
    pub fn new(kinds: &[EntityKind], rule: NameRule) -> Self {
        Self {
            kinds: kinds.to_vec(),
            rule,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaggingConfig {
    /// Integer ids below this value are never classified as fixtures
    pub protected_id_threshold: i64,

    pub rules: Vec<TagRule>,
}

impl Default for TaggingConfig {
    fn default() -> Self {
        use EntityKind::{Category, Plant, Sale};
        let exact = |names: &[&str]| NameRule::Exact(names.iter().map(|n| n.to_string()).collect());
        let prefix = |p: &str| NameRule::Prefix(p.to_string());

        let mut seeded_plants = vec!["Aloevera".to_string(), "Low Stock Plant".to_string()];
        seeded_plants.extend((1..=10).map(|n| format!("Plant {n}")));

        Self {
            protected_id_threshold: 0,
            rules: vec![
                TagRule::new(
                    &[Category],
                    exact(&[
                        "Chives", "Rue", "Vegetables", "Blueberries", "plants", "Temp", "Herbs",
                        "TestRoot", "Testsub",
                    ]),
                ),
                TagRule::new(&[Category], prefix("plants_")),
                TagRule::new(&[Category], prefix("sort_")),
                TagRule::new(&[Category], prefix("S_Par")),
                TagRule::new(&[Category], prefix("S_Sub")),
                TagRule::new(&[Category], NameRule::Pattern(r"^\d+$".to_string())),
                TagRule::new(&[Category, Plant, Sale], prefix("API_")),
                TagRule::new(&[Plant, Sale], prefix("S_Plt")),
                TagRule::new(&[Plant], NameRule::Exact(seeded_plants)),
            ],
        }
    }
}

#[derive(Debug, Clone)]
enum Matcher {
    Prefix(String),
    Suffix(String),
    Exact(Vec<String>),
    Pattern(Regex),
}

impl Matcher {
    fn matches(&self, name: &str) -> bool {
        match self {
            Matcher::Prefix(p) => name.starts_with(p.as_str()),
            Matcher::Suffix(s) => name.ends_with(s.as_str()),
            Matcher::Exact(names) => names.iter().any(|n| n == name),
            Matcher::Pattern(re) => re.is_match(name),
        }
    }
}

#[derive(Debug, Clone)]
struct CompiledRule {
    kinds: Vec<EntityKind>,
    matcher: Matcher,
}

/// Pure fixture classifier
#[derive(Debug, Clone)]
pub struct EntityTagger {
    protected_id_threshold: i64,
    rules: Vec<CompiledRule>,
}

impl EntityTagger {
    pub fn new(config: &TaggingConfig) -> FixtureResult<Self> {
        let rules = config
            .rules
            .iter()
            .map(|r| {
                let matcher = match &r.rule {
                    NameRule::Prefix(p) => Matcher::Prefix(p.clone()),
                    NameRule::Suffix(s) => Matcher::Suffix(s.clone()),
                    NameRule::Exact(names) => Matcher::Exact(names.clone()),
                    NameRule::Pattern(p) => Matcher::Pattern(Regex::new(p).map_err(|e| {
                        FixtureError::Config(format!("invalid tagging pattern '{p}': {e}"))
                    })?),
                };
                Ok(CompiledRule {
                    kinds: r.kinds.clone(),
                    matcher,
                })
            })
            .collect::<FixtureResult<Vec<_>>>()?;

        Ok(Self {
            protected_id_threshold: config.protected_id_threshold,
            rules,
        })
    }

    /// Seed data shipped with the backend, never eligible for deletion.
    pub fn is_protected(&self, entity: &FixtureEntity) -> bool {
        entity
            .id
            .as_int()
            .map_or(false, |id| id < self.protected_id_threshold)
    }

    pub fn matches_name(&self, entity: &FixtureEntity) -> bool {
        self.rules.iter().any(|rule| {
            (rule.kinds.is_empty() || rule.kinds.contains(&entity.kind))
                && rule.matcher.matches(&entity.name)
        })
    }

    pub fn is_test_fixture(&self, entity: &FixtureEntity) -> bool {
        if self.is_protected(entity) {
            return false;
        }
        entity.created_by_suite || self.matches_name(entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntityKind::{Category, Plant, Sale};

    fn tagger() -> EntityTagger {
        EntityTagger::new(&TaggingConfig::default()).unwrap()
    }

    #[test]
    fn default_rules_cover_known_fixture_names() {
        let t = tagger();
        for name in ["Herbs", "plants_07", "sort_Parent_A", "API_Parent", "48213", "S_Sub12"] {
            assert!(
                t.is_test_fixture(&FixtureEntity::new(Category, 100, name)),
                "{name} should be a fixture"
            );
        }
        assert!(t.is_test_fixture(&FixtureEntity::new(Plant, 100, "API_Plant_1234")));
        assert!(t.is_test_fixture(&FixtureEntity::new(Plant, 100, "Plant 10")));
        assert!(t.is_test_fixture(&FixtureEntity::new(Sale, 100, "S_Plt412")));
    }

    #[test]
    fn ordinary_records_are_left_alone() {
        let t = tagger();
        assert!(!t.is_test_fixture(&FixtureEntity::new(Category, 100, "Flowers")));
        assert!(!t.is_test_fixture(&FixtureEntity::new(Plant, 100, "Rose")));
        // Category-only rules do not leak onto plants.
        assert!(!t.is_test_fixture(&FixtureEntity::new(Plant, 100, "Herbs")));
        assert!(!t.is_test_fixture(&FixtureEntity::new(Plant, 100, "12345")));
    }

    #[test]
    fn suite_created_records_are_fixtures_without_a_name_match() {
        let t = tagger();
        let created = FixtureEntity::new(Sale, 55, "Rose").created();
        assert!(t.is_test_fixture(&created));
    }

    #[test]
    fn protected_ids_override_everything() {
        let config = TaggingConfig {
            protected_id_threshold: 10,
            ..TaggingConfig::default()
        };
        let t = EntityTagger::new(&config).unwrap();

        assert!(!t.is_test_fixture(&FixtureEntity::new(Category, 3, "Herbs")));
        assert!(!t.is_test_fixture(&FixtureEntity::new(Category, 9, "API_X").created()));
        assert!(t.is_test_fixture(&FixtureEntity::new(Category, 10, "Herbs")));
        // String ids that are not numeric cannot be compared and are not protected.
        assert!(t.is_test_fixture(&FixtureEntity::new(Category, "abc", "Herbs")));
    }

    #[test]
    fn suffix_and_pattern_rules() {
        let config = TaggingConfig {
            protected_id_threshold: 0,
            rules: vec![
                TagRule::new(&[], NameRule::Suffix("_tmp".to_string())),
                TagRule::new(&[Plant], NameRule::Pattern("^Gh[0-9]{4}$".to_string())),
            ],
        };
        let t = EntityTagger::new(&config).unwrap();
        assert!(t.is_test_fixture(&FixtureEntity::new(Category, 1, "roses_tmp")));
        assert!(t.is_test_fixture(&FixtureEntity::new(Plant, 1, "Gh1234")));
        assert!(!t.is_test_fixture(&FixtureEntity::new(Category, 1, "Gh1234")));
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let config = TaggingConfig {
            protected_id_threshold: 0,
            rules: vec![TagRule::new(&[], NameRule::Pattern("(".to_string()))],
        };
        assert!(matches!(EntityTagger::new(&config), Err(FixtureError::Config(_))));
    }

    #[test]
    fn rules_deserialize_from_toml() {
        let config: TaggingConfig = toml::from_str(
            r#"
protected_id_threshold = 5

[[rules]]
kinds = ["category"]
prefix = "e2e_"

[[rules]]
exact = ["Temp", "Scratch"]
"#,
        )
        .unwrap();
        assert_eq!(config.rules.len(), 2);
        assert_eq!(config.rules[0].rule, NameRule::Prefix("e2e_".to_string()));
        assert!(config.rules[1].kinds.is_empty());
    }
}
