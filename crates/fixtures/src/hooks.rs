//! Tag-driven hook table
//!
//! Maps a scenario tag to the kinds swept before it, the fixtures seeded
//! before it, and the kinds swept after it.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{FixtureError, FixtureResult};
use crate::model::EntityKind;
use crate::seed::{FixtureSpec, NameSpec};

const BUILTIN_HOOKS: &str = include_str!("../hooks/default.yaml");

/// Tag of a binding that fires for every scenario, tagged or not.
pub const ALWAYS: &str = "*";

/// One seeding step of a binding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SeedAction {
    /// `count` copies of `template`; `{n}` in its name becomes the two-digit
    /// index (`01`, `02`, ...) and `{i}` the plain one.
    Series { template: FixtureSpec, count: u32 },
    Single {
        spec: FixtureSpec,
        #[serde(default)]
        alias: Option<String>,
        /// Seed only when the fixture under this alias was newly created
        /// earlier in the same scenario.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        if_created: Option<String>,
    },
}

impl SeedAction {
    /// Concrete specs in seeding order, each with the alias it is exposed under.
    pub fn expand(&self) -> Vec<(Option<String>, FixtureSpec)> {
        match self {
            SeedAction::Single { spec, alias, .. } => vec![(alias.clone(), spec.clone())],
            SeedAction::Series { template, count } => (1..=*count)
                .map(|i| {
                    let mut spec = template.clone();
                    spec.name = match &template.name {
                        NameSpec::Literal(name) => NameSpec::Literal(fill_index(name, i)),
                        NameSpec::Generated { generated } => NameSpec::Generated {
                            generated: fill_index(generated, i),
                        },
                    };
                    (None, spec)
                })
                .collect(),
        }
    }

    /// Alias this action depends on, if any.
    pub fn condition(&self) -> Option<&str> {
        match self {
            SeedAction::Single { if_created, .. } => if_created.as_deref(),
            SeedAction::Series { .. } => None,
        }
    }
}

fn fill_index(pattern: &str, i: u32) -> String {
    pattern
        .replace("{n}", &format!("{i:02}"))
        .replace("{i}", &i.to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookBinding {
    pub tag: String,
    #[serde(default)]
    pub cleanup_before: Vec<EntityKind>,
    #[serde(default)]
    pub seed: Vec<SeedAction>,
    #[serde(default)]
    pub cleanup_after: Vec<EntityKind>,
}

impl HookBinding {
    /// Whether this binding applies to a scenario tagged `tags`.
    pub fn fires_for(&self, tags: &TagSet) -> bool {
        self.tag == ALWAYS || tags.contains(&self.tag)
    }

    fn validate(&self) -> FixtureResult<()> {
        if normalize_tag(&self.tag).is_empty() {
            return Err(FixtureError::HookTable("binding with an empty tag".to_string()));
        }
        let mut aliases: Vec<&str> = Vec::new();
        for action in &self.seed {
            if let Some(alias) = action.condition() {
                if !aliases.contains(&alias) {
                    return Err(FixtureError::HookTable(format!(
                        "tag '{}': if_created refers to unknown alias '{}'",
                        self.tag, alias
                    )));
                }
            }
            if let SeedAction::Single { alias: Some(alias), .. } = action {
                aliases.push(alias.as_str());
            }
            if let SeedAction::Series { count: 0, .. } = action {
                return Err(FixtureError::HookTable(format!(
                    "tag '{}': series with count 0",
                    self.tag
                )));
            }
            for (_, spec) in action.expand() {
                spec.validate().map_err(|e| {
                    FixtureError::HookTable(format!("tag '{}': {}", self.tag, e))
                })?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HookTable {
    #[serde(default)]
    pub hooks: Vec<HookBinding>,
}

impl HookTable {
    /// Parse a hook table from YAML string
    pub fn from_yaml(yaml: &str) -> FixtureResult<Self> {
        let mut table: HookTable = serde_yaml::from_str(yaml)?;
        for binding in &mut table.hooks {
            binding.tag = normalize_tag(&binding.tag);
        }
        table.validate()?;
        Ok(table)
    }

    /// Parse a hook table from a YAML file
    pub fn from_file(path: &Path) -> FixtureResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| FixtureError::HookTable(format!("{}: {}", path.display(), e)))
    }

    /// Load and merge every hook table in a directory
    pub fn load_all(dir: &Path) -> FixtureResult<Self> {
        let mut paths: Vec<_> = walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
            .map(|e| e.into_path())
            .collect();
        paths.sort();

        let mut table = HookTable::default();
        for path in paths {
            table.merge(Self::from_file(&path)?)?;
        }
        Ok(table)
    }

    /// Table used when no hook file is configured
    pub fn builtin() -> FixtureResult<Self> {
        Self::from_yaml(BUILTIN_HOOKS)
    }

    /// Load from a file or a directory of files.
    pub fn load(path: &Path) -> FixtureResult<Self> {
        if path.is_dir() {
            Self::load_all(path)
        } else {
            Self::from_file(path)
        }
    }

    pub fn merge(&mut self, other: HookTable) -> FixtureResult<()> {
        self.hooks.extend(other.hooks);
        self.validate()
    }

    fn validate(&self) -> FixtureResult<()> {
        let mut seen = HashSet::new();
        for binding in &self.hooks {
            binding.validate()?;
            if !seen.insert(binding.tag.as_str()) {
                return Err(FixtureError::HookTable(format!(
                    "tag '{}' is bound more than once",
                    binding.tag
                )));
            }
        }
        Ok(())
    }

    pub fn get(&self, tag: &str) -> Option<&HookBinding> {
        let tag = normalize_tag(tag);
        self.hooks.iter().find(|b| b.tag == tag)
    }

    /// Bindings that fire for `tags`, in table order. `*` bindings fire for every scenario.
    pub fn bindings_for<'a>(&'a self, tags: &'a TagSet) -> impl Iterator<Item = &'a HookBinding> + 'a {
        self.hooks.iter().filter(move |b| b.fires_for(tags))
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

fn normalize_tag(tag: &str) -> String {
    tag.trim().trim_start_matches('@').to_string()
}

/// Normalized tags of one scenario
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet {
    tags: Vec<String>,
}

impl TagSet {
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = TagSet::default();
        for tag in tags {
            let tag = normalize_tag(tag.as_ref());
            if !tag.is_empty() && !set.tags.contains(&tag) {
                set.tags.push(tag);
            }
        }
        set
    }

    /// Split a tag expression such as `"@category @setup_sorting_data"`.
    pub fn parse(expr: &str) -> Self {
        Self::new(expr.split(|c: char| c.is_whitespace() || c == ','))
    }

    pub fn contains(&self, tag: &str) -> bool {
        let tag = normalize_tag(tag);
        self.tags.iter().any(|t| *t == tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

impl fmt::Display for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tags: Vec<String> = self.tags.iter().map(|t| format!("@{t}")).collect();
        f.write_str(&tags.join(" "))
    }
}
