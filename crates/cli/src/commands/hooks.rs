//! Hooks Command

use anyhow::Result;
use serde::Serialize;

use nursery_fixtures::hooks::ALWAYS;
use nursery_fixtures::{EntityKind, HookBinding, HookTable, SeedAction};

use crate::output::{print_list, OutputFormat, TableDisplay};

#[derive(Serialize)]
pub struct HookRow {
    pub tag: String,
    pub cleanup_before: Vec<EntityKind>,
    pub seeds: Vec<String>,
    pub cleanup_after: Vec<EntityKind>,
}

impl From<&HookBinding> for HookRow {
    fn from(binding: &HookBinding) -> Self {
        let seeds = binding
            .seed
            .iter()
            .map(|action| match action {
                SeedAction::Single {
                    spec,
                    if_created: Some(alias),
                    ..
                } => format!("{} (if '{}' was created)", spec.describe(), alias),
                SeedAction::Single { spec, .. } => spec.describe(),
                SeedAction::Series { template, count } => format!("{} x{}", template.describe(), count),
            })
            .collect();
        Self {
            tag: if binding.tag == ALWAYS {
                "* (every scenario)".to_string()
            } else {
                format!("@{}", binding.tag)
            },
            cleanup_before: binding.cleanup_before.clone(),
            seeds,
            cleanup_after: binding.cleanup_after.clone(),
        }
    }
}

fn join_kinds(kinds: &[EntityKind]) -> String {
    if kinds.is_empty() {
        return "-".to_string();
    }
    kinds.iter().map(|k| k.to_string()).collect::<Vec<_>>().join(", ")
}

impl TableDisplay for HookRow {
    fn headers() -> Vec<&'static str> {
        vec!["Tag", "Cleanup Before", "Seeds", "Cleanup After"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.tag.clone(),
            join_kinds(&self.cleanup_before),
            if self.seeds.is_empty() { "-".to_string() } else { self.seeds.join("\n") },
            join_kinds(&self.cleanup_after),
        ]
    }
}

pub fn execute(table: &HookTable, format: OutputFormat) -> Result<()> {
    let rows: Vec<HookRow> = table.hooks.iter().map(HookRow::from).collect();
    print_list(&rows, format);
    Ok(())
}
