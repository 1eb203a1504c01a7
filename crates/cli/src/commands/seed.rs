//! Seed Command

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use nursery_fixtures::{EntityKind, LifecycleCoordinator, TagSet};

use crate::output::{print_list, print_message, OutputFormat, TableDisplay};

#[derive(Args, Debug)]
pub struct SeedArgs {
    /// Scenario tag whose before-hooks to run, e.g. `@setup_plant_data`; repeatable
    #[arg(long = "tag", required = true)]
    pub tags: Vec<String>,
}

#[derive(Serialize)]
pub struct SeededRow {
    pub kind: EntityKind,
    pub id: String,
    pub name: String,
    pub parent: Option<String>,
    pub created: bool,
}

impl TableDisplay for SeededRow {
    fn headers() -> Vec<&'static str> {
        vec!["Kind", "ID", "Name", "Parent", "Status"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.kind.to_string(),
            self.id.clone(),
            self.name.clone(),
            self.parent.clone().unwrap_or_else(|| "-".to_string()),
            if self.created { "created" } else { "existing" }.to_string(),
        ]
    }
}

/// Run the before-hooks for the tags and leave the data in place.
pub async fn execute(args: SeedArgs, coordinator: LifecycleCoordinator, format: OutputFormat) -> Result<()> {
    let tags = TagSet::new(&args.tags);
    let unbound: Vec<&str> = tags.iter().filter(|t| coordinator.hooks().get(t).is_none()).collect();
    if !unbound.is_empty() {
        print_message(&format!("No hooks bound to: {}", unbound.join(", ")), format);
    }

    let fixtures = coordinator.before_scenario(&tags).await?;
    let rows: Vec<SeededRow> = fixtures
        .entities()
        .iter()
        .map(|e| SeededRow {
            kind: e.kind,
            id: e.id.to_string(),
            name: e.name.clone(),
            parent: e.parent_ref.as_ref().map(|p| p.to_string()),
            created: e.created_by_suite,
        })
        .collect();
    print_list(&rows, format);
    Ok(())
}
