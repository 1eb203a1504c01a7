//! Cleanup Command

use anyhow::{bail, Result};
use clap::Args;
use serde::Serialize;

use nursery_fixtures::{CleanupReport, EntityKind, FixtureEntity, LifecycleCoordinator};

use crate::output::{print_list, print_success, print_warning, OutputFormat, TableDisplay};

#[derive(Args, Debug)]
pub struct CleanupArgs {
    /// Kind to sweep (category, plant, sale); repeatable, default all
    #[arg(long = "kind")]
    pub kinds: Vec<EntityKind>,

    /// Show what would be deleted without deleting
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Serialize)]
pub struct CleanupRow {
    pub kind: EntityKind,
    pub id: String,
    pub name: String,
    pub outcome: String,
}

impl CleanupRow {
    fn new(entity: &FixtureEntity, outcome: impl Into<String>) -> Self {
        Self {
            kind: entity.kind,
            id: entity.id.to_string(),
            name: entity.name.clone(),
            outcome: outcome.into(),
        }
    }
}

impl TableDisplay for CleanupRow {
    fn headers() -> Vec<&'static str> {
        vec!["Kind", "ID", "Name", "Outcome"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.kind.to_string(),
            self.id.clone(),
            self.name.clone(),
            self.outcome.clone(),
        ]
    }
}

fn report_rows(report: &CleanupReport) -> Vec<CleanupRow> {
    let mut rows: Vec<CleanupRow> = Vec::with_capacity(report.attempted());
    rows.extend(report.deleted.iter().map(|e| CleanupRow::new(e, "deleted")));
    rows.extend(report.already_gone.iter().map(|e| CleanupRow::new(e, "already gone")));
    rows.extend(report.blocked.iter().map(|e| CleanupRow::new(e, "blocked (409)")));
    rows.extend(report.failed.iter().map(|f| {
        let outcome = match f.status {
            Some(status) => format!("failed ({status})"),
            None => "failed".to_string(),
        };
        CleanupRow::new(&f.entity, outcome)
    }));
    rows
}

pub async fn execute(args: CleanupArgs, coordinator: LifecycleCoordinator, format: OutputFormat) -> Result<()> {
    let kinds = if args.kinds.is_empty() {
        EntityKind::ALL.to_vec()
    } else {
        args.kinds
    };

    if args.dry_run {
        let (plan, report) = coordinator.cleaner().preview(&kinds).await;
        for warning in &report.warnings {
            print_warning(warning);
        }
        let rows: Vec<CleanupRow> = plan.steps.iter().map(|e| CleanupRow::new(e, "would delete")).collect();
        print_list(&rows, format);
        return Ok(());
    }

    let report = coordinator.cleaner().sweep(&kinds).await;
    for warning in &report.warnings {
        print_warning(warning);
    }
    print_list(&report_rows(&report), format);

    if !report.failed.is_empty() {
        bail!("{} deletion(s) failed", report.failed.len());
    }
    print_success(&format!("Removed {} fixture(s)", report.deleted.len()));
    Ok(())
}
