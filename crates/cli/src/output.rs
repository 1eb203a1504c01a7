//! Output formatting for CLI
//!
//! Listings go to stdout in the chosen format. Status lines (✅, ❌, ⚠️) go
//! to stderr so `--format json|yaml` output stays machine-readable.

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Bordered table
    #[default]
    Table,
    /// JSON array
    Json,
    /// YAML sequence
    Yaml,
    /// One tab-separated line per row, for grep and cut
    Plain,
}

/// Rows that can be rendered as table columns
pub trait TableDisplay {
    fn headers() -> Vec<&'static str>;
    fn row(&self) -> Vec<String>;
}

/// Render `items` as `format`. Empty listings still produce valid JSON/YAML.
pub fn render_list<T: Serialize + TableDisplay>(items: &[T], format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(items).unwrap_or_else(|_| "[]".to_string()),
        OutputFormat::Yaml => serde_yaml::to_string(items).unwrap_or_else(|_| "[]\n".to_string()),
        OutputFormat::Table if items.is_empty() => "Nothing to show.".to_string(),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(T::headers());
            for item in items {
                table.add_row(item.row());
            }
            table.to_string()
        }
        OutputFormat::Plain => items
            .iter()
            // Multi-line cells are flattened so one row stays one line.
            .map(|item| item.row().iter().map(|c| c.replace('\n', "; ")).collect::<Vec<_>>().join("\t"))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

pub fn print_list<T: Serialize + TableDisplay>(items: &[T], format: OutputFormat) {
    let rendered = render_list(items, format);
    if rendered.ends_with('\n') {
        print!("{rendered}");
    } else if !rendered.is_empty() {
        println!("{rendered}");
    }
}

/// Informational note; kept off stdout for machine formats.
pub fn print_message(message: &str, format: OutputFormat) {
    match format {
        OutputFormat::Table | OutputFormat::Plain => println!("{message}"),
        OutputFormat::Json | OutputFormat::Yaml => eprintln!("{message}"),
    }
}

pub fn print_success(message: &str) {
    eprintln!("✅ {message}");
}

pub fn print_error(message: &str) {
    eprintln!("❌ {message}");
}

pub fn print_warning(message: &str) {
    eprintln!("⚠️  {message}");
}
