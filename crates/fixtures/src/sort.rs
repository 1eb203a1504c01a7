//! Table sort convergence over a browser driver

use std::cmp::Ordering;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::FixtureResult;
use crate::poller::ConvergenceQuery;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Numeric,
    Text,
}

/// Parse a cell such as `"Rs. 1,250.00"` or `".50"`.
///
/// Digits and `-` are kept. A `.` is kept only as a decimal point: followed by
/// a digit and not directly after a letter, so the dot of a currency
/// abbreviation is dropped.
pub fn parse_numeric(cell: &str) -> Option<f64> {
    let chars: Vec<char> = cell.chars().collect();
    let mut kept = String::with_capacity(chars.len());
    for (i, c) in chars.iter().enumerate() {
        let keep = match c {
            '0'..='9' | '-' => true,
            '.' => {
                let digit_follows = chars.get(i + 1).map_or(false, |n| n.is_ascii_digit());
                let after_letter = i > 0 && chars[i - 1].is_alphabetic();
                digit_follows && !after_letter
            }
            _ => false,
        };
        if keep {
            kept.push(*c);
        }
    }
    if kept.starts_with('.') {
        kept.insert(0, '0');
    } else if kept.starts_with("-.") {
        kept.insert(1, '0');
    }
    kept.parse().ok()
}

/// `None` when a numeric cell does not parse.
fn compare(kind: ColumnKind, a: &str, b: &str) -> Option<Ordering> {
    match kind {
        ColumnKind::Numeric => parse_numeric(a)?.partial_cmp(&parse_numeric(b)?),
        ColumnKind::Text => Some(a.trim().to_lowercase().cmp(&b.trim().to_lowercase())),
    }
}

/// Whether `cells` are in `order`. Fewer than two cells count as sorted; a
/// numeric column with an unreadable cell never does.
pub fn is_sorted(cells: &[String], kind: ColumnKind, order: SortOrder) -> bool {
    cells.windows(2).all(|pair| match compare(kind, &pair[0], &pair[1]) {
        Some(ord) => match order {
            SortOrder::Ascending => ord != Ordering::Greater,
            SortOrder::Descending => ord != Ordering::Less,
        },
        None => false,
    })
}

/// Browser-side capability needed to drive a sortable column.
#[async_trait]
pub trait ColumnDriver: Send + Sync {
    /// Visible cell texts of the column, top to bottom.
    async fn read_column(&self, column: &str) -> FixtureResult<Vec<String>>;

    async fn click_header(&self, column: &str) -> FixtureResult<()>;
}

/// Converges when `column` reads as sorted in `order`; corrects by clicking the header.
pub struct SortConvergence<'a, D: ColumnDriver + ?Sized> {
    driver: &'a D,
    column: String,
    kind: ColumnKind,
    order: SortOrder,
}

impl<'a, D: ColumnDriver + ?Sized> SortConvergence<'a, D> {
    pub fn new(driver: &'a D, column: impl Into<String>, kind: ColumnKind, order: SortOrder) -> Self {
        Self {
            driver,
            column: column.into(),
            kind,
            order,
        }
    }
}

#[async_trait]
impl<'a, D: ColumnDriver + ?Sized> ConvergenceQuery for SortConvergence<'a, D> {
    type Value = Vec<String>;

    async fn sample(&self) -> FixtureResult<Vec<String>> {
        self.driver.read_column(&self.column).await
    }

    fn is_converged(&self, cells: &Vec<String>) -> bool {
        is_sorted(cells, self.kind, self.order)
    }

    async fn correct(&self) -> FixtureResult<()> {
        self.driver.click_header(&self.column).await
    }
}
