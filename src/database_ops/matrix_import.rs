//! Feature matrix import: competitor rows × feature columns of yes/no marks
//! upserted into `competitor_features`.

use anyhow::{bail, Result};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{info, warn};

use super::entities::{CellUpsert, ImplementationQuality};
use super::spreadsheet::{read_grid, read_grid_bytes, Grid};
use super::store::CatalogStore;
use crate::normalization::names::{resolve, resolve_exact, Named, Resolution};

/// Cell values that mean "this competitor has the feature".
pub const POSITIVE_MARKERS: &[&str] = &["var", "yes", "true", "x", "✓", "✔", "v", "1"];
/// Cell values that mean "does not have it". Anything else is counted as non-standard.
pub const NEGATIVE_MARKERS: &[&str] = &["yok", "no", "false", "-", "✗", "✘", "0", ""];

/// Header cells that describe the sheet rather than a feature.
const METADATA_HEADERS: &[&str] = &[
    "region",
    "bölge",
    "coverage",
    "coverage score",
    "total coverage",
    "coverage %",
];

pub fn is_positive_marker(cell: &str) -> bool {
    let v = cell.trim().to_lowercase();
    POSITIVE_MARKERS.contains(&v.as_str())
}

fn is_known_marker(cell: &str) -> bool {
    let v = cell.trim().to_lowercase();
    POSITIVE_MARKERS.contains(&v.as_str()) || NEGATIVE_MARKERS.contains(&v.as_str())
}

fn is_metadata_header(cell: &str) -> bool {
    let v = cell.trim().to_lowercase();
    METADATA_HEADERS.contains(&v.as_str())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureColumn {
    pub index: usize,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixRow {
    /// 1-based sheet row, for log lines people can find in the spreadsheet.
    pub line: usize,
    pub competitor: String,
    pub cells: Vec<String>,
}

impl MatrixRow {
    pub fn cell(&self, index: usize) -> &str {
        self.cells.get(index).map(String::as_str).unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixSheet {
    pub features: Vec<FeatureColumn>,
    pub rows: Vec<MatrixRow>,
}

impl MatrixSheet {
    pub fn from_path(path: &Path) -> Result<Self> {
        Self::from_grid(read_grid(path)?)
    }

    pub fn from_bytes(file_name: &str, bytes: Vec<u8>) -> Result<Self> {
        Self::from_grid(read_grid_bytes(file_name, bytes)?)
    }

    /// Row 0 holds feature names from column 1 on; column 0 of every later
    /// row holds the competitor name.
    pub fn from_grid(grid: Grid) -> Result<Self> {
        let mut rows = grid.into_iter();
        let Some(header) = rows.next() else {
            bail!("matrix sheet is empty");
        };
        let features: Vec<FeatureColumn> = header
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, name)| !name.trim().is_empty() && !is_metadata_header(name))
            .map(|(index, name)| FeatureColumn {
                index,
                name: name.trim().to_string(),
            })
            .collect();
        if features.is_empty() {
            bail!("matrix header has no feature columns");
        }

        let rows: Vec<MatrixRow> = rows
            .enumerate()
            .filter_map(|(i, cells)| {
                let competitor = cells.first()?.trim().to_string();
                if competitor.is_empty() {
                    return None;
                }
                Some(MatrixRow {
                    line: i + 2,
                    competitor,
                    cells,
                })
            })
            .collect();
        if rows.is_empty() {
            bail!("matrix sheet has a header but no competitor rows");
        }
        Ok(Self { features, rows })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Applied to every upserted cell; `None` keeps stored quality on update.
    pub quality_override: Option<ImplementationQuality>,
    pub notes_override: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NonStandardCell {
    pub competitor: String,
    pub feature: String,
    pub raw: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UnresolvedName {
    pub name: String,
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub rows: usize,
    pub cells: usize,
    pub positive: usize,
    pub negative: usize,
    pub upserted: usize,
    pub non_standard: Vec<NonStandardCell>,
    pub unresolved_competitors: Vec<UnresolvedName>,
    pub unresolved_features: Vec<UnresolvedName>,
    pub errors: usize,
}

fn unresolved<T: Named>(name: &str, resolution: Resolution<'_, T>) -> UnresolvedName {
    let suggestion = match resolution {
        Resolution::Unresolved { suggestion } => suggestion.map(|s| s.name().to_string()),
        _ => None,
    };
    UnresolvedName {
        name: name.to_string(),
        suggestion,
    }
}

/// Upserts every resolvable cell of `sheet`. Never creates competitors or
/// features and never deletes; per-cell failures are counted and skipped.
pub async fn import_matrix(
    store: &dyn CatalogStore,
    sheet: &MatrixSheet,
    opts: &ImportOptions,
) -> Result<ImportReport> {
    let competitors = store.competitors().await?;
    let features = store.features().await?;
    let mut report = ImportReport::default();

    let mut columns = Vec::with_capacity(sheet.features.len());
    for column in &sheet.features {
        match resolve_exact(&column.name, &features) {
            Some(feature) => columns.push((column, feature)),
            None => {
                warn!(feature = %column.name, "feature column not in catalog; skipping");
                let resolution = resolve(&column.name, &features);
                report
                    .unresolved_features
                    .push(unresolved(&column.name, resolution));
            }
        }
    }

    let mut seen_competitors = BTreeSet::new();
    for row in &sheet.rows {
        report.rows += 1;
        let competitor = match resolve(&row.competitor, &competitors) {
            Resolution::Exact(c) | Resolution::Substring(c) => c,
            other => {
                warn!(line = row.line, competitor = %row.competitor, "competitor not found; skipping row");
                report
                    .unresolved_competitors
                    .push(unresolved(&row.competitor, other));
                continue;
            }
        };
        if !seen_competitors.insert(competitor.id) {
            warn!(line = row.line, competitor = %competitor.name, "competitor appears more than once; later row wins");
        }

        for (column, feature) in &columns {
            let raw = row.cell(column.index);
            let has_feature = is_positive_marker(raw);
            report.cells += 1;
            if has_feature {
                report.positive += 1;
            } else {
                report.negative += 1;
            }
            if !is_known_marker(raw) {
                report.non_standard.push(NonStandardCell {
                    competitor: competitor.name.clone(),
                    feature: feature.name.clone(),
                    raw: raw.to_string(),
                });
            }

            let cell = CellUpsert {
                competitor_id: competitor.id,
                feature_id: feature.id,
                has_feature,
                implementation_quality: opts.quality_override,
                notes: opts.notes_override.clone(),
            };
            match store.upsert_competitor_feature(&cell).await {
                Ok(_) => report.upserted += 1,
                Err(err) => {
                    report.errors += 1;
                    warn!(line = row.line, competitor = %competitor.name, feature = %feature.name, error = %err, "cell upsert failed");
                }
            }
        }
    }

    info!(
        rows = report.rows,
        cells = report.cells,
        positive = report.positive,
        upserted = report.upserted,
        unresolved_competitors = report.unresolved_competitors.len(),
        unresolved_features = report.unresolved_features.len(),
        errors = report.errors,
        "matrix import finished"
    );
    Ok(report)
}
