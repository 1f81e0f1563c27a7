//! The competitor × feature grid served by `/api/matrix` and its CSV export.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use super::coverage::{self, percentage, round2, Catalog};
use crate::database_ops::entities::{
    Competitor, CompetitorFeature, Feature, ImplementationQuality,
};

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MatrixCell {
    pub has_feature: bool,
    pub implementation_quality: ImplementationQuality,
    pub notes: Option<String>,
    pub screenshot_count: i64,
}

impl MatrixCell {
    fn empty(screenshot_count: i64) -> Self {
        Self {
            has_feature: false,
            implementation_quality: ImplementationQuality::None,
            notes: None,
            screenshot_count,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatrixRow {
    pub feature: Feature,
    /// Keyed by competitor id; every competitor has an entry.
    pub cells: BTreeMap<Uuid, MatrixCell>,
    pub screenshot_count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatrixView {
    pub competitors: Vec<Competitor>,
    pub features: Vec<MatrixRow>,
}

/// Builds the full grid. Pairs without a stored cell read as "not implemented".
/// `screenshot_counts` holds `(competitor_id, feature_id, count)` evidence totals.
pub fn build_matrix(
    competitors: Vec<Competitor>,
    features: Vec<Feature>,
    cells: &[CompetitorFeature],
    screenshot_counts: &[(Uuid, Uuid, i64)],
) -> MatrixView {
    let counts: HashMap<(Uuid, Uuid), i64> = screenshot_counts
        .iter()
        .map(|(c, f, n)| ((*c, *f), *n))
        .collect();
    let stored: HashMap<(Uuid, Uuid), &CompetitorFeature> = cells
        .iter()
        .map(|c| ((c.competitor_id, c.feature_id), c))
        .collect();

    let rows = features
        .into_iter()
        .map(|feature| {
            let mut row_cells = BTreeMap::new();
            let mut row_total = 0;
            for competitor in &competitors {
                let key = (competitor.id, feature.id);
                let count = counts.get(&key).copied().unwrap_or(0);
                row_total += count;
                let cell = match stored.get(&key) {
                    Some(cell) => MatrixCell {
                        has_feature: cell.has_feature,
                        implementation_quality: cell.implementation_quality,
                        notes: cell.notes.clone(),
                        screenshot_count: count,
                    },
                    None => MatrixCell::empty(count),
                };
                row_cells.insert(competitor.id, cell);
            }
            MatrixRow {
                feature,
                cells: row_cells,
                screenshot_count: row_total,
            }
        })
        .collect();

    MatrixView {
        competitors,
        features: rows,
    }
}

fn pct_text(value: f64) -> String {
    format!("{:.2}", round2(value))
}

/// CSV with one row per feature, a `Var`/`Yok` column per competitor, a
/// trailing per-feature coverage column and a final `TOTAL COVERAGE` row.
pub fn export_csv(catalog: &Catalog<'_>) -> Result<String> {
    let implemented = catalog.implemented();
    let mut wtr = csv::Writer::from_writer(Vec::new());

    let mut header = vec!["Feature".to_string(), "Category".into(), "Priority".into()];
    header.extend(catalog.competitors.iter().map(|c| c.name.clone()));
    header.push("Coverage %".into());
    wtr.write_record(&header)?;

    for feature in catalog.features {
        let mut record = vec![
            feature.name.clone(),
            feature.category.clone().unwrap_or_default(),
            feature.priority.clone().unwrap_or_default(),
        ];
        let mut count = 0;
        for competitor in catalog.competitors {
            let has = implemented.contains(&(competitor.id, feature.id));
            if has {
                count += 1;
            }
            record.push(if has { "Var" } else { "Yok" }.to_string());
        }
        record.push(pct_text(percentage(count, catalog.competitors.len())));
        wtr.write_record(&record)?;
    }

    let mut total = vec!["TOTAL COVERAGE".to_string(), String::new(), String::new()];
    total.extend(
        coverage::competitor_coverage(catalog)
            .iter()
            .map(|c| pct_text(c.coverage)),
    );
    total.push(pct_text(coverage::overall(catalog)));
    wtr.write_record(&total)?;

    let bytes = wtr.into_inner().context("flushing csv export")?;
    String::from_utf8(bytes).context("csv export is not utf-8")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::coverage::fixtures::*;
    use crate::database_ops::entities::{ImplementationQuality as Q, Region};

    #[test]
    fn grid_fills_missing_cells_and_sums_evidence() {
        let btc = competitor("BTCTurk", Some(Region::Tr));
        let kraken = competitor("Kraken", Some(Region::Global));
        let app = feature("Mobile App", Some("Platform"));
        let cells = vec![cell(&btc, &app, true, Q::Excellent)];
        let counts = vec![(btc.id, app.id, 3), (kraken.id, app.id, 1)];

        let view = build_matrix(
            vec![btc.clone(), kraken.clone()],
            vec![app.clone()],
            &cells,
            &counts,
        );
        let row = &view.features[0];
        assert_eq!(row.screenshot_count, 4);
        assert!(row.cells[&btc.id].has_feature);
        assert_eq!(row.cells[&btc.id].implementation_quality, Q::Excellent);
        assert_eq!(row.cells[&kraken.id], MatrixCell::empty(1));

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(
            json["features"][0]["cells"][btc.id.to_string()]["screenshotCount"],
            serde_json::json!(3)
        );
    }

    #[test]
    fn csv_export_has_markers_and_coverage_totals() {
        let comps = vec![
            competitor("BTCTurk", Some(Region::Tr)),
            competitor("Paribu", Some(Region::Tr)),
        ];
        let mut app = feature("Mobile App", Some("Platform"));
        app.priority = Some("high".into());
        let features = vec![app.clone(), feature("Convert", None)];
        let cells = vec![cell(&comps[0], &app, true, Q::Good)];

        let csv = export_csv(&Catalog::new(&comps, &features, &cells)).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "Feature,Category,Priority,BTCTurk,Paribu,Coverage %");
        assert_eq!(lines[1], "Mobile App,Platform,high,Var,Yok,50.00");
        assert_eq!(lines[2], "Convert,,,Yok,Yok,0.00");
        assert_eq!(lines[3], "TOTAL COVERAGE,,,50.00,0.00,25.00");
    }
}
