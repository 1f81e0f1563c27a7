//! Coverage figures over the feature matrix. Pure functions over catalog
//! slices; callers load the data and these recompute on every request.
//!
//! Percentages are kept unrounded internally and rounded to two decimals
//! when serialized.

use itertools::Itertools;
use serde::{Serialize, Serializer};
use std::collections::HashSet;
use uuid::Uuid;

use crate::database_ops::entities::{Competitor, CompetitorFeature, Feature, Region};

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn serialize_pct<S: Serializer>(value: &f64, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(round2(*value))
}

/// `part / whole * 100`, or 0 when there is nothing to divide by.
pub fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Which competitors a figure is computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    All,
    Region(Region),
}

impl Scope {
    fn includes(&self, competitor: &Competitor) -> bool {
        match self {
            Scope::All => true,
            Scope::Region(region) => competitor.region == Some(*region),
        }
    }
}

/// The slices every coverage figure is computed from.
#[derive(Debug, Clone, Copy)]
pub struct Catalog<'a> {
    pub competitors: &'a [Competitor],
    pub features: &'a [Feature],
    pub cells: &'a [CompetitorFeature],
}

impl<'a> Catalog<'a> {
    pub fn new(
        competitors: &'a [Competitor],
        features: &'a [Feature],
        cells: &'a [CompetitorFeature],
    ) -> Self {
        Self {
            competitors,
            features,
            cells,
        }
    }

    /// Distinct `(competitor, feature)` pairs with `has_feature`, restricted
    /// to ids present in the catalog.
    pub fn implemented(&self) -> HashSet<(Uuid, Uuid)> {
        let competitor_ids: HashSet<Uuid> = self.competitors.iter().map(|c| c.id).collect();
        let feature_ids: HashSet<Uuid> = self.features.iter().map(|f| f.id).collect();
        self.cells
            .iter()
            .filter(|c| c.has_feature)
            .filter(|c| competitor_ids.contains(&c.competitor_id) && feature_ids.contains(&c.feature_id))
            .map(|c| (c.competitor_id, c.feature_id))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScopeCoverage {
    pub implemented_by: usize,
    pub total_competitors: usize,
    #[serde(serialize_with = "serialize_pct")]
    pub coverage: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeatureCoverage {
    pub feature_id: Uuid,
    pub feature_name: String,
    pub category: Option<String>,
    pub combined: ScopeCoverage,
    pub tr: ScopeCoverage,
    pub global: ScopeCoverage,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompetitorCoverage {
    pub competitor_id: Uuid,
    pub competitor_name: String,
    pub region: Option<Region>,
    pub implemented_features: usize,
    pub total_features: usize,
    #[serde(serialize_with = "serialize_pct")]
    pub coverage: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegionSummary {
    pub region: Option<Region>,
    pub competitors: usize,
    #[serde(serialize_with = "serialize_pct")]
    pub average_coverage: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CoverageReport {
    #[serde(serialize_with = "serialize_pct")]
    pub overall_coverage: f64,
    pub total_competitors: usize,
    pub total_features: usize,
    pub total_implementations: usize,
    pub features: Vec<FeatureCoverage>,
    pub competitors: Vec<CompetitorCoverage>,
    pub by_region: Vec<RegionSummary>,
}

fn scope_coverage(
    catalog: &Catalog<'_>,
    implemented: &HashSet<(Uuid, Uuid)>,
    feature_id: Uuid,
    scope: Scope,
) -> ScopeCoverage {
    let in_scope: Vec<&Competitor> = catalog
        .competitors
        .iter()
        .filter(|c| scope.includes(c))
        .collect();
    let implemented_by = in_scope
        .iter()
        .filter(|c| implemented.contains(&(c.id, feature_id)))
        .count();
    ScopeCoverage {
        implemented_by,
        total_competitors: in_scope.len(),
        coverage: percentage(implemented_by, in_scope.len()),
    }
}

pub fn feature_coverage(catalog: &Catalog<'_>) -> Vec<FeatureCoverage> {
    let implemented = catalog.implemented();
    catalog
        .features
        .iter()
        .map(|f| FeatureCoverage {
            feature_id: f.id,
            feature_name: f.name.clone(),
            category: f.category.clone(),
            combined: scope_coverage(catalog, &implemented, f.id, Scope::All),
            tr: scope_coverage(catalog, &implemented, f.id, Scope::Region(Region::Tr)),
            global: scope_coverage(catalog, &implemented, f.id, Scope::Region(Region::Global)),
        })
        .collect()
}

pub fn competitor_coverage(catalog: &Catalog<'_>) -> Vec<CompetitorCoverage> {
    let implemented = catalog.implemented();
    let total_features = catalog.features.len();
    catalog
        .competitors
        .iter()
        .map(|c| {
            let count = catalog
                .features
                .iter()
                .filter(|f| implemented.contains(&(c.id, f.id)))
                .count();
            CompetitorCoverage {
                competitor_id: c.id,
                competitor_name: c.name.clone(),
                region: c.region,
                implemented_features: count,
                total_features,
                coverage: percentage(count, total_features),
            }
        })
        .collect()
}

/// Implementations over every possible `(competitor, feature)` pair.
pub fn overall(catalog: &Catalog<'_>) -> f64 {
    percentage(
        catalog.implemented().len(),
        catalog.competitors.len() * catalog.features.len(),
    )
}

pub fn coverage_report(catalog: &Catalog<'_>) -> CoverageReport {
    let competitors = competitor_coverage(catalog);
    let mut by_region = Vec::new();
    for region in [Some(Region::Tr), Some(Region::Global), None] {
        let members: Vec<&CompetitorCoverage> =
            competitors.iter().filter(|c| c.region == region).collect();
        if members.is_empty() && region.is_none() {
            continue;
        }
        let average = if members.is_empty() {
            0.0
        } else {
            members.iter().map(|c| c.coverage).sum::<f64>() / members.len() as f64
        };
        by_region.push(RegionSummary {
            region,
            competitors: members.len(),
            average_coverage: average,
        });
    }

    CoverageReport {
        overall_coverage: overall(catalog),
        total_competitors: catalog.competitors.len(),
        total_features: catalog.features.len(),
        total_implementations: catalog.implemented().len(),
        features: feature_coverage(catalog),
        competitors,
        by_region,
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompetitorFlag {
    pub competitor_id: Uuid,
    pub competitor_name: String,
    pub has_feature: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GapEntry {
    pub feature_id: Uuid,
    pub feature_name: String,
    pub category: Option<String>,
    #[serde(serialize_with = "serialize_pct")]
    pub coverage: f64,
    pub implemented_by: Vec<String>,
    pub missing_from: Vec<String>,
    pub competitors: Vec<CompetitorFlag>,
}

/// Features ordered from least to most covered (ties by name).
pub fn gap_analysis(catalog: &Catalog<'_>) -> Vec<GapEntry> {
    let implemented = catalog.implemented();
    catalog
        .features
        .iter()
        .map(|f| {
            let competitors: Vec<CompetitorFlag> = catalog
                .competitors
                .iter()
                .map(|c| CompetitorFlag {
                    competitor_id: c.id,
                    competitor_name: c.name.clone(),
                    has_feature: implemented.contains(&(c.id, f.id)),
                })
                .collect();
            let (have, lack): (Vec<&CompetitorFlag>, Vec<&CompetitorFlag>) =
                competitors.iter().partition(|flag| flag.has_feature);
            GapEntry {
                feature_id: f.id,
                feature_name: f.name.clone(),
                category: f.category.clone(),
                coverage: percentage(have.len(), competitors.len()),
                implemented_by: have.iter().map(|c| c.competitor_name.clone()).collect(),
                missing_from: lack.iter().map(|c| c.competitor_name.clone()).collect(),
                competitors,
            }
        })
        .sorted_by(|a, b| {
            a.coverage
                .total_cmp(&b.coverage)
                .then_with(|| a.feature_name.cmp(&b.feature_name))
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HeatmapColumn {
    pub competitor_id: Uuid,
    pub competitor_name: String,
    pub region: Option<Region>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HeatmapRow {
    pub feature_id: Uuid,
    pub feature_name: String,
    pub category: Option<String>,
    /// One score per column: 0 when missing, otherwise the quality weight (1-4).
    pub scores: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Heatmap {
    pub competitors: Vec<HeatmapColumn>,
    pub rows: Vec<HeatmapRow>,
}

pub fn heatmap(catalog: &Catalog<'_>) -> Heatmap {
    let cells: std::collections::HashMap<(Uuid, Uuid), &CompetitorFeature> = catalog
        .cells
        .iter()
        .map(|c| ((c.competitor_id, c.feature_id), c))
        .collect();
    Heatmap {
        competitors: catalog
            .competitors
            .iter()
            .map(|c| HeatmapColumn {
                competitor_id: c.id,
                competitor_name: c.name.clone(),
                region: c.region,
            })
            .collect(),
        rows: catalog
            .features
            .iter()
            .map(|f| HeatmapRow {
                feature_id: f.id,
                feature_name: f.name.clone(),
                category: f.category.clone(),
                scores: catalog
                    .competitors
                    .iter()
                    .map(|c| match cells.get(&(c.id, f.id)) {
                        Some(cell) if cell.has_feature => cell.implementation_quality.score(),
                        _ => 0,
                    })
                    .collect(),
            })
            .collect(),
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::database_ops::entities::ImplementationQuality as Q;

    #[test]
    fn percentage_handles_empty_denominator() {
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(percentage(3, 0), 0.0);
        assert!((percentage(1, 3) - 100.0 / 3.0).abs() < 1e-9);
        assert_eq!(round2(percentage(1, 3)), 33.33);
        assert_eq!(round2(100.0 / 3.0), 33.33);
        assert_eq!(round2(2.0 / 3.0 * 100.0), 66.67);
    }

    #[test]
    fn feature_coverage_spans_zero_to_hundred_and_is_monotonic() {
        let comps = vec![
            competitor("BTCTurk", Some(Region::Tr)),
            competitor("Paribu", Some(Region::Tr)),
            competitor("Kraken", Some(Region::Global)),
        ];
        let convert = feature("Convert", None);
        let features = vec![convert.clone()];

        let mut cells = Vec::new();
        let mut last = -1.0;
        for (i, c) in comps.iter().enumerate() {
            let cov = feature_coverage(&Catalog::new(&comps, &features, &cells));
            let combined = cov[0].combined.coverage;
            assert!(combined > last);
            if i == 0 {
                assert_eq!(combined, 0.0);
            }
            last = combined;
            cells.push(cell(c, &convert, true, Q::Good));
        }
        let cov = feature_coverage(&Catalog::new(&comps, &features, &cells));
        assert_eq!(cov[0].combined.coverage, 100.0);
        assert_eq!(cov[0].tr.implemented_by, 2);
        assert_eq!(cov[0].global.total_competitors, 1);
    }

    #[test]
    fn duplicate_and_dangling_cells_do_not_inflate_coverage() {
        let comps = vec![competitor("BTCTurk", Some(Region::Tr)), competitor("OKX", None)];
        let f = feature("Referral", None);
        let features = vec![f.clone()];
        let ghost = competitor("Ghost", None);
        let cells = vec![
            cell(&comps[0], &f, true, Q::Good),
            cell(&comps[0], &f, true, Q::Excellent),
            cell(&ghost, &f, true, Q::Good),
            cell(&comps[1], &f, false, Q::None),
        ];
        let catalog = Catalog::new(&comps, &features, &cells);
        assert_eq!(feature_coverage(&catalog)[0].combined.coverage, 50.0);
        assert_eq!(overall(&catalog), 50.0);
        // untagged competitors count only in the combined scope
        assert_eq!(feature_coverage(&catalog)[0].global.total_competitors, 0);
        assert_eq!(feature_coverage(&catalog)[0].global.coverage, 0.0);
    }

    #[test]
    fn report_groups_by_region_and_serializes_rounded() {
        let comps = vec![
            competitor("BTCTurk", Some(Region::Tr)),
            competitor("Kraken", Some(Region::Global)),
        ];
        let features = vec![
            feature("Convert", Some("Trading")),
            feature("Referral", Some("Growth")),
            feature("Mobile App", Some("Platform")),
        ];
        let cells = vec![cell(&comps[0], &features[0], true, Q::Good)];
        let report = coverage_report(&Catalog::new(&comps, &features, &cells));

        assert_eq!(report.total_implementations, 1);
        assert_eq!(report.by_region.len(), 2);
        assert_eq!(report.by_region[0].region, Some(Region::Tr));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["overallCoverage"], serde_json::json!(16.67));
        assert_eq!(json["competitors"][0]["coverage"], serde_json::json!(33.33));
    }

    #[test]
    fn gap_analysis_lists_least_covered_first() {
        let comps = vec![
            competitor("BTCTurk", Some(Region::Tr)),
            competitor("Paribu", Some(Region::Tr)),
        ];
        let wide = feature("Convert", None);
        let narrow = feature("Copy Trading", None);
        let none = feature("NFT / Marketplace", None);
        let features = vec![wide.clone(), narrow.clone(), none.clone()];
        let cells = vec![
            cell(&comps[0], &wide, true, Q::Good),
            cell(&comps[1], &wide, true, Q::Good),
            cell(&comps[1], &narrow, true, Q::Fair),
        ];
        let gaps = gap_analysis(&Catalog::new(&comps, &features, &cells));
        let order: Vec<&str> = gaps.iter().map(|g| g.feature_name.as_str()).collect();
        assert_eq!(order, vec!["NFT / Marketplace", "Copy Trading", "Convert"]);
        assert_eq!(gaps[1].implemented_by, vec!["Paribu".to_string()]);
        assert_eq!(gaps[1].missing_from, vec!["BTCTurk".to_string()]);
        assert_eq!(gaps[0].competitors.len(), 2);
    }

    #[test]
    fn heatmap_scores_quality_and_zeroes_missing() {
        let comps = vec![
            competitor("BTCTurk", Some(Region::Tr)),
            competitor("Kraken", Some(Region::Global)),
            competitor("Paribu", Some(Region::Tr)),
        ];
        let f = feature("Convert", None);
        let features = vec![f.clone()];
        let cells = vec![
            cell(&comps[0], &f, true, Q::Excellent),
            cell(&comps[1], &f, false, Q::Excellent),
        ];
        let map = heatmap(&Catalog::new(&comps, &features, &cells));
        assert_eq!(map.rows[0].scores, vec![4, 0, 0]);
        assert_eq!(map.competitors.len(), 3);
    }
}
