//! Consistency between screenshots and the feature matrix: orphans, missing
//! files, cells claiming a feature without evidence and evidence on cells
//! that say the feature is absent.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use super::coverage::Catalog;
use crate::database_ops::entities::Screenshot;

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotQuality {
    pub total_screenshots: usize,
    pub valid_assignments: usize,
    pub orphans: usize,
    pub missing_files: usize,
}

/// `missing` holds ids of rows whose file is known to be gone.
pub fn validate_screenshots(screenshots: &[Screenshot], missing: &HashSet<Uuid>) -> ScreenshotQuality {
    let valid_assignments = screenshots.iter().filter(|s| s.feature_id.is_some()).count();
    ScreenshotQuality {
        total_screenshots: screenshots.len(),
        valid_assignments,
        orphans: screenshots.len() - valid_assignments,
        missing_files: screenshots.iter().filter(|s| missing.contains(&s.id)).count(),
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CellRef {
    pub competitor_id: Uuid,
    pub competitor_name: String,
    pub feature_id: Uuid,
    pub feature_name: String,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MismatchKind {
    /// Screenshot assigned to a feature the matrix has no cell for.
    MissingRelationship,
    /// Screenshot evidence on a cell with `has_feature = false`.
    InconsistentFlag,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotMismatch {
    pub screenshot_id: Uuid,
    pub issue: MismatchKind,
    pub details: String,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MatrixQuality {
    pub total_relationships: usize,
    /// Cells without the feature that still have screenshot evidence.
    pub inconsistent_flags: usize,
    /// Cells with the feature but no screenshot evidence.
    pub missing_screenshots: Vec<CellRef>,
    pub screenshot_mismatches: Vec<ScreenshotMismatch>,
}

/// Screenshot counts per `(competitor, feature)` from the rows themselves.
pub fn evidence_counts(screenshots: &[Screenshot]) -> Vec<(Uuid, Uuid, i64)> {
    let mut counts: HashMap<(Uuid, Uuid), i64> = HashMap::new();
    for shot in screenshots {
        if let Some(feature_id) = shot.feature_id {
            *counts.entry((shot.competitor_id, feature_id)).or_default() += 1;
        }
    }
    counts.into_iter().map(|((c, f), n)| (c, f, n)).collect()
}

/// `evidence` is `(competitor, feature, screenshot count)`; cells and
/// screenshots referring to ids outside the catalog are ignored.
pub fn validate_matrix(
    catalog: &Catalog<'_>,
    screenshots: &[Screenshot],
    evidence: &[(Uuid, Uuid, i64)],
) -> MatrixQuality {
    let competitors: HashMap<Uuid, &str> = catalog
        .competitors
        .iter()
        .map(|c| (c.id, c.name.as_str()))
        .collect();
    let features: HashMap<Uuid, &str> = catalog
        .features
        .iter()
        .map(|f| (f.id, f.name.as_str()))
        .collect();
    let evidence: HashMap<(Uuid, Uuid), i64> = evidence
        .iter()
        .map(|&(c, f, n)| ((c, f), n))
        .collect();
    let mut flags: HashMap<(Uuid, Uuid), bool> = HashMap::new();

    let mut report = MatrixQuality::default();
    for cell in catalog.cells {
        let (Some(competitor), Some(feature)) = (
            competitors.get(&cell.competitor_id),
            features.get(&cell.feature_id),
        ) else {
            continue;
        };
        let pair = (cell.competitor_id, cell.feature_id);
        if flags.insert(pair, cell.has_feature).is_some() {
            continue;
        }
        report.total_relationships += 1;
        let shots = evidence.get(&pair).copied().unwrap_or(0);
        if cell.has_feature && shots == 0 {
            report.missing_screenshots.push(CellRef {
                competitor_id: cell.competitor_id,
                competitor_name: competitor.to_string(),
                feature_id: cell.feature_id,
                feature_name: feature.to_string(),
            });
        } else if !cell.has_feature && shots > 0 {
            report.inconsistent_flags += 1;
        }
    }

    for shot in screenshots {
        let Some(feature_id) = shot.feature_id else {
            continue;
        };
        let (Some(competitor), Some(feature)) = (
            competitors.get(&shot.competitor_id),
            features.get(&feature_id),
        ) else {
            continue;
        };
        let mismatch = match flags.get(&(shot.competitor_id, feature_id)) {
            None => Some((
                MismatchKind::MissingRelationship,
                format!("assigned to {feature} but {competitor} has no matrix cell for it"),
            )),
            Some(false) => Some((
                MismatchKind::InconsistentFlag,
                format!("screenshot exists but {competitor} is marked without {feature}"),
            )),
            Some(true) => None,
        };
        if let Some((issue, details)) = mismatch {
            report.screenshot_mismatches.push(ScreenshotMismatch {
                screenshot_id: shot.id,
                issue,
                details,
            });
        }
    }
    report
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    pub fn for_score(score: u8) -> Self {
        match score {
            90..=u8::MAX => Grade::A,
            80..=89 => Grade::B,
            70..=79 => Grade::C,
            60..=69 => Grade::D,
            _ => Grade::F,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QualityScore {
    pub overall: u8,
    pub screenshots: u8,
    pub assignments: u8,
    pub grade: Grade,
}

fn to_score(value: f64) -> u8 {
    value.clamp(0.0, 100.0).round() as u8
}

/// Scores out of 100. Files on disk weigh 3 and feature assignments 4 in the
/// overall figure. Nothing to score gives 0.
pub fn quality_score(screens: &ScreenshotQuality, matrix: &MatrixQuality) -> QualityScore {
    let total = screens.total_screenshots as f64;
    let (screenshots, assignments) = if screens.total_screenshots == 0 {
        (0.0, 0.0)
    } else {
        let present = (total - screens.missing_files as f64) / total * 100.0;
        let assigned = screens.valid_assignments as f64 / total * 100.0;
        let orphan_penalty = screens.orphans as f64 / total * 30.0;
        let inconsistency_penalty = (matrix.inconsistent_flags as f64 / total * 50.0).min(30.0);
        (present, assigned - orphan_penalty - inconsistency_penalty)
    };
    let overall = to_score((screenshots * 3.0 + assignments.max(0.0) * 4.0) / 7.0);
    QualityScore {
        overall,
        screenshots: to_score(screenshots),
        assignments: to_score(assignments),
        grade: Grade::for_score(overall),
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Issue {
    pub severity: Severity,
    pub category: &'static str,
    pub message: String,
    pub count: usize,
}

/// Problems worth a look, most severe first. Empty when the data is clean.
pub fn issues(screens: &ScreenshotQuality, matrix: &MatrixQuality) -> Vec<Issue> {
    let candidates = [
        (
            Severity::Critical,
            "files",
            screens.missing_files,
            "screenshot files are missing from the uploads directory",
        ),
        (
            Severity::Warning,
            "assignments",
            screens.orphans,
            "screenshots are not assigned to any feature",
        ),
        (
            Severity::Warning,
            "consistency",
            matrix.inconsistent_flags,
            "competitor-feature cells have screenshots but are marked absent",
        ),
        (
            Severity::Warning,
            "relationships",
            matrix.screenshot_mismatches.len(),
            "screenshots disagree with the matrix",
        ),
        (
            Severity::Info,
            "coverage",
            matrix.missing_screenshots.len(),
            "feature implementations lack screenshots",
        ),
    ];
    candidates
        .into_iter()
        .filter(|(_, _, count, _)| *count > 0)
        .map(|(severity, category, count, what)| Issue {
            severity,
            category,
            message: format!("{count} {what}"),
            count,
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DataQualityOverview {
    pub quality_score: QualityScore,
    pub screenshots: ScreenshotQuality,
    pub matrix: MatrixQuality,
}

pub fn overview(screens: ScreenshotQuality, matrix: MatrixQuality) -> DataQualityOverview {
    DataQualityOverview {
        quality_score: quality_score(&screens, &matrix),
        screenshots: screens,
        matrix,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::entities::{CellUpsert, NewScreenshot, Region, UploadSource};
    use crate::database_ops::{CatalogStore, MemoryStore};

    async fn shoot(store: &MemoryStore, competitor_id: Uuid, feature_id: Option<Uuid>, name: &str) -> Screenshot {
        store
            .insert_screenshot(&NewScreenshot {
                competitor_id,
                feature_id,
                file_path: format!("uploads/screenshots/x/{name}"),
                file_name: name.to_string(),
                file_size: 1,
                mime_type: "image/png".into(),
                cdn_url: None,
                is_onboarding: false,
                upload_source: UploadSource::Manual,
            })
            .await
            .unwrap()
    }

    async fn mark(store: &MemoryStore, competitor_id: Uuid, feature_id: Uuid, has_feature: bool) {
        store
            .upsert_competitor_feature(&CellUpsert {
                competitor_id,
                feature_id,
                has_feature,
                implementation_quality: None,
                notes: None,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn matrix_and_screenshots_disagreements_are_reported() {
        let store = MemoryStore::new();
        let btc = store.add_competitor("BTCTurk", Some(Region::Tr));
        let kraken = store.add_competitor("Kraken", Some(Region::Global));
        let app = store.add_feature("Mobile App", None);
        let convert = store.add_feature("Convert", None);
        let referral = store.add_feature("Referral", None);

        // backed by evidence
        mark(&store, btc.id, app.id, true).await;
        shoot(&store, btc.id, Some(app.id), "app.png").await;
        // claimed without evidence
        mark(&store, kraken.id, app.id, true).await;
        // evidence on a cell marked absent
        mark(&store, btc.id, convert.id, false).await;
        let flagged = shoot(&store, btc.id, Some(convert.id), "convert.png").await;
        // evidence with no cell at all
        let stray = shoot(&store, kraken.id, Some(referral.id), "ref.png").await;
        let orphan = shoot(&store, kraken.id, None, "misc.png").await;

        let competitors = store.competitors().await.unwrap();
        let features = store.features().await.unwrap();
        let cells = store.competitor_features().await.unwrap();
        let screenshots = store.screenshots().await.unwrap();
        let catalog = Catalog::new(&competitors, &features, &cells);

        let matrix = validate_matrix(&catalog, &screenshots, &evidence_counts(&screenshots));
        assert_eq!(matrix.total_relationships, 3);
        assert_eq!(matrix.inconsistent_flags, 1);
        assert_eq!(matrix.missing_screenshots.len(), 1);
        assert_eq!(matrix.missing_screenshots[0].competitor_name, "Kraken");
        assert_eq!(matrix.missing_screenshots[0].feature_name, "Mobile App");

        let kinds: Vec<(Uuid, MismatchKind)> = matrix
            .screenshot_mismatches
            .iter()
            .map(|m| (m.screenshot_id, m.issue))
            .collect();
        assert_eq!(kinds.len(), 2);
        assert!(kinds.contains(&(flagged.id, MismatchKind::InconsistentFlag)));
        assert!(kinds.contains(&(stray.id, MismatchKind::MissingRelationship)));

        let screens = validate_screenshots(&screenshots, &HashSet::from([orphan.id]));
        assert_eq!(screens.total_screenshots, 4);
        assert_eq!(screens.valid_assignments, 3);
        assert_eq!(screens.orphans, 1);
        assert_eq!(screens.missing_files, 1);

        let found = issues(&screens, &matrix);
        let categories: Vec<&str> = found.iter().map(|i| i.category).collect();
        assert_eq!(
            categories,
            vec!["files", "assignments", "consistency", "relationships", "coverage"]
        );
        assert_eq!(found[0].severity, Severity::Critical);
        assert_eq!(found[3].count, 2);
        assert_eq!(found[4].message, "1 feature implementations lack screenshots");
    }

    #[test]
    fn clean_data_scores_an_a_without_issues() {
        let screens = ScreenshotQuality {
            total_screenshots: 10,
            valid_assignments: 10,
            orphans: 0,
            missing_files: 0,
        };
        let matrix = MatrixQuality::default();
        let score = quality_score(&screens, &matrix);
        assert_eq!(score.overall, 100);
        assert_eq!(score.grade, Grade::A);
        assert!(issues(&screens, &matrix).is_empty());
    }

    #[test]
    fn penalties_lower_the_score() {
        let screens = ScreenshotQuality {
            total_screenshots: 10,
            valid_assignments: 5,
            orphans: 5,
            missing_files: 2,
        };
        let matrix = MatrixQuality {
            inconsistent_flags: 10,
            ..MatrixQuality::default()
        };
        let score = quality_score(&screens, &matrix);
        assert_eq!(score.screenshots, 80);
        // 50 assigned - 15 orphan penalty - 30 capped inconsistency penalty
        assert_eq!(score.assignments, 5);
        // (80 * 3 + 5 * 4) / 7 = 37.1
        assert_eq!(score.overall, 37);
        assert_eq!(score.grade, Grade::F);
    }

    #[test]
    fn empty_catalog_scores_zero() {
        let score = quality_score(&ScreenshotQuality::default(), &MatrixQuality::default());
        assert_eq!(score.overall, 0);
        assert_eq!(score.grade, Grade::F);
        assert_eq!(Grade::for_score(85), Grade::B);
        assert_eq!(Grade::for_score(60), Grade::D);
    }
}
