//! Region backfill: assigns TR/Global to competitors from the Turkish
//! exchange list.

use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

use super::store::CatalogStore;
use crate::normalization::region::region_for;

#[derive(Debug, Clone, Default, Serialize)]
pub struct RegionReport {
    pub competitors: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub errors: usize,
    /// Competitor count per region after the run.
    pub distribution: BTreeMap<String, usize>,
}

/// Sets every competitor's region from its name. Competitors already in the
/// right region are left alone.
pub async fn populate_regions(store: &dyn CatalogStore, dry_run: bool) -> Result<RegionReport> {
    let competitors = store.competitors().await?;
    let mut report = RegionReport {
        competitors: competitors.len(),
        ..RegionReport::default()
    };

    for competitor in &competitors {
        let region = region_for(&competitor.name);
        *report
            .distribution
            .entry(region.to_string())
            .or_default() += 1;
        if competitor.region == Some(region) {
            report.unchanged += 1;
            continue;
        }
        info!(competitor = %competitor.name, from = ?competitor.region, to = %region, dry_run, "region change");
        if dry_run {
            report.updated += 1;
            continue;
        }
        match store.set_competitor_region(competitor.id, region).await {
            Ok(()) => report.updated += 1,
            Err(err) => {
                report.errors += 1;
                warn!(competitor = %competitor.name, error = %err, "region update failed");
            }
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::entities::Region;
    use crate::database_ops::memory::MemoryStore;

    #[tokio::test]
    async fn assigns_regions_and_is_idempotent() {
        let store = MemoryStore::new();
        store.add_competitor("Binance TR", None);
        store.add_competitor("Coinbase", Some(Region::Tr));
        store.add_competitor("Paribu", Some(Region::Tr));

        let first = populate_regions(&store, false).await.unwrap();
        assert_eq!(first.updated, 2);
        assert_eq!(first.unchanged, 1);
        assert_eq!(first.distribution.get("TR"), Some(&2));
        assert_eq!(first.distribution.get("Global"), Some(&1));

        let coinbase = store
            .competitors()
            .await
            .unwrap()
            .into_iter()
            .find(|c| c.name == "Coinbase")
            .unwrap();
        assert_eq!(coinbase.region, Some(Region::Global));

        let second = populate_regions(&store, false).await.unwrap();
        assert_eq!(second.updated, 0);
    }

    #[tokio::test]
    async fn dry_run_reports_without_writing() {
        let store = MemoryStore::new();
        store.add_competitor("BTC Turk", None);
        let report = populate_regions(&store, true).await.unwrap();
        assert_eq!(report.updated, 1);
        assert_eq!(store.competitors().await.unwrap()[0].region, None);
    }
}
