use anyhow::Result;
use serde_json::{json, Map, Value};
use sqlx::Row;

#[derive(Debug, Clone, Default)]
pub struct DbCountsConfig {
    /// Optional override for the Postgres connection string.
    pub database_url: Option<String>,
}

fn is_undefined_table_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some("42P01"),
        _ => false,
    }
}

/// Row counts per catalog table plus the screenshot and region breakdowns.
pub async fn run(cfg: DbCountsConfig) -> Result<()> {
    let db = super::connect(cfg.database_url).await?;
    let pool = &db.pool;

    // Tables that do not exist yet (fresh database) count as zero.
    macro_rules! count {
        ($sql:expr) => {
            match sqlx::query_scalar::<_, i64>($sql)
                .persistent(false)
                .fetch_one(pool)
                .await
            {
                Ok(val) => val,
                Err(e) if is_undefined_table_error(&e) => 0,
                Err(e) => return Err(e.into()),
            }
        };
    }

    let competitors = count!("SELECT COUNT(*)::BIGINT FROM competitors");
    let features = count!("SELECT COUNT(*)::BIGINT FROM features");
    let cells = count!("SELECT COUNT(*)::BIGINT FROM competitor_features");
    let implemented = count!("SELECT COUNT(*)::BIGINT FROM competitor_features WHERE has_feature");
    let screenshots = count!("SELECT COUNT(*)::BIGINT FROM screenshots");
    let orphans = count!("SELECT COUNT(*)::BIGINT FROM screenshots WHERE feature_id IS NULL");
    let onboarding_rows = count!("SELECT COUNT(*)::BIGINT FROM screenshots WHERE is_onboarding");
    let with_cdn = count!("SELECT COUNT(*)::BIGINT FROM screenshots WHERE cdn_url IS NOT NULL");
    let onboarding_steps = count!("SELECT COUNT(*)::BIGINT FROM onboarding_screenshots");
    let legacy = count!("SELECT COUNT(*)::BIGINT FROM competitor_feature_screenshots");

    let mut regions = Map::new();
    match sqlx::query(
        "SELECT COALESCE(region, 'unassigned') AS region, COUNT(*)::BIGINT AS n
           FROM competitors GROUP BY 1 ORDER BY 1",
    )
    .persistent(false)
    .fetch_all(pool)
    .await
    {
        Ok(rows) => {
            for row in rows {
                let region: String = row.get("region");
                let n: i64 = row.get("n");
                regions.insert(region, Value::from(n));
            }
        }
        Err(e) if is_undefined_table_error(&e) => {}
        Err(e) => return Err(e.into()),
    }

    let mut sources = Map::new();
    match sqlx::query(
        "SELECT upload_source, COUNT(*)::BIGINT AS n FROM screenshots GROUP BY 1 ORDER BY 1",
    )
    .persistent(false)
    .fetch_all(pool)
    .await
    {
        Ok(rows) => {
            for row in rows {
                let source: String = row.get("upload_source");
                let n: i64 = row.get("n");
                sources.insert(source, Value::from(n));
            }
        }
        Err(e) if is_undefined_table_error(&e) => {}
        Err(e) => return Err(e.into()),
    }

    let report = json!({
        "competitors": competitors,
        "competitorsByRegion": regions,
        "features": features,
        "matrixCells": cells,
        "implementedCells": implemented,
        "screenshots": {
            "total": screenshots,
            "orphans": orphans,
            "onboarding": onboarding_rows,
            "withCdnUrl": with_cdn,
            "bySource": sources,
        },
        "onboardingSteps": onboarding_steps,
        "legacyScreenshots": legacy,
    });
    tracing::info!(competitors, features, screenshots, "db counts collected");
    super::print_report("db-counts", false, &report)?;
    db.close().await;
    Ok(())
}
