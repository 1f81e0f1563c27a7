use anyhow::{Context, Result};
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions, PgSslMode},
    PgPool, Row,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::util::env as env_util;

#[derive(Clone)]
pub struct Db {
    pub pool: PgPool,
}

impl Db {
    // SECURITY: never include raw DSNs in tracing spans (they may contain credentials).
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let db = Self::connect_no_migrate(database_url, max_connections).await?;
        // Default off: the service must be able to start against a schema managed elsewhere.
        if env_util::env_flag("AUTO_MIGRATE", false) {
            info!("running migrations (AUTO_MIGRATE=on)");
            db.run_migrations().await?;
        } else {
            info!("AUTO_MIGRATE disabled; skipping migrations");
        }
        Ok(db)
    }

    /// Variant that never runs migrations regardless of env (admin data paths).
    #[instrument(skip(database_url))]
    pub async fn connect_no_migrate(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = Self::pool_options(max_connections)
            .connect_with(Self::connect_options(database_url)?)
            .await
            .context("connecting to postgres")?;
        info!(max_connections, "connected to db");
        Ok(Self { pool })
    }

    /// Pool that opens connections on first use. Handler tests use it to
    /// exercise request paths that are rejected before touching the database.
    pub fn connect_lazy(database_url: &str) -> Result<Self> {
        let pool = Self::pool_options(1).connect_lazy_with(Self::connect_options(database_url)?);
        Ok(Self { pool })
    }

    fn connect_options(database_url: &str) -> Result<PgConnectOptions> {
        let mut options = PgConnectOptions::from_str(database_url)?;
        if database_url.contains("sslmode=require") {
            options = options.ssl_mode(PgSslMode::Require);
        }
        // PgBouncer transaction mode has no prepared statement affinity.
        if !env_util::env_flag("USE_PREPARED", false) {
            options = options.statement_cache_capacity(0);
        }
        Ok(options)
    }

    fn pool_options(max_connections: u32) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
    }

    pub async fn ping(&self) -> bool {
        sqlx::query_scalar::<_, bool>("SELECT true")
            .fetch_one(&self.pool)
            .await
            .is_ok()
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("db pool closed");
    }
}

/// A numbered `NNNN_description.sql` file in the migrations directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    pub version: i64,
    pub description: String,
    pub path: PathBuf,
}

/// Parses `0003_add_index.sql` into `(3, "add_index")`. Files without a
/// numeric prefix (e.g. `database_settings.sql`) are not migrations.
pub fn parse_migration_name(file_name: &str) -> Option<(i64, String)> {
    let stem = file_name.strip_suffix(".sql")?;
    let digits: String = stem.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    let description = stem[digits.len()..].strip_prefix('_')?;
    Some((digits.parse().ok()?, description.to_string()))
}

pub fn discover_migrations(dir: &Path) -> Result<Vec<MigrationFile>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
            continue;
        };
        if let Some((version, description)) = parse_migration_name(name) {
            files.push(MigrationFile {
                version,
                description,
                path,
            });
        }
    }
    files.sort_by_key(|m| m.version);
    Ok(files)
}

impl Db {
    /// Lightweight numbered-file runner. Each pending file runs in its own
    /// transaction together with its bookkeeping row.
    pub async fn run_migrations(&self) -> Result<usize> {
        let dir = env_util::env_opt("MIGRATIONS_DIR").unwrap_or_else(|| "./migrations".into());
        let candidates = discover_migrations(Path::new(&dir))?;
        if candidates.is_empty() {
            warn!(dir = %dir, "no migration files found");
            return Ok(0);
        }

        sqlx::raw_sql(
            "CREATE TABLE IF NOT EXISTS _lens_migrations (
                version BIGINT PRIMARY KEY,
                description TEXT,
                installed_at TIMESTAMPTZ DEFAULT now()
             )",
        )
        .execute(&self.pool)
        .await?;

        let mut applied: HashSet<i64> = HashSet::new();
        for row in sqlx::raw_sql("SELECT version FROM _lens_migrations")
            .fetch_all(&self.pool)
            .await?
        {
            applied.insert(row.try_get::<i64, _>(0)?);
        }

        let mut ran = 0usize;
        for migration in candidates {
            if !applied.insert(migration.version) {
                continue;
            }
            let sql = std::fs::read_to_string(&migration.path)
                .with_context(|| format!("reading {}", migration.path.display()))?;
            info!(version = migration.version, file = ?migration.path, "applying migration");

            let mut tx = self.pool.begin().await?;
            sqlx::raw_sql(&sql)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("migration {} failed", migration.version))?;
            sqlx::query("INSERT INTO _lens_migrations (version, description) VALUES ($1, $2)")
                .bind(migration.version)
                .bind(&migration.description)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            ran += 1;
        }

        let latest: Option<i64> = sqlx::query_scalar("SELECT max(version) FROM _lens_migrations")
            .fetch_one(&self.pool)
            .await?;
        info!(applied = ran, latest = latest.unwrap_or_default(), "migrations up-to-date");
        Ok(ran)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migration_names_need_numeric_prefix_and_sql_suffix() {
        assert_eq!(
            parse_migration_name("0001_catalog.sql"),
            Some((1, "catalog".to_string()))
        );
        assert_eq!(
            parse_migration_name("0012_add_screenshot_index.sql"),
            Some((12, "add_screenshot_index".to_string()))
        );
        assert_eq!(parse_migration_name("database_settings.sql"), None);
        assert_eq!(parse_migration_name("0003_notes.txt"), None);
        assert_eq!(parse_migration_name("0004.sql"), None);
    }

    #[test]
    fn discovery_sorts_by_version_and_ignores_strays() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["0002_b.sql", "0001_a.sql", "README.md", "seed.sql"] {
            std::fs::write(dir.path().join(name), "SELECT 1;").unwrap();
        }
        let found = discover_migrations(dir.path()).unwrap();
        let versions: Vec<i64> = found.iter().map(|m| m.version).collect();
        assert_eq!(versions, vec![1, 2]);
        assert_eq!(found[0].description, "a");
    }

    #[test]
    fn repository_migrations_are_discoverable() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations");
        let found = discover_migrations(&dir).unwrap();
        assert!(found.len() >= 2);
        assert_eq!(found[0].version, 1);
    }
}
