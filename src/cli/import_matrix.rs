use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::info;

use crate::database_ops::entities::ImplementationQuality;
use crate::database_ops::matrix_import::{import_matrix, ImportOptions, MatrixSheet};
use crate::database_ops::{CatalogStore, MemoryStore};

#[derive(Debug, Clone)]
pub struct ImportMatrixConfig {
    pub database_url: Option<String>,
    /// `.xlsx`, `.xls`, `.ods` or `.csv`.
    pub file: PathBuf,
    pub dry_run: bool,
    pub quality: Option<ImplementationQuality>,
    pub notes: Option<String>,
}

pub async fn run(cfg: ImportMatrixConfig) -> Result<()> {
    let sheet = MatrixSheet::from_path(&cfg.file)
        .with_context(|| format!("reading matrix {}", cfg.file.display()))?;
    info!(
        file = %cfg.file.display(),
        rows = sheet.rows.len(),
        features = sheet.features.len(),
        dry_run = cfg.dry_run,
        "matrix loaded"
    );

    let db = super::connect(cfg.database_url.clone()).await?;
    let opts = ImportOptions {
        quality_override: cfg.quality,
        notes_override: cfg.notes.clone(),
    };

    let report = if cfg.dry_run {
        let snapshot = MemoryStore::snapshot(&db).await?;
        import_matrix(&snapshot as &dyn CatalogStore, &sheet, &opts).await?
    } else {
        import_matrix(&db, &sheet, &opts).await?
    };

    super::print_report("import-matrix", cfg.dry_run, &report)?;
    db.close().await;
    Ok(())
}
