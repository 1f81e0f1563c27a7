use actix_multipart::Multipart;
use actix_web::web;
use serde::Serialize;

use super::{created, HandlerResult};
use crate::api::error::ApiError;
use crate::api::uploads::{read_form, FileKind};
use crate::database_ops::matrix_import::{import_matrix, ImportOptions, ImportReport, MatrixSheet};
use crate::database_ops::{CatalogStore, Db, MemoryStore};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatrixUploadResult {
    pub file_name: String,
    pub file_size: usize,
    pub dry_run: bool,
    pub import_result: ImportReport,
}

/// Multipart form: `excel` (workbook or CSV) and optional `dryRun`. Runs the
/// same import as `lens import-matrix`.
pub async fn upload_matrix(db: web::Data<Db>, payload: Multipart) -> HandlerResult {
    let mut form = read_form(payload, "excel", FileKind::Spreadsheet).await?;
    let dry_run = form.parsed::<bool>("dryRun")?.unwrap_or(false);
    let file = form
        .file
        .take()
        .ok_or_else(|| ApiError::BadRequest("no file uploaded in field 'excel'".into()))?;

    let file_name = file.original_name.clone();
    let file_size = file.bytes.len();
    let sheet = web::block(move || MatrixSheet::from_bytes(&file.original_name, file.bytes))
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("matrix parser stopped: {e}")))?
        .map_err(|e| ApiError::BadRequest(format!("{e:#}")))?;

    let opts = ImportOptions::default();
    let report = if dry_run {
        let snapshot = MemoryStore::snapshot(db.get_ref()).await?;
        import_matrix(&snapshot as &dyn CatalogStore, &sheet, &opts).await?
    } else {
        import_matrix(db.get_ref(), &sheet, &opts).await?
    };
    tracing::info!(
        file = %file_name,
        upserted = report.upserted,
        errors = report.errors,
        dry_run,
        "matrix upload imported"
    );

    created(MatrixUploadResult {
        file_name,
        file_size,
        dry_run,
        import_result: report,
    })
}
