//! Admin commands behind the `lens` binary. Each command has a config struct
//! and a `run` entry point; reports are printed to stdout as JSON.

pub mod cleanup_storage;
pub mod db_counts;
pub mod import_matrix;
pub mod legacy_screenshots;
pub mod migrate;
pub mod populate_regions;
pub mod sync_screenshots;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::config::AppConfig;
use crate::database_ops::Db;
use crate::util::env as env_util;

/// Connects without running migrations; admin commands never change the schema
/// implicitly.
pub(crate) async fn connect(database_url: Option<String>) -> Result<Db> {
    env_util::init_env();
    let config = AppConfig::from_env();
    let url = match database_url.or(config.database_url) {
        Some(url) => url,
        None => env_util::db_url()?,
    };
    Db::connect_no_migrate(&url, config.max_connections.min(5)).await
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Summary<'a, T: Serialize> {
    command: &'a str,
    dry_run: bool,
    report: &'a T,
}

pub(crate) fn print_report<T: Serialize>(command: &str, dry_run: bool, report: &T) -> Result<()> {
    let summary = Summary {
        command,
        dry_run,
        report,
    };
    let out = serde_json::to_string_pretty(&summary).context("serializing report")?;
    println!("{out}");
    Ok(())
}
