// Admin CLI for competitor-lens: schema migrations, matrix import, screenshot
// reconciliation and data maintenance.

use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Args, Parser, Subcommand};
use competitor_lens::cli::{
    cleanup_storage::{self, CleanupStorageConfig},
    db_counts::{self, DbCountsConfig},
    import_matrix::{self, ImportMatrixConfig},
    legacy_screenshots::{self, LegacyScreenshotsConfig},
    migrate::{self, MigrateConfig},
    populate_regions::{self, PopulateRegionsConfig},
    sync_screenshots::{self, SyncScreenshotsConfig},
};
use competitor_lens::database_ops::entities::ImplementationQuality;
use competitor_lens::tracing::{init_tracing, LogStyle};
use competitor_lens::util::env as env_util;

#[derive(Parser, Debug)]
#[command(name = "lens", version, about = "Competitor feature matrix admin commands")]
struct Cli {
    /// Postgres connection string (defaults to DATABASE_URL)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Default, Args)]
struct DryRun {
    /// Plan against an in-memory snapshot; nothing is written
    #[arg(long = "dry-run", action = ArgAction::SetTrue)]
    dry_run: bool,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Command {
    /// Apply pending SQL migrations
    Migrate,
    /// Import a competitor x feature spreadsheet (xlsx, xls, ods or csv)
    ImportMatrix {
        file: PathBuf,
        /// Quality written to every imported cell (excellent, good, fair, none)
        #[arg(long)]
        quality: Option<ImplementationQuality>,
        /// Notes written to every imported cell
        #[arg(long)]
        notes: Option<String>,
        #[command(flatten)]
        dry: DryRun,
    },
    /// Register screenshot files as database rows
    SyncScreenshots {
        /// Local screenshots directory (defaults to $UPLOADS_DIR/screenshots)
        #[arg(long, conflicts_with = "remote")]
        root: Option<PathBuf>,
        /// Use the S3 bucket listing instead of the local tree
        #[arg(long, action = ArgAction::SetTrue)]
        remote: bool,
        /// JSON keyword rules file: [{"pattern": "...", "feature": "..."}]
        #[arg(long)]
        rules: Option<PathBuf>,
        /// Delete rows whose local file no longer exists
        #[arg(long, action = ArgAction::SetTrue)]
        prune: bool,
        /// Set has_feature on every pair that has screenshot evidence
        #[arg(long = "mark-evidence", action = ArgAction::SetTrue)]
        mark_evidence: bool,
        #[command(flatten)]
        dry: DryRun,
    },
    /// Align screenshot rows with the S3 bucket (rows only, never objects)
    CleanupStorage {
        #[arg(long, default_value_t = 100)]
        chunk_size: usize,
        #[arg(long = "chunk-delay-ms", default_value_t = 500)]
        chunk_delay_ms: u64,
        #[command(flatten)]
        dry: DryRun,
    },
    /// Assign TR/Global regions from the Turkish exchange list
    PopulateRegions {
        #[command(flatten)]
        dry: DryRun,
    },
    /// Copy v1 feature screenshots into the screenshots table
    MigrateLegacyScreenshots {
        #[command(flatten)]
        dry: DryRun,
    },
    /// Print row counts for every catalog table
    DbCounts,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing("info,sqlx=warn", LogStyle::Cli)?;
    env_util::bootstrap_cli("lens");

    let database_url = cli.database_url;
    match cli.command {
        Command::Migrate => migrate::run(MigrateConfig { database_url }).await,
        Command::ImportMatrix {
            file,
            quality,
            notes,
            dry,
        } => {
            import_matrix::run(ImportMatrixConfig {
                database_url,
                file,
                dry_run: dry.dry_run,
                quality,
                notes,
            })
            .await
        }
        Command::SyncScreenshots {
            root,
            remote,
            rules,
            prune,
            mark_evidence,
            dry,
        } => {
            sync_screenshots::run(SyncScreenshotsConfig {
                database_url,
                root,
                remote,
                rules,
                prune,
                mark_evidence,
                dry_run: dry.dry_run,
            })
            .await
        }
        Command::CleanupStorage {
            chunk_size,
            chunk_delay_ms,
            dry,
        } => {
            cleanup_storage::run(CleanupStorageConfig {
                database_url,
                dry_run: dry.dry_run,
                chunk_size,
                chunk_delay_ms,
            })
            .await
        }
        Command::PopulateRegions { dry } => {
            populate_regions::run(PopulateRegionsConfig {
                database_url,
                dry_run: dry.dry_run,
            })
            .await
        }
        Command::MigrateLegacyScreenshots { dry } => {
            legacy_screenshots::run(LegacyScreenshotsConfig {
                database_url,
                dry_run: dry.dry_run,
            })
            .await
        }
        Command::DbCounts => db_counts::run(DbCountsConfig { database_url }).await,
    }
}
