pub mod catalog;
pub mod db;
pub mod entities;
pub mod file_scan;
pub mod legacy_migration;
pub mod matrix_import;
pub mod memory;
pub mod object_store;
pub mod regions;
pub mod screenshot_sync;
pub mod spreadsheet;
pub mod storage_cleanup;
pub mod store;

pub use db::Db;
pub use memory::MemoryStore;
pub use store::CatalogStore;
