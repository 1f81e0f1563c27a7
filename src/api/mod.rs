// HTTP API for the competitor feature matrix: catalog CRUD, matrix editing,
// screenshot galleries and coverage analytics.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod rate_limit;
pub mod routes;
pub mod server;
pub mod uploads;

pub use error::ApiError;
pub use server::{build_upload_storage, ApiServer};
