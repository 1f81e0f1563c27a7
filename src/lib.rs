pub mod analytics;
pub mod api;
pub mod cli;
pub mod config;
pub mod database_ops;
pub mod normalization;
pub mod tracing;

pub mod util {
    pub mod env;
}
