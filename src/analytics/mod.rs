pub mod coverage;
pub mod data_quality;
pub mod matrix;

pub use coverage::{Catalog, CoverageReport, GapEntry, Heatmap};
pub use matrix::{build_matrix, export_csv, MatrixView};
