//! Reads the first worksheet of an `.xlsx`/`.xls`/`.ods` workbook, or a
//! `.csv` file, into a grid of trimmed strings.

use anyhow::{anyhow, bail, Context, Result};
use calamine::{open_workbook_auto, open_workbook_auto_from_rs, Data, Range, Reader};
use std::io::Cursor;
use std::path::Path;

pub type Grid = Vec<Vec<String>>;

/// Extensions accepted for matrix files.
pub const MATRIX_EXTENSIONS: [&str; 5] = ["csv", "xlsx", "xlsm", "xls", "ods"];

fn extension(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

pub fn read_grid(path: &Path) -> Result<Grid> {
    match extension(&path.to_string_lossy()).as_str() {
        "csv" => {
            let reader = csv::ReaderBuilder::new()
                .has_headers(false)
                .flexible(true)
                .from_path(path)
                .with_context(|| format!("opening {}", path.display()))?;
            csv_grid(reader).with_context(|| format!("reading {}", path.display()))
        }
        "xlsx" | "xlsm" | "xls" | "ods" => {
            let mut workbook =
                open_workbook_auto(path).with_context(|| format!("opening {}", path.display()))?;
            let range = workbook
                .worksheet_range_at(0)
                .ok_or_else(|| anyhow!("{} has no worksheets", path.display()))?
                .with_context(|| format!("reading first worksheet of {}", path.display()))?;
            Ok(range_grid(&range))
        }
        other => bail!("unsupported matrix file extension '{other}' ({})", path.display()),
    }
}

/// Same as [`read_grid`] for an uploaded file held in memory; `file_name`
/// only selects the format.
pub fn read_grid_bytes(file_name: &str, bytes: Vec<u8>) -> Result<Grid> {
    match extension(file_name).as_str() {
        "csv" => {
            let reader = csv::ReaderBuilder::new()
                .has_headers(false)
                .flexible(true)
                .from_reader(Cursor::new(bytes));
            csv_grid(reader).with_context(|| format!("reading {file_name}"))
        }
        "xlsx" | "xlsm" | "xls" | "ods" => {
            let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
                .with_context(|| format!("opening {file_name}"))?;
            let range = workbook
                .worksheet_range_at(0)
                .ok_or_else(|| anyhow!("{file_name} has no worksheets"))?
                .with_context(|| format!("reading first worksheet of {file_name}"))?;
            Ok(range_grid(&range))
        }
        other => bail!("unsupported matrix file extension '{other}' ({file_name})"),
    }
}

fn csv_grid<R: std::io::Read>(mut reader: csv::Reader<R>) -> Result<Grid> {
    let mut grid = Vec::new();
    for record in reader.records() {
        let record = record?;
        grid.push(record.iter().map(|c| c.trim().to_string()).collect());
    }
    Ok(grid)
}

fn range_grid(range: &Range<Data>) -> Grid {
    range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect()
}

/// Spreadsheet cell as the text a person would read in it. Whole floats drop
/// the fraction so a `1` typed into Excel compares equal to `"1"`.
pub fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        other => other.to_string().trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_cells_render_like_typed_text() {
        assert_eq!(cell_text(&Data::Float(1.0)), "1");
        assert_eq!(cell_text(&Data::Float(0.5)), "0.5");
        assert_eq!(cell_text(&Data::Int(1)), "1");
        assert_eq!(cell_text(&Data::Bool(true)), "true");
        assert_eq!(cell_text(&Data::String("  Var ".into())), "Var");
        assert_eq!(cell_text(&Data::Empty), "");
    }

    #[test]
    fn csv_grid_is_trimmed_and_ragged_rows_survive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matrix.csv");
        std::fs::write(&path, "Competitor, Mobile App ,Convert\nBTCTurk,VAR\n").unwrap();
        let grid = read_grid(&path).unwrap();
        assert_eq!(grid[0], vec!["Competitor", "Mobile App", "Convert"]);
        assert_eq!(grid[1], vec!["BTCTurk", "VAR"]);
    }

    #[test]
    fn uploaded_csv_bytes_read_like_a_file() {
        let grid = read_grid_bytes("Matrix.CSV", b"Competitor,Mobile App\nParibu, yes \n".to_vec()).unwrap();
        assert_eq!(grid, vec![vec!["Competitor", "Mobile App"], vec!["Paribu", "yes"]]);
    }

    #[test]
    fn unknown_extension_is_rejected() {
        assert!(read_grid(Path::new("matrix.pdf")).is_err());
        assert!(read_grid_bytes("matrix.pdf", Vec::new()).is_err());
        assert!(read_grid_bytes("not a workbook.xlsx", b"plain text".to_vec()).is_err());
    }
}
