//! Physical LED mapping loader and routing table (spec component C1).
//!
//! The CSV encodes a physical LED grid of `2*height` rows by `width`
//! columns; each populated cell holds the 1-based LED index. The logical
//! (visual) grid is half the physical height — the "stagger" that encodes a
//! hexagonally offset LED layout (spec §4.1, GLOSSARY "Stagger").

use std::collections::HashMap;
use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("failed to read mapping csv {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: csv::Error,
    },
}

/// Parallel source/destination index arrays consumed by the writer's
/// scatter step.
#[derive(Debug, Clone)]
pub struct RoutingTable {
    pub src_indices: Vec<u32>,
    pub dst_indices: Vec<u32>,
}

impl RoutingTable {
    pub fn len(&self) -> usize {
        self.src_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.src_indices.is_empty()
    }

    /// A 1:1 mapping of the logical grid onto itself, used whenever the CSV
    /// is absent, unreadable, or yields zero usable entries.
    pub fn identity(width: usize, height: usize) -> Self {
        let total = width * height;
        let indices: Vec<u32> = (0..total as u32).collect();
        Self {
            src_indices: indices.clone(),
            dst_indices: indices,
        }
    }
}

/// Parse the mapping CSV, if any, and build a routing table. Never fails:
/// any problem (missing file, IO error, malformed cells) degrades to the
/// identity mapping, logged at `warn`, per spec §4.1's failure-mode table.
pub fn load(csv_path: Option<&Path>, width: usize, height: usize) -> RoutingTable {
    let total_leds = width * height;

    let grid = match csv_path {
        Some(path) => match read_grid(path) {
            Ok(grid) => grid,
            Err(err) => {
                tracing::warn!(error = %err, "mapping_csv_unreadable_using_identity");
                HashMap::new()
            }
        },
        None => HashMap::new(),
    };

    if grid.is_empty() {
        if csv_path.is_some() {
            tracing::warn!("mapping_csv_missing_or_empty_using_identity");
        }
        return RoutingTable::identity(width, height);
    }

    let mut src_indices = Vec::with_capacity(total_leds);
    let mut dst_indices = Vec::with_capacity(total_leds);

    for visual_row in 0..height {
        for visual_col in 0..width {
            let mut physical_row = if visual_col % 2 == 0 {
                visual_row * 2
            } else {
                visual_row * 2 + 1
            };
            physical_row = physical_row.min(2 * height - 1);

            let Some(&pixel_idx) = grid.get(&(physical_row, visual_col)) else {
                continue;
            };
            if pixel_idx >= total_leds {
                continue;
            }
            src_indices.push((visual_row * width + visual_col) as u32);
            dst_indices.push(pixel_idx as u32);
        }
    }

    if src_indices.is_empty() {
        tracing::warn!("mapping_csv_yielded_no_entries_using_identity");
        return RoutingTable::identity(width, height);
    }

    RoutingTable {
        src_indices,
        dst_indices,
    }
}

/// Read the raw CSV into a `(row, col) -> 0-based LED index` table. Blank
/// or non-numeric cells are skipped individually; a non-positive value
/// (after the 1-based -> 0-based shift) is also skipped.
fn read_grid(path: &Path) -> Result<HashMap<(usize, usize), usize>, MappingError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|source| MappingError::Io {
            path: path.display().to_string(),
            source,
        })?;

    let mut grid = HashMap::new();
    for (row_idx, record) in reader.records().enumerate() {
        let record = record.map_err(|source| MappingError::Io {
            path: path.display().to_string(),
            source,
        })?;
        for (col_idx, cell) in record.iter().enumerate() {
            let trimmed = cell.trim();
            if trimmed.is_empty() {
                continue;
            }
            let Ok(raw) = trimmed.parse::<i64>() else {
                continue;
            };
            let pixel_index = raw - 1;
            if pixel_index < 0 {
                continue;
            }
            grid.insert((row_idx, col_idx), pixel_index as usize);
        }
    }
    Ok(grid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_falls_back_to_identity() {
        let table = load(Some(Path::new("/nonexistent/mapping.csv")), 2, 2);
        assert_eq!(table.src_indices, vec![0, 1, 2, 3]);
        assert_eq!(table.dst_indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn no_path_falls_back_to_identity() {
        let table = load(None, 3, 3);
        assert_eq!(table.len(), 9);
        assert!(table.dst_indices.iter().all(|&d| (d as usize) < 9));
    }

    #[test]
    fn stagger_selects_correct_physical_row() {
        // height=2, width=2: physical grid has 4 rows, 2 cols.
        // row0="1,2" row1="3,4" row2="5,6" row3="7,8"
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "1,2").unwrap();
        writeln!(file, "3,4").unwrap();
        writeln!(file, "5,6").unwrap();
        writeln!(file, "7,8").unwrap();

        let table = load(Some(file.path()), 2, 2);
        // visual (0,0): even col -> physical row 0 -> LED 1 (0-based 0)
        // visual (0,1): odd col -> physical row 1 -> LED 4 (0-based 3)
        // visual (1,0): even col -> physical row 2 -> LED 5 (0-based 4)
        // visual (1,1): odd col -> physical row 3 -> LED 8 (0-based 7)
        let mut pairs: Vec<(u32, u32)> = table
            .src_indices
            .iter()
            .copied()
            .zip(table.dst_indices.iter().copied())
            .collect();
        pairs.sort();
        assert_eq!(pairs, vec![(0, 0), (1, 3), (2, 4), (3, 7)]);
    }

    #[test]
    fn malformed_cells_are_skipped_not_fatal() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "abc,2").unwrap();
        writeln!(file, ",4").unwrap();
        writeln!(file, "5,6").unwrap();
        writeln!(file, "7,8").unwrap();

        let table = load(Some(file.path()), 2, 2);
        assert!(!table.is_empty());
    }

    #[test]
    fn out_of_range_pixel_index_is_excluded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "100,2").unwrap();
        writeln!(file, "3,4").unwrap();
        writeln!(file, "5,6").unwrap();
        writeln!(file, "7,8").unwrap();

        let table = load(Some(file.path()), 2, 2);
        assert!(table.dst_indices.iter().all(|&d| (d as usize) < 4));
    }
}
