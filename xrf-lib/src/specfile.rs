//! Reader for the tabulated "specfile" text format of the EPDL97/EADL97 data.
//!
//! A file is a sequence of scans. `#S <n> <title>` opens a scan, `#N` gives
//! the column count, `#L` lists the column labels separated by at least two
//! spaces and the numeric rows follow. Any other `#` line is a comment.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, XrfError};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Scan {
    pub number: usize,
    pub title: String,
    pub labels: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl Scan {
    fn new(number: usize, title: &str) -> Self {
        Scan {
            number,
            title: title.to_string(),
            labels: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// All values of one column.
    pub fn column(&self, index: usize) -> Vec<f64> {
        self.rows.iter().map(|row| row[index]).collect()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct SpecFile {
    path: PathBuf,
    scans: Vec<Scan>,
}

impl SpecFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| XrfError::data_not_found(path, e.to_string()))?;
        let file = Self::parse(path, &text)?;
        log::debug!("read {} scans from {}", file.scans.len(), path.display());
        Ok(file)
    }

    pub fn parse(path: impl Into<PathBuf>, text: &str) -> Result<Self> {
        let path = path.into();
        let mut scans: Vec<Scan> = Vec::new();
        let mut declared_columns: Option<usize> = None;

        for (line_number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(rest) = line.strip_prefix("#S") {
                let rest = rest.trim();
                let (number, title) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
                let number = number.parse::<usize>().map_err(|_| {
                    XrfError::data_not_found(
                        &path,
                        format!("line {}: bad scan header '{line}'", line_number + 1),
                    )
                })?;
                scans.push(Scan::new(number, title.trim()));
                declared_columns = None;
                continue;
            }

            let Some(scan) = scans.last_mut() else {
                // file header before the first scan
                continue;
            };

            if let Some(rest) = line.strip_prefix("#N") {
                declared_columns = rest.trim().parse::<usize>().ok();
            } else if let Some(rest) = line.strip_prefix("#L") {
                scan.labels = split_labels(rest);
                if let Some(n) = declared_columns {
                    if n != scan.labels.len() {
                        return Err(XrfError::data_not_found(
                            &path,
                            format!(
                                "scan {}: #N declares {n} columns but #L has {}",
                                scan.number,
                                scan.labels.len()
                            ),
                        ));
                    }
                }
                if let Some(row) = scan.rows.iter().find(|row| row.len() != scan.labels.len()) {
                    return Err(XrfError::data_not_found(
                        &path,
                        format!(
                            "scan {}: row of {} columns precedes #L with {}",
                            scan.number,
                            row.len(),
                            scan.labels.len()
                        ),
                    ));
                }
            } else if line.starts_with('#') {
                continue;
            } else {
                let row = line
                    .split_whitespace()
                    .map(str::parse::<f64>)
                    .collect::<std::result::Result<Vec<f64>, _>>()
                    .map_err(|e| {
                        XrfError::data_not_found(&path, format!("line {}: {e}", line_number + 1))
                    })?;
                let expected = if scan.labels.is_empty() {
                    declared_columns
                        .or_else(|| scan.rows.first().map(Vec::len))
                        .unwrap_or(row.len())
                } else {
                    scan.labels.len()
                };
                if row.len() != expected {
                    return Err(XrfError::data_not_found(
                        &path,
                        format!(
                            "line {}: expected {expected} columns, found {}",
                            line_number + 1,
                            row.len()
                        ),
                    ));
                }
                scan.rows.push(row);
            }
        }

        Ok(SpecFile { path, scans })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn scans(&self) -> &[Scan] {
        &self.scans
    }
}

fn split_labels(text: &str) -> Vec<String> {
    text.split("  ")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
