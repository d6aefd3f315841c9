use crate::error::OutputParseError;
use georeg_core::{Confidence, RegistrationResult, Transform};
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tracing::info;

/// Result file body: the confidence label, then one comma separated line
/// per transform row
pub fn format_output(confidence: Confidence, transform: &Transform) -> String {
    let mut out = String::new();
    out.push_str(confidence.as_str());
    out.push('\n');
    for row in transform.rows() {
        let cells: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        out.push_str(&cells.join(", "));
        out.push('\n');
    }
    out
}

/// Write the result file, replacing any existing one. With `echo` the
/// matrix is also logged.
pub fn write_output<P: AsRef<Path>>(path: P, result: &RegistrationResult, echo: bool) -> io::Result<()> {
    let body = format_output(result.confidence(), result.transform());
    let mut file = fs::File::create(path.as_ref())?;
    file.write_all(body.as_bytes())?;
    file.sync_all()?;

    if echo {
        for row in result.transform().rows() {
            info!("{:>14.6} {:>14.6} {:>14.6}", row[0], row[1], row[2]);
        }
    }
    Ok(())
}

/// Parse a result file body back into label and transform
pub fn parse_output(text: &str) -> Result<(Confidence, Transform), OutputParseError> {
    let mut lines = text.lines();
    let label: Confidence = lines.next().ok_or(OutputParseError::MissingLine(1))?.parse()?;

    let mut rows = [[0.0f64; 3]; 3];
    for (r, row) in rows.iter_mut().enumerate() {
        let line_no = r + 2;
        let line = lines.next().ok_or(OutputParseError::MissingLine(line_no))?;
        let cells: Vec<&str> = line.split(',').map(str::trim).collect();
        if cells.len() != 3 {
            return Err(OutputParseError::Malformed {
                line: line_no,
                reason: format!("expected 3 values, found {}", cells.len()),
            });
        }
        for (slot, cell) in row.iter_mut().zip(&cells) {
            *slot = cell.parse().map_err(|e| OutputParseError::Malformed {
                line: line_no,
                reason: format!("{cell:?}: {e}"),
            })?;
        }
    }

    let transform = Transform::from_rows(rows).ok_or(OutputParseError::Malformed {
        line: 4,
        reason: "transform has zero scale".to_string(),
    })?;
    Ok((label, transform))
}

pub fn read_output<P: AsRef<Path>>(path: P) -> Result<(Confidence, Transform), OutputParseError> {
    parse_output(&fs::read_to_string(path)?)
}
