//! Result extraction
//!
//! Scans the solver log for the rigid-body data records the template's
//! output section requests and turns them into a force-stroke curve. Each
//! record looks like:
//!
//! ```text
//! Data Record #1
//! ===========================================================================
//! Step = 3
//! Time = 0.3
//! Data = z;Fz
//! 2  -0.0295  0.125
//! ```
//!
//! The indenter moves in -z, so stroke is the negated z displacement and
//! force is the contact force on the rigid body. The parser tolerates
//! duplicate records (deduplicated on exact stroke), a truncated trailing
//! row (dropped), and non-monotone strokes (unloading data, kept in order).

use std::collections::HashSet;
use std::path::Path;

use crate::error::RunnerResult;

/// One point of the force-stroke curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurvePoint {
    pub stroke: f64,
    pub force: f64,
}

/// Parse rigid-body rows out of the raw solver log.
pub fn parse_rigid_body_rows(log: &str) -> Vec<CurvePoint> {
    let mut points = Vec::new();
    let mut seen: HashSet<u64> = HashSet::new();
    let mut in_data = false;

    for line in log.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("Data = ") {
            in_data = true;
            continue;
        }
        if !in_data {
            continue;
        }

        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        if fields.len() < 3 {
            // End of the record block, or a truncated trailing row.
            in_data = false;
            continue;
        }
        let parsed = (
            fields[0].parse::<u64>(),
            fields[1].parse::<f64>(),
            fields[2].parse::<f64>(),
        );
        let (Ok(_body), Ok(z), Ok(fz)) = parsed else {
            in_data = false;
            continue;
        };

        let stroke = -z;
        if seen.insert(stroke.to_bits()) {
            points.push(CurvePoint { stroke, force: fz });
        }
    }
    points
}

/// Format with six significant figures.
fn sig6(v: f64) -> String {
    if v == 0.0 || !v.is_finite() {
        return "0".to_string();
    }
    let magnitude = v.abs().log10().floor() as i32;
    let decimals = (5 - magnitude).max(0) as usize;
    format!("{v:.decimals$}")
}

/// Write the `stroke,force` CSV. An empty curve still gets the header.
pub fn write_curve_csv(points: &[CurvePoint], path: &Path) -> RunnerResult<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["stroke", "force"])?;
    for point in points {
        writer.write_record([sig6(point.stroke), sig6(point.force)])?;
    }
    writer.flush()?;
    Ok(())
}
