//! Report rendering: human-readable text, JSON and CSV, plus merging of CSV
//! files written by earlier runs.

use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::Result;
use crate::schema::{BenchReport, Summary};

pub const CSV_HEADER: [&str; 11] = [
    "system",
    "multiplicity",
    "name",
    "executions",
    "total (μs)",
    "arithMean (μs)",
    "geoMean (μs)",
    "min (μs)",
    "max (μs)",
    "ops/s",
    "μs/op",
];

pub fn print_text<W: Write>(out: &mut W, summaries: &[Summary], elapsed: Duration) -> io::Result<()> {
    for s in summaries {
        writeln!(out, "{} ({}x) took: {}μs", s.name, s.executions, s.total_us)?;
        writeln!(
            out,
            "  arithMean: {}μs, geoMean: {}μs, min: {}μs, max: {}μs",
            s.arith_mean_us, s.geo_mean_us, s.min_us, s.max_us
        )?;
        if s.errors > 0 {
            writeln!(out, "  errors: {}", s.errors)?;
        }
        writeln!(out, "  ops/s: {:.2}", s.ops_per_sec)?;
        writeln!(out, "  μs/op: {:.2}", s.us_per_op)?;
        writeln!(out)?;
    }
    writeln!(out, "elapsed time: {:?}", elapsed)
}

pub fn to_json(report: &BenchReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

pub fn write_csv<W: Write>(out: W, summaries: &[Summary]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(out);
    wtr.write_record(CSV_HEADER)?;

    for s in summaries {
        wtr.write_record([
            s.system.clone(),
            s.multiplicity.to_string(),
            s.name.clone(),
            s.executions.to_string(),
            s.total_us.to_string(),
            s.arith_mean_us.to_string(),
            s.geo_mean_us.to_string(),
            s.min_us.to_string(),
            s.max_us.to_string(),
            format!("{:.2}", s.ops_per_sec),
            format!("{:.2}", s.us_per_op),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

pub fn write_csv_file(path: &Path, summaries: &[Summary]) -> Result<()> {
    let file = std::fs::File::create(path)?;
    write_csv(io::BufWriter::new(file), summaries)?;
    debug!(path = %path.display(), "wrote csv summary");
    Ok(())
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeStats {
    pub files_merged: usize,
    pub files_skipped: usize,
    pub rows: usize,
}

/// Reads every data row of a summary CSV file, or `None` when its header
/// is not [`CSV_HEADER`]. Nothing is returned unless the whole file parses.
fn read_summary_rows(path: &Path) -> csv::Result<Option<Vec<csv::StringRecord>>> {
    let mut rdr = csv::Reader::from_path(path)?;
    let header_matches = rdr
        .headers()?
        .iter()
        .map(str::trim)
        .eq(CSV_HEADER.iter().copied());
    if !header_matches {
        return Ok(None);
    }
    rdr.records().collect::<csv::Result<Vec<_>>>().map(Some)
}

/// Concatenates the rows of every `*.csv` file directly inside `root_dir`
/// into `target`, under a single header. Files whose header differs or that
/// fail to parse are skipped, as is the target itself.
pub fn merge_csv(root_dir: &Path, target: &Path) -> Result<MergeStats> {
    let mut wtr = csv::Writer::from_path(target)?;
    wtr.write_record(CSV_HEADER)?;
    wtr.flush()?;
    let target_abs = target.canonicalize()?;

    let mut stats = MergeStats::default();
    for entry in WalkDir::new(root_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(io::Error::from)?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().map_or(true, |ext| ext != "csv") {
            continue;
        }
        if path.canonicalize().map_or(false, |p| p == target_abs) {
            continue;
        }

        let records = match read_summary_rows(path) {
            Ok(Some(records)) => records,
            Ok(None) => {
                warn!(path = %path.display(), "unexpected csv header, skipping");
                stats.files_skipped += 1;
                continue;
            }
            Err(e) => {
                warn!(path = %path.display(), "unreadable csv file, skipping: {e}");
                stats.files_skipped += 1;
                continue;
            }
        };

        for record in &records {
            wtr.write_record(record)?;
        }
        stats.rows += records.len();
        stats.files_merged += 1;
    }

    wtr.flush()?;
    Ok(stats)
}
