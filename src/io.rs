//! Collaborator-side CSV persistence helpers. None of the three core
//! subsystems call into this module — it exists purely as a convenience
//! layer a driver caller may use or ignore.

use std::fs::{File, OpenOptions, create_dir_all};
use std::io::BufWriter;
use std::path::Path;

use csv::{ReaderBuilder, Writer, WriterBuilder};
use log::error;

use crate::event::StationId;
use crate::metrics::{Counters, Projection, ProjectionMultiset};

/// Writes one `delay_ms` column, one row per match, 3-decimal fixed.
pub fn write_latency_csv(path: impl AsRef<Path>, samples: &[f64]) -> Result<(), Box<dyn std::error::Error>> {
    let path = path.as_ref();
    ensure_parent_dir(path)?;
    let mut wtr = Writer::from_writer(BufWriter::new(File::create(path)?));
    wtr.write_record(["delay_ms"])?;
    for s in samples {
        wtr.write_record([format!("{s:.3}")])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Writes `a1_start,last_a_end,b_end`, one row per projection, duplicates
/// preserved in emission order.
pub fn write_projection_csv(
    path: impl AsRef<Path>,
    projections: &ProjectionMultiset,
) -> Result<(), Box<dyn std::error::Error>> {
    let path = path.as_ref();
    ensure_parent_dir(path)?;
    let mut wtr = Writer::from_writer(BufWriter::new(File::create(path)?));
    wtr.write_record(["a1_start", "last_a_end", "b_end"])?;
    for (a1, a_last, b) in projections.as_slice() {
        wtr.write_record([a1.to_string(), a_last.to_string(), b.to_string()])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Reads a projection CSV back into a multiset, preserving row order.
pub fn read_projection_csv(path: impl AsRef<Path>) -> Result<ProjectionMultiset, Box<dyn std::error::Error>> {
    let mut rdr = ReaderBuilder::new().has_headers(true).from_path(path)?;
    let mut out = ProjectionMultiset::new();
    for result in rdr.records() {
        let record = result?;
        let parse = |i: usize| -> Result<StationId, Box<dyn std::error::Error>> {
            record
                .get(i)
                .and_then(|v| v.parse::<StationId>().ok())
                .ok_or_else(|| "malformed projection row".into())
        };
        let projection: Projection = (parse(0)?, parse(1)?, parse(2)?);
        out.push(projection);
    }
    Ok(out)
}

/// Writes `name,value` rows sorted by name, appending to an existing file
/// (so repeated sweep runs accumulate into one consolidated file), creating
/// a fresh file with header when `path` doesn't yet exist.
pub fn write_counter_csv(path: impl AsRef<Path>, counters: &Counters) -> Result<(), Box<dyn std::error::Error>> {
    let path = path.as_ref();
    ensure_parent_dir(path)?;
    let existed = path.exists();
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut wtr = WriterBuilder::new()
        .has_headers(false)
        .from_writer(BufWriter::new(file));
    if !existed {
        wtr.write_record(["name", "value"])?;
    }
    for (name, value) in counters.as_sorted_pairs() {
        wtr.write_record([name.to_string(), value.to_string()])?;
    }
    wtr.flush()?;
    Ok(())
}

fn ensure_parent_dir(path: &Path) -> Result<(), std::io::Error> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            create_dir_all(parent).inspect_err(|e| {
                error!("failed to create directory {}: {e}", parent.display());
            })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn tmp_path(name: &str) -> std::path::PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("bikehotpath_io_test_{}_{}", std::process::id(), name));
        p
    }

    #[test]
    fn latency_csv_round_trip_format() {
        let path = tmp_path("latency.csv");
        write_latency_csv(&path, &[1.0, 2.5, 3.14159]).unwrap();
        let mut content = String::new();
        File::open(&path).unwrap().read_to_string(&mut content).unwrap();
        assert_eq!(content, "delay_ms\n1.000\n2.500\n3.142\n");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn projection_csv_round_trips_multiset() {
        let path = tmp_path("projections.csv");
        let mut projections = ProjectionMultiset::new();
        projections.push((100, 300, 426));
        projections.push((100, 300, 426));
        projections.push((200, 400, 462));

        write_projection_csv(&path, &projections).unwrap();
        let read_back = read_projection_csv(&path).unwrap();
        assert_eq!(read_back.as_slice(), projections.as_slice());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn counter_csv_rows_are_sorted_by_name() {
        let path = tmp_path("counters.csv");
        let counters = Counters {
            events_ingested: 10,
            events_dropped: 2,
            matches_completed: 1,
            partial_pruned: 0,
            partial_evicted: 0,
        };
        write_counter_csv(&path, &counters).unwrap();
        let mut content = String::new();
        File::open(&path).unwrap().read_to_string(&mut content).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some("name,value"));
        let rows: Vec<&str> = lines.collect();
        let mut sorted_rows = rows.clone();
        sorted_rows.sort();
        assert_eq!(rows, sorted_rows);
        let _ = std::fs::remove_file(&path);
    }
}
