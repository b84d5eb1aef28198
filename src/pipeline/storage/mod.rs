use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

use crate::error::Result;

/// Write a batch as NDJSON with atomic publish: the full batch lands in a
/// temp file first and is renamed into place, so a concurrent reader sees
/// either the previous run's output or this one, never a partial batch.
pub fn write_ndjson<T: Serialize>(path: &Path, items: &[T]) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }

    let tmp_path = path.with_extension("ndjson.tmp");
    {
        let mut writer = BufWriter::new(
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)?,
        );
        for item in items {
            let line = serde_json::to_string(item)?;
            writeln!(writer, "{}", line)?;
        }
        writer.flush()?;
    }
    fs::rename(&tmp_path, path)?;

    info!(path = %path.display(), records = items.len(), "published partition");
    Ok(())
}

/// Read a batch back from NDJSON. Blank lines are skipped.
pub fn read_ndjson<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let reader = BufReader::new(File::open(path)?);
    let mut items = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        items.push(serde_json::from_str(&line)?);
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Row {
        id: String,
        value: f64,
    }

    #[test]
    fn round_trips_a_batch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gold").join("rows.ndjson");

        let rows = vec![
            Row { id: "a".to_string(), value: 1.5 },
            Row { id: "b".to_string(), value: -2.0 },
        ];
        write_ndjson(&path, &rows).unwrap();

        let read: Vec<Row> = read_ndjson(&path).unwrap();
        assert_eq!(read, rows);
    }

    #[test]
    fn publish_leaves_no_temp_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.ndjson");
        write_ndjson(&path, &[Row { id: "a".to_string(), value: 0.0 }]).unwrap();

        assert!(path.exists());
        assert!(!path.with_extension("ndjson.tmp").exists());
    }

    #[test]
    fn rewrite_supersedes_previous_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.ndjson");

        write_ndjson(&path, &[Row { id: "old".to_string(), value: 1.0 }]).unwrap();
        write_ndjson(&path, &[Row { id: "new".to_string(), value: 2.0 }]).unwrap();

        let read: Vec<Row> = read_ndjson(&path).unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].id, "new");
    }
}
