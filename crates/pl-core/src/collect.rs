//! Input collection: finding event files, reading them, consolidating them.
//!
//! Records are read as plain text with their own width, so a short row
//! reaches the normalizer as a short row instead of failing the whole file.
//! The consolidated file is written through Arrow's CSV writer.

use arrow::array::{ArrayRef, StringArray};
use arrow::csv::WriterBuilder;
use arrow::datatypes::{DataType, Field as ArrowField, Schema};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use pl_config::{FieldMapping, MappingError, CONSOLIDATED_HEADER};
use pl_common::Field;
use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse CSV {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("cannot write CSV {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: ArrowError,
    },

    #[error("{path}: {source}")]
    Mapping {
        path: PathBuf,
        #[source]
        source: MappingError,
    },

    #[error("no CSV files under {0}")]
    NoInput(PathBuf),
}

impl From<CollectError> for pl_common::Error {
    fn from(err: CollectError) -> Self {
        match err {
            CollectError::Mapping { .. } => pl_common::Error::InvalidMapping(err.to_string()),
            other => pl_common::Error::Collection(other.to_string()),
        }
    }
}

/// Header and records of one CSV file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvTable {
    pub path: PathBuf,
    pub header: Vec<String>,
    /// Data records, header excluded. Record `n` (1-based) is `records[n - 1]`.
    pub records: Vec<Vec<String>>,
}

/// All `*.csv` files under `dir`, recursively, in sorted order.
///
/// A path that is itself a file is returned as the only entry.
pub fn discover_files(dir: &Path) -> Result<Vec<PathBuf>, CollectError> {
    let io = |path: &Path| {
        let path = path.to_path_buf();
        move |source| CollectError::Io { path, source }
    };

    let meta = std::fs::metadata(dir).map_err(io(dir))?;
    if meta.is_file() {
        return Ok(vec![dir.to_path_buf()]);
    }

    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in std::fs::read_dir(&current).map_err(io(&current))? {
            let entry = entry.map_err(io(&current))?;
            let path = entry.path();
            let file_type = entry.file_type().map_err(io(&path))?;
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() && is_csv(&path) {
                files.push(path);
            }
        }
    }
    files.sort();
    debug!(dir = %dir.display(), files = files.len(), "discovered input files");
    Ok(files)
}

fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
}

/// Read a header-led CSV file with every cell as text.
///
/// Records keep the width they were written with; checking it against the
/// header is left to the normalizer.
pub fn read_csv(path: &Path) -> Result<CsvTable, CollectError> {
    let csv_err = |source| CollectError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(|source| CollectError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(file);
    let header: Vec<String> = reader
        .headers()
        .map_err(csv_err)?
        .iter()
        .map(str::to_string)
        .collect();

    let mut records = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        records.push(record.iter().map(str::to_string).collect());
    }

    debug!(path = %path.display(), records = records.len(), "read CSV");
    Ok(CsvTable {
        path: path.to_path_buf(),
        header,
        records,
    })
}

fn text_schema<S: AsRef<str>>(names: &[S]) -> Arc<Schema> {
    Arc::new(Schema::new(
        names
            .iter()
            .map(|name| ArrowField::new(name.as_ref(), DataType::Utf8, true))
            .collect::<Vec<_>>(),
    ))
}

/// Outcome of a consolidation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsolidateReport {
    pub files: usize,
    pub records: usize,
    pub written: usize,
    /// Rows dropped for an empty artist.
    pub discarded: usize,
    pub output: PathBuf,
}

/// Source column feeding each consolidated column.
fn consolidated_sources(mapping: &FieldMapping) -> Vec<String> {
    let defaults = FieldMapping::default();
    CONSOLIDATED_HEADER
        .iter()
        .map(|name| {
            Field::ALL
                .into_iter()
                .find(|f| defaults.column_for(*f) == *name)
                .map(|f| mapping.column_for(f).to_string())
                .unwrap_or_else(|| name.to_string())
        })
        .collect()
}

/// Concatenate raw event files into one 11-column CSV.
///
/// Every file must carry the mapped event columns; the three descriptive
/// columns (gender, level, location) are copied when present and left empty
/// otherwise. Rows without an artist are not song plays and are dropped.
pub fn consolidate(
    files: &[PathBuf],
    mapping: &FieldMapping,
    output: &Path,
) -> Result<ConsolidateReport, CollectError> {
    let sources = consolidated_sources(mapping);
    let mut columns: Vec<Vec<String>> = vec![Vec::new(); CONSOLIDATED_HEADER.len()];
    let mut report = ConsolidateReport {
        files: files.len(),
        output: output.to_path_buf(),
        ..Default::default()
    };

    for path in files {
        let table = read_csv(path)?;
        let layout = mapping
            .resolve(&table.header)
            .map_err(|source| CollectError::Mapping {
                path: path.clone(),
                source,
            })?;
        let positions: Vec<Option<usize>> = sources
            .iter()
            .map(|source| table.header.iter().position(|h| h.trim() == source))
            .collect();
        let artist = layout.position(Field::Artist);

        for record in &table.records {
            report.records += 1;
            if record.get(artist).map_or(true, |a| a.trim().is_empty()) {
                report.discarded += 1;
                continue;
            }
            for (column, position) in columns.iter_mut().zip(&positions) {
                let cell = position
                    .and_then(|p| record.get(p))
                    .map(String::as_str)
                    .unwrap_or_default();
                column.push(cell.to_string());
            }
            report.written += 1;
        }
    }

    write_consolidated(output, columns).map_err(|source| CollectError::Write {
        path: output.to_path_buf(),
        source,
    })?;
    info!(
        files = report.files,
        records = report.records,
        written = report.written,
        discarded = report.discarded,
        output = %output.display(),
        "consolidated event files"
    );
    Ok(report)
}

fn write_consolidated(output: &Path, columns: Vec<Vec<String>>) -> Result<(), ArrowError> {
    let arrays: Vec<ArrayRef> = columns
        .into_iter()
        .map(|values| Arc::new(StringArray::from(values)) as ArrayRef)
        .collect();
    let batch = RecordBatch::try_new(text_schema(&CONSOLIDATED_HEADER), arrays)?;

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(output)?;
    let mut writer = WriterBuilder::new().with_header(true).build(file);
    writer.write(&batch)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const RAW_HEADER: &str = "artist,auth,firstName,gender,itemInSession,lastName,length,level,\
location,method,page,registration,sessionId,song,status,ts,userId";

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn discovery_is_recursive_sorted_and_csv_only() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "2018-11-02-events.csv", RAW_HEADER);
        write(tmp.path(), "nested/2018-11-01-events.csv", RAW_HEADER);
        write(tmp.path(), "notes.txt", "ignore me");

        let files = discover_files(tmp.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("2018-11-02-events.csv"));
        assert!(files[1].ends_with("nested/2018-11-01-events.csv"));
    }

    #[test]
    fn discovery_of_missing_dir_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let err = discover_files(&tmp.path().join("absent")).unwrap_err();
        assert!(matches!(err, CollectError::Io { .. }));
    }

    #[test]
    fn quoted_cells_and_empty_cells_are_text() {
        let tmp = TempDir::new().unwrap();
        let path = write(
            tmp.path(),
            "events.csv",
            "\"artist\",\"song\",\"length\"\n\"\",\"Greece 2000\",\"\"\n\"Dr, Dre\",\"x\",\"1.5\"\n",
        );
        let table = read_csv(&path).unwrap();
        assert_eq!(table.header, vec!["artist", "song", "length"]);
        assert_eq!(
            table.records,
            vec![
                vec!["".to_string(), "Greece 2000".to_string(), "".to_string()],
                vec!["Dr, Dre".to_string(), "x".to_string(), "1.5".to_string()],
            ]
        );
    }

    #[test]
    fn records_keep_their_own_width() {
        let tmp = TempDir::new().unwrap();
        let path = write(tmp.path(), "events.csv", "a,b,c\n1,2,3\n4,5\n6,7,8,9\n");
        let table = read_csv(&path).unwrap();
        let widths: Vec<usize> = table.records.iter().map(Vec::len).collect();
        assert_eq!(widths, vec![3, 2, 4]);
        assert_eq!(table.records[1], vec!["4".to_string(), "5".to_string()]);
    }

    #[test]
    fn short_record_is_padded_empty_when_consolidating() {
        let tmp = TempDir::new().unwrap();
        let body = format!("{RAW_HEADER}\nFaithless,Logged In,Ava\n");
        let raw = write(tmp.path(), "short.csv", &body);
        let out = tmp.path().join("out.csv");

        let report = consolidate(&[raw], &FieldMapping::default(), &out).unwrap();
        assert_eq!(report.written, 1);
        let table = read_csv(&out).unwrap();
        assert_eq!(table.records[0][0], "Faithless");
        assert_eq!(table.records[0][1], "Ava");
        assert_eq!(table.records[0][10], "");
    }

    #[test]
    fn consolidation_projects_and_drops_empty_artists() {
        let tmp = TempDir::new().unwrap();
        let body = format!(
            "{RAW_HEADER}\n\
             Faithless,Logged In,Ava,F,4,Robinson,495.3073,free,\"New Haven-Milford, CT\",PUT,NextSong,1.54E+12,338,Music Matters (Mark Knight Dub),200,1.54E+12,50\n\
             ,Logged In,Ava,F,5,Robinson,,free,\"New Haven-Milford, CT\",GET,Home,1.54E+12,338,,200,1.54E+12,50\n"
        );
        let raw = write(tmp.path(), "event_data/2018-11-01-events.csv", &body);
        let out = tmp.path().join("event_datafile_new.csv");

        let report = consolidate(&[raw], &FieldMapping::default(), &out).unwrap();
        assert_eq!(report.records, 2);
        assert_eq!(report.written, 1);
        assert_eq!(report.discarded, 1);

        let table = read_csv(&out).unwrap();
        assert_eq!(table.header, CONSOLIDATED_HEADER.to_vec());
        assert_eq!(
            table.records,
            vec![[
                "Faithless",
                "Ava",
                "F",
                "4",
                "Robinson",
                "495.3073",
                "free",
                "New Haven-Milford, CT",
                "338",
                "Music Matters (Mark Knight Dub)",
                "50"
            ]
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()]
        );
    }

    #[test]
    fn consolidation_rejects_file_missing_mapped_column() {
        let tmp = TempDir::new().unwrap();
        let raw = write(tmp.path(), "bad.csv", "artist,song\nA,B\n");
        let err = consolidate(&[raw], &FieldMapping::default(), &tmp.path().join("out.csv"))
            .unwrap_err();
        assert!(matches!(err, CollectError::Mapping { .. }));
    }
}
