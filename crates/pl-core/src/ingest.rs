//! Ingestion driver.
//!
//! Rows flow strictly one at a time: normalize, materialize, then one write
//! per table, each acknowledged before the next row starts. A failed write
//! ends the run; the three tables must stay copies of the same event stream.

use crate::catalog::Catalog;
use crate::collect::{read_csv, CollectError};
use crate::materialize::materialize;
use crate::normalize::{MalformedRowError, Normalized, Normalizer};
use pl_common::{PlayEvent, RunId};
use pl_config::{FieldMapping, RowPolicy};
use pl_storage::{StoreError, StoreGateway};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("malformed row at {origin}:{record}: {source}")]
    Malformed {
        origin: String,
        record: usize,
        #[source]
        source: MalformedRowError,
    },

    #[error("write to {table} failed at {origin}:{record}: {source}")]
    Write {
        table: String,
        origin: String,
        record: usize,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Collect(#[from] CollectError),
}

impl From<IngestError> for pl_common::Error {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Malformed {
                origin,
                record,
                source,
            } => pl_common::Error::MalformedRow {
                location: format!("{origin}:{record}"),
                reason: source.to_string(),
            },
            IngestError::Write {
                source: source @ StoreError::Unavailable { .. },
                ..
            } => source.into(),
            IngestError::Write {
                table,
                origin,
                record,
                source,
            } => pl_common::Error::WriteFailed {
                table,
                location: format!("{origin}:{record}"),
                reason: source.to_string(),
            },
            IngestError::Collect(e) => e.into(),
        }
    }
}

/// Counters for one ingestion run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub run_id: RunId,
    pub files: usize,
    /// Data records read, header rows excluded.
    pub records: usize,
    pub events: usize,
    /// Rows without an artist.
    pub discarded: usize,
    /// Rows skipped under [`RowPolicy::Skip`].
    pub malformed: usize,
    pub writes: usize,
}

impl IngestReport {
    pub fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            files: 0,
            records: 0,
            events: 0,
            discarded: 0,
            malformed: 0,
            writes: 0,
        }
    }
}

/// Drives rows from input files into every catalog table.
#[derive(Debug, Clone, Copy)]
pub struct Ingestor<'c> {
    catalog: &'c Catalog,
    policy: RowPolicy,
}

impl<'c> Ingestor<'c> {
    pub fn new(catalog: &'c Catalog, policy: RowPolicy) -> Self {
        Self { catalog, policy }
    }

    /// Ingest every file in order into a fresh report.
    pub fn ingest_files<G: StoreGateway + ?Sized>(
        &self,
        gateway: &mut G,
        files: &[PathBuf],
        mapping: &FieldMapping,
    ) -> Result<IngestReport, IngestError> {
        let mut report = IngestReport::new(RunId::new());
        info!(run_id = %report.run_id, files = files.len(), policy = %self.policy, "ingest started");
        for path in files {
            self.ingest_file(gateway, path, mapping, &mut report)?;
        }
        info!(
            run_id = %report.run_id,
            records = report.records,
            events = report.events,
            discarded = report.discarded,
            malformed = report.malformed,
            writes = report.writes,
            "ingest finished"
        );
        Ok(report)
    }

    /// Ingest one CSV file. Its header is resolved against `mapping` before
    /// any row is read.
    pub fn ingest_file<G: StoreGateway + ?Sized>(
        &self,
        gateway: &mut G,
        path: &Path,
        mapping: &FieldMapping,
        report: &mut IngestReport,
    ) -> Result<(), IngestError> {
        let table = read_csv(path)?;
        let layout = mapping
            .resolve(&table.header)
            .map_err(|source| CollectError::Mapping {
                path: path.to_path_buf(),
                source,
            })?;
        let origin = path.display().to_string();
        debug!(file = %origin, records = table.records.len(), "ingesting file");

        self.ingest_records(gateway, &Normalizer::new(layout), &origin, &table.records, report)?;
        report.files += 1;
        Ok(())
    }

    /// Ingest already-split records. `origin` names their source in errors;
    /// records are numbered from 1.
    pub fn ingest_records<G, S>(
        &self,
        gateway: &mut G,
        normalizer: &Normalizer,
        origin: &str,
        records: &[Vec<S>],
        report: &mut IngestReport,
    ) -> Result<(), IngestError>
    where
        G: StoreGateway + ?Sized,
        S: AsRef<str>,
    {
        for (idx, fields) in records.iter().enumerate() {
            let record = idx + 1;
            report.records += 1;

            let event = match normalizer.normalize(fields) {
                Ok(Normalized::Event(event)) => event,
                Ok(Normalized::Discarded) => {
                    debug!(origin, record, "row without artist discarded");
                    report.discarded += 1;
                    continue;
                }
                Err(source) => match self.policy {
                    RowPolicy::Skip => {
                        warn!(origin, record, error = %source, "malformed row skipped");
                        report.malformed += 1;
                        continue;
                    }
                    RowPolicy::Abort => {
                        return Err(IngestError::Malformed {
                            origin: origin.to_string(),
                            record,
                            source,
                        })
                    }
                },
            };

            report.writes += self.write_event(gateway, &event).map_err(|(table, source)| {
                IngestError::Write {
                    table,
                    origin: origin.to_string(),
                    record,
                    source,
                }
            })?;
            report.events += 1;
        }
        Ok(())
    }

    /// Fan one event out to every table. Returns the number of writes.
    pub fn write_event<G: StoreGateway + ?Sized>(
        &self,
        gateway: &mut G,
        event: &PlayEvent,
    ) -> Result<usize, (String, StoreError)> {
        let writes = materialize(self.catalog, event);
        let count = writes.len();
        for write in writes {
            gateway
                .execute_write(write.table, write.values)
                .map_err(|e| (write.table.to_string(), e))?;
        }
        Ok(count)
    }
}
