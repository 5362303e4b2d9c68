//! Record Store: measurement rows in SQLite.
//!
//! [`Database`] owns the connection on a worker thread; [`MeasurementStore`]
//! layers the per-run table lifecycle on top of it and is what the controller
//! writes through, via [`RecordStore`].

pub mod connection;
pub mod helpers;
pub mod models;
pub mod repositories;
pub mod schema;

use std::path::PathBuf;

use anyhow::Context;

pub use connection::Database;
pub use models::{CaptureDetails, MeasurementRecord};
pub use schema::{TableLayout, MEASUREMENT_TABLE};

use crate::error::StoreError;

/// Append-only sink for measurement rows.
pub trait RecordStore {
    /// Drops and recreates the measurement table.
    fn init_schema(&mut self, layout: TableLayout) -> Result<(), StoreError>;

    fn insert_record(&mut self, record: &MeasurementRecord) -> Result<(), StoreError>;

    fn close(&mut self) -> Result<(), StoreError>;
}

pub struct MeasurementStore {
    db: Database,
    layout: Option<TableLayout>,
    closed: bool,
}

impl MeasurementStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let db = Database::open(&path)
            .with_context(|| format!("failed to open record store {}", path.display()))?;
        Ok(Self::new(db))
    }

    pub fn new(db: Database) -> Self {
        Self {
            db,
            layout: None,
            closed: false,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }
}

impl RecordStore for MeasurementStore {
    fn init_schema(&mut self, layout: TableLayout) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.db.recreate_measurement_table(layout)?;
        self.layout = Some(layout);
        Ok(())
    }

    fn insert_record(&mut self, record: &MeasurementRecord) -> Result<(), StoreError> {
        self.ensure_open()?;
        let layout = self.layout.ok_or(StoreError::SchemaNotInitialised)?;
        if layout == TableLayout::Capture && record.capture.is_none() {
            return Err(StoreError::MissingCaptureDetails {
                epc: record.epc.clone(),
            });
        }
        self.db.insert_measurement(layout, record)?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), StoreError> {
        if !self.closed {
            self.closed = true;
            self.db.close();
        }
        Ok(())
    }
}

impl<S: RecordStore + ?Sized> RecordStore for &mut S {
    fn init_schema(&mut self, layout: TableLayout) -> Result<(), StoreError> {
        (**self).init_schema(layout)
    }

    fn insert_record(&mut self, record: &MeasurementRecord) -> Result<(), StoreError> {
        (**self).insert_record(record)
    }

    fn close(&mut self) -> Result<(), StoreError> {
        (**self).close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_before_schema_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MeasurementStore::open(dir.path().join("m.db")).unwrap();
        let record = MeasurementRecord::sweep("AA", -40, 0, 840_000, 3150);
        assert!(matches!(
            store.insert_record(&record),
            Err(StoreError::SchemaNotInitialised)
        ));
    }

    #[test]
    fn capture_layout_needs_capture_details() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MeasurementStore::open(dir.path().join("m.db")).unwrap();
        store.init_schema(TableLayout::Capture).unwrap();
        let record = MeasurementRecord::sweep("AA", -40, 0, 840_000, 3150);
        assert!(matches!(
            store.insert_record(&record),
            Err(StoreError::MissingCaptureDetails { .. })
        ));
    }

    #[test]
    fn closed_store_refuses_writes_and_keeps_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.db");
        let mut store = MeasurementStore::open(&path).unwrap();
        store.init_schema(TableLayout::Sweep).unwrap();
        let record = MeasurementRecord::sweep("AA", -40, 0, 840_000, 3150);
        store.insert_record(&record).unwrap();
        store.close().unwrap();
        store.close().unwrap();
        assert!(matches!(store.insert_record(&record), Err(StoreError::Closed)));

        let reopened = Database::open(&path).unwrap();
        assert_eq!(reopened.measurements().unwrap(), vec![record]);
    }
}
