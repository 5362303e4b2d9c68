use anyhow::{bail, Context, Result};
use rusqlite::{params, Row};

use crate::db::{
    connection::Database,
    helpers::{to_i32, to_i64, to_u32, to_u64, to_u8},
    models::{CaptureDetails, MeasurementRecord},
    schema::{current_layout, recreate_table, TableLayout},
};

fn row_to_measurement(row: &Row, layout: TableLayout) -> Result<MeasurementRecord> {
    let record = MeasurementRecord::sweep(
        row.get::<_, String>("epc")?,
        to_i32(row.get("rssi")?, "rssi")?,
        to_i32(row.get("phase")?, "phase")?,
        to_u32(row.get("freq")?, "freq")?,
        to_i32(row.get("pow")?, "pow")?,
    );
    if layout == TableLayout::Sweep {
        return Ok(record);
    }

    Ok(record.with_capture(CaptureDetails {
        antenna: to_u8(row.get("ant")?, "ant")?,
        timestamp_secs: to_u64(row.get("ts")?, "ts")?,
        read_count: to_u32(row.get("read_count")?, "read_count")?,
        protocol: to_u32(row.get("protocol")?, "protocol")?,
    }))
}

impl Database {
    pub fn recreate_measurement_table(&self, layout: TableLayout) -> Result<()> {
        self.execute(move |conn| recreate_table(conn, layout))
    }

    pub fn insert_measurement(&self, layout: TableLayout, record: &MeasurementRecord) -> Result<()> {
        let record = record.clone();
        self.execute(move |conn| {
            match (layout, record.capture) {
                (TableLayout::Sweep, _) => {
                    let mut stmt = conn.prepare_cached(
                        "INSERT INTO ToP (epc, rssi, phase, freq, pow) VALUES (?1, ?2, ?3, ?4, ?5)",
                    )?;
                    stmt.execute(params![
                        record.epc,
                        record.rssi,
                        record.phase,
                        record.frequency,
                        record.power,
                    ])
                    .with_context(|| format!("failed to insert measurement for {}", record.epc))?;
                }
                (TableLayout::Capture, Some(details)) => {
                    let mut stmt = conn.prepare_cached(
                        "INSERT INTO ToP (epc, rssi, phase, freq, pow, ant, ts, read_count, protocol)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    )?;
                    stmt.execute(params![
                        record.epc,
                        record.rssi,
                        record.phase,
                        record.frequency,
                        record.power,
                        details.antenna,
                        to_i64(details.timestamp_secs)?,
                        details.read_count,
                        details.protocol,
                    ])
                    .with_context(|| format!("failed to insert capture row for {}", record.epc))?;
                }
                (TableLayout::Capture, None) => {
                    bail!("capture row for {} has no capture details", record.epc)
                }
            }
            Ok(())
        })
    }

    /// All rows of the measurement table in insertion order.
    pub fn measurements(&self) -> Result<Vec<MeasurementRecord>> {
        self.execute(|conn| {
            let Some(layout) = current_layout(conn)? else {
                return Ok(Vec::new());
            };
            let mut stmt = conn.prepare("SELECT * FROM ToP ORDER BY rowid")?;
            let mut rows = stmt.query([])?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                records.push(row_to_measurement(row, layout)?);
            }
            Ok(records)
        })
    }

    pub fn measurement_count(&self) -> Result<u64> {
        self.execute(|conn| {
            if current_layout(conn)?.is_none() {
                return Ok(0);
            }
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM ToP", [], |row| row.get(0))
                .context("failed to count measurements")?;
            to_u64(count, "count")
        })
    }
}
