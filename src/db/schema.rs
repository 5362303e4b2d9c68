use std::fmt;

use anyhow::{Context, Result};
use rusqlite::Connection;

pub const MEASUREMENT_TABLE: &str = "ToP";

/// Column layout of the measurement table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableLayout {
    /// `(epc, rssi, phase, freq, pow)`
    Sweep,
    /// Sweep columns plus `(ant, ts, read_count, protocol)`.
    Capture,
}

impl TableLayout {
    pub fn column_count(&self) -> usize {
        match self {
            TableLayout::Sweep => 5,
            TableLayout::Capture => 9,
        }
    }

    pub fn from_column_count(count: usize) -> Option<Self> {
        [TableLayout::Sweep, TableLayout::Capture]
            .into_iter()
            .find(|layout| layout.column_count() == count)
    }

    fn ddl(&self) -> &'static str {
        match self {
            TableLayout::Sweep => include_str!("schemas/sweep.sql"),
            TableLayout::Capture => include_str!("schemas/capture.sql"),
        }
    }
}

impl fmt::Display for TableLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableLayout::Sweep => f.write_str("sweep"),
            TableLayout::Capture => f.write_str("capture"),
        }
    }
}

/// Drops the measurement table and defines it afresh.
pub fn recreate_table(conn: &mut Connection, layout: TableLayout) -> Result<()> {
    let tx = conn
        .transaction()
        .context("failed to open schema transaction")?;
    tx.execute_batch(layout.ddl())
        .with_context(|| format!("failed to create {layout} measurement table"))?;
    tx.commit().context("failed to commit schema")?;
    Ok(())
}

/// Layout of the existing measurement table, if there is one.
pub fn current_layout(conn: &Connection) -> Result<Option<TableLayout>> {
    let columns: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM pragma_table_info(?1)",
            [MEASUREMENT_TABLE],
            |row| row.get(0),
        )
        .context("failed to inspect measurement table")?;
    Ok(TableLayout::from_column_count(columns as usize))
}
