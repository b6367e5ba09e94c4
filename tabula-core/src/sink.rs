//! Table sinks: one CSV stream per enabled table.
//!
//! Every stream receives its header exactly once when opened, then one
//! newline-terminated row per [`TableSinks::write_row`] call. Values are
//! rendered with [`Field::render`] and written verbatim; the CSV writer never
//! adds quoting of its own.

use std::io::{self, Write};

use csv::{QuoteStyle, Terminator, WriterBuilder};
use thiserror::Error;

use crate::table::{Field, RowCounts, Schema, Table, TableSelection};

/// Errors raised while opening, writing or closing a table stream.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The underlying stream could not be created.
    #[error("failed to open the {table} table")]
    Open {
        /// Table whose stream failed.
        table: Table,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// A header or row could not be written.
    #[error("failed to write to the {table} table")]
    Write {
        /// Table whose stream failed.
        table: Table,
        /// Underlying CSV error.
        #[source]
        source: csv::Error,
    },
    /// Buffered rows could not be flushed.
    #[error("failed to flush the {table} table")]
    Flush {
        /// Table whose stream failed.
        table: Table,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// CSV stream for a single table.
#[derive(Debug)]
pub struct TableWriter<W: Write> {
    table: Table,
    writer: csv::Writer<W>,
    rows: u64,
}

impl<W: Write> TableWriter<W> {
    /// Wrap `inner` and write the header row for `table`.
    pub fn new(table: Table, schema: Schema, inner: W) -> Result<Self, SinkError> {
        let mut writer = WriterBuilder::new()
            .has_headers(false)
            .quote_style(QuoteStyle::Never)
            .terminator(Terminator::Any(b'\n'))
            .from_writer(inner);
        writer
            .write_record(table.columns(schema))
            .map_err(|source| SinkError::Write { table, source })?;
        Ok(Self {
            table,
            writer,
            rows: 0,
        })
    }

    /// Table this stream belongs to.
    #[must_use]
    pub const fn table(&self) -> Table {
        self.table
    }

    /// Rows written so far, excluding the header.
    #[must_use]
    pub const fn rows(&self) -> u64 {
        self.rows
    }

    /// Append one row.
    pub fn write_row(&mut self, fields: &[Field<'_>]) -> Result<(), SinkError> {
        let table = self.table;
        self.writer
            .write_record(fields.iter().map(Field::render))
            .map_err(|source| SinkError::Write { table, source })?;
        self.rows += 1;
        Ok(())
    }

    /// Flush buffered rows and hand back the underlying stream.
    pub fn finish(mut self) -> Result<W, SinkError> {
        let table = self.table;
        self.writer
            .flush()
            .map_err(|source| SinkError::Flush { table, source })?;
        self.writer.into_inner().map_err(|err| SinkError::Flush {
            table,
            source: err.into_error(),
        })
    }
}

/// A finished table stream.
#[derive(Debug)]
pub struct TableOutput<W> {
    /// Table the stream belongs to.
    pub table: Table,
    /// Rows written, excluding the header.
    pub rows: u64,
    /// The underlying stream.
    pub inner: W,
}

/// The set of open table streams for one pipeline run.
///
/// Only enabled tables are opened. Dropping the set (for example when a run
/// aborts) closes every stream it still holds.
#[derive(Debug)]
pub struct TableSinks<W: Write> {
    writers: Vec<TableWriter<W>>,
}

impl<W: Write> TableSinks<W> {
    /// Open a stream for each table enabled in `selection`.
    ///
    /// `open` is called once per enabled table and never for a disabled one.
    pub fn open<F>(selection: TableSelection, schema: Schema, mut open: F) -> Result<Self, SinkError>
    where
        F: FnMut(Table) -> io::Result<W>,
    {
        let mut writers = Vec::new();
        for table in selection.enabled() {
            let inner = open(table).map_err(|source| SinkError::Open { table, source })?;
            writers.push(TableWriter::new(table, schema, inner)?);
        }
        Ok(Self { writers })
    }

    /// Whether a stream is open for `table`.
    #[must_use]
    pub fn is_enabled(&self, table: Table) -> bool {
        self.writers.iter().any(|writer| writer.table() == table)
    }

    /// Append one row to `table`; a no-op when the table is disabled.
    pub fn write_row(&mut self, table: Table, fields: &[Field<'_>]) -> Result<(), SinkError> {
        match self.writers.iter_mut().find(|writer| writer.table() == table) {
            Some(writer) => writer.write_row(fields),
            None => Ok(()),
        }
    }

    /// Rows written so far per table.
    #[must_use]
    pub fn counts(&self) -> RowCounts {
        let mut counts = RowCounts::default();
        for writer in &self.writers {
            counts.set(writer.table(), writer.rows());
        }
        counts
    }

    /// Flush and close every stream.
    pub fn finish(self) -> Result<Vec<TableOutput<W>>, SinkError> {
        self.writers
            .into_iter()
            .map(|writer| {
                let table = writer.table();
                let rows = writer.rows();
                writer.finish().map(|inner| TableOutput { table, rows, inner })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn output_text(outputs: &[TableOutput<Vec<u8>>], table: Table) -> String {
        let output = outputs
            .iter()
            .find(|output| output.table == table)
            .unwrap_or_else(|| panic!("no output for {table}"));
        String::from_utf8(output.inner.clone()).expect("utf-8 output")
    }

    #[rstest]
    fn header_is_written_once_before_rows() {
        let mut sinks = TableSinks::open(
            TableSelection {
                members: true,
                ..TableSelection::default()
            },
            Schema::Bulk,
            |_| Ok(Vec::new()),
        )
        .expect("open sinks");
        sinks
            .write_row(
                Table::Members,
                &[
                    Field::Integer(1),
                    Field::Integer(2),
                    Field::text("outer"),
                    Field::text("way"),
                ],
            )
            .expect("write row");
        let outputs = sinks.finish().expect("finish sinks");
        assert_eq!(
            output_text(&outputs, Table::Members),
            "relationId,memberId,memberRole,memberType\n1,2,\"outer\",\"way\"\n"
        );
    }

    #[rstest]
    fn disabled_tables_are_never_opened() {
        let mut opened = Vec::new();
        let mut sinks = TableSinks::open(
            TableSelection {
                ways: true,
                ..TableSelection::default()
            },
            Schema::Bulk,
            |table| {
                opened.push(table);
                Ok(Vec::new())
            },
        )
        .expect("open sinks");
        assert!(!sinks.is_enabled(Table::Nodes));
        sinks
            .write_row(Table::Nodes, &[Field::Integer(1)])
            .expect("disabled write is a no-op");
        let outputs = sinks.finish().expect("finish sinks");
        assert_eq!(opened, vec![Table::Ways]);
        assert_eq!(outputs.len(), 1);
    }

    #[rstest]
    fn commas_inside_values_are_not_escaped() {
        let mut sinks = TableSinks::open(
            TableSelection {
                tags: true,
                ..TableSelection::default()
            },
            Schema::Bulk,
            |_| Ok(Vec::new()),
        )
        .expect("open sinks");
        sinks
            .write_row(
                Table::Tags,
                &[
                    Field::Null,
                    Field::text("way"),
                    Field::Integer(9),
                    Field::text("note"),
                    Field::text("a, \"b\""),
                ],
            )
            .expect("write row");
        assert_eq!(sinks.counts().tags, 1);
        let outputs = sinks.finish().expect("finish sinks");
        let text = output_text(&outputs, Table::Tags);
        assert_eq!(text.lines().nth(1), Some(",\"way\",9,\"note\",\"a, 'b'\""));
    }

    #[rstest]
    fn open_failures_name_the_table() {
        let err = TableSinks::<Vec<u8>>::open(TableSelection::all(), Schema::Bulk, |table| {
            if table == Table::Nodes {
                Err(io::Error::other("disk full"))
            } else {
                Ok(Vec::new())
            }
        })
        .expect_err("nodes stream fails to open");
        assert!(matches!(
            err,
            SinkError::Open {
                table: Table::Nodes,
                ..
            }
        ));
    }
}
