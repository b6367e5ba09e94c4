//! Diff pipeline: create actions of an augmented diff into table sinks.
//!
//! Way geometry comes from the `lat`/`lon` attributes embedded in each `nd`
//! element, so no coordinate cache is involved. Points that fail to parse
//! are dropped; a way left with no points gets an empty geometry.

mod document;

use std::io::Write;
use std::str::FromStr;

use log::info;
use tabula_core::{
    EntityKind, Field, Row, RowCounts, SinkError, Table, TableSinks, Watermark, build_wkt,
};
use thiserror::Error;

pub use document::{
    CreatedEntity, DiffDocument, MAX_ELEMENT_DEPTH, MemberRef, PointRef, RawAttributes,
};

/// Errors raised by the diff pipeline.
#[derive(Debug, Error)]
pub enum DiffError {
    /// The document is not well-formed XML.
    #[error("malformed augmented diff near byte {position}")]
    Xml {
        /// Reader position when the error was detected.
        position: usize,
        /// Underlying parser error.
        #[source]
        source: quick_xml::Error,
    },
    /// The document ended before an element was closed.
    #[error("augmented diff ended inside <{element}>")]
    Truncated {
        /// Innermost unclosed element.
        element: String,
    },
    /// Elements are nested deeper than the reader accepts.
    #[error("augmented diff nests elements deeper than {limit} near byte {position}")]
    TooDeep {
        /// Deepest nesting accepted.
        limit: usize,
        /// Reader position of the element that crossed the limit.
        position: usize,
    },
    /// A table stream failed.
    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Quantity tracked as the resumption watermark of a diff run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum WatermarkKind {
    /// Highest changeset id.
    #[default]
    Changeset,
    /// Latest edit time, in epoch milliseconds.
    Timestamp,
}

impl FromStr for WatermarkKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "changeset" => Ok(Self::Changeset),
            "timestamp" => Ok(Self::Timestamp),
            other => Err(format!(
                "unknown watermark kind {other:?}; expected changeset or timestamp"
            )),
        }
    }
}

/// Outcome of a successful diff run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffReport {
    /// Watermark to resume from.
    pub watermark: Watermark,
    /// Rows emitted per table.
    pub counts: RowCounts,
}

/// Write the create actions of `document` into `sinks`.
///
/// The watermark starts at `previous` and only rises.
///
/// # Examples
/// ```
/// use tabula_core::{Schema, TableSelection, TableSinks, Watermark};
/// use tabula_data::{DiffDocument, WatermarkKind, run_diff};
///
/// let document = DiffDocument::parse(
///     r#"<osm><action type="create">
///          <node id="7" changeset="12" lat="1" lon="2"/>
///        </action></osm>"#,
/// )?;
/// let selection = TableSelection { nodes: true, ..TableSelection::default() };
/// let mut sinks = TableSinks::open(selection, Schema::Diff, |_| Ok(Vec::new()))?;
/// let report = run_diff(&document, &mut sinks, Watermark::new(10), WatermarkKind::Changeset)?;
/// assert_eq!(report.watermark, Watermark::new(12));
/// assert_eq!(report.counts.nodes, 1);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn run_diff<W: Write>(
    document: &DiffDocument,
    sinks: &mut TableSinks<W>,
    previous: Watermark,
    kind: WatermarkKind,
) -> Result<DiffReport, DiffError> {
    let mut watermark = previous;
    for entity in document.creations() {
        let epoch_millis = entity.epoch_millis();
        match kind {
            WatermarkKind::Changeset => watermark.observe(entity.changeset()),
            WatermarkKind::Timestamp => {
                if let Some(millis) = epoch_millis {
                    watermark.observe(millis);
                }
            }
        }
        write_entity(entity, epoch_millis, sinks)?;
    }
    let counts = sinks.counts();
    info!(
        "diff run emitted {} nodes, {} ways, {} relations, {} members, {} tags; watermark {watermark}",
        counts.nodes, counts.ways, counts.relations, counts.members, counts.tags
    );
    Ok(DiffReport { watermark, counts })
}

fn meta_fields(entity: &CreatedEntity, epoch_millis: Option<i64>) -> Row<'_> {
    let attributes = &entity.attributes;
    vec![
        Field::opt_integer(epoch_millis),
        Field::opt_text(attributes.id.as_deref()),
        Field::opt_text(attributes.version.as_deref()),
        Field::opt_text(attributes.changeset.as_deref()),
        Field::opt_text(attributes.user.as_deref()),
        Field::opt_text(attributes.uid.as_deref()),
    ]
}

fn write_entity<W: Write>(
    entity: &CreatedEntity,
    epoch_millis: Option<i64>,
    sinks: &mut TableSinks<W>,
) -> Result<(), SinkError> {
    if sinks.is_enabled(Table::Tags) {
        for (key, value) in &entity.tags {
            sinks.write_row(
                Table::Tags,
                &[
                    Field::opt_integer(epoch_millis),
                    Field::text(entity.kind.as_str()),
                    Field::opt_text(entity.attributes.id.as_deref()),
                    Field::text(key),
                    Field::text(value),
                ],
            )?;
        }
    }
    match entity.kind {
        EntityKind::Node if sinks.is_enabled(Table::Nodes) => {
            let mut row = meta_fields(entity, epoch_millis);
            row.push(Field::opt_text(entity.attributes.lat.as_deref()));
            row.push(Field::opt_text(entity.attributes.lon.as_deref()));
            sinks.write_row(Table::Nodes, &row)
        }
        EntityKind::Way if sinks.is_enabled(Table::Ways) => {
            let mut row = meta_fields(entity, epoch_millis);
            let geometry = build_wkt(&entity.coordinates()).ok();
            row.push(geometry.map_or(Field::Null, Field::from));
            sinks.write_row(Table::Ways, &row)
        }
        EntityKind::Relation => {
            if sinks.is_enabled(Table::Relations) {
                let mut row = meta_fields(entity, epoch_millis);
                row.push(Field::from(entity.member_refs()));
                sinks.write_row(Table::Relations, &row)?;
            }
            if sinks.is_enabled(Table::Members) {
                for member in &entity.members {
                    sinks.write_row(
                        Table::Members,
                        &[
                            Field::opt_text(entity.attributes.id.as_deref()),
                            Field::opt_text(member.reference.as_deref()),
                            Field::opt_text(member.role.as_deref()),
                            Field::opt_text(member.member_type.as_deref()),
                        ],
                    )?;
                }
            }
            Ok(())
        }
        EntityKind::Node | EntityKind::Way => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use tabula_core::{Schema, TableOutput, TableSelection};

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<osm version="0.6" generator="Overpass API">
  <action type="create">
    <node id="101" version="1" changeset="500" user="ann" uid="3" timestamp="2025-03-03T11:55:24Z" lat="52.5" lon="13.4">
      <tag k="name" v="Kiosk &quot;Ost&quot;"/>
    </node>
  </action>
  <action type="modify">
    <old><node id="55" version="1" changeset="400" lat="0" lon="0"/></old>
    <new><node id="55" version="2" changeset="900" lat="1" lon="1"/></new>
  </action>
  <action type="create">
    <way id="201" version="1" changeset="501" user="ann" uid="3" timestamp="not a time">
      <nd ref="1" lat="0" lon="0"/>
      <nd ref="2" lat="0" lon="1"/>
      <nd ref="3" lat="1" lon="1"/>
      <nd ref="1" lat="0" lon="0"/>
    </way>
  </action>
  <action type="create">
    <relation id="301" version="1" changeset="499" user="ann" uid="3" timestamp="2025-03-03T11:55:24Z">
      <member type="way" ref="201" role="outer"/>
      <member type="node" ref="101" role=""/>
      <tag k="type" v="multipolygon"/>
    </relation>
  </action>
</osm>"#;

    #[fixture]
    fn sample() -> DiffDocument {
        DiffDocument::parse(SAMPLE).expect("sample parses")
    }

    fn run(
        document: &DiffDocument,
        kind: WatermarkKind,
    ) -> (DiffReport, Vec<TableOutput<Vec<u8>>>) {
        let mut sinks = TableSinks::open(TableSelection::all(), Schema::Diff, |_| Ok(Vec::new()))
            .expect("open sinks");
        let report = run_diff(document, &mut sinks, Watermark::new(100), kind).expect("diff run");
        (report, sinks.finish().expect("finish sinks"))
    }

    fn body(outputs: &[TableOutput<Vec<u8>>], table: Table) -> Vec<String> {
        let output = outputs
            .iter()
            .find(|output| output.table == table)
            .unwrap_or_else(|| panic!("no output for {table}"));
        String::from_utf8(output.inner.clone())
            .expect("utf-8 output")
            .lines()
            .skip(1)
            .map(str::to_owned)
            .collect()
    }

    #[rstest]
    fn modify_actions_emit_nothing(sample: DiffDocument) {
        let (report, outputs) = run(&sample, WatermarkKind::Changeset);
        assert_eq!(report.watermark, Watermark::new(501));
        assert_eq!(
            body(&outputs, Table::Nodes),
            vec!["1741002924000,\"101\",\"1\",\"500\",\"ann\",\"3\",\"52.5\",\"13.4\""]
        );
    }

    #[rstest]
    fn ways_use_inline_coordinates(sample: DiffDocument) {
        let (_, outputs) = run(&sample, WatermarkKind::Changeset);
        assert_eq!(
            body(&outputs, Table::Ways),
            vec![",\"201\",\"1\",\"501\",\"ann\",\"3\",\"POLYGON((0 0, 1 0, 1 1, 0 0))\""]
        );
    }

    #[rstest]
    fn relations_list_member_refs(sample: DiffDocument) {
        let (report, outputs) = run(&sample, WatermarkKind::Changeset);
        assert_eq!(
            body(&outputs, Table::Relations),
            vec!["1741002924000,\"301\",\"1\",\"499\",\"ann\",\"3\",\"201,101\""]
        );
        assert_eq!(
            body(&outputs, Table::Members),
            vec!["\"301\",\"201\",\"outer\",\"way\"", "\"301\",\"101\",\"\",\"node\""]
        );
        assert_eq!(report.counts.members, 2);
    }

    #[rstest]
    fn tags_keep_owner_kind(sample: DiffDocument) {
        let (report, outputs) = run(&sample, WatermarkKind::Changeset);
        assert_eq!(
            body(&outputs, Table::Tags),
            vec![
                "1741002924000,\"node\",\"101\",\"name\",\"Kiosk 'Ost'\"",
                "1741002924000,\"relation\",\"301\",\"type\",\"multipolygon\"",
            ]
        );
        assert_eq!(report.counts.tags, 2);
    }

    #[rstest]
    fn timestamp_watermark_tracks_edit_time(sample: DiffDocument) {
        let (report, _) = run(&sample, WatermarkKind::Timestamp);
        assert_eq!(report.watermark, Watermark::new(1_741_002_924_000));
    }

    #[rstest]
    fn unusable_points_leave_geometry_empty() {
        let document = DiffDocument::parse(
            r#"<osm><action type="create"><way id="1"><nd lat="x" lon="y"/></way></action></osm>"#,
        )
        .expect("parses");
        let (report, outputs) = run(&document, WatermarkKind::Changeset);
        assert_eq!(body(&outputs, Table::Ways), vec![",\"1\",,,,,"]);
        assert_eq!(report.watermark, Watermark::new(100));
    }

    #[rstest]
    #[case("changeset", WatermarkKind::Changeset)]
    #[case(" Timestamp ", WatermarkKind::Timestamp)]
    fn watermark_kind_parses(#[case] raw: &str, #[case] expected: WatermarkKind) {
        assert_eq!(raw.parse::<WatermarkKind>(), Ok(expected));
        assert!("sequence".parse::<WatermarkKind>().is_err());
    }
}
