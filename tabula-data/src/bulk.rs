//! Bulk pipeline: one pass over an ordered entity stream into table sinks.

use std::error::Error as StdError;
use std::io::Write;

use log::{debug, info};
use tabula_core::{
    MissingNode, NodeCoordinateCache, OsmEntity, OsmNode, OsmRelation, OsmWay, RowCounts,
    SinkError, SummaryTracker, Table, TableSinks, build_wkt, rows,
};
use thiserror::Error;

/// Errors that abort a bulk run.
#[derive(Debug, Error)]
pub enum BulkError {
    /// The entity source failed.
    #[error("failed to read the entity stream")]
    Decode {
        /// Error reported by the source.
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
    /// A way referenced a node that the stream had not produced yet.
    #[error("entity stream is not ordered nodes, ways, relations")]
    OrderingViolation(#[from] MissingNode),
    /// A table stream failed.
    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Outcome of a successful bulk run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BulkReport {
    /// Node bounds and the highest changeset id seen.
    pub summary: SummaryTracker,
    /// Rows emitted per table.
    pub counts: RowCounts,
}

/// Drive `entities` through the row extractors into `sinks`.
///
/// The stream must yield every node before any way that references it. Work
/// for a table is skipped entirely when `sinks` has no stream for it; in
/// particular nodes are only cached when the ways table is enabled.
///
/// # Errors
///
/// Stops at the first source error, unresolved way node or sink failure.
/// Rows already written stay in the sinks, which the caller drops or
/// finishes.
///
/// # Examples
/// ```
/// use geo::Coord;
/// use tabula_core::{EntityMeta, OsmEntity, OsmNode, Schema, TableSelection, TableSinks};
/// use tabula_data::run_bulk;
///
/// let node = OsmEntity::Node(OsmNode {
///     meta: EntityMeta::new(1).with_changeset(7),
///     tags: Vec::new(),
///     coordinate: Coord { x: 13.5, y: 52.5 },
/// });
/// let selection = TableSelection { nodes: true, ..TableSelection::default() };
/// let mut sinks = TableSinks::open(selection, Schema::Bulk, |_| Ok(Vec::new()))?;
/// let report = run_bulk([Ok::<_, std::io::Error>(node)], &mut sinks)?;
/// assert_eq!(report.counts.nodes, 1);
/// assert_eq!(report.summary.watermark().value(), 7);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn run_bulk<I, E, W>(entities: I, sinks: &mut TableSinks<W>) -> Result<BulkReport, BulkError>
where
    I: IntoIterator<Item = Result<OsmEntity, E>>,
    E: Into<Box<dyn StdError + Send + Sync>>,
    W: Write,
{
    let mut pipeline = BulkPipeline {
        cache: NodeCoordinateCache::new(),
        summary: SummaryTracker::new(),
        resolve_ways: sinks.is_enabled(Table::Ways),
    };
    for entity in entities {
        let entity = entity.map_err(|source| BulkError::Decode {
            source: source.into(),
        })?;
        pipeline.process(&entity, sinks)?;
    }
    let counts = sinks.counts();
    debug!("cached {} node coordinates", pipeline.cache.len());
    info!(
        "bulk run emitted {} nodes, {} ways, {} relations, {} members, {} tags; watermark {}",
        counts.nodes,
        counts.ways,
        counts.relations,
        counts.members,
        counts.tags,
        pipeline.summary.watermark()
    );
    Ok(BulkReport {
        summary: pipeline.summary,
        counts,
    })
}

struct BulkPipeline {
    cache: NodeCoordinateCache,
    summary: SummaryTracker,
    resolve_ways: bool,
}

impl BulkPipeline {
    fn process<W: Write>(
        &mut self,
        entity: &OsmEntity,
        sinks: &mut TableSinks<W>,
    ) -> Result<(), BulkError> {
        if let Some(changeset) = entity.meta().changeset {
            self.summary.observe_watermark(changeset);
        }
        if sinks.is_enabled(Table::Tags) {
            for row in rows::tag_rows(entity) {
                sinks.write_row(Table::Tags, &row)?;
            }
        }
        match entity {
            OsmEntity::Node(node) => self.node(node, sinks),
            OsmEntity::Way(way) => self.way(way, sinks),
            OsmEntity::Relation(relation) => Self::relation(relation, sinks),
        }
    }

    fn node<W: Write>(&mut self, node: &OsmNode, sinks: &mut TableSinks<W>) -> Result<(), BulkError> {
        self.summary.observe_coordinate(node.coordinate);
        if self.resolve_ways {
            self.cache.put(node.meta.id, node.coordinate);
        }
        if sinks.is_enabled(Table::Nodes) {
            sinks.write_row(Table::Nodes, &rows::node_row(node))?;
        }
        Ok(())
    }

    fn way<W: Write>(&self, way: &OsmWay, sinks: &mut TableSinks<W>) -> Result<(), BulkError> {
        if !self.resolve_ways {
            return Ok(());
        }
        let points = self.cache.resolve(way.meta.id, &way.node_refs)?;
        // Only an empty point list fails, and that maps to an absent geometry.
        let geometry = build_wkt(&points).ok();
        sinks.write_row(Table::Ways, &rows::way_row(way, geometry))?;
        Ok(())
    }

    fn relation<W: Write>(relation: &OsmRelation, sinks: &mut TableSinks<W>) -> Result<(), BulkError> {
        if sinks.is_enabled(Table::Relations) {
            sinks.write_row(Table::Relations, &rows::relation_row(relation))?;
        }
        if sinks.is_enabled(Table::Members) {
            for row in rows::member_rows(relation) {
                sinks.write_row(Table::Members, &row)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Coord;
    use rstest::{fixture, rstest};
    use std::io;
    use tabula_core::{
        EntityKind, EntityMeta, RelationMember, Schema, TableOutput, TableSelection,
    };

    fn node(id: i64, lat: f64, lon: f64, changeset: i64) -> OsmEntity {
        OsmEntity::Node(OsmNode {
            meta: EntityMeta::new(id).with_changeset(changeset),
            tags: Vec::new(),
            coordinate: Coord { x: lon, y: lat },
        })
    }

    fn way(id: i64, node_refs: Vec<i64>) -> OsmEntity {
        OsmEntity::Way(OsmWay {
            meta: EntityMeta::new(id).with_changeset(5),
            tags: vec![("area".into(), "yes".into())],
            node_refs,
        })
    }

    fn relation(id: i64) -> OsmEntity {
        OsmEntity::Relation(OsmRelation {
            meta: EntityMeta::new(id).with_changeset(300),
            tags: Vec::new(),
            members: vec![RelationMember {
                member_id: 10,
                member_type: EntityKind::Way,
                role: "outer".into(),
            }],
        })
    }

    #[fixture]
    fn square() -> Vec<OsmEntity> {
        vec![
            node(1, 0.0, 0.0, 100),
            node(2, 0.0, 1.0, 101),
            node(3, 1.0, 1.0, 102),
            way(10, vec![1, 2, 3, 1]),
            relation(20),
        ]
    }

    fn run(
        entities: Vec<OsmEntity>,
        selection: TableSelection,
    ) -> (Result<BulkReport, BulkError>, Vec<TableOutput<Vec<u8>>>) {
        let mut sinks =
            TableSinks::open(selection, Schema::Bulk, |_| Ok(Vec::new())).expect("open sinks");
        let result = run_bulk(entities.into_iter().map(Ok::<_, io::Error>), &mut sinks);
        (result, sinks.finish().expect("finish sinks"))
    }

    fn lines(outputs: &[TableOutput<Vec<u8>>], table: Table) -> Vec<String> {
        outputs
            .iter()
            .find(|output| output.table == table)
            .map(|output| {
                String::from_utf8(output.inner.clone())
                    .expect("utf-8 output")
                    .lines()
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }

    #[rstest]
    fn closed_way_becomes_polygon(square: Vec<OsmEntity>) {
        let (result, outputs) = run(square, TableSelection::all());
        let report = result.expect("bulk run succeeds");
        assert_eq!(
            lines(&outputs, Table::Ways),
            vec![
                "epochMillis,id,version,changeset,username,uid,geometry".to_owned(),
                ",10,,5,,,\"POLYGON((0 0, 1 0, 1 1, 0 0))\"".to_owned(),
            ]
        );
        assert_eq!(report.counts.nodes, 3);
        assert_eq!(report.counts.members, 1);
        assert_eq!(report.counts.tags, 1);
        assert_eq!(report.summary.watermark().value(), 300);
    }

    #[rstest]
    fn bounds_cover_every_node(square: Vec<OsmEntity>) {
        let (result, _) = run(square, TableSelection::default());
        let bounds = result.expect("bulk run succeeds").summary.bounds();
        assert_eq!(
            (bounds.min_lat, bounds.max_lat, bounds.min_lon, bounds.max_lon),
            (0.0, 1.0, 0.0, 1.0)
        );
    }

    #[rstest]
    fn missing_node_aborts_with_header_only() {
        let entities = vec![node(1, 0.0, 0.0, 1), way(11, vec![1, 99])];
        let (result, outputs) = run(entities, TableSelection::all());
        let err = result.expect_err("ordering violation");
        assert!(matches!(
            err,
            BulkError::OrderingViolation(MissingNode {
                way_id: 11,
                node_id: 99
            })
        ));
        assert_eq!(lines(&outputs, Table::Ways).len(), 1);
    }

    #[rstest]
    fn disabled_ways_skip_resolution() {
        let entities = vec![way(11, vec![99])];
        let selection = TableSelection {
            tags: true,
            ..TableSelection::default()
        };
        let (result, outputs) = run(entities, selection);
        assert_eq!(result.expect("no resolution attempted").counts.ways, 0);
        assert_eq!(
            lines(&outputs, Table::Tags),
            vec![
                "epochMillis,type,id,key,value".to_owned(),
                ",\"way\",11,\"area\",\"yes\"".to_owned(),
            ]
        );
    }

    #[rstest]
    fn way_without_refs_has_empty_geometry() {
        let selection = TableSelection {
            ways: true,
            ..TableSelection::default()
        };
        let (result, outputs) = run(vec![way(12, Vec::new())], selection);
        result.expect("bulk run succeeds");
        assert_eq!(lines(&outputs, Table::Ways)[1], ",12,,5,,,");
    }

    #[rstest]
    fn source_errors_abort_the_run() {
        let mut sinks = TableSinks::<Vec<u8>>::open(TableSelection::all(), Schema::Bulk, |_| {
            Ok(Vec::new())
        })
        .expect("open sinks");
        let entities = vec![Ok(node(1, 0.0, 0.0, 1)), Err(io::Error::other("truncated"))];
        let err = run_bulk(entities, &mut sinks).expect_err("source failure");
        assert!(matches!(err, BulkError::Decode { .. }));
    }
}
