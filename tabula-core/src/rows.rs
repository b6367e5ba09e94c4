//! Row extraction for entities coming from a PBF extract.
//!
//! Each function produces the column values of one table row in the order
//! given by the bulk [`Schema`](crate::Schema).

use crate::entity::{EntityMeta, OsmEntity, OsmNode, OsmRelation, OsmWay};
use crate::table::{Field, Row};

/// Shared `epochMillis, id, version, changeset, username, uid` prefix.
fn meta_fields(meta: &EntityMeta) -> Row<'_> {
    vec![
        Field::opt_integer(meta.timestamp_millis),
        Field::Integer(meta.id),
        Field::opt_integer(meta.version),
        Field::opt_integer(meta.changeset),
        Field::opt_text(meta.username.as_deref()),
        Field::opt_integer(meta.uid),
    ]
}

/// One tags-table row per tag of `entity`, owner kind and id denormalised.
pub fn tag_rows(entity: &OsmEntity) -> impl Iterator<Item = Row<'_>> {
    let meta = entity.meta();
    let kind = entity.kind();
    entity.tags().iter().map(move |(key, value)| {
        vec![
            Field::opt_integer(meta.timestamp_millis),
            Field::text(kind.as_str()),
            Field::Integer(meta.id),
            Field::text(key),
            Field::text(value),
        ]
    })
}

/// Nodes-table row.
#[must_use]
pub fn node_row(node: &OsmNode) -> Row<'_> {
    let mut row = meta_fields(&node.meta);
    row.push(Field::Float(node.coordinate.y));
    row.push(Field::Float(node.coordinate.x));
    row
}

/// Ways-table row; `geometry` is absent when the way has no points.
#[must_use]
pub fn way_row<'a>(way: &'a OsmWay, geometry: Option<String>) -> Row<'a> {
    let mut row = meta_fields(&way.meta);
    row.push(geometry.map_or(Field::Null, Field::from));
    row
}

/// Relations-table row.
#[must_use]
pub fn relation_row(relation: &OsmRelation) -> Row<'_> {
    meta_fields(&relation.meta)
}

/// One members-table row per member of `relation`.
pub fn member_rows(relation: &OsmRelation) -> impl Iterator<Item = Row<'_>> {
    relation.members.iter().map(move |member| {
        vec![
            Field::Integer(relation.meta.id),
            Field::Integer(member.member_id),
            Field::text(&member.role),
            Field::text(member.member_type.as_str()),
        ]
    })
}
