//! Output tables, their column layouts and field formatting.

use std::borrow::Cow;
use std::fmt;

/// One of the relational tables produced from an entity stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    /// One row per tag per entity.
    Tags,
    /// One row per node.
    Nodes,
    /// One row per way, with its WKT geometry.
    Ways,
    /// One row per relation.
    Relations,
    /// One row per relation member.
    Members,
}

/// Column layout of the tags table.
pub const TAG_COLUMNS: &[&str] = &["epochMillis", "type", "id", "key", "value"];
/// Column layout of the nodes table.
pub const NODE_COLUMNS: &[&str] = &[
    "epochMillis",
    "id",
    "version",
    "changeset",
    "username",
    "uid",
    "lat",
    "lon",
];
/// Column layout of the ways table.
pub const WAY_COLUMNS: &[&str] = &[
    "epochMillis",
    "id",
    "version",
    "changeset",
    "username",
    "uid",
    "geometry",
];
/// Column layout of the relations table.
pub const RELATION_COLUMNS: &[&str] = &[
    "epochMillis",
    "id",
    "version",
    "changeset",
    "username",
    "uid",
];
/// Relations layout used by the diff pipeline, which appends the member refs.
pub const DIFF_RELATION_COLUMNS: &[&str] = &[
    "epochMillis",
    "id",
    "version",
    "changeset",
    "username",
    "uid",
    "members",
];
/// Column layout of the members table.
pub const MEMBER_COLUMNS: &[&str] = &["relationId", "memberId", "memberRole", "memberType"];

/// Which pipeline a table layout belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Schema {
    /// Full extract conversion.
    #[default]
    Bulk,
    /// Incremental augmented-diff conversion.
    Diff,
}

impl Table {
    /// Every table, in the order the pipelines open them.
    pub const ALL: [Self; 5] = [
        Self::Tags,
        Self::Nodes,
        Self::Ways,
        Self::Relations,
        Self::Members,
    ];

    /// Lowercase table name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Tags => "tags",
            Self::Nodes => "nodes",
            Self::Ways => "ways",
            Self::Relations => "relations",
            Self::Members => "members",
        }
    }

    /// Header columns of this table under `schema`.
    #[must_use]
    pub const fn columns(self, schema: Schema) -> &'static [&'static str] {
        match (self, schema) {
            (Self::Tags, _) => TAG_COLUMNS,
            (Self::Nodes, _) => NODE_COLUMNS,
            (Self::Ways, _) => WAY_COLUMNS,
            (Self::Relations, Schema::Bulk) => RELATION_COLUMNS,
            (Self::Relations, Schema::Diff) => DIFF_RELATION_COLUMNS,
            (Self::Members, _) => MEMBER_COLUMNS,
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Independent enable flags for every table.
///
/// A disabled table is never opened and no row is extracted for it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TableSelection {
    /// Emit the tags table.
    pub tags: bool,
    /// Emit the nodes table.
    pub nodes: bool,
    /// Emit the ways table.
    pub ways: bool,
    /// Emit the relations table.
    pub relations: bool,
    /// Emit the members table.
    pub members: bool,
}

impl TableSelection {
    /// Every table enabled.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            tags: true,
            nodes: true,
            ways: true,
            relations: true,
            members: true,
        }
    }

    /// Whether `table` is enabled.
    #[must_use]
    pub const fn is_enabled(self, table: Table) -> bool {
        match table {
            Table::Tags => self.tags,
            Table::Nodes => self.nodes,
            Table::Ways => self.ways,
            Table::Relations => self.relations,
            Table::Members => self.members,
        }
    }

    /// Enabled tables in [`Table::ALL`] order.
    pub fn enabled(self) -> impl Iterator<Item = Table> {
        Table::ALL
            .into_iter()
            .filter(move |table| self.is_enabled(*table))
    }
}

/// Per-table count of emitted rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowCounts {
    /// Rows written to the tags table.
    pub tags: u64,
    /// Rows written to the nodes table.
    pub nodes: u64,
    /// Rows written to the ways table.
    pub ways: u64,
    /// Rows written to the relations table.
    pub relations: u64,
    /// Rows written to the members table.
    pub members: u64,
}

impl RowCounts {
    /// Count for `table`.
    #[must_use]
    pub const fn get(&self, table: Table) -> u64 {
        match table {
            Table::Tags => self.tags,
            Table::Nodes => self.nodes,
            Table::Ways => self.ways,
            Table::Relations => self.relations,
            Table::Members => self.members,
        }
    }

    pub(crate) fn set(&mut self, table: Table, rows: u64) {
        let slot = match table {
            Table::Tags => &mut self.tags,
            Table::Nodes => &mut self.nodes,
            Table::Ways => &mut self.ways,
            Table::Relations => &mut self.relations,
            Table::Members => &mut self.members,
        };
        *slot = rows;
    }
}

/// A single column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Field<'a> {
    /// Absent value; renders as an empty field.
    Null,
    /// String value; rendered quoted.
    Text(Cow<'a, str>),
    /// Integer value; rendered bare.
    Integer(i64),
    /// Floating-point value; rendered bare.
    Float(f64),
}

impl<'a> Field<'a> {
    /// Borrowed text field.
    #[must_use]
    pub const fn text(value: &'a str) -> Self {
        Self::Text(Cow::Borrowed(value))
    }

    /// Text field, or [`Field::Null`] when absent.
    #[must_use]
    pub fn opt_text(value: Option<&'a str>) -> Self {
        value.map_or(Self::Null, Self::text)
    }

    /// Integer field, or [`Field::Null`] when absent.
    #[must_use]
    pub fn opt_integer<T: Into<i64>>(value: Option<T>) -> Self {
        value.map_or(Self::Null, |inner| Self::Integer(inner.into()))
    }

    /// Render the value for a CSV row.
    ///
    /// Strings are wrapped in double quotes after every embedded `"` has been
    /// replaced with `'`. The substitution is lossy; no other escaping is
    /// applied.
    ///
    /// ```
    /// use tabula_core::Field;
    ///
    /// assert_eq!(Field::text("He said \"hi\"").render(), "\"He said 'hi'\"");
    /// assert_eq!(Field::Integer(42).render(), "42");
    /// assert_eq!(Field::Null.render(), "");
    /// ```
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Text(value) => format!("\"{}\"", value.replace('"', "'")),
            Self::Integer(value) => value.to_string(),
            Self::Float(value) => value.to_string(),
        }
    }
}

impl From<i64> for Field<'_> {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for Field<'_> {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<String> for Field<'_> {
    fn from(value: String) -> Self {
        Self::Text(Cow::Owned(value))
    }
}

impl<'a> From<&'a str> for Field<'a> {
    fn from(value: &'a str) -> Self {
        Self::text(value)
    }
}

/// Ordered column values of one table row.
pub type Row<'a> = Vec<Field<'a>>;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Field::Null, "")]
    #[case(Field::text("plain"), "\"plain\"")]
    #[case(Field::text("He said \"hi\""), "\"He said 'hi'\"")]
    #[case(Field::text("a,b"), "\"a,b\"")]
    #[case(Field::text(""), "\"\"")]
    #[case(Field::Integer(-17), "-17")]
    #[case(Field::Float(52.5), "52.5")]
    #[case(Field::Float(13.0), "13")]
    fn renders_fields(#[case] field: Field<'static>, #[case] expected: &str) {
        assert_eq!(field.render(), expected);
    }

    #[rstest]
    fn optional_constructors_fall_back_to_null() {
        assert_eq!(Field::opt_text(None), Field::Null);
        assert_eq!(Field::opt_integer::<i32>(None), Field::Null);
        assert_eq!(Field::opt_integer(Some(7_i32)), Field::Integer(7));
    }

    #[rstest]
    fn selection_filters_tables() {
        let selection = TableSelection {
            tags: true,
            ways: true,
            ..TableSelection::default()
        };
        let enabled: Vec<Table> = selection.enabled().collect();
        assert_eq!(enabled, vec![Table::Tags, Table::Ways]);
        assert!(!selection.is_enabled(Table::Members));
    }

    #[rstest]
    fn diff_relations_carry_member_refs() {
        assert_eq!(Table::Relations.columns(Schema::Bulk).len(), 6);
        assert_eq!(
            Table::Relations.columns(Schema::Diff).last(),
            Some(&"members")
        );
        assert_eq!(
            Table::Ways.columns(Schema::Bulk),
            Table::Ways.columns(Schema::Diff)
        );
    }
}
