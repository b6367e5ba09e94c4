//! Owned OSM entity model shared by the bulk and diff pipelines.

use std::fmt;

use geo::Coord;

/// Kind of an OSM entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum EntityKind {
    /// A point feature.
    Node,
    /// An ordered list of node references.
    Way,
    /// An ordered list of typed members.
    Relation,
}

impl EntityKind {
    /// Lowercase name used in table rows and OSM XML element names.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Way => "way",
            Self::Relation => "relation",
        }
    }

    /// Parse an OSM XML element name.
    ///
    /// ```
    /// use tabula_core::EntityKind;
    ///
    /// assert_eq!(EntityKind::from_element_name("way"), Some(EntityKind::Way));
    /// assert_eq!(EntityKind::from_element_name("changeset"), None);
    /// ```
    #[must_use]
    pub fn from_element_name(name: &str) -> Option<Self> {
        match name {
            "node" => Some(Self::Node),
            "way" => Some(Self::Way),
            "relation" => Some(Self::Relation),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered key/value tags attached to an entity.
pub type Tags = Vec<(String, String)>;

/// Version, authorship and timing metadata common to every entity.
///
/// Fields other than `id` are optional because PBF extracts may omit the
/// metadata block entirely.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityMeta {
    /// OSM identifier.
    pub id: i64,
    /// Entity version.
    pub version: Option<i32>,
    /// Changeset that produced this version.
    pub changeset: Option<i64>,
    /// Display name of the editing user.
    pub username: Option<String>,
    /// Numeric id of the editing user.
    pub uid: Option<i32>,
    /// Edit time as milliseconds since the Unix epoch.
    pub timestamp_millis: Option<i64>,
}

impl EntityMeta {
    /// Metadata carrying only an id.
    #[must_use]
    pub fn new(id: i64) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// Set the version.
    #[must_use]
    pub fn with_version(mut self, version: i32) -> Self {
        self.version = Some(version);
        self
    }

    /// Set the changeset id.
    #[must_use]
    pub fn with_changeset(mut self, changeset: i64) -> Self {
        self.changeset = Some(changeset);
        self
    }

    /// Set the editing user.
    #[must_use]
    pub fn with_user(mut self, uid: i32, username: impl Into<String>) -> Self {
        self.uid = Some(uid);
        self.username = Some(username.into());
        self
    }

    /// Set the edit timestamp in epoch milliseconds.
    #[must_use]
    pub fn with_timestamp_millis(mut self, millis: i64) -> Self {
        self.timestamp_millis = Some(millis);
        self
    }
}

/// A node with its location.
#[derive(Debug, Clone, PartialEq)]
pub struct OsmNode {
    /// Common metadata.
    pub meta: EntityMeta,
    /// Attached tags.
    pub tags: Tags,
    /// WGS84 location (`x = longitude`, `y = latitude`).
    pub coordinate: Coord<f64>,
}

/// A way with its ordered node references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsmWay {
    /// Common metadata.
    pub meta: EntityMeta,
    /// Attached tags.
    pub tags: Tags,
    /// Referenced node ids in way order.
    pub node_refs: Vec<i64>,
}

/// One member of a relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationMember {
    /// Referenced entity id.
    pub member_id: i64,
    /// Referenced entity kind.
    pub member_type: EntityKind,
    /// Role of the member within the relation (may be empty).
    pub role: String,
}

/// A relation with its ordered members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsmRelation {
    /// Common metadata.
    pub meta: EntityMeta,
    /// Attached tags.
    pub tags: Tags,
    /// Members in relation order.
    pub members: Vec<RelationMember>,
}

/// Any OSM entity produced by an entity source.
#[derive(Debug, Clone, PartialEq)]
pub enum OsmEntity {
    /// A node.
    Node(OsmNode),
    /// A way.
    Way(OsmWay),
    /// A relation.
    Relation(OsmRelation),
}

impl OsmEntity {
    /// Kind of the wrapped entity.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::Node(_) => EntityKind::Node,
            Self::Way(_) => EntityKind::Way,
            Self::Relation(_) => EntityKind::Relation,
        }
    }

    /// Metadata of the wrapped entity.
    #[must_use]
    pub const fn meta(&self) -> &EntityMeta {
        match self {
            Self::Node(node) => &node.meta,
            Self::Way(way) => &way.meta,
            Self::Relation(relation) => &relation.meta,
        }
    }

    /// Tags of the wrapped entity.
    #[must_use]
    pub fn tags(&self) -> &[(String, String)] {
        match self {
            Self::Node(node) => &node.tags,
            Self::Way(way) => &way.tags,
            Self::Relation(relation) => &relation.tags,
        }
    }
}
