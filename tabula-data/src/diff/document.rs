//! Augmented-diff XML reading.
//!
//! The document is streamed with `quick-xml`; each `action` element is
//! captured as a small owned subtree and inspected. Only `create` actions
//! survive; their entity element is captured with its attributes as raw
//! strings.

use geo::Coord;
use log::{debug, warn};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::ops::Range;
use tabula_core::{EntityKind, Tags};

use super::DiffError;

#[derive(Debug, Clone, PartialEq, Eq)]
struct XmlElement {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<XmlElement>,
}

impl XmlElement {
    fn from_start(start: &BytesStart<'_>, position: usize) -> Result<Self, DiffError> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let attributes = start
            .attributes()
            .map(|attribute| {
                let attribute = attribute
                    .map_err(|source| DiffError::Xml {
                        position,
                        source: quick_xml::Error::from(source),
                    })?;
                let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
                let value = attribute
                    .unescape_value()
                    .map_err(|source| DiffError::Xml { position, source })?
                    .into_owned();
                Ok((key, value))
            })
            .collect::<Result<Vec<_>, DiffError>>()?;
        Ok(Self {
            name,
            attributes,
            children: Vec::new(),
        })
    }

    fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    fn owned_attribute(&self, key: &str) -> Option<String> {
        self.attribute(key).map(str::to_owned)
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |child| child.name == name)
    }
}

/// Deepest element nesting accepted in a diff document.
pub const MAX_ELEMENT_DEPTH: usize = 256;

fn close(open: &mut Vec<XmlElement>, actions: &mut Vec<XmlElement>) {
    let Some(element) = open.pop() else {
        return;
    };
    match open.last_mut() {
        Some(parent) => parent.children.push(element),
        None => actions.push(element),
    }
}

/// Stream the document and return its `action` elements as owned subtrees.
///
/// Only elements inside an action are materialised; everything else is
/// tracked by name so an unterminated document can still be reported.
fn parse_actions(xml: &str) -> Result<Vec<XmlElement>, DiffError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut outer: Vec<String> = Vec::new();
    let mut open: Vec<XmlElement> = Vec::new();
    let mut actions = Vec::new();
    loop {
        let position = reader.buffer_position();
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                if outer.len() + open.len() >= MAX_ELEMENT_DEPTH {
                    return Err(DiffError::TooDeep {
                        limit: MAX_ELEMENT_DEPTH,
                        position,
                    });
                }
                if open.is_empty() && start.name().as_ref() != b"action" {
                    outer.push(String::from_utf8_lossy(start.name().as_ref()).into_owned());
                } else {
                    open.push(XmlElement::from_start(&start, position)?);
                }
            }
            Ok(Event::Empty(start)) => {
                if !open.is_empty() || start.name().as_ref() == b"action" {
                    open.push(XmlElement::from_start(&start, position)?);
                    close(&mut open, &mut actions);
                }
            }
            Ok(Event::End(_)) => {
                if open.is_empty() {
                    outer.pop();
                } else {
                    close(&mut open, &mut actions);
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(source) => {
                return Err(DiffError::Xml {
                    position: reader.buffer_position(),
                    source,
                });
            }
        }
    }
    match open.pop().map(|element| element.name).or_else(|| outer.pop()) {
        Some(element) => Err(DiffError::Truncated { element }),
        None => Ok(actions),
    }
}

/// Epoch milliseconds of a `YYYY-MM-DDTHH:MM:SSZ` timestamp.
///
/// Any other shape, fractional seconds included, yields `None`.
fn parse_timestamp(raw: &str) -> Option<i64> {
    let bytes = raw.as_bytes();
    if bytes.len() != 20 {
        return None;
    }
    let shaped = bytes.iter().enumerate().all(|(index, byte)| match index {
        4 | 7 => *byte == b'-',
        10 => *byte == b'T',
        13 | 16 => *byte == b':',
        19 => *byte == b'Z',
        _ => byte.is_ascii_digit(),
    });
    if !shaped {
        return None;
    }
    let field = |range: Range<usize>| {
        raw.get(range)
            .and_then(|digits| digits.parse::<i64>().ok())
    };
    let (year, month, day) = (field(0..4)?, field(5..7)?, field(8..10)?);
    let (hour, minute, second) = (field(11..13)?, field(14..16)?, field(17..19)?);
    if !(1..=12).contains(&month)
        || !(1..=days_in_month(year, month)).contains(&day)
        || hour > 23
        || minute > 59
        || second > 59
    {
        return None;
    }
    let days = days_from_civil(year, month, day);
    Some((((days * 24 + hour) * 60 + minute) * 60 + second) * 1000)
}

const fn days_in_month(year: i64, month: i64) -> i64 {
    match month {
        2 if year % 4 == 0 && (year % 100 != 0 || year % 400 == 0) => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

/// Days between 1970-01-01 and the given proleptic Gregorian date.
const fn days_from_civil(year: i64, month: i64, day: i64) -> i64 {
    let year = if month <= 2 { year - 1 } else { year };
    let era = year.div_euclid(400);
    let year_of_era = year.rem_euclid(400);
    let day_of_year = (153 * ((month + 9) % 12) + 2) / 5 + day - 1;
    let day_of_era = year_of_era * 365 + year_of_era / 4 - year_of_era / 100 + day_of_year;
    era * 146_097 + day_of_era - 719_468
}

/// Attributes of a created entity, exactly as they appear in the document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawAttributes {
    /// `id`.
    pub id: Option<String>,
    /// `version`.
    pub version: Option<String>,
    /// `changeset`.
    pub changeset: Option<String>,
    /// `user`.
    pub user: Option<String>,
    /// `uid`.
    pub uid: Option<String>,
    /// `timestamp`.
    pub timestamp: Option<String>,
    /// `lat` (nodes only).
    pub lat: Option<String>,
    /// `lon` (nodes only).
    pub lon: Option<String>,
}

/// Inline location of a way node (`nd` element).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PointRef {
    /// `lat`.
    pub lat: Option<String>,
    /// `lon`.
    pub lon: Option<String>,
}

impl PointRef {
    /// Parsed coordinate, or `None` when either axis is missing or not a number.
    #[must_use]
    pub fn coordinate(&self) -> Option<Coord<f64>> {
        let lat = self.lat.as_deref()?.trim().parse().ok()?;
        let lon = self.lon.as_deref()?.trim().parse().ok()?;
        Some(Coord { x: lon, y: lat })
    }
}

/// A relation member (`member` element).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberRef {
    /// `ref`.
    pub reference: Option<String>,
    /// `role`.
    pub role: Option<String>,
    /// `type`.
    pub member_type: Option<String>,
}

/// An entity introduced by a `create` action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedEntity {
    /// Element kind.
    pub kind: EntityKind,
    /// Raw attributes.
    pub attributes: RawAttributes,
    /// `tag` children as `(k, v)` pairs.
    pub tags: Tags,
    /// `nd` children (ways).
    pub points: Vec<PointRef>,
    /// `member` children (relations).
    pub members: Vec<MemberRef>,
}

impl CreatedEntity {
    fn from_element(kind: EntityKind, element: &XmlElement) -> Self {
        let attributes = RawAttributes {
            id: element.owned_attribute("id"),
            version: element.owned_attribute("version"),
            changeset: element.owned_attribute("changeset"),
            user: element.owned_attribute("user"),
            uid: element.owned_attribute("uid"),
            timestamp: element.owned_attribute("timestamp"),
            lat: element.owned_attribute("lat"),
            lon: element.owned_attribute("lon"),
        };
        let tags = element
            .children_named("tag")
            .map(|tag| {
                (
                    tag.owned_attribute("k").unwrap_or_default(),
                    tag.owned_attribute("v").unwrap_or_default(),
                )
            })
            .collect();
        let points = element
            .children_named("nd")
            .map(|nd| PointRef {
                lat: nd.owned_attribute("lat"),
                lon: nd.owned_attribute("lon"),
            })
            .collect();
        let members = element
            .children_named("member")
            .map(|member| MemberRef {
                reference: member.owned_attribute("ref"),
                role: member.owned_attribute("role"),
                member_type: member.owned_attribute("type"),
            })
            .collect();
        Self {
            kind,
            attributes,
            tags,
            points,
            members,
        }
    }

    /// Edit time in epoch milliseconds.
    ///
    /// An unparseable timestamp is logged and treated as absent.
    #[must_use]
    pub fn epoch_millis(&self) -> Option<i64> {
        let raw = self.attributes.timestamp.as_deref()?;
        let millis = parse_timestamp(raw);
        if millis.is_none() {
            warn!(
                "{} {}: unparseable timestamp {raw:?}",
                self.kind,
                self.attributes.id.as_deref().unwrap_or("?")
            );
        }
        millis
    }

    /// Changeset id, or 0 when absent or not an integer.
    #[must_use]
    pub fn changeset(&self) -> i64 {
        self.attributes
            .changeset
            .as_deref()
            .and_then(|raw| raw.trim().parse().ok())
            .unwrap_or(0)
    }

    /// Coordinates of the way nodes, skipping any that do not parse.
    #[must_use]
    pub fn coordinates(&self) -> Vec<Coord<f64>> {
        let coordinates: Vec<_> = self.points.iter().filter_map(PointRef::coordinate).collect();
        let skipped = self.points.len() - coordinates.len();
        if skipped > 0 {
            warn!(
                "way {}: skipped {skipped} node(s) without a usable location",
                self.attributes.id.as_deref().unwrap_or("?")
            );
        }
        coordinates
    }

    /// Comma-joined `ref` values of the members that carry one.
    #[must_use]
    pub fn member_refs(&self) -> String {
        self.members
            .iter()
            .filter_map(|member| member.reference.as_deref())
            .filter(|reference| !reference.is_empty())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// The create actions of one augmented diff, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffDocument {
    creations: Vec<CreatedEntity>,
    skipped: usize,
}

impl DiffDocument {
    /// Parse an augmented diff.
    ///
    /// Actions whose `type` is not `create` are skipped, as are create
    /// actions with no `node`, `way` or `relation` to read.
    ///
    /// # Examples
    /// ```
    /// use tabula_data::DiffDocument;
    ///
    /// let document = DiffDocument::parse(
    ///     r#"<osm>
    ///          <action type="create"><node id="1" lat="1.5" lon="2.5"/></action>
    ///          <action type="delete"><node id="2"/></action>
    ///        </osm>"#,
    /// )?;
    /// assert_eq!(document.creations().len(), 1);
    /// assert_eq!(document.skipped(), 1);
    /// # Ok::<(), tabula_data::DiffError>(())
    /// ```
    pub fn parse(xml: &str) -> Result<Self, DiffError> {
        let mut document = Self::default();
        for action in parse_actions(xml)? {
            match created_entity(&action) {
                Some(entity) => document.creations.push(entity),
                None => document.skipped += 1,
            }
        }
        debug!(
            "augmented diff holds {} create action(s), {} skipped",
            document.creations.len(),
            document.skipped
        );
        Ok(document)
    }

    /// Entities introduced by create actions.
    #[must_use]
    pub fn creations(&self) -> &[CreatedEntity] {
        &self.creations
    }

    /// Number of actions that produced no entity.
    #[must_use]
    pub const fn skipped(&self) -> usize {
        self.skipped
    }
}

fn created_entity(action: &XmlElement) -> Option<CreatedEntity> {
    if action.attribute("type") != Some("create") {
        return None;
    }
    let element = match action.children_named("new").next() {
        Some(new) => new.children.first()?,
        None => action.children.first()?,
    };
    let Some(kind) = EntityKind::from_element_name(&element.name) else {
        debug!("ignoring create action for <{}>", element.name);
        return None;
    };
    Some(CreatedEntity::from_element(kind, element))
}
