//! Running summary statistics: node bounding box and ingestion watermark.

use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use geo::{Coord, Rect};

/// Bounding box over every node coordinate observed in a run.
///
/// Starts at the empty-set sentinel (`+inf` minima, `-inf` maxima) and keeps
/// those values when no node is observed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    /// Smallest latitude seen.
    pub min_lat: f64,
    /// Largest latitude seen.
    pub max_lat: f64,
    /// Smallest longitude seen.
    pub min_lon: f64,
    /// Largest longitude seen.
    pub max_lon: f64,
}

impl Bounds {
    /// Bounds of the empty set.
    pub const EMPTY: Self = Self {
        min_lat: f64::INFINITY,
        max_lat: f64::NEG_INFINITY,
        min_lon: f64::INFINITY,
        max_lon: f64::NEG_INFINITY,
    };

    /// Grow the box to contain `coordinate` (`x = longitude`, `y = latitude`).
    pub fn include(&mut self, coordinate: Coord<f64>) {
        self.min_lat = self.min_lat.min(coordinate.y);
        self.max_lat = self.max_lat.max(coordinate.y);
        self.min_lon = self.min_lon.min(coordinate.x);
        self.max_lon = self.max_lon.max(coordinate.x);
    }

    /// Whether no coordinate has been included yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.min_lat > self.max_lat || self.min_lon > self.max_lon
    }

    /// The box as a [`Rect`], or `None` while empty.
    #[must_use]
    pub fn to_rect(&self) -> Option<Rect<f64>> {
        (!self.is_empty()).then(|| {
            Rect::new(
                Coord {
                    x: self.min_lon,
                    y: self.min_lat,
                },
                Coord {
                    x: self.max_lon,
                    y: self.max_lat,
                },
            )
        })
    }

    /// Render the four-line `key=value` sidecar.
    ///
    /// ```
    /// use geo::Coord;
    /// use tabula_core::Bounds;
    ///
    /// let mut bounds = Bounds::default();
    /// bounds.include(Coord { x: 20.0, y: 10.0 });
    /// assert_eq!(
    ///     bounds.to_sidecar(),
    ///     "minLatitude=10\nmaxLatitude=10\nminLongitude=20\nmaxLongitude=20\n"
    /// );
    /// ```
    #[must_use]
    pub fn to_sidecar(&self) -> String {
        format!(
            "minLatitude={}\nmaxLatitude={}\nminLongitude={}\nmaxLongitude={}\n",
            self.min_lat, self.max_lat, self.min_lon, self.max_lon
        )
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Highest changeset id or timestamp ingested so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Watermark(i64);

impl Watermark {
    /// Wrap a raw value.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Raw value.
    #[must_use]
    pub const fn value(self) -> i64 {
        self.0
    }

    /// Raise the watermark to `value` if it is higher.
    pub fn observe(&mut self, value: i64) {
        self.0 = self.0.max(value);
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Watermark {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

/// Accumulates [`Bounds`] and a [`Watermark`] over one pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SummaryTracker {
    bounds: Bounds,
    watermark: Watermark,
}

impl SummaryTracker {
    /// Fresh tracker with empty bounds and a zero watermark.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh tracker whose watermark never drops below `watermark`.
    #[must_use]
    pub fn starting_at(watermark: Watermark) -> Self {
        Self {
            bounds: Bounds::EMPTY,
            watermark,
        }
    }

    /// Include a node coordinate in the bounds.
    pub fn observe_coordinate(&mut self, coordinate: Coord<f64>) {
        self.bounds.include(coordinate);
    }

    /// Take the running maximum of the watermark.
    pub fn observe_watermark(&mut self, value: i64) {
        self.watermark.observe(value);
    }

    /// Bounds accumulated so far.
    #[must_use]
    pub const fn bounds(&self) -> Bounds {
        self.bounds
    }

    /// Watermark accumulated so far.
    #[must_use]
    pub const fn watermark(&self) -> Watermark {
        self.watermark
    }
}
