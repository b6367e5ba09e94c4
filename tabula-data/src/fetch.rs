//! Augmented-diff retrieval.
//!
//! [`DiffSource`] is synchronous so the pipelines stay free of async code.
//! [`HttpDiffSource`] satisfies it by blocking on `reqwest` calls inside a
//! Tokio runtime it owns.

use std::fmt;
use std::time::Duration;

use geo::{Coord, Rect};
use log::debug;
use reqwest::{Client, StatusCode};
use tabula_core::Watermark;
use thiserror::Error;
use tokio::runtime::Runtime;

/// Default augmented-diff endpoint.
pub const DEFAULT_BASE_URL: &str = "https://overpass-api.de/api/augmented_diff";

/// Default user agent for diff requests.
pub const DEFAULT_USER_AGENT: &str = "tabula/0.1";

const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Errors raised while fetching an augmented diff.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The server answered HTTP 429.
    #[error("rate limited by {url} (HTTP 429); retry later")]
    RateLimited {
        /// Requested URL.
        url: String,
    },
    /// The server answered with a status other than 200 or 429.
    #[error("request to {url} failed with HTTP {status}")]
    Status {
        /// Requested URL.
        url: String,
        /// Response status code.
        status: u16,
    },
    /// The request did not complete.
    #[error("request to {url} failed: {message}")]
    Network {
        /// Requested URL.
        url: String,
        /// Transport error description.
        message: String,
    },
    /// The HTTP client could not be built.
    #[error("failed to build HTTP client")]
    Client(#[source] reqwest::Error),
    /// The Tokio runtime could not be built.
    #[error("failed to build Tokio runtime")]
    Runtime(#[source] std::io::Error),
}

/// Invalid bounding box filter.
#[derive(Debug, Clone, Copy, Error, PartialEq)]
pub enum BoundingBoxError {
    /// A maximum does not exceed its minimum.
    #[error("bounding box maxima must exceed minima (lon {min_lon}..{max_lon}, lat {min_lat}..{max_lat})")]
    Inverted {
        /// Western edge.
        min_lon: f64,
        /// Southern edge.
        min_lat: f64,
        /// Eastern edge.
        max_lon: f64,
        /// Northern edge.
        max_lat: f64,
    },
    /// An edge lies outside the WGS84 range.
    #[error("bounding box must lie within longitude -180..180 and latitude -90..90")]
    OutOfRange,
}

/// Spatial filter forwarded to the diff endpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox(Rect<f64>);

impl BoundingBox {
    /// Validate and build a bounding box.
    ///
    /// ```
    /// use tabula_data::BoundingBox;
    ///
    /// assert!(BoundingBox::new(13.0, 52.0, 14.0, 53.0).is_ok());
    /// assert!(BoundingBox::new(14.0, 52.0, 13.0, 53.0).is_err());
    /// ```
    pub fn new(
        min_lon: f64,
        min_lat: f64,
        max_lon: f64,
        max_lat: f64,
    ) -> Result<Self, BoundingBoxError> {
        let lon_range = -180.0..=180.0;
        let lat_range = -90.0..=90.0;
        if ![min_lon, max_lon].iter().all(|lon| lon_range.contains(lon))
            || ![min_lat, max_lat].iter().all(|lat| lat_range.contains(lat))
        {
            return Err(BoundingBoxError::OutOfRange);
        }
        if max_lon <= min_lon || max_lat <= min_lat {
            return Err(BoundingBoxError::Inverted {
                min_lon,
                min_lat,
                max_lon,
                max_lat,
            });
        }
        Ok(Self(Rect::new(
            Coord {
                x: min_lon,
                y: min_lat,
            },
            Coord {
                x: max_lon,
                y: max_lat,
            },
        )))
    }

    /// The box as a [`Rect`] (`x = longitude`, `y = latitude`).
    #[must_use]
    pub const fn rect(&self) -> Rect<f64> {
        self.0
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (min, max) = (self.0.min(), self.0.max());
        write!(f, "{},{},{},{}", min.x, min.y, max.x, max.y)
    }
}

/// Something that can produce the augmented diff following a watermark.
pub trait DiffSource {
    /// Fetch the diff document identified by `watermark`.
    fn fetch(&self, watermark: Watermark) -> Result<String, FetchError>;
}

/// Configuration for [`HttpDiffSource`].
#[derive(Debug, Clone)]
pub struct HttpDiffSourceConfig {
    /// Endpoint queried with `?id=<watermark>`.
    pub base_url: String,
    /// Optional spatial filter.
    pub bbox: Option<BoundingBox>,
    /// Request timeout.
    pub timeout: Duration,
    /// User agent header.
    pub user_agent: String,
}

impl Default for HttpDiffSourceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            bbox: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }
}

impl HttpDiffSourceConfig {
    /// Configuration for `base_url` with default settings.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Restrict the diff to `bbox`.
    #[must_use]
    pub const fn with_bbox(mut self, bbox: BoundingBox) -> Self {
        self.bbox = Some(bbox);
        self
    }

    /// Set the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// [`DiffSource`] backed by an HTTP endpoint.
///
/// Must not be called from inside an async context: each fetch blocks on
/// the source's own current-thread runtime.
pub struct HttpDiffSource {
    client: Client,
    config: HttpDiffSourceConfig,
    runtime: Runtime,
}

impl fmt::Debug for HttpDiffSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpDiffSource")
            .field("client", &self.client)
            .field("config", &self.config)
            .field("runtime", &"<tokio::runtime::Runtime>")
            .finish()
    }
}

impl HttpDiffSource {
    /// Source for `base_url` with default settings.
    pub fn new(base_url: impl Into<String>) -> Result<Self, FetchError> {
        Self::with_config(HttpDiffSourceConfig::new(base_url))
    }

    /// Source with explicit configuration.
    pub fn with_config(config: HttpDiffSourceConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(config.timeout)
            .timeout(config.timeout)
            .build()
            .map_err(FetchError::Client)?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(FetchError::Runtime)?;
        Ok(Self {
            client,
            config,
            runtime,
        })
    }

    /// URL of the diff following `watermark`.
    #[must_use]
    pub fn diff_url(&self, watermark: Watermark) -> String {
        let separator = if self.config.base_url.contains('?') {
            '&'
        } else {
            '?'
        };
        let mut url = format!("{}{separator}id={watermark}", self.config.base_url);
        if let Some(bbox) = &self.config.bbox {
            url.push_str(&format!("&bbox={bbox}"));
        }
        url
    }

    async fn fetch_async(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| convert_reqwest_error(&err, url))?;
        match response.status() {
            StatusCode::OK => response
                .text()
                .await
                .map_err(|err| convert_reqwest_error(&err, url)),
            StatusCode::TOO_MANY_REQUESTS => Err(FetchError::RateLimited {
                url: url.to_owned(),
            }),
            status => Err(FetchError::Status {
                url: url.to_owned(),
                status: status.as_u16(),
            }),
        }
    }
}

fn convert_reqwest_error(error: &reqwest::Error, url: &str) -> FetchError {
    match error.status() {
        Some(StatusCode::TOO_MANY_REQUESTS) => FetchError::RateLimited {
            url: url.to_owned(),
        },
        Some(status) => FetchError::Status {
            url: url.to_owned(),
            status: status.as_u16(),
        },
        None => FetchError::Network {
            url: url.to_owned(),
            message: error.to_string(),
        },
    }
}

impl DiffSource for HttpDiffSource {
    fn fetch(&self, watermark: Watermark) -> Result<String, FetchError> {
        let url = self.diff_url(watermark);
        debug!("fetching augmented diff from {url}");
        self.runtime.block_on(self.fetch_async(&url))
    }
}

/// Canned [`DiffSource`] for tests.
#[doc(hidden)]
pub mod test_support {
    use std::cell::RefCell;

    use tabula_core::Watermark;

    use super::{DiffSource, FetchError};

    #[derive(Debug, Clone)]
    enum StubResponse {
        Document(String),
        RateLimited,
        Status(u16),
        Network(String),
    }

    /// Returns a fixed response and records each requested watermark.
    #[derive(Debug)]
    pub struct StubDiffSource {
        response: StubResponse,
        requests: RefCell<Vec<Watermark>>,
    }

    impl StubDiffSource {
        fn with_response(response: StubResponse) -> Self {
            Self {
                response,
                requests: RefCell::new(Vec::new()),
            }
        }

        /// Serve `xml` for every request.
        #[must_use]
        pub fn with_document(xml: impl Into<String>) -> Self {
            Self::with_response(StubResponse::Document(xml.into()))
        }

        /// Answer every request with HTTP 429.
        #[must_use]
        pub fn rate_limited() -> Self {
            Self::with_response(StubResponse::RateLimited)
        }

        /// Answer every request with `status`.
        #[must_use]
        pub fn with_status(status: u16) -> Self {
            Self::with_response(StubResponse::Status(status))
        }

        /// Fail every request at the transport level.
        #[must_use]
        pub fn with_network_error(message: impl Into<String>) -> Self {
            Self::with_response(StubResponse::Network(message.into()))
        }

        /// Watermarks requested so far.
        #[must_use]
        pub fn requests(&self) -> Vec<Watermark> {
            self.requests.borrow().clone()
        }
    }

    impl DiffSource for StubDiffSource {
        fn fetch(&self, watermark: Watermark) -> Result<String, FetchError> {
            self.requests.borrow_mut().push(watermark);
            let url = format!("stub://augmented_diff?id={watermark}");
            match &self.response {
                StubResponse::Document(xml) => Ok(xml.clone()),
                StubResponse::RateLimited => Err(FetchError::RateLimited { url }),
                StubResponse::Status(status) => Err(FetchError::Status {
                    url,
                    status: *status,
                }),
                StubResponse::Network(message) => Err(FetchError::Network {
                    url,
                    message: message.clone(),
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn url_carries_watermark() {
        let source = HttpDiffSource::new("https://example.com/api/augmented_diff")
            .expect("source builds");
        assert_eq!(
            source.diff_url(Watermark::new(6_421_337)),
            "https://example.com/api/augmented_diff?id=6421337"
        );
    }

    #[rstest]
    fn url_carries_bbox() {
        let bbox = BoundingBox::new(13.0, 52.25, 13.75, 52.75).expect("valid bbox");
        let config = HttpDiffSourceConfig::new("https://example.com/adiff?format=xml").with_bbox(bbox);
        let source = HttpDiffSource::with_config(config).expect("source builds");
        assert_eq!(
            source.diff_url(Watermark::new(1)),
            "https://example.com/adiff?format=xml&id=1&bbox=13,52.25,13.75,52.75"
        );
    }

    #[rstest]
    #[case(-181.0, 0.0, 0.0, 1.0)]
    #[case(0.0, -91.0, 1.0, 1.0)]
    #[case(0.0, 0.0, 1.0, 90.5)]
    fn out_of_range_boxes_are_rejected(
        #[case] min_lon: f64,
        #[case] min_lat: f64,
        #[case] max_lon: f64,
        #[case] max_lat: f64,
    ) {
        assert_eq!(
            BoundingBox::new(min_lon, min_lat, max_lon, max_lat),
            Err(BoundingBoxError::OutOfRange)
        );
    }

    #[rstest]
    #[case(1.0, 0.0, 1.0, 1.0)]
    #[case(0.0, 2.0, 1.0, 1.0)]
    fn degenerate_boxes_are_rejected(
        #[case] min_lon: f64,
        #[case] min_lat: f64,
        #[case] max_lon: f64,
        #[case] max_lat: f64,
    ) {
        assert!(matches!(
            BoundingBox::new(min_lon, min_lat, max_lon, max_lat),
            Err(BoundingBoxError::Inverted { .. })
        ));
    }

    #[rstest]
    fn config_builder_pattern() {
        let config = HttpDiffSourceConfig::default()
            .with_timeout(Duration::from_secs(5))
            .with_user_agent("probe/1.0");
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.user_agent, "probe/1.0");
        assert!(config.bbox.is_none());
    }
}
