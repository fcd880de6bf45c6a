use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::{AddressRecord, ReverseGeocoder, Throttle};
use crate::error::{Error, Result};

/// Default public Nominatim endpoint (OpenStreetMap).
pub const DEFAULT_ENDPOINT: &str = "https://nominatim.openstreetmap.org";

/// Default User-Agent sent to Nominatim. The usage policy requires a client
/// identifier; the project URL serves as one.
pub const DEFAULT_USER_AGENT: &str = "https://github.com/marirs/photo-geocoder";

/// Reverse-geocoding client for the Nominatim HTTP API.
///
/// All lookups share one [`Throttle`], so the minimum inter-request interval
/// holds across every concurrent caller. Transient failures are retried once
/// (configurable); a failure after the retry budget is exhausted surfaces as
/// [`Error::Geocoding`].
///
/// # Example
///
/// ```rust,no_run
/// use photo_geocoder::geocode::{Nominatim, ReverseGeocoder};
/// use std::time::Duration;
///
/// # async fn example() -> photo_geocoder::error::Result<()> {
/// let geocoder = Nominatim::new(
///     "https://nominatim.openstreetmap.org".into(),
///     "https://example.com/my-tool".into(),
///     Duration::from_millis(500),
///     1,
/// );
/// if let Some(record) = geocoder.reverse_lookup(48.8583, 2.2945).await? {
///     println!("{:?}", record.display_name);
/// }
/// # Ok(())
/// # }
/// ```
pub struct Nominatim {
    endpoint: String,
    user_agent: String,
    retries: u32,
    throttle: Throttle,
    client: Client,
}

/// The subset of a Nominatim reverse response we care about. A coordinate
/// with no address comes back as `{"error": "Unable to geocode"}` with
/// HTTP 200.
#[derive(Debug, Deserialize)]
struct ReverseResponse {
    error: Option<String>,
    #[serde(flatten)]
    record: AddressRecord,
}

impl Nominatim {
    pub fn new(endpoint: String, user_agent: String, min_interval: Duration, retries: u32) -> Self {
        Self {
            endpoint,
            user_agent,
            retries,
            throttle: Throttle::new(min_interval),
            client: Client::new(),
        }
    }

    async fn attempt(&self, lat: f64, lng: f64) -> Result<Option<AddressRecord>> {
        let url = format!("{}/reverse", self.endpoint.trim_end_matches('/'));

        let resp = self
            .client
            .get(&url)
            .header("User-Agent", &self.user_agent)
            .query(&[
                ("format", "jsonv2".to_string()),
                ("lat", lat.to_string()),
                ("lon", lng.to_string()),
            ])
            .send()
            .await
            .map_err(|e| geocoding_error(lat, lng, format!("request failed: {e}")))?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let text = resp
            .text()
            .await
            .map_err(|e| geocoding_error(lat, lng, format!("failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(geocoding_error(lat, lng, format!("HTTP {status}: {text}")));
        }

        let parsed: ReverseResponse = serde_json::from_str(&text)
            .map_err(|e| geocoding_error(lat, lng, format!("unexpected response: {e}")))?;

        if parsed.error.is_some() {
            return Ok(None);
        }
        Ok(Some(parsed.record))
    }
}

#[async_trait::async_trait]
impl ReverseGeocoder for Nominatim {
    async fn reverse_lookup(&self, lat: f64, lng: f64) -> Result<Option<AddressRecord>> {
        self.throttle.wait().await;

        let mut attempt = 0;
        loop {
            match self.attempt(lat, lng).await {
                Ok(record) => return Ok(record),
                Err(err) if attempt < self.retries => {
                    attempt += 1;
                    log::warn!("Lookup failed, retrying ({attempt}/{}): {err}", self.retries);
                    self.throttle.wait().await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn geocoding_error(lat: f64, lng: f64, message: String) -> Error {
    Error::Geocoding { lat, lng, message }
}
