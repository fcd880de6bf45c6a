pub mod nominatim;

pub use nominatim::Nominatim;

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::Result;

/// A sparse place description returned by a reverse-geocoding provider.
///
/// Both fields are optional because the provider populates whatever it knows
/// about the coordinate: `display_name` is a comma-separated human-readable
/// description (finest-grained component first for Nominatim), and `address`
/// is a map of provider-specific field names (`country`, `state`, `city`,
/// `house_number`, …) to values. The record is immutable once produced; the
/// tag mapping in [`crate::mapping`] consumes it.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AddressRecord {
    pub display_name: Option<String>,
    pub address: Option<HashMap<String, String>>,
}

impl AddressRecord {
    /// Look up a field in the address map, if the map is present at all.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.address.as_ref()?.get(name).map(String::as_str)
    }
}

/// Trait for reverse-geocoding services.
///
/// The shipped implementation is [`Nominatim`]; the trait exists so the
/// per-file worker can be exercised against an in-memory double.
#[async_trait::async_trait]
pub trait ReverseGeocoder: Send + Sync {
    /// Resolve a coordinate to an address record.
    ///
    /// Returns `Ok(None)` when the provider has no address for the
    /// coordinate — that is an ordinary outcome, not an error.
    async fn reverse_lookup(&self, lat: f64, lng: f64) -> Result<Option<AddressRecord>>;
}

/// A minimum-interval rate limiter shared across all callers.
///
/// Nominatim's usage policy asks for at most one request per second from a
/// single client; the default here is one request per 500 ms, matching the
/// historical behavior of this tool. The mutex is held across the sleep so
/// that concurrent callers queue up and the spacing stays global rather than
/// per-caller.
#[derive(Debug)]
pub struct Throttle {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    /// Block until at least `min_interval` has passed since the previous
    /// caller was released.
    pub async fn wait(&self) {
        let mut last_call = self.last_call.lock().await;
        if let Some(last) = *last_call {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last_call = Some(Instant::now());
    }
}
