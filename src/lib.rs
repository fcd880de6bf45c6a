//! # photo-geocoder
//!
//! Reverse geocoder for photos — resolve GPS coordinates already embedded in
//! image metadata to place names (via Nominatim/OpenStreetMap) and write them
//! back as MWG country/state/city/location tags.
//!
//! Files that carry no coordinates, or that already have a country tag, are
//! skipped. One shared `exiftool` process does all metadata I/O; lookups are
//! globally rate-limited to respect the Nominatim usage policy.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use photo_geocoder::config::Config;
//! use photo_geocoder::pipeline::run_batch;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let summary = run_batch(&["photos/*.jpg".to_string()], &config).await?;
//!
//!     println!(
//!         "{} written, {} skipped, {} failed",
//!         summary.written(),
//!         summary.skipped(),
//!         summary.failed()
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Lower-Level Usage
//!
//! The per-file worker takes its collaborators as traits, so each piece can
//! be driven (and tested) on its own:
//!
//! ```rust,no_run
//! use photo_geocoder::exiftool::{ExifTool, MetadataStore, SharedExifTool};
//! use photo_geocoder::geocode::{Nominatim, ReverseGeocoder};
//! use photo_geocoder::mapping::map_address;
//! use std::path::Path;
//! use std::time::Duration;
//!
//! # async fn example() -> photo_geocoder::error::Result<()> {
//! let store = SharedExifTool::new(ExifTool::new()?);
//! let geocoder = Nominatim::new(
//!     "https://nominatim.openstreetmap.org".into(),
//!     "https://example.com/my-tool".into(),
//!     Duration::from_millis(500),
//!     1,
//! );
//!
//! let tags = store
//!     .read_tags(Path::new("photo.jpg"), &["XMP:GPSLatitude", "XMP:GPSLongitude"])
//!     .await?;
//! if let Some(record) = geocoder.reverse_lookup(48.8583, 2.2945).await? {
//!     let assignments = map_address(&record);
//!     store.write_tags(Path::new("photo.jpg"), &assignments).await?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`config`] — Configuration types and loading/saving
//! - [`error`] — Error taxonomy
//! - [`exiftool`] — Persistent exiftool process and the shared metadata store
//! - [`geocode`] — Reverse-geocoding trait, Nominatim client, rate limiting
//! - [`mapping`] — Address record → metadata tag mapping
//! - [`pipeline`] — Per-file worker and the batch coordinator

pub mod config;
pub mod error;
pub mod exiftool;
pub mod geocode;
pub mod mapping;
pub mod pipeline;
