use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::config::Config;
use crate::error::Result;
use crate::exiftool::{ExifTool, MetadataStore, SharedExifTool};
use crate::geocode::{Nominatim, ReverseGeocoder};
use crate::mapping::map_address;

/// Latitude tags, preferred first. XMP carries signed decimal degrees; the
/// Composite tag (derived from the EXIF GPS group plus its hemisphere refs)
/// is the fallback for files that only carry EXIF GPS.
const LATITUDE_TAGS: &[&str] = &["XMP:GPSLatitude", "Composite:GPSLatitude"];
const LONGITUDE_TAGS: &[&str] = &["XMP:GPSLongitude", "Composite:GPSLongitude"];

/// Prior-country tags, preferred first. A populated country tag means the
/// file was already geocoded and is left alone. MWG:Country reads back under
/// the Composite group.
const COUNTRY_TAGS: &[&str] = &["XMP:Country", "Composite:Country"];

/// Why a file was skipped without being written. These are ordinary
/// outcomes, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No latitude or longitude tag present.
    MissingCoordinates,
    /// A country tag is already populated.
    AlreadyGeocoded,
    /// The provider has no address for the coordinate.
    NoAddressFound,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingCoordinates => f.write_str("missing GPS coordinates"),
            SkipReason::AlreadyGeocoded => f.write_str("already geocoded"),
            SkipReason::NoAddressFound => f.write_str("no address found"),
        }
    }
}

/// Terminal state of one file's processing.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Written,
    Skipped(SkipReason),
    Failed(String),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Written => f.write_str("written"),
            Outcome::Skipped(reason) => write!(f, "skipped ({reason})"),
            Outcome::Failed(message) => write!(f, "failed: {message}"),
        }
    }
}

/// One file's path and terminal state.
#[derive(Debug, Clone)]
pub struct FileReport {
    pub path: PathBuf,
    pub outcome: Outcome,
}

/// Aggregate result of a batch run.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub reports: Vec<FileReport>,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.reports.len()
    }

    pub fn written(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Written))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Skipped(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Failed(_)))
    }

    fn count(&self, predicate: impl Fn(&Outcome) -> bool) -> usize {
        self.reports.iter().filter(|r| predicate(&r.outcome)).count()
    }
}

/// Expand glob patterns into a flat file list.
///
/// Invalid patterns and unreadable matches are logged and skipped.
/// Duplicates from overlapping patterns are preserved — the already-geocoded
/// gate makes the second pass over the same file a no-op.
pub fn collect_files(patterns: &[String]) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for pattern in patterns {
        match glob::glob(pattern) {
            Ok(paths) => {
                for entry in paths {
                    match entry {
                        Ok(path) => files.push(path),
                        Err(e) => log::warn!("Skipping unreadable match: {e}"),
                    }
                }
            }
            Err(e) => log::warn!("Invalid pattern '{pattern}': {e}"),
        }
    }

    files
}

/// Process one file start to terminal state. Never fails — errors from the
/// metadata tool or the geocoder are logged with the file path and folded
/// into [`Outcome::Failed`] so the rest of the batch keeps going.
pub async fn process_file(
    path: &Path,
    store: &dyn MetadataStore,
    geocoder: &dyn ReverseGeocoder,
    dry_run: bool,
) -> Outcome {
    match try_process(path, store, geocoder, dry_run).await {
        Ok(outcome) => outcome,
        Err(err) => {
            log::error!("Error while geocoding {}: {err}", path.display());
            Outcome::Failed(err.to_string())
        }
    }
}

async fn try_process(
    path: &Path,
    store: &dyn MetadataStore,
    geocoder: &dyn ReverseGeocoder,
    dry_run: bool,
) -> Result<Outcome> {
    log::info!("Geocoding {}", path.display());

    let mut read_keys: Vec<&str> = Vec::new();
    read_keys.extend_from_slice(LATITUDE_TAGS);
    read_keys.extend_from_slice(LONGITUDE_TAGS);
    read_keys.extend_from_slice(COUNTRY_TAGS);
    let tags = store.read_tags(path, &read_keys).await?;

    // Eligibility gates: both coordinates present, no prior country
    let lat = coordinate_from(&tags, LATITUDE_TAGS);
    let lng = coordinate_from(&tags, LONGITUDE_TAGS);
    let (lat, lng) = match (lat, lng) {
        (Some(lat), Some(lng)) => (lat, lng),
        _ => {
            log::info!("Skipping {}, missing lat/long", path.display());
            return Ok(Outcome::Skipped(SkipReason::MissingCoordinates));
        }
    };
    if let Some(country) = first_value(&tags, COUNTRY_TAGS) {
        log::info!("Skipping {}, previous country: {country}", path.display());
        return Ok(Outcome::Skipped(SkipReason::AlreadyGeocoded));
    }

    let record = match geocoder.reverse_lookup(lat, lng).await? {
        Some(record) => record,
        None => {
            log::info!("No address found for {} ({lat:.5}, {lng:.5})", path.display());
            return Ok(Outcome::Skipped(SkipReason::NoAddressFound));
        }
    };

    let assignments = map_address(&record);
    if assignments.is_empty() {
        // An address record with no usable fields at all
        log::info!("Empty address record for {}", path.display());
        return Ok(Outcome::Skipped(SkipReason::NoAddressFound));
    }

    if dry_run {
        for assignment in &assignments {
            log::info!("  would write {}={}", assignment.tag, assignment.value);
        }
        return Ok(Outcome::Written);
    }

    store.write_tags(path, &assignments).await?;
    log::info!("Wrote {} tag(s) to {}", assignments.len(), path.display());
    Ok(Outcome::Written)
}

/// Take the first populated tag from `keys` and parse it as a signed
/// decimal coordinate. Empty and unparseable values count as absent.
fn coordinate_from(tags: &HashMap<String, String>, keys: &[&str]) -> Option<f64> {
    first_value(tags, keys)?.parse::<f64>().ok()
}

/// The first non-empty value among `keys`, in order.
fn first_value<'a>(tags: &'a HashMap<String, String>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| tags.get(*key))
        .map(String::as_str)
        .find(|value| !value.is_empty())
}

/// Run the batch: expand patterns, process every file through a bounded
/// worker pool, and aggregate the outcomes.
///
/// One exiftool process and one Nominatim client are shared by all workers
/// for the lifetime of the run; the exiftool process is shut down after the
/// pool fully drains.
pub async fn run_batch(patterns: &[String], config: &Config) -> Result<BatchSummary> {
    let files = collect_files(patterns);
    if files.is_empty() {
        log::warn!("No files matched the given patterns");
        return Ok(BatchSummary::default());
    }
    log::info!("Found {} file(s) to process", files.len());

    let store = SharedExifTool::new(ExifTool::with_executable(&config.exiftool.executable)?);
    let geocoder: Arc<dyn ReverseGeocoder> = Arc::new(Nominatim::new(
        config.geocoder.endpoint.clone(),
        config.geocoder.user_agent.clone(),
        config.geocoder.min_interval(),
        config.geocoder.retries,
    ));

    let summary = run_pool(
        files,
        Arc::new(store.clone()),
        geocoder,
        config.batch.concurrency,
        config.batch.dry_run,
    )
    .await;

    if let Err(err) = store.close() {
        log::warn!("Failed to shut down exiftool cleanly: {err}");
    }

    Ok(summary)
}

/// Drain the file list through a semaphore-bounded set of spawned tasks.
/// Completion order is whatever the pool produces; every task runs to a
/// terminal outcome before the summary is assembled.
async fn run_pool(
    files: Vec<PathBuf>,
    store: Arc<dyn MetadataStore>,
    geocoder: Arc<dyn ReverseGeocoder>,
    concurrency: usize,
    dry_run: bool,
) -> BatchSummary {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut handles = Vec::with_capacity(files.len());

    for file in files {
        let store = store.clone();
        let geocoder = geocoder.clone();
        let semaphore = semaphore.clone();

        handles.push(tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    return FileReport {
                        path: file,
                        outcome: Outcome::Failed("worker pool closed".to_string()),
                    };
                }
            };
            let outcome = process_file(&file, store.as_ref(), geocoder.as_ref(), dry_run).await;
            FileReport {
                path: file,
                outcome,
            }
        }));
    }

    let mut summary = BatchSummary::default();
    for handle in handles {
        match handle.await {
            Ok(report) => summary.reports.push(report),
            Err(err) => log::error!("Worker task panicked: {err}"),
        }
    }
    summary
}
