//! Disk cache for fetched venue lists and weather reports.
//!
//! Two independently-keyed namespaces backed by one JSON file each. The full
//! namespace is loaded at open and rewritten on every put; writes go through
//! a temp file and a rename so a crash mid-write never leaves a half-written
//! namespace behind.

use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::NaiveDate;
use serde_json::Value;

use crate::errors::EngineError;
use crate::models::VenueCategory;

/// File name of the venue namespace inside the cache directory.
const VENUES_FILE: &str = "venues.json";
/// File name of the weather namespace inside the cache directory.
const WEATHER_FILE: &str = "weather.json";

/// The two independently-keyed partitions of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheNamespace {
    /// Venue lists keyed `"{city}_{category}"`. No expiry; `force_update`
    /// is the refresh path.
    Venues,
    /// Weather reports keyed `"{city}_{YYYY-MM-DD}"`. Old entries are never
    /// looked up again once the day advances.
    Weather,
}

/// Venue-namespace key for one (city, category) list.
pub fn venue_key(city: &str, category: VenueCategory) -> String {
    format!("{}_{}", city, category)
}

/// Weather-namespace key for one (city, calendar day) report.
pub fn weather_key(city: &str, date: NaiveDate) -> String {
    format!("{}_{}", city, date.format("%Y-%m-%d"))
}

/// Key-value persistence consumed by the engine. `get` never fetches; a
/// missing key is simply `None`.
pub trait CacheStore: Send + Sync {
    fn get(&self, namespace: CacheNamespace, key: &str) -> Option<Value>;
    fn put(&self, namespace: CacheNamespace, key: &str, payload: Value) -> Result<(), EngineError>;
    fn contains(&self, namespace: CacheNamespace, key: &str) -> bool;
}

#[derive(Debug, Default)]
struct CacheState {
    venues: HashMap<String, Value>,
    weather: HashMap<String, Value>,
}

/// `CacheStore` over JSON files in a caller-supplied directory.
///
/// An unreadable or corrupt namespace file is never fatal: it is logged and
/// the namespace starts empty, so the run refetches and the next put rewrites
/// the file.
#[derive(Debug)]
pub struct FileCacheStore {
    venues_path: PathBuf,
    weather_path: PathBuf,
    state: Mutex<CacheState>,
}

impl FileCacheStore {
    /// Open (creating the directory if needed) and load both namespaces.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let venues_path = dir.join(VENUES_FILE);
        let weather_path = dir.join(WEATHER_FILE);

        let venues = match Self::load_namespace(&venues_path) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!("Starting with an empty venue cache: {}", err);
                HashMap::new()
            }
        };
        let weather = match Self::load_namespace(&weather_path) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!("Starting with an empty weather cache: {}", err);
                HashMap::new()
            }
        };

        Ok(Self {
            venues_path,
            weather_path,
            state: Mutex::new(CacheState { venues, weather }),
        })
    }

    fn load_namespace(path: &Path) -> Result<HashMap<String, Value>, EngineError> {
        let raw = match fs::read(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(err) => {
                return Err(EngineError::CacheCorruption {
                    path: path.to_path_buf(),
                    message: err.to_string(),
                })
            }
        };
        serde_json::from_slice(&raw).map_err(|err| EngineError::CacheCorruption {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
    }

    /// Write the whole namespace to `<file>.tmp`, then rename over the live
    /// file. The rename is what makes a put all-or-nothing.
    fn persist_namespace(path: &Path, entries: &HashMap<String, Value>) -> Result<(), EngineError> {
        let json = serde_json::to_string_pretty(entries)?;
        let tmp = path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl CacheStore for FileCacheStore {
    fn get(&self, namespace: CacheNamespace, key: &str) -> Option<Value> {
        let state = self.state.lock().unwrap();
        match namespace {
            CacheNamespace::Venues => state.venues.get(key).cloned(),
            CacheNamespace::Weather => state.weather.get(key).cloned(),
        }
    }

    fn put(&self, namespace: CacheNamespace, key: &str, payload: Value) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        match namespace {
            CacheNamespace::Venues => {
                state.venues.insert(key.to_string(), payload);
                Self::persist_namespace(&self.venues_path, &state.venues)
            }
            CacheNamespace::Weather => {
                state.weather.insert(key.to_string(), payload);
                Self::persist_namespace(&self.weather_path, &state.weather)
            }
        }
    }

    fn contains(&self, namespace: CacheNamespace, key: &str) -> bool {
        let state = self.state.lock().unwrap();
        match namespace {
            CacheNamespace::Venues => state.venues.contains_key(key),
            CacheNamespace::Weather => state.weather.contains_key(key),
        }
    }
}
