//! SQLite key-value storage for bookmarked locations and saved forecasts.
//!
//! Each collection lives in one named slot as a JSON document. Saves replace
//! the whole slot; the two slots are written independently.

use std::collections::BTreeMap;
use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use skybook_core::{RusqliteErrorExt, StorageError};

use crate::types::{ForecastResult, GeoLocation};

pub const LOCATIONS_SLOT: &str = "savedLocations";
pub const SEARCHES_SLOT: &str = "savedSearchResults";

/// Saved forecast snapshots keyed by [`GeoLocation::key`]
pub type SavedSearches = BTreeMap<String, ForecastResult>;

pub struct BookmarkStore {
    conn: Connection,
}

impl BookmarkStore {
    /// Open or create the bookmark database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::ConnectionFailed(format!("{}: {}", parent.display(), e))
            })?;
        }

        let conn = Connection::open(path).map_err(RusqliteErrorExt::into_storage_error)?;
        let store = Self { conn };
        store.init_schema()?;
        tracing::debug!("Opened bookmark store at {}", path.display());
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    #[cfg(test)]
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(RusqliteErrorExt::into_storage_error)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StorageError> {
        self.conn
            .execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS slots (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at INTEGER NOT NULL
                );
                "#,
            )
            .map_err(RusqliteErrorExt::into_storage_error)
    }

    /// Bookmarked locations; empty if nothing was saved or the slot is unreadable
    pub fn load_locations(&self) -> Vec<GeoLocation> {
        self.load_slot(LOCATIONS_SLOT)
    }

    /// Saved forecasts; empty if nothing was saved or the slot is unreadable
    pub fn load_searches(&self) -> SavedSearches {
        self.load_slot(SEARCHES_SLOT)
    }

    pub fn save_locations(&self, locations: &[GeoLocation]) -> Result<(), StorageError> {
        self.save_slot(LOCATIONS_SLOT, locations)
    }

    pub fn save_searches(&self, searches: &SavedSearches) -> Result<(), StorageError> {
        self.save_slot(SEARCHES_SLOT, searches)
    }

    fn load_slot<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        let raw = match self.read_slot(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return T::default(),
            Err(e) => {
                tracing::warn!("Failed to read bookmark slot {}: {}", key, e);
                return T::default();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Ignoring undecodable bookmark slot {}: {}", key, e);
                T::default()
            }
        }
    }

    fn read_slot(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.conn
            .query_row(
                "SELECT value FROM slots WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(RusqliteErrorExt::into_storage_error)
    }

    fn save_slot<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let json =
            serde_json::to_string(value).map_err(|e| StorageError::Serialization(e.to_string()))?;
        let now = chrono::Utc::now().timestamp_millis();

        self.conn
            .execute(
                "INSERT OR REPLACE INTO slots (key, value, updated_at) VALUES (?1, ?2, ?3)",
                params![key, json, now],
            )
            .map_err(RusqliteErrorExt::into_storage_error)?;

        tracing::debug!("Saved bookmark slot {} ({} bytes)", key, json.len());
        Ok(())
    }

    #[cfg(test)]
    fn write_raw(&self, key: &str, value: &str) {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO slots (key, value, updated_at) VALUES (?1, ?2, 0)",
                params![key, value],
            )
            .unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Address, HourlySeries};
    use chrono::{NaiveDate, TimeZone, Utc};

    fn location(lat: &str, lon: &str, name: &str) -> GeoLocation {
        GeoLocation {
            latitude: lat.to_string(),
            longitude: lon.to_string(),
            name: name.to_string(),
            display_name: format!("{}, Somewhere", name),
            address: Address {
                city: name.to_string(),
                county: None,
                state: "Pennsylvania".to_string(),
                country: "United States".to_string(),
                country_code: "us".to_string(),
            },
        }
    }

    fn forecast(temps: &[f64]) -> ForecastResult {
        let day = NaiveDate::from_ymd_opt(2024, 4, 9).unwrap();
        ForecastResult {
            fetched_at: Utc.with_ymd_and_hms(2024, 4, 9, 17, 5, 12).unwrap(),
            hour: 13,
            hourly: HourlySeries {
                time: (0..temps.len() as u32)
                    .map(|h| day.and_hms_opt(h, 0, 0).unwrap())
                    .collect(),
                temperature: temps.to_vec(),
                precipitation_probability: vec![15; temps.len()],
                precipitation: vec![0.25; temps.len()],
            },
        }
    }

    #[test]
    fn test_empty_store_loads_nothing() {
        let store = BookmarkStore::in_memory().unwrap();
        assert!(store.load_locations().is_empty());
        assert!(store.load_searches().is_empty());
    }

    #[test]
    fn test_locations_round_trip_in_order() {
        let store = BookmarkStore::in_memory().unwrap();
        let saved = vec![
            location("39.9527237", "-75.1635262", "Philadelphia"),
            location("40.4406", "-79.9959", "Pittsburgh"),
        ];
        store.save_locations(&saved).unwrap();
        assert_eq!(store.load_locations(), saved);
    }

    #[test]
    fn test_save_overwrites_slot() {
        let store = BookmarkStore::in_memory().unwrap();
        store
            .save_locations(&[location("1", "2", "A"), location("3", "4", "B")])
            .unwrap();
        store.save_locations(&[location("5", "6", "C")]).unwrap();

        let loaded = store.load_locations();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "C");
    }

    #[test]
    fn test_undecodable_slot_loads_empty() {
        let store = BookmarkStore::in_memory().unwrap();
        store.write_raw(LOCATIONS_SLOT, "{not json");
        store.write_raw(SEARCHES_SLOT, "[1, 2, 3]");

        assert!(store.load_locations().is_empty());
        assert!(store.load_searches().is_empty());
    }

    #[test]
    fn test_slots_are_independent() {
        let store = BookmarkStore::in_memory().unwrap();
        store.save_locations(&[location("1", "2", "A")]).unwrap();
        assert!(store.load_searches().is_empty());

        let mut searches = SavedSearches::new();
        searches.insert("9_9".to_string(), forecast(&[40.0]));
        store.save_searches(&searches).unwrap();
        assert_eq!(store.load_locations().len(), 1);
    }

    #[test]
    fn test_full_precision_floats_reload_bit_identical() {
        let store = BookmarkStore::in_memory().unwrap();

        // Values whose shortest decimal form needs 16-17 digits
        let temps: Vec<f64> = (1..=2000u32)
            .map(|i| (i as f64).sqrt() * 13.7 + 1.0 / (i as f64 * 3.0))
            .chain([0.1 + 0.2, 1.0 / 3.0, std::f64::consts::PI])
            .collect();
        let mut snapshot = forecast(&temps[..24]);
        snapshot.hourly.temperature = temps.clone();
        snapshot.hourly.precipitation = temps.iter().map(|t| t / 97.0).collect();

        let mut searches = SavedSearches::new();
        searches.insert("39.9527237_-75.1635262".to_string(), snapshot.clone());
        store.save_searches(&searches).unwrap();

        let loaded = store.load_searches();
        let back = &loaded["39.9527237_-75.1635262"];
        for (saved, reloaded) in snapshot.hourly.temperature.iter().zip(&back.hourly.temperature) {
            assert_eq!(saved.to_bits(), reloaded.to_bits(), "{} != {}", saved, reloaded);
        }
        for (saved, reloaded) in snapshot
            .hourly
            .precipitation
            .iter()
            .zip(&back.hourly.precipitation)
        {
            assert_eq!(saved.to_bits(), reloaded.to_bits(), "{} != {}", saved, reloaded);
        }
        assert_eq!(back.hourly.temperature.len(), temps.len());
    }

    #[test]
    fn test_searches_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("data").join("bookmarks.db");

        let loc = location("39.9527237", "-75.1635262", "Philadelphia");
        let snapshot = forecast(&[62.9, 59.0, 56.1, 58.0]);

        {
            let store = BookmarkStore::open(&db_path).unwrap();
            let mut searches = SavedSearches::new();
            searches.insert(loc.key(), snapshot.clone());
            store.save_searches(&searches).unwrap();
        }

        let reopened = BookmarkStore::open(&db_path).unwrap();
        let loaded = reopened.load_searches();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.get(&loc.key()), Some(&snapshot));
    }
}
