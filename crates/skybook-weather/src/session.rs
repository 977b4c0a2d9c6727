//! Lookup state and bookmarks behind the UI.
//!
//! A session owns the client and the store. Network failures leave the
//! current location and weather as they were and are returned to the caller.
//! Bookmark edits are applied in memory and then persisted; a failed write is
//! logged and returned, the in-memory edit stays.

use skybook_core::StorageError;

use crate::client::GeoWeatherClient;
use crate::store::{BookmarkStore, SavedSearches};
use crate::types::{ForecastResult, GeoLocation, WeatherError};

pub struct WeatherSession {
    client: GeoWeatherClient,
    store: BookmarkStore,
    current_location: Option<GeoLocation>,
    current_weather: Option<ForecastResult>,
    saved_locations: Vec<GeoLocation>,
    saved_searches: SavedSearches,
}

impl WeatherSession {
    /// Start a session with the bookmarks already in `store`
    pub fn new(client: GeoWeatherClient, store: BookmarkStore) -> Self {
        let saved_locations = store.load_locations();
        let saved_searches = store.load_searches();
        tracing::info!(
            locations = saved_locations.len(),
            searches = saved_searches.len(),
            "Loaded bookmarks"
        );

        Self {
            client,
            store,
            current_location: None,
            current_weather: None,
            saved_locations,
            saved_searches,
        }
    }

    pub fn current_location(&self) -> Option<&GeoLocation> {
        self.current_location.as_ref()
    }

    pub fn current_weather(&self) -> Option<&ForecastResult> {
        self.current_weather.as_ref()
    }

    pub fn saved_locations(&self) -> &[GeoLocation] {
        &self.saved_locations
    }

    pub fn saved_searches(&self) -> &SavedSearches {
        &self.saved_searches
    }

    /// Saved forecast snapshot for `location`, if any
    pub fn saved_search(&self, location: &GeoLocation) -> Option<&ForecastResult> {
        self.saved_searches.get(&location.key())
    }

    /// Select a location without geocoding (e.g. a bookmark)
    pub fn set_current_location(&mut self, location: GeoLocation) {
        self.current_location = Some(location);
    }

    /// Geocode `city`/`state` and make the first match the current location.
    ///
    /// No match is reported as [`WeatherError::LocationNotFound`]; the current
    /// location is only replaced on success.
    pub async fn lookup_location(
        &mut self,
        city: &str,
        state: &str,
    ) -> Result<&GeoLocation, WeatherError> {
        let matches = self
            .client
            .geocode(city, state)
            .await
            .inspect_err(|e| tracing::warn!("Location lookup failed: {}", e))?;

        let Some(first) = matches.into_iter().next() else {
            tracing::info!("No location found for {}, {}", city, state);
            return Err(WeatherError::LocationNotFound {
                city: city.to_string(),
                state: state.to_string(),
            });
        };

        tracing::info!("Current location set to {}", first.display_name);
        Ok(self.current_location.insert(first))
    }

    /// Fetch the forecast for `location` and make it the current weather
    pub async fn fetch_weather(
        &mut self,
        location: &GeoLocation,
    ) -> Result<&ForecastResult, WeatherError> {
        let (latitude, longitude) = location.coordinates()?;
        let forecast = self
            .client
            .forecast(latitude, longitude)
            .await
            .inspect_err(|e| {
                tracing::warn!("Forecast fetch failed for {}: {}", location.key(), e)
            })?;

        Ok(self.current_weather.insert(forecast))
    }

    /// [`fetch_weather`](Self::fetch_weather) for the current location
    pub async fn fetch_current_weather(&mut self) -> Result<&ForecastResult, WeatherError> {
        let location = self
            .current_location
            .clone()
            .ok_or_else(|| WeatherError::InvalidRequest("no current location".to_string()))?;
        self.fetch_weather(&location).await
    }

    /// Bookmark `location` unless a location with the same key already is
    pub fn save_location(&mut self, location: &GeoLocation) -> Result<(), StorageError> {
        if self.is_location_saved(location) {
            return Ok(());
        }
        self.saved_locations.push(location.clone());
        self.persist_locations()
    }

    /// Remove every bookmark with `location`'s key
    pub fn unsave_location(&mut self, location: &GeoLocation) -> Result<(), StorageError> {
        self.saved_locations.retain(|saved| !saved.same_place(location));
        self.persist_locations()
    }

    /// Store `weather` as the snapshot for `location`, replacing any earlier one
    pub fn save_search_result(
        &mut self,
        weather: &ForecastResult,
        location: &GeoLocation,
    ) -> Result<(), StorageError> {
        self.saved_searches.insert(location.key(), weather.clone());
        self.persist_searches()
    }

    pub fn unsave_search_result(&mut self, location: &GeoLocation) -> Result<(), StorageError> {
        self.unsave_search_key(&location.key())
    }

    /// Remove the snapshot stored under a derived key
    pub fn unsave_search_key(&mut self, key: &str) -> Result<(), StorageError> {
        self.saved_searches.remove(key);
        self.persist_searches()
    }

    pub fn is_location_saved(&self, location: &GeoLocation) -> bool {
        self.saved_locations
            .iter()
            .any(|saved| saved.same_place(location))
    }

    pub fn is_search_saved(&self, key: &str) -> bool {
        self.saved_searches.contains_key(key)
    }

    fn persist_locations(&self) -> Result<(), StorageError> {
        self.store
            .save_locations(&self.saved_locations)
            .inspect_err(|e| tracing::error!("Failed to persist saved locations: {}", e))
    }

    fn persist_searches(&self) -> Result<(), StorageError> {
        self.store
            .save_searches(&self.saved_searches)
            .inspect_err(|e| tracing::error!("Failed to persist saved searches: {}", e))
    }
}
