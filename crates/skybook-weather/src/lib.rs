//! Location lookup, hourly forecasts and local bookmarks for Skybook.
//!
//! Geocoding uses Nominatim and forecasts use Open-Meteo. Bookmarked
//! locations and saved forecasts are kept in a small SQLite database.

pub mod client;
pub mod session;
pub mod store;
pub mod types;

pub use client::GeoWeatherClient;
pub use session::WeatherSession;
pub use store::{BookmarkStore, SavedSearches};
pub use types::*;
