use chrono::{DateTime, Local, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use skybook_core::{NetworkError, StorageError};

/// Address block returned with each geocoding match
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub county: Option<String>,
    pub state: String,
    pub country: String,
    pub country_code: String,
}

/// A geocoded place.
///
/// Coordinates are kept exactly as the provider spelled them: the derived
/// [`key`](GeoLocation::key) is built from those strings, so two records with
/// the same lat/lon text are the same bookmark whatever their other fields say.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GeoLocation {
    #[serde(rename = "lat", deserialize_with = "coordinate_text")]
    pub latitude: String,
    #[serde(rename = "lon", deserialize_with = "coordinate_text")]
    pub longitude: String,
    pub name: String,
    pub display_name: String,
    pub address: Address,
}

impl GeoLocation {
    /// Derived identity, `"{latitude}_{longitude}"`
    pub fn key(&self) -> String {
        format!("{}_{}", self.latitude, self.longitude)
    }

    /// Whether `other` refers to the same place (same derived key)
    pub fn same_place(&self, other: &GeoLocation) -> bool {
        self.latitude == other.latitude && self.longitude == other.longitude
    }

    /// Parse the stored coordinates as `(latitude, longitude)`
    pub fn coordinates(&self) -> Result<(f64, f64), WeatherError> {
        let parse = |label: &str, value: &str| {
            value.trim().parse::<f64>().map_err(|e| {
                WeatherError::InvalidRequest(format!("{} {:?} is not a number: {}", label, value, e))
            })
        };
        Ok((
            parse("latitude", &self.latitude)?,
            parse("longitude", &self.longitude)?,
        ))
    }
}

/// Providers disagree on whether coordinates are strings or numbers.
fn coordinate_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(f64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    })
}

/// Index-aligned hourly series
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HourlySeries {
    pub time: Vec<NaiveDateTime>,
    /// Degrees in the unit the forecast was requested with
    pub temperature: Vec<f64>,
    /// Percent, 0-100
    pub precipitation_probability: Vec<u8>,
    pub precipitation: Vec<f64>,
}

impl HourlySeries {
    /// Number of hours every reading series can be indexed by
    pub fn len(&self) -> usize {
        self.temperature
            .len()
            .min(self.precipitation_probability.len())
            .min(self.precipitation.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when all four series have the same length
    pub fn is_aligned(&self) -> bool {
        let len = self.temperature.len();
        self.time.len() == len
            && self.precipitation_probability.len() == len
            && self.precipitation.len() == len
    }
}

/// One hour's slice of a forecast
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HourlyReading {
    /// Missing when the provider sent an unparsable timestamp for this hour
    pub time: Option<NaiveDateTime>,
    pub temperature: f64,
    pub precipitation_probability: u8,
    pub precipitation: f64,
}

/// Hourly forecast for one location, as fetched at `fetched_at`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub fetched_at: DateTime<Utc>,
    /// Local wall-clock hour (0-23) at the moment the response was decoded
    pub hour: usize,
    pub hourly: HourlySeries,
}

impl ForecastResult {
    /// Build a result from a decoded forecast payload.
    ///
    /// Timestamps that fail to parse are dropped from `time` only; the reading
    /// series are kept as sent.
    pub(crate) fn from_api(hourly: ApiHourly, decoded_at: DateTime<Local>) -> Self {
        let sent = hourly.time.len();
        let time: Vec<NaiveDateTime> = hourly
            .time
            .iter()
            .filter_map(|raw| parse_forecast_time(raw))
            .collect();

        if time.len() != sent {
            tracing::warn!(
                "Dropped {} unparsable forecast timestamps",
                sent - time.len()
            );
        }

        let series = HourlySeries {
            time,
            temperature: hourly.temperature_2m,
            precipitation_probability: hourly.precipitation_probability,
            precipitation: hourly.precipitation,
        };

        if !series.is_aligned() {
            tracing::debug!(
                time = series.time.len(),
                temperature = series.temperature.len(),
                probability = series.precipitation_probability.len(),
                precipitation = series.precipitation.len(),
                "Forecast series lengths differ"
            );
        }

        Self {
            fetched_at: decoded_at.with_timezone(&Utc),
            hour: decoded_at.hour() as usize,
            hourly: series,
        }
    }

    /// Reading for the hour at `index`
    pub fn reading_at(&self, index: usize) -> Result<HourlyReading, WeatherError> {
        let len = self.hourly.len();
        if index >= len {
            return Err(WeatherError::HourOutOfRange { hour: index, len });
        }

        Ok(HourlyReading {
            time: self.hourly.time.get(index).copied(),
            temperature: self.hourly.temperature[index],
            precipitation_probability: self.hourly.precipitation_probability[index],
            precipitation: self.hourly.precipitation[index],
        })
    }

    /// Reading for the hour the forecast was decoded in
    pub fn current(&self) -> Result<HourlyReading, WeatherError> {
        self.reading_at(self.hour)
    }
}

fn parse_forecast_time(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .ok()
}

/// Forecast endpoint payload; only `hourly` is read
#[derive(Debug, Deserialize)]
pub(crate) struct ApiForecastResponse {
    pub hourly: ApiHourly,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiHourly {
    pub time: Vec<String>,
    pub temperature_2m: Vec<f64>,
    pub precipitation_probability: Vec<u8>,
    pub precipitation: Vec<f64>,
}

/// Weather lookup and bookmark errors
#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("No location found for {city}, {state}")]
    LocationNotFound { city: String, state: String },

    #[error("Hour {hour} is outside the forecast series (length {len})")]
    HourOutOfRange { hour: usize, len: usize },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl WeatherError {
    pub fn user_message(&self) -> &'static str {
        match self {
            WeatherError::InvalidRequest(_) => "That search couldn't be sent. Check the city and state.",
            WeatherError::Network(e) => e.user_message(),
            WeatherError::Decode(_) => "The weather service sent data we couldn't read.",
            WeatherError::LocationNotFound { .. } => "Location not found. Check and try again.",
            WeatherError::HourOutOfRange { .. } => "No forecast is available for the current hour.",
            WeatherError::Storage(e) => e.user_message(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const FORECAST_JSON: &str = include_str!("../testdata/philadelphia_forecast.json");
    const GEOCODE_JSON: &str = include_str!("../testdata/philadelphia_geocode.json");

    fn decode_forecast_at(hour: u32) -> ForecastResult {
        let raw: ApiForecastResponse = serde_json::from_str(FORECAST_JSON).unwrap();
        let at = Local.with_ymd_and_hms(2024, 4, 9, hour, 30, 0).unwrap();
        ForecastResult::from_api(raw.hourly, at)
    }

    fn philadelphia() -> GeoLocation {
        let mut all: Vec<GeoLocation> = serde_json::from_str(GEOCODE_JSON).unwrap();
        all.remove(0)
    }

    #[test]
    fn test_decode_geocode_payload() {
        let loc = philadelphia();
        assert_eq!(loc.latitude, "39.9527237");
        assert_eq!(loc.longitude, "-75.1635262");
        assert_eq!(loc.name, "Philadelphia");
        assert_eq!(loc.address.county.as_deref(), Some("Philadelphia County"));
        assert_eq!(loc.address.country_code, "us");
    }

    #[test]
    fn test_derived_key() {
        assert_eq!(philadelphia().key(), "39.9527237_-75.1635262");
    }

    #[test]
    fn test_identity_ignores_other_fields() {
        let a = philadelphia();
        let mut b = a.clone();
        b.name = "Philly".to_string();
        b.address.county = None;
        assert!(a.same_place(&b));
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_numeric_coordinates_are_accepted() {
        let json = r#"{"lat":40.5,"lon":-74.25,"name":"X","display_name":"X, NJ",
            "address":{"city":"X","state":"New Jersey","country":"United States","country_code":"us"}}"#;
        let loc: GeoLocation = serde_json::from_str(json).unwrap();
        assert_eq!(loc.key(), "40.5_-74.25");
        assert_eq!(loc.address.county, None);
    }

    #[test]
    fn test_coordinates_parse() {
        let (lat, lon) = philadelphia().coordinates().unwrap();
        assert!((lat - 39.9527237).abs() < 1e-9);
        assert!((lon + 75.1635262).abs() < 1e-9);
    }

    #[test]
    fn test_bad_coordinates_are_invalid_request() {
        let mut loc = philadelphia();
        loc.longitude = "west".to_string();
        assert!(matches!(loc.coordinates(), Err(WeatherError::InvalidRequest(_))));
    }

    #[test]
    fn test_current_hour_reading() {
        let forecast = decode_forecast_at(13);
        assert_eq!(forecast.hour, 13);
        assert_eq!(forecast.hourly.len(), 24);
        assert!(forecast.hourly.is_aligned());

        let reading = forecast.current().unwrap();
        assert_eq!(reading.temperature, 58.0);
        assert_eq!(reading.precipitation, 0.0);
        assert_eq!(reading.precipitation_probability, 0);
        assert_eq!(
            reading.time,
            NaiveDateTime::parse_from_str("2024-04-09T13:00", "%Y-%m-%dT%H:%M").ok()
        );
    }

    #[test]
    fn test_hour_past_series_end_is_error() {
        let mut forecast = decode_forecast_at(13);
        forecast.hourly.temperature.truncate(12);

        let err = forecast.current().unwrap_err();
        assert!(matches!(err, WeatherError::HourOutOfRange { hour: 13, len: 12 }));
    }

    #[test]
    fn test_empty_series_has_no_current_reading() {
        let forecast = ForecastResult {
            fetched_at: Utc::now(),
            hour: 0,
            hourly: HourlySeries::default(),
        };
        assert!(forecast.hourly.is_empty());
        assert!(matches!(
            forecast.current(),
            Err(WeatherError::HourOutOfRange { hour: 0, len: 0 })
        ));
    }

    #[test]
    fn test_unparsable_times_dropped_from_time_only() {
        let hourly = ApiHourly {
            time: vec![
                "2024-04-09T00:00".to_string(),
                "garbage".to_string(),
                "2024-04-09T02:00:00".to_string(),
            ],
            temperature_2m: vec![50.0, 51.0, 52.0],
            precipitation_probability: vec![10, 20, 30],
            precipitation: vec![0.1, 0.2, 0.3],
        };
        let at = Local.with_ymd_and_hms(2024, 4, 9, 1, 0, 0).unwrap();
        let forecast = ForecastResult::from_api(hourly, at);

        assert_eq!(forecast.hourly.time.len(), 2);
        assert_eq!(forecast.hourly.temperature.len(), 3);
        assert!(!forecast.hourly.is_aligned());

        let reading = forecast.current().unwrap();
        assert_eq!(reading.temperature, 51.0);
        assert_eq!(reading.precipitation_probability, 20);
    }

    #[test]
    fn test_forecast_serde_round_trip() {
        let forecast = decode_forecast_at(8);
        let json = serde_json::to_string(&forecast).unwrap();
        let back: ForecastResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, forecast);
    }

    #[test]
    fn test_user_messages_are_non_empty() {
        let errors = [
            WeatherError::InvalidRequest("x".into()),
            WeatherError::Decode("x".into()),
            WeatherError::LocationNotFound {
                city: "Nowhere".into(),
                state: "Nothing".into(),
            },
            WeatherError::HourOutOfRange { hour: 23, len: 12 },
            WeatherError::Network(NetworkError::Timeout),
        ];
        for err in &errors {
            assert!(!err.user_message().is_empty(), "{err}");
        }
    }
}
