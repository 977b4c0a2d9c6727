//! Geocoding and hourly forecast client.
//!
//! Forward geocoding goes to Nominatim (OpenStreetMap) and forecasts to
//! Open-Meteo; both are free and need no API key. Base URLs come from
//! [`WeatherConfig`] so tests can point the client at a mock server.

use std::time::Duration;

use chrono::Local;
use reqwest::Client;
use serde::de::DeserializeOwned;
use skybook_core::{NetworkError, ReqwestErrorExt, TemperatureUnit, WeatherConfig};
use tracing::instrument;
use url::Url;

use crate::types::{ApiForecastResponse, ForecastResult, GeoLocation, WeatherError};

const HOURLY_FIELDS: &str = "temperature_2m,precipitation_probability,precipitation";

/// Stateless client for the geocoding and forecast endpoints
#[derive(Debug, Clone)]
pub struct GeoWeatherClient {
    client: Client,
    geocode_url: String,
    forecast_url: String,
    temperature_unit: TemperatureUnit,
    forecast_days: u8,
}

impl GeoWeatherClient {
    pub fn new(config: &WeatherConfig) -> Result<Self, WeatherError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| WeatherError::Network(e.into_network_error()))?;

        Ok(Self {
            client,
            geocode_url: config.geocode_url.clone(),
            forecast_url: config.forecast_url.clone(),
            temperature_unit: config.temperature_unit,
            forecast_days: config.forecast_days,
        })
    }

    /// Search for cities matching `city`/`state`.
    ///
    /// An empty result is not an error here; the caller decides what no match means.
    #[instrument(skip(self), level = "info")]
    pub async fn geocode(&self, city: &str, state: &str) -> Result<Vec<GeoLocation>, WeatherError> {
        let url = self.geocode_request_url(city, state)?;
        let locations: Vec<GeoLocation> = self.get_json(url).await?;
        tracing::info!("Geocoded {} match(es)", locations.len());
        Ok(locations)
    }

    /// Fetch today's hourly forecast for a coordinate pair
    #[instrument(skip(self), level = "info")]
    pub async fn forecast(&self, latitude: f64, longitude: f64) -> Result<ForecastResult, WeatherError> {
        let url = self.forecast_request_url(latitude, longitude)?;
        let response: ApiForecastResponse = self.get_json(url).await?;
        let forecast = ForecastResult::from_api(response.hourly, Local::now());
        tracing::info!(
            hours = forecast.hourly.len(),
            hour = forecast.hour,
            "Fetched forecast"
        );
        Ok(forecast)
    }

    /// Build the search URL. Words are joined with `+` and anything else
    /// URL-special is percent-encoded.
    pub(crate) fn geocode_request_url(&self, city: &str, state: &str) -> Result<Url, WeatherError> {
        let mut url = parse_base(&self.geocode_url)?;
        url.query_pairs_mut()
            .append_pair("city", &normalize_words(city))
            .append_pair("state", &normalize_words(state))
            .append_pair("featureType", "city")
            .append_pair("addressdetails", "1")
            .append_pair("format", "json");
        Ok(url)
    }

    pub(crate) fn forecast_request_url(&self, latitude: f64, longitude: f64) -> Result<Url, WeatherError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(WeatherError::InvalidRequest(format!(
                "latitude {} out of range",
                latitude
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(WeatherError::InvalidRequest(format!(
                "longitude {} out of range",
                longitude
            )));
        }

        let mut url = parse_base(&self.forecast_url)?;
        url.query_pairs_mut()
            .append_pair("latitude", &latitude.to_string())
            .append_pair("longitude", &longitude.to_string())
            .append_pair("hourly", HOURLY_FIELDS)
            .append_pair("temperature_unit", self.temperature_unit.as_query_value())
            .append_pair("forecast_days", &self.forecast_days.to_string());
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, WeatherError> {
        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| WeatherError::Network(e.into_network_error()))?;

        // Success is 200..=298
        let status = response.status();
        if !(200..299).contains(&status.as_u16()) {
            let message = response.text().await.unwrap_or_default();
            tracing::warn!("Request failed with status {}", status);
            return Err(WeatherError::Network(NetworkError::ServerError {
                status: status.as_u16(),
                message,
            }));
        }

        let body = response
            .text()
            .await
            .map_err(|e| WeatherError::Network(e.into_network_error()))?;

        serde_json::from_str(&body).map_err(|e| {
            tracing::debug!("Response did not match schema: {}", e);
            WeatherError::Decode(e.to_string())
        })
    }
}

fn parse_base(base: &str) -> Result<Url, WeatherError> {
    Url::parse(base).map_err(|e| WeatherError::InvalidRequest(format!("{}: {}", base, e)))
}

/// Collapse runs of whitespace to single spaces; the form encoder turns them into `+`.
fn normalize_words(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}
