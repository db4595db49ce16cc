//! Current weather lookup

use async_trait::async_trait;
use canopy_evidence::Coordinates;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_WEATHER_URL: &str = "https://api.openweathermap.org/data/2.5/weather";

#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("weather API key not configured")]
    MissingApiKey,

    #[error("weather transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("weather provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected weather response: {0}")]
    Decode(String),
}

/// Conditions at a point, metric units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    /// Nearest named place
    pub location: String,
    /// Celsius
    pub temperature: f64,
    /// Percent
    pub humidity: f64,
    /// Meters per second
    pub wind_speed: f64,
    pub description: String,
}

#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn current(&self, location: Coordinates) -> Result<WeatherReport, WeatherError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_WEATHER_URL.to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OwmResponse {
    #[serde(default)]
    name: String,
    main: OwmMain,
    wind: OwmWind,
    #[serde(default)]
    weather: Vec<OwmCondition>,
}

#[derive(Debug, Deserialize)]
struct OwmMain {
    temp: f64,
    humidity: f64,
}

#[derive(Debug, Deserialize)]
struct OwmWind {
    speed: f64,
}

#[derive(Debug, Deserialize)]
struct OwmCondition {
    description: String,
}

impl From<OwmResponse> for WeatherReport {
    fn from(r: OwmResponse) -> Self {
        Self {
            location: r.name,
            temperature: r.main.temp,
            humidity: r.main.humidity,
            wind_speed: r.wind.speed,
            description: r
                .weather
                .into_iter()
                .next()
                .map(|c| c.description)
                .unwrap_or_default(),
        }
    }
}

/// OpenWeatherMap current-conditions client
#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    http: reqwest::Client,
    config: WeatherConfig,
}

impl OpenWeatherClient {
    /// # Errors
    /// Returns [`WeatherError::Transport`] if the HTTP client cannot be built.
    pub fn new(config: WeatherConfig) -> Result<Self, WeatherError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { http, config })
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherClient {
    async fn current(&self, location: Coordinates) -> Result<WeatherReport, WeatherError> {
        let key = self.config.api_key.as_deref().ok_or(WeatherError::MissingApiKey)?;
        let response = self
            .http
            .get(&self.config.base_url)
            .query(&[
                ("lat", location.lat.to_string()),
                ("lon", location.lng.to_string()),
                ("appid", key.to_string()),
                ("units", "metric".to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(WeatherError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        let body: OwmResponse = response
            .json()
            .await
            .map_err(|e| WeatherError::Decode(e.to_string()))?;
        Ok(body.into())
    }
}
