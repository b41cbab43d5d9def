//! Open-Meteo archive and forecast client.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::time::Duration;

use clima_core::{
    aggregate, archive_window, forecast::FORECAST_DAYS, DailyArchive, DailyForecast, ForecastDay,
    HistoricalData, Location, RiskType, TemperatureUnit,
};

use super::{ForecastProvider, HistoricalDataProvider, SourceError};
use crate::config::WeatherSettings;

const ARCHIVE_DAILY: &str = "temperature_2m_max,precipitation_sum,temperature_2m_mean";
const FORECAST_DAILY: &str = "weathercode,temperature_2m_max,temperature_2m_min";

/// Client for the Open-Meteo archive and forecast APIs. No key required.
#[derive(Debug, Clone)]
pub struct OpenMeteoClient {
    archive_url: String,
    forecast_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ArchiveResponse {
    daily: Option<DailyArchive>,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    daily: Option<DailyForecast>,
}

#[derive(Debug, Deserialize)]
struct OpenMeteoError {
    #[serde(default)]
    reason: String,
}

impl Default for OpenMeteoClient {
    fn default() -> Self {
        Self::new(&WeatherSettings::default())
    }
}

impl OpenMeteoClient {
    pub fn new(settings: &WeatherSettings) -> Self {
        Self {
            archive_url: settings.archive_url.clone(),
            forecast_url: settings.forecast_url.clone(),
            timeout: settings.timeout,
            client: reqwest::Client::new(),
        }
    }

    /// Fetch the archive for `risk` over the window ending the year before `today`.
    pub async fn fetch_historical_on(
        &self,
        location: &Location,
        risk: RiskType,
        today: NaiveDate,
    ) -> Result<HistoricalData, SourceError> {
        let (start, end) = archive_window(today);
        let query = [
            ("latitude", location.latitude.to_string()),
            ("longitude", location.longitude.to_string()),
            ("start_date", start.format("%Y-%m-%d").to_string()),
            ("end_date", end.format("%Y-%m-%d").to_string()),
            ("daily", ARCHIVE_DAILY.to_string()),
            ("timezone", "auto".to_string()),
        ];

        let body: ArchiveResponse = self.get_json(&self.archive_url, &query).await?;
        let daily = body
            .daily
            .ok_or_else(|| SourceError::InvalidFormat("archive has no daily series".to_string()))?;

        let data = aggregate(risk, &daily)?;
        tracing::debug!(
            location = %location,
            risk = %risk,
            points = data.data.len(),
            "Historical series aggregated"
        );
        Ok(data)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, SourceError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SourceError::Timeout(self.timeout)
                } else {
                    SourceError::HttpError(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<OpenMeteoError>(&body)
                .map(|e| e.reason)
                .unwrap_or(body);
            return Err(SourceError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| SourceError::InvalidFormat(e.to_string()))
    }
}

#[async_trait]
impl HistoricalDataProvider for OpenMeteoClient {
    async fn fetch_historical(
        &self,
        location: &Location,
        risk: RiskType,
    ) -> Result<HistoricalData, SourceError> {
        let today = chrono::Utc::now().date_naive();
        self.fetch_historical_on(location, risk, today).await
    }
}

#[async_trait]
impl ForecastProvider for OpenMeteoClient {
    async fn fetch_forecast(
        &self,
        location: &Location,
        unit: TemperatureUnit,
    ) -> Result<Vec<ForecastDay>, SourceError> {
        let query = [
            ("latitude", location.latitude.to_string()),
            ("longitude", location.longitude.to_string()),
            ("daily", FORECAST_DAILY.to_string()),
            ("temperature_unit", unit.as_str().to_string()),
            ("timezone", "auto".to_string()),
            ("forecast_days", FORECAST_DAYS.to_string()),
        ];

        let body: ForecastResponse = self.get_json(&self.forecast_url, &query).await?;
        let daily = body
            .daily
            .ok_or_else(|| SourceError::InvalidFormat("forecast has no daily series".to_string()))?;
        Ok(daily.to_days(FORECAST_DAYS)?)
    }
}
