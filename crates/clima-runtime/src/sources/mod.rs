//! Weather and climate data sources.
//!
//! Two traits sit at the seam between the runtime and the data provider:
//! [`HistoricalDataProvider`] for the yearly anomaly series a report's
//! projection is built on, and [`ForecastProvider`] for the five-day
//! forecast used by alerts and the chat assistant. The Open-Meteo client
//! (feature `open-meteo`) implements both.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use clima_core::{
    ForecastDay, ForecastError, HistoricalData, HistoricalError, Location, RiskType,
    TemperatureUnit,
};

use crate::resilience::{Classify, ErrorClass};

#[cfg(feature = "open-meteo")]
mod open_meteo;

#[cfg(feature = "open-meteo")]
pub use open_meteo::OpenMeteoClient;

/// Errors from a data source.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("Data API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Unexpected response format: {0}")]
    InvalidFormat(String),

    #[error(transparent)]
    Historical(#[from] HistoricalError),

    #[error(transparent)]
    Forecast(#[from] ForecastError),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),
}

impl Classify for SourceError {
    fn classify(&self) -> ErrorClass {
        match self {
            SourceError::ApiError { status, .. } => ErrorClass::from_status(*status),
            _ => ErrorClass::NonRetryable,
        }
    }
}

/// Supplies the historical series a projection is extrapolated from.
#[async_trait]
pub trait HistoricalDataProvider: Send + Sync {
    async fn fetch_historical(
        &self,
        location: &Location,
        risk: RiskType,
    ) -> Result<HistoricalData, SourceError>;
}

/// Supplies the short-range daily forecast.
#[async_trait]
pub trait ForecastProvider: Send + Sync {
    async fn fetch_forecast(
        &self,
        location: &Location,
        unit: TemperatureUnit,
    ) -> Result<Vec<ForecastDay>, SourceError>;
}
