//! Historical climate series derived from daily archive observations.
//!
//! Each risk type is summarized as one value per year, expressed as an
//! anomaly against the mean of the whole window:
//!
//! | Risk      | Yearly metric                                   | Unit    |
//! |-----------|-------------------------------------------------|---------|
//! | heatwave  | mean of daily mean temperature                  | °C      |
//! | flood     | days with precipitation above 20 mm             | days    |
//! | drought   | precipitation sum                               | mm      |
//! | wildfire  | days above 30 °C with less than 1 mm of rain    | days    |

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::types::RiskType;

pub const HEAVY_RAIN_THRESHOLD_MM: f64 = 20.0;
pub const WILDFIRE_TEMP_THRESHOLD_C: f64 = 30.0;
pub const WILDFIRE_PRECIP_THRESHOLD_MM: f64 = 1.0;

/// Number of full calendar years covered by the archive window.
pub const ARCHIVE_YEARS: i32 = 5;

/// Errors turning archive observations into a series.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HistoricalError {
    #[error("Archive contains no daily observations")]
    EmptyArchive,

    #[error("Invalid date in archive: {0}")]
    InvalidDate(String),
}

/// One point of a yearly series (historical or projected).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub year: String,
    pub value: f64,
}

impl DataPoint {
    pub fn new(year: impl Into<String>, value: f64) -> Self {
        Self {
            year: year.into(),
            value,
        }
    }
}

/// A labelled yearly anomaly series for one risk at one location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalData {
    pub data: Vec<DataPoint>,
    pub label: String,
    pub unit: String,
}

impl HistoricalData {
    /// Render the series as `year: value unit` pairs, for prompts.
    pub fn trend_text(&self) -> String {
        self.data
            .iter()
            .map(|d| format!("{}: {:.2}{}", d.year, d.value, self.unit))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Daily observations as returned by the archive API (`daily` object).
///
/// Missing observations arrive as `null` and are skipped.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DailyArchive {
    #[serde(default)]
    pub time: Vec<String>,

    #[serde(default)]
    pub temperature_2m_max: Vec<Option<f64>>,

    #[serde(default)]
    pub temperature_2m_mean: Vec<Option<f64>>,

    #[serde(default)]
    pub precipitation_sum: Vec<Option<f64>>,
}

/// The archive window for a given day: five full years ending last year.
pub fn archive_window(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let last_year = today.year() - 1;
    let first_year = last_year - (ARCHIVE_YEARS - 1);
    // Jan 1st and Dec 31st exist in every year.
    let start = NaiveDate::from_ymd_opt(first_year, 1, 1).unwrap_or(today);
    let end = NaiveDate::from_ymd_opt(last_year, 12, 31).unwrap_or(today);
    (start, end)
}

#[derive(Default)]
struct YearAccumulator {
    mean_temp_sum: f64,
    mean_temp_count: usize,
    precip_sum: f64,
    heavy_rain_days: usize,
    fire_days: usize,
}

/// Aggregate daily observations into the yearly anomaly series for `risk`.
pub fn aggregate(risk: RiskType, daily: &DailyArchive) -> Result<HistoricalData, HistoricalError> {
    if daily.time.is_empty() {
        return Err(HistoricalError::EmptyArchive);
    }

    let mut years: BTreeMap<String, YearAccumulator> = BTreeMap::new();

    for (index, date) in daily.time.iter().enumerate() {
        let year = date
            .get(..4)
            .filter(|y| y.chars().all(|c| c.is_ascii_digit()))
            .ok_or_else(|| HistoricalError::InvalidDate(date.clone()))?;
        let acc = years.entry(year.to_string()).or_default();

        let mean = daily.temperature_2m_mean.get(index).copied().flatten();
        let max = daily.temperature_2m_max.get(index).copied().flatten();
        let precip = daily.precipitation_sum.get(index).copied().flatten();

        if let Some(t) = mean {
            acc.mean_temp_sum += t;
            acc.mean_temp_count += 1;
        }
        if let Some(p) = precip {
            acc.precip_sum += p;
            if p > HEAVY_RAIN_THRESHOLD_MM {
                acc.heavy_rain_days += 1;
            }
        }
        if let (Some(t), Some(p)) = (max, precip) {
            if t > WILDFIRE_TEMP_THRESHOLD_C && p < WILDFIRE_PRECIP_THRESHOLD_MM {
                acc.fire_days += 1;
            }
        }
    }

    let (label, unit, decimals) = match risk {
        RiskType::Heatwave => ("Annual Temperature Anomaly", "°C", 2),
        RiskType::Flood => ("Heavy Rain Days Anomaly", " days", 1),
        RiskType::Drought => ("Annual Precipitation Anomaly", "mm", 1),
        RiskType::Wildfire => ("High-Risk Wildfire Days Anomaly", " days", 1),
    };

    let yearly: Vec<(String, f64)> = years
        .into_iter()
        .filter_map(|(year, acc)| {
            let value = match risk {
                RiskType::Heatwave => {
                    if acc.mean_temp_count == 0 {
                        tracing::debug!(year = %year, "No mean temperature observations, year skipped");
                        return None;
                    }
                    acc.mean_temp_sum / acc.mean_temp_count as f64
                }
                RiskType::Flood => acc.heavy_rain_days as f64,
                RiskType::Drought => acc.precip_sum,
                RiskType::Wildfire => acc.fire_days as f64,
            };
            Some((year, value))
        })
        .collect();

    if yearly.is_empty() {
        return Err(HistoricalError::EmptyArchive);
    }

    let baseline = yearly.iter().map(|(_, v)| v).sum::<f64>() / yearly.len() as f64;

    Ok(HistoricalData {
        label: label.to_string(),
        unit: unit.to_string(),
        data: yearly
            .into_iter()
            .map(|(year, value)| DataPoint::new(year, round_to(value - baseline, decimals)))
            .collect(),
    })
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
