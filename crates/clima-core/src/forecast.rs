//! Short-range daily forecast.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of days a forecast covers.
pub const FORECAST_DAYS: usize = 5;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForecastError {
    #[error("Forecast has {found} days, expected at least {expected}")]
    TooShort { found: usize, expected: usize },

    #[error("Missing {field} for {date}")]
    MissingValue { field: &'static str, date: String },

    #[error("Invalid date in forecast: {0}")]
    InvalidDate(String),
}

/// Coarse sky condition used for display and alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Condition {
    Sunny,
    Cloudy,
    Rain,
    PartlyCloudy,
}

impl Condition {
    /// Map a WMO weather interpretation code (WMO 4677) to a condition.
    ///
    /// Unhandled codes fall back to partly cloudy.
    pub fn from_wmo_code(code: i64) -> Self {
        match code {
            0 | 1 => Condition::Sunny,
            2 => Condition::PartlyCloudy,
            3 | 45 | 48 => Condition::Cloudy,
            51 | 53 | 55 | 61 | 63 | 65 | 80 | 81 | 82 | 95 | 96 | 99 => Condition::Rain,
            _ => Condition::PartlyCloudy,
        }
    }

    pub fn is_clear(&self) -> bool {
        matches!(self, Condition::Sunny | Condition::PartlyCloudy)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemperatureUnit::Celsius => "celsius",
            TemperatureUnit::Fahrenheit => "fahrenheit",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            TemperatureUnit::Celsius => "°C",
            TemperatureUnit::Fahrenheit => "°F",
        }
    }
}

/// One forecast day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastDay {
    /// Short weekday name ("Mon")
    pub day: String,
    pub high_temp: i32,
    pub low_temp: i32,
    pub condition: Condition,
}

/// Daily forecast arrays as returned by the forecast API (`daily` object).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DailyForecast {
    #[serde(default)]
    pub time: Vec<String>,

    #[serde(default)]
    pub weathercode: Vec<Option<i64>>,

    #[serde(default)]
    pub temperature_2m_max: Vec<Option<f64>>,

    #[serde(default)]
    pub temperature_2m_min: Vec<Option<f64>>,
}

impl DailyForecast {
    /// Convert the first `days` entries into display days.
    pub fn to_days(&self, days: usize) -> Result<Vec<ForecastDay>, ForecastError> {
        if self.time.len() < days {
            return Err(ForecastError::TooShort {
                found: self.time.len(),
                expected: days,
            });
        }

        self.time
            .iter()
            .take(days)
            .enumerate()
            .map(|(i, date)| {
                let parsed = NaiveDate::parse_from_str(date, "%Y-%m-%d")
                    .map_err(|_| ForecastError::InvalidDate(date.clone()))?;
                let value = |series: &[Option<f64>], field| {
                    series
                        .get(i)
                        .copied()
                        .flatten()
                        .ok_or_else(|| ForecastError::MissingValue {
                            field,
                            date: date.clone(),
                        })
                };

                Ok(ForecastDay {
                    day: parsed.format("%a").to_string(),
                    high_temp: value(&self.temperature_2m_max, "temperature_2m_max")?.round() as i32,
                    low_temp: value(&self.temperature_2m_min, "temperature_2m_min")?.round() as i32,
                    condition: Condition::from_wmo_code(
                        self.weathercode.get(i).copied().flatten().unwrap_or(-1),
                    ),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wmo_mapping() {
        assert_eq!(Condition::from_wmo_code(0), Condition::Sunny);
        assert_eq!(Condition::from_wmo_code(2), Condition::PartlyCloudy);
        assert_eq!(Condition::from_wmo_code(48), Condition::Cloudy);
        assert_eq!(Condition::from_wmo_code(95), Condition::Rain);
        assert_eq!(Condition::from_wmo_code(71), Condition::PartlyCloudy);
    }

    #[test]
    fn test_to_days_rounds_and_names_weekdays() {
        let daily = DailyForecast {
            time: vec!["2026-10-12".to_string(), "2026-10-13".to_string()],
            weathercode: vec![Some(61), None],
            temperature_2m_max: vec![Some(21.6), Some(18.2)],
            temperature_2m_min: vec![Some(10.4), Some(9.5)],
        };
        let days = daily.to_days(2).unwrap();

        assert_eq!(days[0].day, "Mon");
        assert_eq!(days[0].high_temp, 22);
        assert_eq!(days[0].low_temp, 10);
        assert_eq!(days[0].condition, Condition::Rain);
        assert_eq!(days[1].day, "Tue");
        assert_eq!(days[1].condition, Condition::PartlyCloudy);
    }

    #[test]
    fn test_short_forecast_is_rejected() {
        let daily = DailyForecast {
            time: vec!["2026-10-12".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            daily.to_days(FORECAST_DAYS),
            Err(ForecastError::TooShort { found: 1, expected: 5 })
        ));
    }

    #[test]
    fn test_missing_temperature_is_reported() {
        let daily = DailyForecast {
            time: vec!["2026-10-12".to_string()],
            weathercode: vec![Some(0)],
            temperature_2m_max: vec![None],
            temperature_2m_min: vec![Some(1.0)],
        };
        assert!(matches!(
            daily.to_days(1),
            Err(ForecastError::MissingValue { field: "temperature_2m_max", .. })
        ));
    }
}
