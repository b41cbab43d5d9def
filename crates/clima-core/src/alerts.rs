//! Proactive alerts derived from the five-day forecast.
//!
//! Thresholds assume a celsius forecast.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::forecast::{Condition, ForecastDay, FORECAST_DAYS};
use crate::types::RiskType;

pub const HEATWAVE_TEMP_THRESHOLD: i32 = 35;
pub const HEATWAVE_DAYS_THRESHOLD: usize = 3;
pub const FLOOD_RAIN_DAYS_THRESHOLD: usize = 2;
pub const WILDFIRE_TEMP_THRESHOLD: i32 = 30;
pub const WILDFIRE_SUNNY_DAYS_THRESHOLD: usize = 3;

/// A dismissible warning about an elevated near-term risk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    /// `<risk>-<YYYY-MM-DD>`, stable for a day so dismissal sticks
    pub id: String,
    pub risk_type: RiskType,
    pub title: String,
    pub message: String,
}

/// Inspect a forecast for heatwave, flood and wildfire signals.
///
/// Returns nothing for forecasts shorter than five days.
pub fn check_for_alerts(forecast: &[ForecastDay], today: NaiveDate) -> Vec<Alert> {
    if forecast.len() < FORECAST_DAYS {
        return Vec::new();
    }

    let stamp = today.format("%Y-%m-%d");
    let mut alerts = Vec::new();

    let mut consecutive_hot = 0;
    for day in forecast {
        if day.high_temp >= HEATWAVE_TEMP_THRESHOLD {
            consecutive_hot += 1;
        } else {
            consecutive_hot = 0;
        }
        if consecutive_hot >= HEATWAVE_DAYS_THRESHOLD {
            alerts.push(Alert {
                id: format!("heatwave-{stamp}"),
                risk_type: RiskType::Heatwave,
                title: "Heatwave Alert".to_string(),
                message: format!(
                    "An extended period of high temperatures ({HEATWAVE_DAYS_THRESHOLD}+ days over {HEATWAVE_TEMP_THRESHOLD}°C) is forecast."
                ),
            });
            break;
        }
    }

    let rainy_days = forecast
        .iter()
        .filter(|d| d.condition == Condition::Rain)
        .count();
    if rainy_days >= FLOOD_RAIN_DAYS_THRESHOLD {
        alerts.push(Alert {
            id: format!("flood-{stamp}"),
            risk_type: RiskType::Flood,
            title: "Increased Flood Risk".to_string(),
            message: format!(
                "Multiple days of rain ({rainy_days} days) are forecast, which may increase the risk of local flooding."
            ),
        });
    }

    let hot_and_dry = forecast
        .iter()
        .filter(|d| d.high_temp >= WILDFIRE_TEMP_THRESHOLD && d.condition.is_clear())
        .count();
    if hot_and_dry >= WILDFIRE_SUNNY_DAYS_THRESHOLD {
        alerts.push(Alert {
            id: format!("wildfire-{stamp}"),
            risk_type: RiskType::Wildfire,
            title: "Elevated Wildfire Danger".to_string(),
            message: format!(
                "A period of hot, dry weather ({hot_and_dry} days) is forecast, increasing the risk of wildfires."
            ),
        });
    }

    alerts
}

/// Drop alerts the user has already dismissed.
pub fn without_dismissed<S: AsRef<str>>(alerts: Vec<Alert>, dismissed: &[S]) -> Vec<Alert> {
    alerts
        .into_iter()
        .filter(|a| !dismissed.iter().any(|d| d.as_ref() == a.id))
        .collect()
}
