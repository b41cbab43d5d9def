//! Human-readable rendering of command results.
//!
//! With `--json` commands print the serialized value instead; these
//! functions only cover the plain-text form.

use std::fmt::Write;

use serde::Serialize;

use clima_core::{
    ActionItem, Alert, Challenge, ComparisonData, DataPoint, ForecastDay, ItemStatus, Location,
    RiskType, TemperatureUnit,
};
use clima_runtime::ReportOutcome;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn series(out: &mut String, points: &[DataPoint], unit: &str) {
    for point in points {
        let _ = writeln!(out, "    {}  {:+}{}", point.year, point.value, unit);
    }
}

fn status_mark(status: ItemStatus) -> &'static str {
    match status {
        ItemStatus::ToDo => "[ ]",
        ItemStatus::InProgress => "[~]",
        ItemStatus::Completed => "[x]",
    }
}

pub fn item_line(item: &ActionItem) -> String {
    let id = item.id.as_ref().map(|id| id.to_string()).unwrap_or_default();
    format!(
        "{} {} ({:?}, {:?}) {}",
        status_mark(item.status),
        item.title,
        item.priority,
        item.category,
        id
    )
    .trim_end()
    .to_string()
}

pub fn report(location: &Location, risk: RiskType, outcome: &ReportOutcome) -> String {
    let mut out = String::new();
    let report = &outcome.report;
    let _ = writeln!(out, "{} for {}", risk.title(), location);

    match &report.historical_data {
        Some(historical) => {
            let _ = writeln!(out, "\n  {} (last five years)", historical.label);
            series(&mut out, &historical.data, &historical.unit);
        }
        None => {
            let _ = writeln!(out, "\n  Historical data unavailable");
        }
    }

    if let Some(plan) = &report.action_plan {
        let (done, total) = plan.progress();
        let _ = writeln!(out, "\n  Action plan ({}/{} completed)", done, total);
        let _ = writeln!(out, "  {}", plan.summary);
        for item in &plan.items {
            let _ = writeln!(out, "    {}", item_line(item));
        }
    }
    if let Some(error) = &outcome.plan_error {
        let _ = writeln!(out, "\n  Action plan failed: {}", error);
    }

    if let Some(projection) = &report.future_projection {
        let unit = report
            .historical_data
            .as_ref()
            .map(|h| h.unit.as_str())
            .unwrap_or_default();
        let _ = writeln!(out, "\n  Projection");
        series(&mut out, projection, unit);
    }
    if let Some(error) = &outcome.projection_error {
        let _ = writeln!(out, "\n  Projection failed: {}", error);
    }

    if outcome.cancelled {
        let _ = writeln!(out, "\n  Cancelled; partial results were stored.");
    }
    out
}

pub fn forecast(location: &Location, days: &[ForecastDay], unit: TemperatureUnit) -> String {
    let mut out = format!("5-day forecast for {}\n", location);
    for day in days {
        let _ = writeln!(
            out,
            "  {:<4} {:>4}{} / {:>4}{}  {:?}",
            day.day,
            day.high_temp,
            unit.symbol(),
            day.low_temp,
            unit.symbol(),
            day.condition
        );
    }
    out
}

pub fn alerts(alerts: &[Alert]) -> String {
    if alerts.is_empty() {
        return "No alerts for the coming days.\n".to_string();
    }
    let mut out = String::new();
    for alert in alerts {
        let _ = writeln!(out, "{} [{}]\n  {}", alert.title, alert.id, alert.message);
    }
    out
}

pub fn comparison(location: &Location, other: &str, data: &ComparisonData) -> String {
    let mut out = format!("{}\n\n", data.summary);
    let _ = writeln!(out, "  {:<10} {:>6} {:>6}", "risk", "here", "there");
    for item in &data.comparison {
        let _ = writeln!(
            out,
            "  {:<10} {:>6} {:>6}",
            item.risk_type, item.my_location_score, item.other_location_score
        );
    }
    let _ = writeln!(out, "\n  here = {}, there = {}", location.display_name, other);
    out
}

pub fn challenges(challenges: &[Challenge]) -> String {
    let mut out = String::new();
    for challenge in challenges {
        let _ = writeln!(
            out,
            "{} {} ({:?})\n    {}",
            if challenge.completed { "[x]" } else { "[ ]" },
            challenge.title,
            challenge.category,
            challenge.description
        );
    }
    out
}
