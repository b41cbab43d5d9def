//! Shared domain types: locations, risk categories, user profile context.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A geographic point with a human-readable name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    /// Latitude in decimal degrees
    pub latitude: f64,

    /// Longitude in decimal degrees
    pub longitude: f64,

    /// Simplified place name (e.g., "New York")
    pub display_name: String,
}

impl Location {
    /// Create a new location.
    pub fn new(latitude: f64, longitude: f64, display_name: impl Into<String>) -> Self {
        Self {
            latitude,
            longitude,
            display_name: display_name.into(),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:.4}, {:.4})",
            self.display_name, self.latitude, self.longitude
        )
    }
}

/// Error parsing a risk type from text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown risk type: '{0}' (expected flood, heatwave, drought or wildfire)")]
pub struct UnknownRiskType(pub String);

/// The hazard category a report covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskType {
    Flood,
    Heatwave,
    Drought,
    Wildfire,
}

impl RiskType {
    /// All risk types in dashboard order.
    pub const ALL: [RiskType; 4] = [
        RiskType::Flood,
        RiskType::Heatwave,
        RiskType::Drought,
        RiskType::Wildfire,
    ];

    /// Wire name used in prompts, cache keys and schemas.
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskType::Flood => "flood",
            RiskType::Heatwave => "heatwave",
            RiskType::Drought => "drought",
            RiskType::Wildfire => "wildfire",
        }
    }

    /// Heading shown above a report.
    pub fn title(&self) -> &'static str {
        match self {
            RiskType::Flood => "Flood Risk Analysis",
            RiskType::Heatwave => "Extreme Heat Analysis",
            RiskType::Drought => "Drought Stress Analysis",
            RiskType::Wildfire => "Wildfire Danger Analysis",
        }
    }
}

impl fmt::Display for RiskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskType {
    type Err = UnknownRiskType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flood" => Ok(RiskType::Flood),
            "heatwave" => Ok(RiskType::Heatwave),
            "drought" => Ok(RiskType::Drought),
            "wildfire" => Ok(RiskType::Wildfire),
            other => Err(UnknownRiskType(other.to_string())),
        }
    }
}

/// Cache identity of a report: a (location, risk type) pair.
///
/// Coordinates are quantized to four decimal places (~11 m) so that the
/// same place picked twice maps to the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReportKey {
    latitude_e4: i32,
    longitude_e4: i32,
    pub risk: RiskType,
}

impl ReportKey {
    pub fn new(location: &Location, risk: RiskType) -> Self {
        Self {
            latitude_e4: quantize(location.latitude),
            longitude_e4: quantize(location.longitude),
            risk,
        }
    }

    /// Whether this key belongs to the given location.
    pub fn is_at(&self, location: &Location) -> bool {
        self.latitude_e4 == quantize(location.latitude)
            && self.longitude_e4 == quantize(location.longitude)
    }
}

impl fmt::Display for ReportKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.4},{:.4}/{}",
            self.latitude_e4 as f64 / 10_000.0,
            self.longitude_e4 as f64 / 10_000.0,
            self.risk
        )
    }
}

fn quantize(degrees: f64) -> i32 {
    (degrees * 10_000.0).round() as i32
}

/// Kind of dwelling the user lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HomeType {
    House,
    Apartment,
    Other,
    #[default]
    #[serde(rename = "")]
    Unspecified,
}

impl HomeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            HomeType::House => "house",
            HomeType::Apartment => "apartment",
            HomeType::Other => "other",
            HomeType::Unspecified => "",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HouseholdMember {
    Pets,
    Children,
    Elderly,
}

impl HouseholdMember {
    pub fn as_str(&self) -> &'static str {
        match self {
            HouseholdMember::Pets => "pets",
            HouseholdMember::Children => "children",
            HouseholdMember::Elderly => "elderly",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LocalEnvironment {
    River,
    Forest,
    DenseUrban,
    Coastal,
}

impl LocalEnvironment {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocalEnvironment::River => "river",
            LocalEnvironment::Forest => "forest",
            LocalEnvironment::DenseUrban => "dense urban area",
            LocalEnvironment::Coastal => "coastline",
        }
    }
}

/// Personal context used to tailor generated action plans.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub home_type: HomeType,

    #[serde(default)]
    pub household_details: Vec<HouseholdMember>,

    #[serde(default)]
    pub local_environment: Vec<LocalEnvironment>,
}

impl UserProfile {
    /// True when no field carries information.
    pub fn is_empty(&self) -> bool {
        self.home_type == HomeType::Unspecified
            && self.household_details.is_empty()
            && self.local_environment.is_empty()
    }
}

/// Category of a personal footprint challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChallengeCategory {
    Energy,
    Water,
    Waste,
    Transport,
}

/// A small daily challenge for reducing one's carbon footprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    pub description: String,
    pub category: ChallengeCategory,
    #[serde(default)]
    pub completed: bool,
}

/// The built-in challenge set used when personalized generation fails.
pub fn default_challenges() -> Vec<Challenge> {
    let make = |id: &str, title: &str, description: &str, category| Challenge {
        id: Some(id.to_string()),
        title: title.to_string(),
        description: description.to_string(),
        category,
        completed: false,
    };

    vec![
        make(
            "d1",
            "Go Meatless for a Day",
            "Avoid meat and dairy products for one full day.",
            ChallengeCategory::Waste,
        ),
        make(
            "d2",
            "Unplug Electronics",
            "Unplug chargers and appliances when not in use.",
            ChallengeCategory::Energy,
        ),
        make(
            "d3",
            "5-Minute Shower",
            "Limit your shower time to 5 minutes to save water and energy.",
            ChallengeCategory::Water,
        ),
        make(
            "d4",
            "Use a Reusable Bottle",
            "Avoid single-use plastic bottles for a day.",
            ChallengeCategory::Waste,
        ),
        make(
            "d5",
            "Walk or Bike for a Short Trip",
            "Choose human-powered transport over a car for a trip under 2 miles.",
            ChallengeCategory::Transport,
        ),
    ]
}

/// Per-risk scores comparing two locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskComparisonItem {
    pub risk_type: RiskType,

    /// Score from 1 (low risk) to 10 (high risk)
    pub my_location_score: u8,

    /// Score from 1 (low risk) to 10 (high risk)
    pub other_location_score: u8,
}

/// Structured comparison between the user's location and another place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonData {
    pub summary: String,
    pub comparison: Vec<RiskComparisonItem>,
}

impl ComparisonData {
    /// Clamp every score into the 1..=10 range.
    pub fn clamp_scores(mut self) -> Self {
        for item in &mut self.comparison {
            item.my_location_score = item.my_location_score.clamp(1, 10);
            item.other_location_score = item.other_location_score.clamp(1, 10);
        }
        self
    }
}
