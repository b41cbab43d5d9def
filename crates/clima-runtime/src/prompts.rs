//! Prompts for the generative calls.
//!
//! Structured calls pair these prompts with a JSON schema from
//! [`clima_core::schema`]; the prompt describes the content, the schema
//! fixes the shape.

use clima_core::{ActionPlan, HistoricalData, HomeType, Location, RiskReport, RiskType, UserProfile};

/// System instruction for the chat assistant.
pub const CHAT_SYSTEM_INSTRUCTION: &str = "You are CLIMA, a friendly and knowledgeable AI \
assistant specializing in climate science, risk assessment, and preparedness. Your goal is to \
provide clear, accurate, and accessible answers. You have tools to access real-time weather and \
user-specific risk reports. Use your tools when a user's question can be answered by them.";

pub const DAILY_TIP_PROMPT: &str = "Give me one unique, actionable, and encouraging tip for \
reducing my personal carbon footprint today. Make it concise and positive.";

/// Used in the share summary when the plan has no high-priority item.
pub const FALLBACK_KEY_ACTION: &str = "developing a preparedness plan";

/// First-person description of where the user lives and with whom.
pub fn location_context(location: &Location, profile: &UserProfile) -> String {
    let mut context = format!(
        "I live in {} (latitude: {}, longitude: {}).",
        location.display_name, location.latitude, location.longitude
    );

    if profile.home_type != HomeType::Unspecified {
        context.push_str(&format!(" I live in a {}.", profile.home_type.as_str()));
    }
    if !profile.household_details.is_empty() {
        let members: Vec<&str> = profile.household_details.iter().map(|m| m.as_str()).collect();
        context.push_str(&format!(" My household includes {}.", members.join(", ")));
    }
    if !profile.local_environment.is_empty() {
        let places: Vec<&str> = profile.local_environment.iter().map(|e| e.as_str()).collect();
        context.push_str(&format!(
            " My immediate environment is near a {}.",
            places.join(", ")
        ));
    }

    context
}

/// Prompt for a personalized action plan.
///
/// When `existing` is given, its items are listed with their ids so the
/// model can continue them instead of inventing replacements.
pub fn action_plan(
    location: &Location,
    risk: RiskType,
    profile: &UserProfile,
    existing: Option<&ActionPlan>,
) -> String {
    let mut prompt = format!(
        "{} Generate a personalized action plan to mitigate the risks of {}. The plan should be \
         highly relevant to my specific context. Provide a brief summary and a list of actionable \
         items according to the provided JSON schema. Ensure every item has a status of 'To Do'. \
         If relevant, include links to helpful external resources.",
        location_context(location, profile),
        risk
    );

    if let Some(plan) = existing.filter(|p| !p.items.is_empty()) {
        let listed: Vec<String> = plan
            .items
            .iter()
            .map(|item| match item.id {
                Some(id) => format!("[{}] {}", id, item.title),
                None => item.title.clone(),
            })
            .collect();
        prompt.push_str(&format!(
            " My current plan already has these items: {}. When an item of the new plan continues \
             one of them, reuse its title and set its id.",
            listed.join("; ")
        ));
    }

    prompt
}

/// Prompt for a projection extrapolated from a historical series.
pub fn projection(location: &Location, risk: RiskType, historical: &HistoricalData) -> String {
    format!(
        "Act as a climate data scientist. I will provide you with the historical climate data \
         anomaly for {risk} risk in {name}. The historical data is: [{trend}]. Based on this \
         historical trend and general climate models for the region, project a quantifiable data \
         trend for the next 5-10 years. Provide a JSON object containing an array of 2-3 future \
         data points (e.g., for 2030, 2035). The values should represent the projected anomaly, \
         consistent with the historical data unit ({unit}). Follow the provided JSON schema exactly.",
        risk = risk,
        name = location.display_name,
        trend = historical.trend_text(),
        unit = historical.unit,
    )
}

pub fn comparison(location: &Location, other: &str) -> String {
    format!(
        "Compare the primary climate risks (flood, heatwave, drought, wildfire) for my location, \
         {}, versus {}. Provide a concise text summary and then assign a risk score from 1 (low \
         risk) to 10 (high risk) for each of the four risks for both locations. Respond with a \
         JSON object that follows the provided schema exactly.",
        location.display_name, other
    )
}

pub fn challenges(location: &Location) -> String {
    format!(
        "For a user in {}, generate a list of exactly 5 unique, actionable, and varied challenges \
         to help them reduce their personal carbon footprint. The challenges should cover \
         different categories. The response must follow the provided JSON schema exactly.",
        location.display_name
    )
}

/// Prompt for a short shareable text about a report.
pub fn share_summary(location: &Location, risk: RiskType, report: &RiskReport) -> String {
    let key_action = report
        .action_plan
        .as_ref()
        .and_then(|plan| plan.high_priority().next())
        .map(|item| item.title.as_str())
        .unwrap_or(FALLBACK_KEY_ACTION);

    format!(
        "Create a concise, shareable summary (like for Twitter/X) about the climate risk of {risk} \
         in {name}.\n\nThe summary should be engaging and informative for a general audience. \
         Start by mentioning the risk and location. Include the key insight that a crucial step \
         for residents is \"{key_action}\".\n\nEnd with a positive call to action and include a \
         relevant hashtag like #ClimateAction, #ClimateReady, or #{risk}Safety. Keep the entire \
         text under 280 characters.",
        risk = risk,
        name = location.display_name,
        key_action = key_action,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use clima_core::{
        ActionItem, Category, DataPoint, HouseholdMember, ItemId, ItemStatus, LocalEnvironment,
        Priority,
    };

    fn new_york() -> Location {
        Location::new(40.7, -74.0, "New York")
    }

    fn item(title: &str, priority: Priority) -> ActionItem {
        ActionItem {
            id: None,
            title: title.to_string(),
            description: "d".to_string(),
            category: Category::Home,
            priority,
            status: ItemStatus::ToDo,
            resources: vec![],
        }
    }

    #[test]
    fn test_location_context_without_profile() {
        let context = location_context(&new_york(), &UserProfile::default());
        assert_eq!(context, "I live in New York (latitude: 40.7, longitude: -74).");
    }

    #[test]
    fn test_location_context_with_profile() {
        let profile = UserProfile {
            home_type: HomeType::Apartment,
            household_details: vec![HouseholdMember::Pets, HouseholdMember::Elderly],
            local_environment: vec![LocalEnvironment::River, LocalEnvironment::DenseUrban],
        };
        let context = location_context(&new_york(), &profile);
        assert!(context.contains(" I live in a apartment."));
        assert!(context.contains(" My household includes pets, elderly."));
        assert!(context.contains(" My immediate environment is near a river, dense urban area."));
    }

    #[test]
    fn test_action_plan_lists_existing_ids() {
        let id = ItemId::new();
        let mut shutters = item("Install storm shutters", Priority::High);
        shutters.id = Some(id);
        let existing = ActionPlan {
            summary: "s".to_string(),
            items: vec![shutters],
        };

        let fresh = action_plan(&new_york(), RiskType::Flood, &UserProfile::default(), None);
        assert!(fresh.contains("mitigate the risks of flood"));
        assert!(!fresh.contains("already has these items"));

        let refresh = action_plan(
            &new_york(),
            RiskType::Flood,
            &UserProfile::default(),
            Some(&existing),
        );
        assert!(refresh.contains(&format!("[{}] Install storm shutters", id)));
    }

    #[test]
    fn test_projection_includes_trend_and_unit() {
        let historical = HistoricalData {
            data: vec![DataPoint::new("2023", -0.5), DataPoint::new("2024", 0.5)],
            label: "Annual Temperature Anomaly".to_string(),
            unit: "°C".to_string(),
        };
        let prompt = projection(&new_york(), RiskType::Heatwave, &historical);
        assert!(prompt.contains("[2023: -0.50°C, 2024: 0.50°C]"));
        assert!(prompt.contains("historical data unit (°C)"));
    }

    #[test]
    fn test_share_summary_uses_first_high_priority_item() {
        let mut report = RiskReport::default();
        assert!(share_summary(&new_york(), RiskType::Wildfire, &report)
            .contains(FALLBACK_KEY_ACTION));

        report.action_plan = Some(ActionPlan {
            summary: "s".to_string(),
            items: vec![
                item("Clear gutters", Priority::Low),
                item("Create defensible space", Priority::High),
                item("Pack a go-bag", Priority::High),
            ],
        });
        let prompt = share_summary(&new_york(), RiskType::Wildfire, &report);
        assert!(prompt.contains("\"Create defensible space\""));
        assert!(prompt.contains("#wildfireSafety"));
    }
}
