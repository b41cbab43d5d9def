//! Partial risk reports and the patches that fill them.

use serde::{Deserialize, Serialize};

use crate::historical::{DataPoint, HistoricalData};
use crate::plan::{merge_plan, ActionPlan};

/// Everything known about one risk at one location.
///
/// Fields are filled independently as their sub-fetches succeed and are
/// never removed except by an explicit cache clear.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub historical_data: Option<HistoricalData>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_plan: Option<ActionPlan>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub future_projection: Option<Vec<DataPoint>>,
}

/// One field-level update produced by a report-generation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum ReportPatch {
    Historical(HistoricalData),
    Plan(ActionPlan),
    Projection(Vec<DataPoint>),
}

impl RiskReport {
    /// A report is complete once both generated parts are present.
    pub fn is_complete(&self) -> bool {
        self.action_plan.is_some() && self.future_projection.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.historical_data.is_none()
            && self.action_plan.is_none()
            && self.future_projection.is_none()
    }

    /// Apply a patch, touching only the field it names.
    ///
    /// A plan patch is merged against the plan currently held, so progress
    /// recorded since the patch was produced is not lost.
    pub fn apply(&mut self, patch: ReportPatch) {
        match patch {
            ReportPatch::Historical(data) => self.historical_data = Some(data),
            ReportPatch::Plan(plan) => {
                let merged = merge_plan(self.action_plan.as_ref(), plan);
                self.action_plan = Some(merged);
            }
            ReportPatch::Projection(points) => self.future_projection = Some(points),
        }
    }

    /// Apply patches in order.
    pub fn apply_all(&mut self, patches: impl IntoIterator<Item = ReportPatch>) {
        for patch in patches {
            self.apply(patch);
        }
    }
}
