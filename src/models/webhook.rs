use chrono::{DateTime, NaiveDate, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Event type the HR system sends for new hires. Other values are accepted
/// on the onboarding route but logged.
pub const ONBOARDING_EVENT: &str = "user.onboarding";

const WEEKDAYS: [&str; 7] = [
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

/// A single first-day agenda entry.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct ScheduleItem {
    #[garde(length(min = 1, max = 50))]
    pub time: String,

    #[garde(length(min = 1, max = 300))]
    pub activity: String,

    #[garde(length(max = 200))]
    #[serde(default)]
    pub location: Option<String>,

    #[garde(skip)]
    #[serde(default)]
    pub attendees: Option<Vec<String>>,
}

/// Employee information sent by the HR system.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct EmployeeData {
    #[garde(length(min = 1, max = 100))]
    pub employee_id: String,

    #[garde(length(min = 1, max = 200))]
    pub name: String,

    #[garde(email)]
    pub email: String,

    #[garde(length(min = 1, max = 200))]
    pub position: String,

    #[garde(length(min = 1, max = 200))]
    pub team: String,

    #[garde(length(min = 1, max = 200))]
    pub manager: String,

    #[garde(skip)]
    pub start_date: NaiveDate,

    #[garde(length(min = 1, max = 200))]
    pub office: String,

    #[garde(length(max = 50), inner(length(min = 1, max = 100)))]
    #[serde(default)]
    pub tech_stack: Vec<String>,

    #[garde(length(max = 50), dive)]
    #[serde(default)]
    pub first_day_schedule: Vec<ScheduleItem>,

    #[garde(skip)]
    #[serde(default)]
    pub first_week_schedule: BTreeMap<String, String>,

    #[garde(length(max = 200))]
    #[serde(default)]
    pub department: Option<String>,

    #[garde(length(max = 200))]
    #[serde(default)]
    pub buddy: Option<String>,
}

impl EmployeeData {
    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or(&self.name)
    }

    /// First-week entries, weekdays in calendar order, anything else after.
    pub fn ordered_week(&self) -> Vec<(&str, &str)> {
        let mut entries: Vec<(&str, &str)> = self
            .first_week_schedule
            .iter()
            .map(|(day, activity)| (day.as_str(), activity.as_str()))
            .collect();
        entries.sort_by_key(|(day, _)| {
            WEEKDAYS
                .iter()
                .position(|d| d.eq_ignore_ascii_case(day))
                .unwrap_or(WEEKDAYS.len())
        });
        entries
    }
}

/// `POST /webhooks/user-onboarding` body.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct OnboardingWebhook {
    #[garde(length(min = 1, max = 100))]
    #[serde(default = "default_event_type")]
    pub event_type: String,

    #[garde(dive)]
    pub employee_data: EmployeeData,

    #[garde(skip)]
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

fn default_event_type() -> String {
    ONBOARDING_EVENT.to_string()
}

/// Acknowledgement returned by the webhook endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub success: bool,
    pub message: String,
    pub job_id: Option<Uuid>,
    pub processed_at: DateTime<Utc>,
}
