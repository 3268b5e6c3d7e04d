//! Onboarding webhook payloads used across the HTTP tests

#![allow(dead_code)]

use serde_json::{json, Value};

/// A new hire as the HR system describes them.
#[derive(Debug, Clone)]
pub struct OnboardingFixture {
    pub employee_id: &'static str,
    pub name: &'static str,
    pub email: &'static str,
    pub position: &'static str,
    pub start_date: &'static str,
}

pub const SARAH_JOHNSON: OnboardingFixture = OnboardingFixture {
    employee_id: "EMP001",
    name: "Sarah Johnson",
    email: "sarah.johnson@example.com",
    position: "Senior Software Engineer",
    start_date: "2025-03-03",
};

pub const MARCUS_LEE: OnboardingFixture = OnboardingFixture {
    employee_id: "EMP002",
    name: "Marcus Lee",
    email: "marcus.lee@example.com",
    position: "Product Designer",
    start_date: "2025-04-07",
};

impl OnboardingFixture {
    pub fn employee_data(&self) -> Value {
        json!({
            "employee_id": self.employee_id,
            "name": self.name,
            "email": self.email,
            "position": self.position,
            "team": "Platform Engineering",
            "manager": "Mike Chen",
            "start_date": self.start_date,
            "office": "San Francisco HQ",
            "tech_stack": ["Rust", "PostgreSQL", "Kubernetes"],
            "first_day_schedule": [
                { "time": "9:00 AM", "activity": "Welcome breakfast", "location": "Kitchen" },
                { "time": "10:00 AM", "activity": "Laptop setup", "attendees": ["IT"] }
            ],
            "first_week_schedule": {
                "Monday": "Orientation",
                "Wednesday": "Architecture deep dive",
                "Friday": "Team lunch"
            },
            "department": "Engineering",
            "buddy": "Priya Patel"
        })
    }

    /// Full webhook body.
    pub fn webhook(&self) -> Value {
        json!({
            "event_type": "user.onboarding",
            "employee_data": self.employee_data(),
            "timestamp": "2025-02-20T10:00:00Z"
        })
    }
}
