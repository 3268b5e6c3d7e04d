use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::models::webhook::EmployeeData;
use crate::services::pipeline::{Notifier, StageError};

const MAIL_SEND_URL: &str = "https://api.sendgrid.com/v3/mail/send";

/// Sends the "your video is ready" email through SendGrid.
pub struct SendGridNotifier {
    http: Client,
    api_key: String,
    from_email: String,
    base_url: String,
}

impl SendGridNotifier {
    pub fn new(http: Client, api_key: String, from_email: String, base_url: String) -> Self {
        Self {
            http,
            api_key,
            from_email,
            base_url,
        }
    }

    /// Absolute link to a published video.
    pub fn video_url(&self, video_location: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), video_location)
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// SendGrid v3 `mail/send` request body.
pub fn mail_body(from_email: &str, employee: &EmployeeData, video_url: &str) -> Value {
    let first_name = employee.first_name();
    let html = format!(
        "<html><body style=\"font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;\">\
         <h1>Welcome to the Team!</h1>\
         <p>Hi {name},</p>\
         <p>We've prepared a personalized welcome video covering your team, \
         your tech stack, and what to expect on your first day and week.</p>\
         <p><a href=\"{url}\">Watch Your Welcome Video</a></p>\
         <p>See you soon!</p>\
         </body></html>",
        name = escape_html(first_name),
        url = escape_html(video_url),
    );

    json!({
        "personalizations": [{
            "to": [{ "email": employee.email, "name": employee.name }]
        }],
        "from": { "email": from_email },
        "subject": format!("Welcome to the team, {first_name}!"),
        "content": [{ "type": "text/html", "value": html }]
    })
}

#[async_trait]
impl Notifier for SendGridNotifier {
    async fn notify(&self, employee: &EmployeeData, video_location: &str) -> Result<(), StageError> {
        let body = mail_body(&self.from_email, employee, &self.video_url(video_location));

        let response = self
            .http
            .post(MAIL_SEND_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(StageError::from_http)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(StageError::from_status(status, &text));
        }

        tracing::info!(
            employee_id = %employee.employee_id,
            status = status.as_u16(),
            "Onboarding email sent"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::webhook::tests::sample_employee;

    #[test]
    fn test_mail_body() {
        let employee = sample_employee();
        let body = mail_body("onboarding@example.com", &employee, "https://videos.example.com/videos/x.mp4");

        assert_eq!(body["subject"], "Welcome to the team, Sarah!");
        assert_eq!(body["from"]["email"], "onboarding@example.com");
        assert_eq!(body["personalizations"][0]["to"][0]["email"], employee.email.as_str());
        let html = body["content"][0]["value"].as_str().unwrap();
        assert!(html.contains("href=\"https://videos.example.com/videos/x.mp4\""));
        assert!(html.contains("Hi Sarah,"));
    }

    #[test]
    fn test_video_url_joins_base() {
        let notifier = SendGridNotifier::new(
            Client::new(),
            "key".to_string(),
            "from@example.com".to_string(),
            "https://onboarding.example.com/".to_string(),
        );
        assert_eq!(
            notifier.video_url("/videos/abc.mp4"),
            "https://onboarding.example.com/videos/abc.mp4"
        );
    }

    #[test]
    fn test_html_escaped() {
        assert_eq!(escape_html("<b>Tom & \"Jerry\"</b>"), "&lt;b&gt;Tom &amp; &quot;Jerry&quot;&lt;/b&gt;");
    }
}
