use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

use crate::models::webhook::EmployeeData;
use crate::services::pipeline::{Script, ScriptLine, ScriptWriter, Speaker, StageError};

const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";

const SYSTEM_PROMPT: &str = concat!(
    "You are a creative script writer for onboarding videos. ",
    "Write a warm, engaging conversation between two friendly hosts, Alex and Jordan, ",
    "welcoming a new employee. Keep it conversational and natural, give each host ",
    "3-5 turns, keep the whole script to 2-3 minutes when spoken, cover the important ",
    "details without overwhelming, and end on an encouraging note.\n\n",
    "Format every line EXACTLY as `Alex: <text>` or `Jordan: <text>`."
);

/// Script writer backed by the OpenAI chat completions API.
pub struct OpenAiScriptWriter {
    http: Client,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

impl OpenAiScriptWriter {
    pub fn new(http: Client, api_key: String, model: String) -> Self {
        Self {
            http,
            api_key,
            model,
        }
    }
}

#[async_trait]
impl ScriptWriter for OpenAiScriptWriter {
    async fn write_script(&self, employee: &EmployeeData) -> Result<Script, StageError> {
        let prompt = build_prompt(employee);
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            temperature: 0.7,
            max_tokens: 2000,
        };

        let response = self
            .http
            .post(CHAT_COMPLETIONS_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(StageError::from_http)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StageError::from_status(status, &body));
        }

        let chat: ChatResponse = response.json().await.map_err(StageError::from_http)?;
        let text = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| StageError::Permanent("completion contained no message".to_string()))?;

        let script = parse_script(&text);
        if script.lines.is_empty() {
            return Err(StageError::Permanent(
                "script generation returned no dialogue lines".to_string(),
            ));
        }

        tracing::info!(
            employee_id = %employee.employee_id,
            lines = script.lines.len(),
            "Generated onboarding script"
        );
        Ok(script)
    }
}

/// Describe the employee for the model.
pub fn build_prompt(employee: &EmployeeData) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "Create an onboarding welcome script for:\n");
    let _ = writeln!(prompt, "Name: {}", employee.name);
    let _ = writeln!(prompt, "Position: {}", employee.position);
    let _ = writeln!(prompt, "Team: {}", employee.team);
    let _ = writeln!(prompt, "Manager: {}", employee.manager);
    let _ = writeln!(prompt, "Start Date: {}", employee.start_date);
    let _ = writeln!(prompt, "Office: {}", employee.office);
    let _ = writeln!(prompt, "Tech Stack: {}", employee.tech_stack.join(", "));
    if let Some(department) = &employee.department {
        let _ = writeln!(prompt, "Department: {department}");
    }
    if let Some(buddy) = &employee.buddy {
        let _ = writeln!(prompt, "Onboarding Buddy: {buddy}");
    }

    let _ = writeln!(prompt, "\nFirst Day Schedule:");
    for item in &employee.first_day_schedule {
        let _ = writeln!(prompt, "- {}: {}", item.time, item.activity);
    }

    let _ = writeln!(prompt, "\nFirst Week Overview:");
    for (day, activity) in employee.ordered_week() {
        let _ = writeln!(prompt, "- {day}: {activity}");
    }

    let _ = write!(
        prompt,
        "\nCreate an engaging conversation that welcomes {} and covers these key points \
         naturally. Make them feel excited and prepared!",
        employee.name
    );
    prompt
}

/// Parse `Speaker: text` lines into a script.
///
/// Lines without a known host or without text are skipped.
pub fn parse_script(text: &str) -> Script {
    let lines = text
        .lines()
        .filter_map(|line| {
            let (speaker, content) = line.trim().split_once(':')?;
            let speaker = match speaker.trim().trim_matches('*').to_lowercase().as_str() {
                "alex" | "host1" | "speaker1" => Speaker::Host1,
                "jordan" | "host2" | "speaker2" => Speaker::Host2,
                other => {
                    tracing::debug!(speaker = other, "Skipping line from unknown speaker");
                    return None;
                }
            };
            let content = content.trim();
            (!content.is_empty()).then(|| ScriptLine {
                speaker,
                text: content.to_string(),
            })
        })
        .collect();

    Script { lines }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::webhook::tests::sample_employee;

    #[test]
    fn test_parse_normalises_speakers() {
        let script = parse_script(
            "Alex: Welcome Sarah!\n\nJordan: We're thrilled.\nHOST1: Let's go\nspeaker2: Yes: really",
        );
        let speakers: Vec<Speaker> = script.lines.iter().map(|l| l.speaker).collect();
        assert_eq!(
            speakers,
            vec![Speaker::Host1, Speaker::Host2, Speaker::Host1, Speaker::Host2]
        );
        assert_eq!(script.lines[3].text, "Yes: really");
    }

    #[test]
    fn test_parse_skips_noise() {
        let script = parse_script("Here is your script\nNarrator: hello\nAlex:   \n**Alex**: Hi there");
        assert_eq!(script.lines.len(), 1);
        assert_eq!(script.lines[0].text, "Hi there");
    }

    #[test]
    fn test_prompt_includes_employee_details() {
        let prompt = build_prompt(&sample_employee());
        assert!(prompt.contains("Name: Sarah Johnson"));
        assert!(prompt.contains("Tech Stack: Rust, PostgreSQL, Kubernetes"));
        assert!(prompt.contains("- 9:00 AM: Welcome breakfast"));
        assert!(prompt.contains("Onboarding Buddy: Priya Patel"));
        let monday = prompt.find("- Monday").unwrap();
        let friday = prompt.find("- Friday").unwrap();
        assert!(monday < friday);
    }
}
