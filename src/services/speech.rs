use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::io::AsyncWriteExt;

use crate::services::media;
use crate::services::pipeline::{Narration, Script, Speaker, SpeechSynthesizer, StageError};

const SYNTHESIZE_URL: &str = "https://texttospeech.googleapis.com/v1/text:synthesize";

/// Speech synthesis through the Google Cloud Text-to-Speech REST API.
///
/// Each script line becomes one MP3 segment; segments are concatenated into
/// `narration.mp3` (MPEG audio frames concatenate cleanly).
pub struct GoogleSpeechSynthesizer {
    http: Client,
    api_key: String,
    ffprobe_path: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeRequest<'a> {
    input: SynthesisInput<'a>,
    voice: VoiceSelection<'a>,
    audio_config: AudioConfig,
}

#[derive(Serialize)]
struct SynthesisInput<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceSelection<'a> {
    language_code: &'a str,
    name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioConfig {
    audio_encoding: &'static str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    audio_content: String,
}

/// Voice used for each host.
pub fn voice_for(speaker: Speaker) -> &'static str {
    match speaker {
        Speaker::Host1 => "en-US-Chirp3-HD-Algenib",
        Speaker::Host2 => "en-US-Chirp3-HD-Aoede",
    }
}

impl GoogleSpeechSynthesizer {
    pub fn new(http: Client, api_key: String, ffprobe_path: String) -> Self {
        Self {
            http,
            api_key,
            ffprobe_path,
        }
    }

    async fn synthesize_line(&self, speaker: Speaker, text: &str) -> Result<Vec<u8>, StageError> {
        let request = SynthesizeRequest {
            input: SynthesisInput { text },
            voice: VoiceSelection {
                language_code: "en-US",
                name: voice_for(speaker),
            },
            audio_config: AudioConfig {
                audio_encoding: "MP3",
            },
        };

        let response = self
            .http
            .post(SYNTHESIZE_URL)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(StageError::from_http)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StageError::from_status(status, &body));
        }

        let body: SynthesizeResponse = response.json().await.map_err(StageError::from_http)?;
        base64::engine::general_purpose::STANDARD
            .decode(body.audio_content)
            .map_err(|e| StageError::Permanent(format!("invalid audio content: {e}")))
    }
}

#[async_trait]
impl SpeechSynthesizer for GoogleSpeechSynthesizer {
    async fn synthesize(&self, script: &Script, work_dir: &Path) -> Result<Narration, StageError> {
        let audio_dir = work_dir.join("audio");
        tokio::fs::create_dir_all(&audio_dir)
            .await
            .map_err(|e| StageError::from_io("creating audio directory", e))?;

        let path = work_dir.join("narration.mp3");
        let mut narration = tokio::fs::File::create(&path)
            .await
            .map_err(|e| StageError::from_io("creating narration file", e))?;

        for (idx, line) in script.lines.iter().enumerate() {
            let audio = self.synthesize_line(line.speaker, &line.text).await?;

            let segment = audio_dir.join(format!("segment_{idx:03}.mp3"));
            tokio::fs::write(&segment, &audio)
                .await
                .map_err(|e| StageError::from_io("writing audio segment", e))?;
            narration
                .write_all(&audio)
                .await
                .map_err(|e| StageError::from_io("writing narration", e))?;

            tracing::debug!(segment = idx, speaker = %line.speaker, bytes = audio.len(), "Synthesized segment");
        }

        narration
            .flush()
            .await
            .map_err(|e| StageError::from_io("writing narration", e))?;
        drop(narration);

        let duration = media::probe_duration(&self.ffprobe_path, &path).await?;
        tracing::info!(
            segments = script.lines.len(),
            duration_secs = duration.as_secs_f64(),
            "Narration ready"
        );

        Ok(Narration { path, duration })
    }
}
