use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::services::media;
use crate::services::pipeline::{Narration, RenderedSlide, StageError, VideoComposer};

const MIN_SLIDE_SECS: f64 = 3.0;
const FRAME_RATE: u32 = 30;
const FONT_SIZE: u32 = 56;

/// Builds the final MP4 with ffmpeg: each slide is looped for an equal share
/// of the narration, captioned with `drawtext`, and the clips are concatenated
/// over the narration track. Narration is padded with silence so a short
/// track never cuts the closing slides.
pub struct FfmpegComposer {
    ffmpeg_path: String,
    font_path: Option<String>,
}

impl FfmpegComposer {
    pub fn new(ffmpeg_path: String, font_path: Option<String>) -> Self {
        Self {
            ffmpeg_path,
            font_path,
        }
    }
}

/// How long each slide stays on screen.
pub fn slide_duration(narration: Duration, slides: usize) -> Duration {
    if slides == 0 {
        return Duration::ZERO;
    }
    let share = narration.as_secs_f64() / slides as f64;
    Duration::from_secs_f64(share.max(MIN_SLIDE_SECS))
}

// ffmpeg unescapes a filter option twice: once while splitting the graph
// and again while splitting the filter's `key=value` list. Escape for the
// option list first, then quote that for the graph.
fn filter_path(path: &Path) -> String {
    let raw = path.to_string_lossy();
    let mut value = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '\'' | ':') {
            value.push('\\');
        }
        value.push(c);
    }
    // Inside single quotes only `'` is special; close, escape and reopen.
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// The `-filter_complex` graph captioning `slides` and concatenating them
/// into the `[v]` output, plus the narration (the input after the slides)
/// padded with silence into `[a]`.
pub fn build_filter_graph(slides: &[RenderedSlide], font_path: Option<&str>) -> String {
    let font = font_path
        .map(|f| format!(":fontfile={}", filter_path(Path::new(f))))
        .unwrap_or_default();

    let mut graph = String::new();
    for (idx, slide) in slides.iter().enumerate() {
        graph.push_str(&format!(
            "[{idx}:v]drawtext=textfile={}{font}:fontcolor=white:fontsize={FONT_SIZE}\
             :line_spacing=16:x=(w-text_w)/2:y=(h-text_h)/2,format=yuv420p,setsar=1[v{idx}];",
            filter_path(&slide.caption_path),
        ));
    }
    for idx in 0..slides.len() {
        graph.push_str(&format!("[v{idx}]"));
    }
    graph.push_str(&format!(
        "concat=n={n}:v=1:a=0,fps={FRAME_RATE}[v];[{n}:a]apad[a]",
        n = slides.len()
    ));
    graph
}

impl FfmpegComposer {
    fn arguments(&self, slides: &[RenderedSlide], narration: &Narration, output: &Path) -> Vec<OsString> {
        let per_slide = slide_duration(narration.duration, slides.len());
        let mut args: Vec<OsString> = vec!["-y".into(), "-hide_banner".into()];

        for slide in slides {
            args.extend([
                "-loop".into(),
                "1".into(),
                "-t".into(),
                format!("{:.3}", per_slide.as_secs_f64()).into(),
                "-i".into(),
                slide.image_path.clone().into_os_string(),
            ]);
        }
        args.extend(["-i".into(), narration.path.clone().into_os_string()]);

        args.extend([
            "-filter_complex".into(),
            build_filter_graph(slides, self.font_path.as_deref()).into(),
            "-map".into(),
            "[v]".into(),
            "-map".into(),
            "[a]".into(),
            "-c:v".into(),
            "libx264".into(),
            "-preset".into(),
            "fast".into(),
            "-crf".into(),
            "23".into(),
            "-c:a".into(),
            "aac".into(),
            "-b:a".into(),
            "192k".into(),
            // Ends at the last slide; the padded narration never ends.
            "-shortest".into(),
            "-movflags".into(),
            "+faststart".into(),
            output.as_os_str().to_owned(),
        ]);
        args
    }
}

#[async_trait]
impl VideoComposer for FfmpegComposer {
    async fn compose(
        &self,
        slides: &[RenderedSlide],
        narration: &Narration,
        work_dir: &Path,
    ) -> Result<PathBuf, StageError> {
        if slides.is_empty() {
            return Err(StageError::Permanent("no slides to compose".to_string()));
        }

        let output = work_dir.join("final.mp4");
        let started = std::time::Instant::now();
        media::run_tool(&self.ffmpeg_path, self.arguments(slides, narration, &output)).await?;

        tracing::info!(
            slides = slides.len(),
            narration_secs = narration.duration.as_secs_f64(),
            encode_ms = started.elapsed().as_millis() as u64,
            "Video composed"
        );
        Ok(output)
    }
}
