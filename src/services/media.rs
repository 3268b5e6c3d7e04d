use std::ffi::OsStr;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;

use crate::services::pipeline::StageError;

/// Run an external media tool, returning its stdout.
///
/// A missing binary or a non-zero exit is an unrecoverable stage failure;
/// the tail of stderr is kept in the message.
pub async fn run_tool<I, S>(program: &str, args: I) -> Result<String, StageError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| StageError::from_io(&format!("spawning {program}"), e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
        let tail: Vec<&str> = tail.into_iter().rev().collect();
        return Err(StageError::Permanent(format!(
            "{program} exited with {}: {}",
            output.status,
            tail.join(" | ")
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Duration of a media file as reported by ffprobe.
pub async fn probe_duration(ffprobe: &str, path: &Path) -> Result<Duration, StageError> {
    let stdout = run_tool(
        ffprobe,
        [
            OsStr::new("-v"),
            OsStr::new("error"),
            OsStr::new("-show_entries"),
            OsStr::new("format=duration"),
            OsStr::new("-of"),
            OsStr::new("default=noprint_wrappers=1:nokey=1"),
            path.as_os_str(),
        ],
    )
    .await?;

    parse_duration(&stdout)
}

fn parse_duration(stdout: &str) -> Result<Duration, StageError> {
    let seconds: f64 = stdout.trim().parse().map_err(|_| {
        StageError::Permanent(format!("ffprobe returned no duration: {:?}", stdout.trim()))
    })?;
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(StageError::Permanent(format!(
            "media has invalid duration {seconds}"
        )));
    }
    Ok(Duration::from_secs_f64(seconds))
}
