//! Container probing through the external `ffprobe` and `mkvmerge` tools.

use std::io::ErrorKind;
use std::path::Path;
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Deserialize;

use crate::media::mime::{classify, VideoContainer};

/// What the title formatter needs to know about a file. Fields are empty when unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaInfo {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub audio_languages: Vec<String>,
    pub subtitle_languages: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("failed to run probe tool: {0}")]
    Io(#[from] std::io::Error),
    #[error("{tool} failed: {stderr}")]
    ToolFailed { tool: &'static str, stderr: String },
    #[error("failed to parse probe output: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Blocking metadata extraction. Callers on the async runtime go through `spawn_blocking`.
pub trait MediaProbe: Send + Sync {
    fn probe(&self, path: &Path) -> Result<MediaInfo, ProbeError>;
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct MkvmergeOutput {
    #[serde(default)]
    pub tracks: Vec<MkvTrack>,
}

#[derive(Debug, Deserialize)]
pub struct MkvTrack {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub properties: MkvTrackProperties,
}

#[derive(Debug, Default, Deserialize)]
pub struct MkvTrackProperties {
    pub language: Option<String>,
    pub track_name: Option<String>,
}

/// Probe backed by `ffprobe` (resolution) and, for Matroska files, `mkvmerge -J` (languages).
#[derive(Debug, Default)]
pub struct ToolProbe {
    ffprobe_missing: AtomicBool,
}

impl ToolProbe {
    pub fn new() -> Self {
        Self::default()
    }

    fn dimensions(&self, path: &Path) -> Result<(Option<u32>, Option<u32>), ProbeError> {
        let output = match Command::new("ffprobe")
            .args(["-v", "quiet", "-print_format", "json", "-show_streams"])
            .arg(path)
            .output()
        {
            Ok(output) => output,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if !self.ffprobe_missing.swap(true, Ordering::Relaxed) {
                    tracing::warn!("ffprobe not found on PATH, stream titles will omit resolution");
                }
                return Ok((None, None));
            }
            Err(e) => return Err(e.into()),
        };

        if !output.status.success() {
            return Err(ProbeError::ToolFailed {
                tool: "ffprobe",
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let parsed: FfprobeOutput = serde_json::from_slice(&output.stdout)?;
        let dims = parsed
            .streams
            .iter()
            .find_map(|s| match (s.width, s.height) {
                (Some(w), Some(h)) if w > 0 && h > 0 => Some((Some(w), Some(h))),
                _ => None,
            })
            .unwrap_or((None, None));
        Ok(dims)
    }
}

impl MediaProbe for ToolProbe {
    fn probe(&self, path: &Path) -> Result<MediaInfo, ProbeError> {
        let (width, height) = self.dimensions(path)?;
        let mut info = MediaInfo {
            width,
            height,
            ..MediaInfo::default()
        };

        if classify(path) == Some(VideoContainer::Matroska) {
            let (audio, subs) = mkv_languages(path);
            info.audio_languages = audio;
            info.subtitle_languages = subs;
        }
        Ok(info)
    }
}

/// Audio and subtitle languages from `mkvmerge -J`. Any failure yields empty lists.
fn mkv_languages(path: &Path) -> (Vec<String>, Vec<String>) {
    let output = match Command::new("mkvmerge").arg("-J").arg(path).output() {
        Ok(output) if output.status.success() => output,
        Ok(output) => {
            tracing::debug!(
                "mkvmerge exited with {} for {}",
                output.status,
                path.display()
            );
            return (Vec::new(), Vec::new());
        }
        Err(e) => {
            tracing::debug!("mkvmerge unavailable for {}: {}", path.display(), e);
            return (Vec::new(), Vec::new());
        }
    };

    match serde_json::from_slice::<MkvmergeOutput>(&output.stdout) {
        Ok(parsed) => collect_languages(&parsed.tracks),
        Err(e) => {
            tracing::error!("Cannot parse mkvmerge output for {}: {}", path.display(), e);
            (Vec::new(), Vec::new())
        }
    }
}

/// Split tracks into distinct audio and subtitle language labels, first-seen order.
pub fn collect_languages(tracks: &[MkvTrack]) -> (Vec<String>, Vec<String>) {
    let mut audio: Vec<String> = Vec::new();
    let mut subs: Vec<String> = Vec::new();

    for track in tracks {
        let target = match track.kind.as_str() {
            "audio" => &mut audio,
            "subtitles" => &mut subs,
            _ => continue,
        };
        let lang = normalize_language(
            track.properties.language.as_deref(),
            track.properties.track_name.as_deref(),
        );
        if !target.contains(&lang) {
            target.push(lang);
        }
    }

    (audio, subs)
}

/// Map a track's language code and name to a short label. The track name wins over the
/// code because Spanish releases tag both Castilian and Latin American audio as `spa`.
pub fn normalize_language(language: Option<&str>, track_name: Option<&str>) -> String {
    let lang = language.unwrap_or("und").to_lowercase();
    let name = track_name.unwrap_or_default().to_lowercase();

    if name.contains("castellano") || name.contains("cast") {
        "Esp".to_string()
    } else if name.contains("latino") || name.contains("lat") {
        "Lat".to_string()
    } else if lang == "spa" {
        "Esp".to_string()
    } else if matches!(lang.as_str(), "esl" | "es-la" | "lat") {
        "Lat".to_string()
    } else {
        lang.to_uppercase()
    }
}
