use std::path::Path;

/// Container formats the addon hands out to players.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum VideoContainer {
    Mp4,
    Matroska,
}

impl VideoContainer {
    pub fn mime(self) -> &'static str {
        match self {
            VideoContainer::Mp4 => "video/mp4",
            VideoContainer::Matroska => "video/x-matroska",
        }
    }
}

/// Classify a file path by extension. Returns `None` for anything that is not a
/// playable video. Extensions are matched case-insensitively.
pub fn classify(path: &Path) -> Option<VideoContainer> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "mp4" => Some(VideoContainer::Mp4),
        "mkv" => Some(VideoContainer::Matroska),
        _ => None,
    }
}

pub fn is_video(path: &Path) -> bool {
    classify(path).is_some()
}

/// Content-Type for a served file: matroska for `.mkv`, mp4 for everything else.
/// Purely extension based, the bytes are never sniffed.
pub fn content_type(path: &Path) -> &'static str {
    classify(path)
        .unwrap_or(VideoContainer::Mp4)
        .mime()
}
