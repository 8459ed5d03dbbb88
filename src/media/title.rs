//! Display titles for stream entries.

use crate::media::probe::MediaInfo;

const SIZE_UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum TitleStyle {
    /// Multi-line layout with emoji markers.
    #[default]
    Verbose,
    /// Single line with bracketed tags.
    Compact,
}

impl TitleStyle {
    pub fn from_compact_flag(compact: bool) -> Self {
        if compact {
            TitleStyle::Compact
        } else {
            TitleStyle::Verbose
        }
    }
}

/// What a title is built from.
#[derive(Debug, Clone, Copy)]
pub struct TitleParts<'a> {
    pub folder: &'a str,
    /// `(season, episode)` for series, `None` for movies.
    pub episode: Option<(u32, u32)>,
    pub file_size: u64,
    pub info: &'a MediaInfo,
}

/// Human-readable size with binary units and two decimals, e.g. `1.50 GB`.
pub fn format_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0.00 B".to_string();
    }
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", size, SIZE_UNITS[unit])
}

/// `S01 E02`
pub fn episode_tag(season: u32, episode: u32) -> String {
    format!("S{:02} E{:02}", season, episode)
}

/// Render ASCII letters as Unicode small capitals; anything else passes through.
pub fn small_caps(text: &str) -> String {
    text.chars()
        .map(|c| match c.to_ascii_lowercase() {
            'a' => 'ᴀ',
            'b' => 'ʙ',
            'c' => 'ᴄ',
            'd' => 'ᴅ',
            'e' => 'ᴇ',
            'f' => 'ꜰ',
            'g' => 'ɢ',
            'h' => 'ʜ',
            'i' => 'ɪ',
            'j' => 'ᴊ',
            'k' => 'ᴋ',
            'l' => 'ʟ',
            'm' => 'ᴍ',
            'n' => 'ɴ',
            'o' => 'ᴏ',
            'p' => 'ᴘ',
            'q' => 'ǫ',
            'r' => 'ʀ',
            's' => 'ꜱ',
            't' => 'ᴛ',
            'u' => 'ᴜ',
            'v' => 'ᴠ',
            'w' => 'ᴡ',
            'x' => 'x',
            'y' => 'ʏ',
            'z' => 'ᴢ',
            _ => c,
        })
        .collect()
}

pub fn format_title(parts: &TitleParts<'_>, style: TitleStyle) -> String {
    let mut title = parts.folder.to_string();
    if let Some((season, episode)) = parts.episode {
        title.push(' ');
        title.push_str(&episode_tag(season, episode));
    }

    let resolution = match parts.info.height {
        Some(h) => format!("{}p", h),
        None => "?p".to_string(),
    };
    let size = format_size(parts.file_size);
    let audio = &parts.info.audio_languages;
    let subs = &parts.info.subtitle_languages;

    match style {
        TitleStyle::Verbose => {
            title.push_str(&format!("\n📺 {}\n💾 {}", resolution, size));

            let mut tracks = Vec::new();
            if !audio.is_empty() {
                tracks.push(format!("🔊 {}", join_mapped(audio, small_caps, " / ")));
            }
            if !subs.is_empty() {
                tracks.push(format!("🔤 {}", join_mapped(subs, small_caps, " / ")));
            }
            if !tracks.is_empty() {
                title.push('\n');
                title.push_str(&tracks.join(" "));
            }
        }
        TitleStyle::Compact => {
            title.push_str(&format!(" [{}] [{}]", resolution, size));

            if !audio.is_empty() {
                let prefix = match audio.len() {
                    1 => "Audio",
                    2 => "Dual",
                    _ => "Multi",
                };
                title.push_str(&format!(
                    " [{}: {}]",
                    prefix,
                    join_mapped(audio, |s| s.to_uppercase(), "/")
                ));
            }
            if !subs.is_empty() {
                title.push_str(&format!(
                    " [Sub: {}]",
                    join_mapped(subs, |s| s.to_uppercase(), "/")
                ));
            }
        }
    }

    title
}

fn join_mapped(items: &[String], f: impl Fn(&str) -> String, sep: &str) -> String {
    items.iter().map(|s| f(s)).collect::<Vec<_>>().join(sep)
}
