use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::media::mime::is_video;

/// `S<season>E<episode>` anywhere in a file name, case-insensitive.
static EPISODE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)S(\d+)E(\d+)").expect("episode tag pattern is valid"));

/// An episode file found under a show's season directory. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Episode {
    pub season: u32,
    pub episode: u32,
    pub file_name: String,
    pub path: PathBuf,
}

/// Parse the first `SxxEyy` tag in `name`. Zero or out-of-range numbers do not count.
pub fn parse_episode_tag(name: &str) -> Option<(u32, u32)> {
    let caps = EPISODE_TAG.captures(name)?;
    let season: u32 = caps[1].parse().ok()?;
    let episode: u32 = caps[2].parse().ok()?;
    (season > 0 && episode > 0).then_some((season, episode))
}

/// List the episodes of the show rooted at `show_dir`.
///
/// Only immediate sub-directories whose name starts with `season` (any case) are searched,
/// one level deep. Directories and files are visited in lexical name order and the first
/// file claiming a given season/episode pair wins; later duplicates are skipped. A missing
/// show directory yields an empty list.
pub fn locate(show_dir: &Path) -> Vec<Episode> {
    if !show_dir.is_dir() {
        return Vec::new();
    }

    let mut episodes = Vec::new();
    let mut seen = HashSet::new();

    let season_dirs = sorted_entries(show_dir)
        .into_iter()
        .filter(|(name, path)| name.to_lowercase().starts_with("season") && path.is_dir());

    for (_, season_dir) in season_dirs {
        for (file_name, path) in sorted_entries(&season_dir) {
            if !is_video(&path) || !path.is_file() {
                continue;
            }
            let Some((season, episode)) = parse_episode_tag(&file_name) else {
                continue;
            };
            if !seen.insert((season, episode)) {
                tracing::debug!(
                    "Ignoring duplicate S{:02}E{:02}: {}",
                    season,
                    episode,
                    path.display()
                );
                continue;
            }
            episodes.push(Episode {
                season,
                episode,
                file_name,
                path,
            });
        }
    }

    episodes
}

/// Convenience lookup over [`locate`].
pub fn find_episode(show_dir: &Path, season: u32, episode: u32) -> Option<Episode> {
    locate(show_dir)
        .into_iter()
        .find(|e| e.season == season && e.episode == episode)
}

/// First video file (lexical order) directly inside a movie folder. No recursion.
pub fn find_movie_file(movie_dir: &Path) -> Option<PathBuf> {
    if !movie_dir.is_dir() {
        return None;
    }
    sorted_entries(movie_dir)
        .into_iter()
        .map(|(_, path)| path)
        .find(|path| is_video(path) && path.is_file())
}

/// Directory entries sorted by file name. Unreadable directories and entries are logged and skipped.
fn sorted_entries(dir: &Path) -> Vec<(String, PathBuf)> {
    let read = match std::fs::read_dir(dir) {
        Ok(read) => read,
        Err(e) => {
            tracing::warn!("Cannot read directory {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut entries: Vec<(String, PathBuf)> = read
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("Cannot access entry in {}: {}", dir.display(), e);
                None
            }
        })
        .filter_map(|entry| {
            let name = entry.file_name().into_string().ok()?;
            Some((name, entry.path()))
        })
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries
}
