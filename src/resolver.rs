//! Turns a `(category, id)` request into a playable stream descriptor.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::library::episodes::{find_episode, find_movie_file};
use crate::library::index::Lookup;
use crate::library::{Category, Library};
use crate::lookup::CachedTitles;
use crate::media::probe::MediaProbe;
use crate::media::title::{format_title, TitleParts, TitleStyle};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Malformed(String),
    #[error("{0}")]
    Metadata(String),
}

/// A parsed stream request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamRequest {
    /// `tt0903747:1:2`
    Series {
        imdb_id: String,
        season: u32,
        episode: u32,
    },
    /// `tt0133093`
    Movie { imdb_id: String },
}

impl StreamRequest {
    pub fn parse(category: &str, id: &str) -> Result<Self, ResolveError> {
        let category: Category = category
            .parse()
            .map_err(|e: crate::library::UnknownCategory| ResolveError::Malformed(e.to_string()))?;

        match category {
            Category::Series => {
                let mut parts = id.split(':');
                let (Some(imdb_id), Some(season), Some(episode), None) =
                    (parts.next(), parts.next(), parts.next(), parts.next())
                else {
                    return Err(ResolveError::Malformed(format!(
                        "series id `{id}` must look like <imdb id>:<season>:<episode>"
                    )));
                };
                let (Ok(season), Ok(episode)) = (season.parse(), episode.parse()) else {
                    return Err(ResolveError::Malformed(format!(
                        "series id `{id}` has a non-numeric season or episode"
                    )));
                };
                Ok(StreamRequest::Series {
                    imdb_id: valid_imdb_id(imdb_id)?,
                    season,
                    episode,
                })
            }
            Category::Movie => Ok(StreamRequest::Movie {
                imdb_id: valid_imdb_id(id)?,
            }),
        }
    }

    pub fn category(&self) -> Category {
        match self {
            StreamRequest::Series { .. } => Category::Series,
            StreamRequest::Movie { .. } => Category::Movie,
        }
    }

    pub fn imdb_id(&self) -> &str {
        match self {
            StreamRequest::Series { imdb_id, .. } | StreamRequest::Movie { imdb_id } => imdb_id,
        }
    }
}

fn valid_imdb_id(id: &str) -> Result<String, ResolveError> {
    if !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric()) {
        Ok(id.to_string())
    } else {
        Err(ResolveError::Malformed(format!("invalid id `{id}`")))
    }
}

/// A file on disk matched to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    pub folder: String,
    pub path: PathBuf,
    pub episode: Option<(u32, u32)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamEntry {
    pub name: String,
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StreamsResponse {
    pub streams: Vec<StreamEntry>,
}

pub struct StreamResolver {
    library: Arc<Library>,
    titles: Option<Arc<CachedTitles>>,
    probe: Arc<dyn MediaProbe>,
    style: TitleStyle,
    addon_name: String,
    base_url: String,
}

impl StreamResolver {
    pub fn new(
        library: Arc<Library>,
        titles: Option<Arc<CachedTitles>>,
        probe: Arc<dyn MediaProbe>,
        style: TitleStyle,
        addon_name: String,
        base_url: String,
    ) -> Self {
        Self {
            library,
            titles,
            probe,
            style,
            addon_name,
            base_url,
        }
    }

    pub fn library(&self) -> &Arc<Library> {
        &self.library
    }

    /// Folder name for `imdb_id`: index, then one reload of the index, then the external
    /// title lookup when configured. A title only counts if a folder of that exact name
    /// exists under the category root; it is then written back to the index.
    pub async fn find_folder(&self, category: Category, imdb_id: &str) -> Option<String> {
        let shelf = self.library.shelf(category);
        if let Lookup::Hit(folder) = shelf.index.lookup(imdb_id) {
            return Some(folder);
        }

        tracing::warn!(
            "{} not in {} index '{}', reloading",
            imdb_id,
            category,
            shelf.index.path().display()
        );
        shelf.index.load();
        if let Lookup::Hit(folder) = shelf.index.lookup(imdb_id) {
            return Some(folder);
        }

        let titles = self.titles.as_ref()?;
        tracing::warn!("{} still missing from {} index, asking title lookup", imdb_id, category);
        let title = titles.title(imdb_id).await?;

        if !shelf.has_folder(&title) {
            tracing::warn!(
                "{} resolved to '{}' but {} does not exist",
                imdb_id,
                title,
                shelf.folder_path(&title).display()
            );
            return None;
        }

        tracing::info!("{} found on disk by title: '{}'", imdb_id, title);
        if let Err(e) = shelf.register(imdb_id, &title) {
            tracing::error!("Could not persist {} -> '{}': {}", imdb_id, title, e);
        }
        Some(title)
    }

    /// Find the file a request refers to.
    pub async fn locate(&self, request: &StreamRequest) -> Result<Located, ResolveError> {
        let category = request.category();
        let imdb_id = request.imdb_id();
        let folder = self.find_folder(category, imdb_id).await.ok_or_else(|| {
            ResolveError::NotFound(format!("IMDb ID {imdb_id} not found on the server"))
        })?;
        let folder_path = self.library.shelf(category).folder_path(&folder);

        match *request {
            StreamRequest::Series {
                season, episode, ..
            } => {
                let found = find_episode(&folder_path, season, episode).ok_or_else(|| {
                    ResolveError::NotFound(format!(
                        "Episode S{season}E{episode} for IMDb ID {imdb_id} not found on the server"
                    ))
                })?;
                tracing::info!("Episode found: {}", found.file_name);
                Ok(Located {
                    folder,
                    path: found.path,
                    episode: Some((season, episode)),
                })
            }
            StreamRequest::Movie { .. } => {
                let path = find_movie_file(&folder_path).ok_or_else(|| {
                    ResolveError::NotFound(format!(
                        "No video file for IMDb ID {imdb_id} in folder '{folder}'"
                    ))
                })?;
                tracing::info!("Movie found: {}", path.display());
                Ok(Located {
                    folder,
                    path,
                    episode: None,
                })
            }
        }
    }

    /// Resolve a request all the way to the stream list returned to the player.
    pub async fn resolve(&self, request: &StreamRequest) -> Result<StreamsResponse, ResolveError> {
        let located = self.locate(request).await?;
        let title = self.describe(&located).await?;
        let url = self.file_url(&located.path)?;

        Ok(StreamsResponse {
            streams: vec![StreamEntry {
                name: self.addon_name.clone(),
                title,
                url,
            }],
        })
    }

    /// `<base_url>/file/<percent-encoded absolute path>`
    pub fn file_url(&self, path: &Path) -> Result<String, ResolveError> {
        let path = path.to_str().ok_or_else(|| {
            ResolveError::Metadata(format!("path is not valid UTF-8: {}", path.display()))
        })?;
        Ok(format!("{}/file/{}", self.base_url, urlencoding::encode(path)))
    }

    async fn describe(&self, located: &Located) -> Result<String, ResolveError> {
        let probe = Arc::clone(&self.probe);
        let path = located.path.clone();
        let probed = tokio::task::spawn_blocking(move || {
            let size = std::fs::metadata(&path)?.len();
            let info = probe.probe(&path)?;
            Ok::<_, Box<dyn std::error::Error + Send + Sync>>((size, info))
        })
        .await;

        let (file_size, info) = match probed {
            Ok(Ok(probed)) => probed,
            Ok(Err(e)) => {
                tracing::error!("Cannot read metadata of {}: {}", located.path.display(), e);
                return Err(ResolveError::Metadata(format!(
                    "could not process file {}",
                    file_name(&located.path)
                )));
            }
            Err(e) => {
                tracing::error!("Metadata task for {} failed: {}", located.path.display(), e);
                return Err(ResolveError::Metadata(format!(
                    "could not process file {}",
                    file_name(&located.path)
                )));
            }
        };

        let parts = TitleParts {
            folder: &located.folder,
            episode: located.episode,
            file_size,
            info: &info,
        };
        Ok(format_title(&parts, self.style))
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
