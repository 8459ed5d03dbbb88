pub mod episodes;
pub mod guard;
pub mod index;

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use crate::config::Config;
use crate::library::guard::PathGuard;
use crate::library::index::{ContentIndex, IndexError};

/// The two kinds of content the addon serves.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Category {
    Series,
    Movie,
}

impl Category {
    pub const ALL: [Category; 2] = [Category::Series, Category::Movie];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Series => "series",
            Category::Movie => "movie",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported content type `{0}`")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "series" => Ok(Category::Series),
            "movie" => Ok(Category::Movie),
            other => Err(UnknownCategory(other.to_string())),
        }
    }
}

/// Media root plus the id→folder index for one category.
#[derive(Debug)]
pub struct Shelf {
    pub root: PathBuf,
    pub index: ContentIndex,
}

impl Shelf {
    pub fn new(root: impl Into<PathBuf>, index: ContentIndex) -> Self {
        Self {
            root: root.into(),
            index,
        }
    }

    pub fn folder_path(&self, folder: &str) -> PathBuf {
        self.root.join(folder)
    }

    /// True iff `folder` names an existing directory directly under the root.
    pub fn has_folder(&self, folder: &str) -> bool {
        is_plain_folder_name(folder) && self.folder_path(folder).is_dir()
    }

    /// Persist `id → folder`, refusing folders that do not exist under this shelf's root.
    pub fn register(&self, id: &str, folder: &str) -> Result<bool, IndexError> {
        if !is_plain_folder_name(folder) {
            return Err(IndexError::InvalidFolder(folder.to_string()));
        }
        if !self.has_folder(folder) {
            return Err(IndexError::MissingFolder(self.folder_path(folder)));
        }
        self.index.insert(id, folder)
    }
}

/// A single normal path component: no separators, no `.`/`..`, no root or prefix.
fn is_plain_folder_name(folder: &str) -> bool {
    let mut components = Path::new(folder).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !folder.contains(['/', '\\'])
}

/// Both shelves, owned once and shared by the request handlers.
#[derive(Debug)]
pub struct Library {
    series: Shelf,
    movies: Shelf,
    guard: PathGuard,
}

impl Library {
    pub fn new(series: Shelf, movies: Shelf) -> Self {
        let guard = PathGuard::new([series.root.as_path(), movies.root.as_path()]);
        Self {
            series,
            movies,
            guard,
        }
    }

    /// Build both shelves from configuration and load their backing stores.
    pub fn from_config(config: &Config) -> Self {
        let library = Self::new(
            Shelf::new(
                &config.series_dir,
                ContentIndex::new(Category::Series, &config.series_index),
            ),
            Shelf::new(
                &config.movies_dir,
                ContentIndex::new(Category::Movie, &config.movies_index),
            ),
        );
        for category in Category::ALL {
            library.shelf(category).index.load();
        }
        library
    }

    pub fn shelf(&self, category: Category) -> &Shelf {
        match category {
            Category::Series => &self.series,
            Category::Movie => &self.movies,
        }
    }

    pub fn guard(&self) -> &PathGuard {
        &self.guard
    }
}
