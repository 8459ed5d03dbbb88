use std::path::{Component, Path, PathBuf};

/// Confines served files to a fixed set of media roots.
#[derive(Debug, Clone)]
pub struct PathGuard {
    roots: Vec<PathBuf>,
}

impl PathGuard {
    pub fn new<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        Self {
            roots: roots.into_iter().map(|r| resolve(r.as_ref())).collect(),
        }
    }

    /// True iff `path`, once resolved, lies strictly below one of the roots.
    ///
    /// Comparison is per path component, so `/media/Series2/x` is not under `/media/Series`,
    /// and the root itself is not a permitted target.
    pub fn is_permitted(&self, path: &Path) -> bool {
        self.permit(path).is_some()
    }

    /// The resolved form of `path` when it is permitted. Serve this rather than the input
    /// so the checked path and the opened path are the same.
    pub fn permit(&self, path: &Path) -> Option<PathBuf> {
        let resolved = resolve(path);
        self.roots
            .iter()
            .any(|root| resolved != *root && resolved.starts_with(root))
            .then_some(resolved)
    }
}

/// Absolute, `.`/`..`-free form of `path` with symlinks resolved as far as the path exists.
///
/// Paths that do not exist are resolved through their deepest existing ancestor so that a
/// missing file below a symlinked root still compares equal to the canonical root.
pub fn resolve(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };
    let normalized = normalize(&absolute);

    let mut existing = normalized.as_path();
    let mut rest = Vec::new();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            return rest.iter().rev().fold(canonical, |acc, part| acc.join(part));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name.to_os_string());
                existing = parent;
            }
            _ => return normalized,
        }
    }
}

/// Lexically drop `.` and fold `..` into the preceding component. `..` at the root is a no-op.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}
