use std::sync::Arc;

use crate::library::Library;
use crate::resolver::StreamResolver;

/// Shared application state injected into all route handlers via axum::extract::State.
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<StreamResolver>,
    pub addon_name: String,
}

impl AppState {
    pub fn new(resolver: Arc<StreamResolver>, addon_name: String) -> Self {
        Self {
            resolver,
            addon_name,
        }
    }

    pub fn library(&self) -> &Library {
        self.resolver.library()
    }
}
