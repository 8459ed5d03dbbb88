use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::http::state::AppState;
use crate::library::Category;

pub const ADDON_ID: &str = "org.localAddon.localLanStreaming";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub id: &'static str,
    pub version: &'static str,
    pub name: String,
    pub description: &'static str,
    pub resources: Vec<&'static str>,
    pub types: Vec<&'static str>,
    pub id_prefixes: Vec<&'static str>,
    pub behavior_hints: BehaviorHints,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorHints {
    pub configurable: bool,
    pub configuration_required: bool,
}

pub fn build_manifest(name: &str) -> Manifest {
    Manifest {
        id: ADDON_ID,
        version: env!("CARGO_PKG_VERSION"),
        name: name.to_string(),
        description: "Streams media stored on this machine to players on the local network.",
        resources: vec!["stream"],
        types: Category::ALL.iter().map(|c| c.as_str()).collect(),
        id_prefixes: vec!["tt"],
        behavior_hints: BehaviorHints {
            configurable: false,
            configuration_required: false,
        },
    }
}

/// GET /manifest.json
pub async fn serve_manifest(State(state): State<AppState>) -> Json<Manifest> {
    tracing::info!("Manifest requested");
    Json(build_manifest(&state.addon_name))
}
