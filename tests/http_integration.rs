use std::collections::HashMap;
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use lanstream::http::{build_router, state::AppState};
use lanstream::library::index::ContentIndex;
use lanstream::library::{Category, Library, Shelf};
use lanstream::lookup::{CachedTitles, LookupError, TitleSource};
use lanstream::media::probe::{MediaInfo, MediaProbe, ProbeError};
use lanstream::media::title::TitleStyle;
use lanstream::resolver::StreamResolver;

const BASE_URL: &str = "http://192.168.1.20:7000";
const ADDON_NAME: &str = "Test LAN Addon";
const EPISODE_SIZE: usize = 1000;
const MOVIE_SIZE: usize = 2500;

/// Reports a fixed resolution without touching the file.
struct FixedProbe;

impl MediaProbe for FixedProbe {
    fn probe(&self, _path: &Path) -> Result<MediaInfo, ProbeError> {
        Ok(MediaInfo {
            width: Some(1920),
            height: Some(1080),
            audio_languages: vec!["Esp".into(), "ENG".into()],
            subtitle_languages: Vec::new(),
        })
    }
}

struct BrokenProbe;

impl MediaProbe for BrokenProbe {
    fn probe(&self, _path: &Path) -> Result<MediaInfo, ProbeError> {
        Err(ProbeError::ToolFailed {
            tool: "ffprobe",
            stderr: "Invalid data found when processing input".into(),
        })
    }
}

struct TableSource(HashMap<&'static str, &'static str>);

#[async_trait]
impl TitleSource for TableSource {
    async fn fetch_title(&self, id: &str) -> Result<Option<String>, LookupError> {
        Ok(self.0.get(id).map(|t| t.to_string()))
    }
}

/// Byte `i` of a fixture file is `i % 251`, so any span can be checked by offset.
fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

struct Fixture {
    tmp: TempDir,
    episode: PathBuf,
    movie: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let season = tmp.path().join("Series/Breaking Bad/season 1");
        fs::create_dir_all(&season).unwrap();
        fs::create_dir_all(tmp.path().join("Series/Game of Thrones/Season 1")).unwrap();
        let episode = season.join("Breaking.Bad.S01E01.720p.mkv");
        fs::write(&episode, pattern(EPISODE_SIZE)).unwrap();
        fs::write(
            tmp.path().join("Series/Game of Thrones/Season 1/GoT.S01E01.mp4"),
            pattern(10),
        )
        .unwrap();

        let movie_dir = tmp.path().join("Movies/The Matrix (1999)");
        fs::create_dir_all(&movie_dir).unwrap();
        let movie = movie_dir.join("The.Matrix.1999.mp4");
        fs::write(&movie, pattern(MOVIE_SIZE)).unwrap();

        fs::write(
            tmp.path().join("series_map.json"),
            r#"{"tt0903747": "Breaking Bad"}"#,
        )
        .unwrap();
        fs::write(tmp.path().join("movies_map.json"), "{}").unwrap();

        Self { tmp, episode, movie }
    }

    fn series_index(&self) -> PathBuf {
        self.tmp.path().join("series_map.json")
    }

    fn movies_index(&self) -> PathBuf {
        self.tmp.path().join("movies_map.json")
    }

    fn app_with(&self, probe: Arc<dyn MediaProbe>, titles: Option<Arc<CachedTitles>>) -> axum::Router {
        let library = Library::new(
            Shelf::new(
                self.tmp.path().join("Series"),
                ContentIndex::new(Category::Series, self.series_index()),
            ),
            Shelf::new(
                self.tmp.path().join("Movies"),
                ContentIndex::new(Category::Movie, self.movies_index()),
            ),
        );
        for category in Category::ALL {
            library.shelf(category).index.load();
        }
        let resolver = Arc::new(StreamResolver::new(
            Arc::new(library),
            titles,
            probe,
            TitleStyle::Verbose,
            ADDON_NAME.to_string(),
            BASE_URL.to_string(),
        ));
        build_router(AppState::new(resolver, ADDON_NAME.to_string()))
    }

    fn app(&self) -> axum::Router {
        self.app_with(Arc::new(FixedProbe), None)
    }
}

fn file_uri(path: &Path) -> String {
    format!("/file/{}", urlencoding::encode(path.to_str().unwrap()))
}

async fn get(app: axum::Router, uri: &str) -> axum::response::Response {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn get_range(app: axum::Router, uri: &str, range: &str) -> axum::response::Response {
    app.oneshot(
        Request::builder()
            .uri(uri)
            .header(header::RANGE, range)
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

async fn body_json(response: axum::response::Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

fn header_str<'a>(response: &'a axum::response::Response, name: header::HeaderName) -> &'a str {
    response.headers().get(name).unwrap().to_str().unwrap()
}

// ── GET /manifest.json ────────────────────────────────────────────────────────

#[tokio::test]
async fn manifest_describes_addon() {
    let fx = Fixture::new();
    let response = get(fx.app(), "/manifest.json").await;
    assert_eq!(response.status(), StatusCode::OK);
    let manifest = body_json(response).await;
    assert_eq!(manifest["id"], "org.localAddon.localLanStreaming");
    assert_eq!(manifest["name"], ADDON_NAME);
    assert_eq!(manifest["resources"], serde_json::json!(["stream"]));
    assert_eq!(manifest["types"], serde_json::json!(["series", "movie"]));
    assert_eq!(manifest["idPrefixes"], serde_json::json!(["tt"]));
}

#[tokio::test]
async fn responses_allow_any_origin() {
    let fx = Fixture::new();
    let response = fx
        .app()
        .oneshot(
            Request::builder()
                .uri("/manifest.json")
                .header(header::ORIGIN, "http://player.local")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(header_str(&response, header::ACCESS_CONTROL_ALLOW_ORIGIN), "*");
}

// ── GET /stream/{category}/{id}.json ──────────────────────────────────────────

#[tokio::test]
async fn series_episode_resolves_to_file_url() {
    let fx = Fixture::new();
    let response = get(fx.app(), "/stream/series/tt0903747:1:1.json").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let streams = body["streams"].as_array().unwrap();
    assert_eq!(streams.len(), 1);
    assert_eq!(streams[0]["name"], ADDON_NAME);

    let title = streams[0]["title"].as_str().unwrap();
    assert!(title.starts_with("Breaking Bad S01 E01\n📺 1080p"), "title: {title}");

    let url = streams[0]["url"].as_str().unwrap();
    let encoded = url.strip_prefix(&format!("{BASE_URL}/file/")).unwrap();
    let decoded = urlencoding::decode(encoded).unwrap();
    assert_eq!(Path::new(&*decoded), fx.episode);
}

#[tokio::test]
async fn stream_url_serves_requested_range() {
    let fx = Fixture::new();
    let body = body_json(get(fx.app(), "/stream/series/tt0903747:1:1.json").await).await;
    let url = body["streams"][0]["url"].as_str().unwrap();
    let uri = url.strip_prefix(BASE_URL).unwrap();

    let response = get_range(fx.app(), uri, "bytes=0-99").await;
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        header_str(&response, header::CONTENT_RANGE),
        format!("bytes 0-99/{EPISODE_SIZE}")
    );
    assert_eq!(header_str(&response, header::CONTENT_LENGTH), "100");
    assert_eq!(header_str(&response, header::CONTENT_TYPE), "video/x-matroska");
    assert_eq!(body_bytes(response).await, pattern(EPISODE_SIZE)[..100].to_vec());
}

#[tokio::test]
async fn movie_resolves_after_external_index_write() {
    let fx = Fixture::new();
    let app = fx.app();

    // The movie index was empty at startup; an external tool fills it in afterwards.
    fs::write(fx.movies_index(), r#"{"tt0133093": "The Matrix (1999)"}"#).unwrap();

    let response = get(app, "/stream/movie/tt0133093.json").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let title = body["streams"][0]["title"].as_str().unwrap();
    assert!(title.starts_with("The Matrix (1999)\n"), "title: {title}");
    let url = body["streams"][0]["url"].as_str().unwrap();
    assert!(url.ends_with(&urlencoding::encode(fx.movie.to_str().unwrap()).into_owned()));
}

#[tokio::test]
async fn unknown_id_is_404_naming_the_id() {
    let fx = Fixture::new();
    let response = get(fx.app(), "/stream/movie/tt7654321.json").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("tt7654321"));
}

#[tokio::test]
async fn missing_episode_is_404() {
    let fx = Fixture::new();
    let response = get(fx.app(), "/stream/series/tt0903747:5:9.json").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("S5E9"));
}

#[tokio::test]
async fn unsupported_category_is_400() {
    let fx = Fixture::new();
    let response = get(fx.app(), "/stream/channel/tt0903747.json").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_series_id_is_400() {
    let fx = Fixture::new();
    for uri in [
        "/stream/series/tt0903747.json",
        "/stream/series/tt0903747:1.json",
        "/stream/series/tt0903747:one:1.json",
    ] {
        let response = get(fx.app(), uri).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
    }
}

#[tokio::test]
async fn id_without_json_suffix_is_400() {
    let fx = Fixture::new();
    let response = get(fx.app(), "/stream/series/tt0903747:1:1").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Invalid parameters.");
}

#[tokio::test]
async fn title_lookup_fills_index_when_folder_exists() {
    let fx = Fixture::new();
    let titles = Arc::new(CachedTitles::new(
        Box::new(TableSource(HashMap::from([
            ("tt0944947", "Game of Thrones"),
            ("tt0000404", "Not On Disk"),
        ]))),
        Duration::from_secs(60),
        NonZeroUsize::new(16).unwrap(),
    ));
    let app = fx.app_with(Arc::new(FixedProbe), Some(titles));

    let response = get(app.clone(), "/stream/series/tt0944947:1:1.json").await;
    assert_eq!(response.status(), StatusCode::OK);
    let on_disk: Value =
        serde_json::from_str(&fs::read_to_string(fx.series_index()).unwrap()).unwrap();
    assert_eq!(on_disk["tt0944947"], "Game of Thrones");
    assert_eq!(on_disk["tt0903747"], "Breaking Bad");

    let response = get(app, "/stream/series/tt0000404:1:1.json").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let on_disk: Value =
        serde_json::from_str(&fs::read_to_string(fx.series_index()).unwrap()).unwrap();
    assert!(on_disk.get("tt0000404").is_none());
}

#[tokio::test]
async fn looked_up_title_escaping_root_is_not_stored() {
    let fx = Fixture::new();
    let titles = Arc::new(CachedTitles::new(
        Box::new(TableSource(HashMap::from([("tt0000666", "../Movies")]))),
        Duration::from_secs(60),
        NonZeroUsize::new(16).unwrap(),
    ));
    let app = fx.app_with(Arc::new(FixedProbe), Some(titles));

    let response = get(app, "/stream/series/tt0000666:1:1.json").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let on_disk: Value =
        serde_json::from_str(&fs::read_to_string(fx.series_index()).unwrap()).unwrap();
    assert!(on_disk.get("tt0000666").is_none());
}

#[tokio::test]
async fn probe_failure_is_500() {
    let fx = Fixture::new();
    let app = fx.app_with(Arc::new(BrokenProbe), None);
    let response = get(app, "/stream/series/tt0903747:1:1.json").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("Breaking.Bad.S01E01.720p.mkv"));
}

// ── GET/HEAD /file/{path} ─────────────────────────────────────────────────────

#[tokio::test]
async fn full_get_returns_whole_file() {
    let fx = Fixture::new();
    let response = get(fx.app(), &file_uri(&fx.movie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, header::ACCEPT_RANGES), "bytes");
    assert_eq!(header_str(&response, header::CONTENT_TYPE), "video/mp4");
    assert_eq!(header_str(&response, header::CONTENT_LENGTH), MOVIE_SIZE.to_string());
    assert!(response.headers().get(header::CONTENT_RANGE).is_none());
    assert_eq!(body_bytes(response).await, pattern(MOVIE_SIZE));
}

#[tokio::test]
async fn open_ended_range_runs_to_end_of_file() {
    let fx = Fixture::new();
    let response = get_range(fx.app(), &file_uri(&fx.movie), "bytes=2000-").await;
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        header_str(&response, header::CONTENT_RANGE),
        format!("bytes 2000-{}/{MOVIE_SIZE}", MOVIE_SIZE - 1)
    );
    assert_eq!(body_bytes(response).await, pattern(MOVIE_SIZE)[2000..].to_vec());
}

#[tokio::test]
async fn middle_range_returns_exact_bytes() {
    let fx = Fixture::new();
    let response = get_range(fx.app(), &file_uri(&fx.episode), "bytes=500-509").await;
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(header_str(&response, header::CONTENT_LENGTH), "10");
    assert_eq!(body_bytes(response).await, pattern(EPISODE_SIZE)[500..510].to_vec());
}

#[tokio::test]
async fn unsatisfiable_ranges_are_416() {
    let fx = Fixture::new();
    let ranges = [
        "bytes=100-50".to_string(),
        format!("bytes=0-{EPISODE_SIZE}"),
        format!("bytes={EPISODE_SIZE}-"),
        "bytes=-100".to_string(),
        "lines=0-10".to_string(),
    ];
    for range in &ranges {
        let response = get_range(fx.app(), &file_uri(&fx.episode), range).await;
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE, "{range}");
        assert_eq!(
            header_str(&response, header::CONTENT_RANGE),
            format!("bytes */{EPISODE_SIZE}")
        );
    }
}

#[tokio::test]
async fn head_reports_headers_without_body() {
    let fx = Fixture::new();
    let response = fx
        .app()
        .oneshot(
            Request::builder()
                .method(Method::HEAD)
                .uri(file_uri(&fx.episode))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, header::CONTENT_LENGTH), EPISODE_SIZE.to_string());
    assert_eq!(header_str(&response, header::ACCEPT_RANGES), "bytes");
    assert!(body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn traversal_outside_roots_is_403() {
    let fx = Fixture::new();
    let response = get(fx.app(), "/file/..%2f..%2fetc%2fpasswd").await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let escape = fx.tmp.path().join("Series/../series_map.json");
    let response = get(fx.app(), &file_uri(&escape)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn missing_file_under_root_is_404() {
    let fx = Fixture::new();
    let missing = fx.tmp.path().join("Movies/The Matrix (1999)/gone.mp4");
    let response = get(fx.app(), &file_uri(&missing)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn directory_under_root_is_404() {
    let fx = Fixture::new();
    let dir = fx.tmp.path().join("Movies/The Matrix (1999)");
    let response = get(fx.app(), &file_uri(&dir)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
