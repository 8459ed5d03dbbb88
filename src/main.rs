use std::num::NonZeroUsize;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use axum::Router;
use clap::Parser;

use lanstream::http::{self, state::AppState};
use lanstream::library::{Category, Library};
use lanstream::lookup::{omdb::OmdbClient, CachedTitles};
use lanstream::media::probe::ToolProbe;
use lanstream::media::title::TitleStyle;
use lanstream::resolver::StreamResolver;
use lanstream::{cli, config};

/// Set to true once the first Ctrl+C is received. Second Ctrl+C force-exits.
static SHUTTING_DOWN: AtomicBool = AtomicBool::new(false);

async fn wait_for_shutdown() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
    if SHUTTING_DOWN.swap(true, Ordering::SeqCst) {
        eprintln!("\nlanstream: forced exit");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = cli::Args::parse();

    let file_config = config::find_config_file(args.config.as_deref()).and_then(|path| {
        match config::load_config(&path) {
            Ok(cfg) => {
                tracing::debug!("Loaded config from {}", path.display());
                Some(cfg)
            }
            Err(e) => {
                tracing::warn!("Failed to parse config file: {}", e);
                None
            }
        }
    });

    let config = config::Config::resolve(file_config, &args).unwrap_or_else(|e| {
        eprintln!("error: {}", e);
        std::process::exit(1);
    });

    for path in [&config.series_dir, &config.movies_dir] {
        if !path.is_dir() {
            eprintln!("error: not a directory: {}", path.display());
            std::process::exit(1);
        }
    }

    let library = Arc::new(Library::from_config(&config));

    if let Some(cli::Command::Add {
        imdb_id,
        folder,
        category,
    }) = &args.command
    {
        std::process::exit(add_entry(&library, *category, imdb_id, folder));
    }

    let titles = match &config.omdb_api_key {
        Some(key) => {
            let capacity =
                NonZeroUsize::new(config.lookup_cache_capacity).unwrap_or(NonZeroUsize::MIN);
            Some(Arc::new(CachedTitles::new(
                Box::new(OmdbClient::new(key.clone())),
                config.omdb_cache_ttl,
                capacity,
            )))
        }
        None => {
            tracing::warn!("No OMDb API key configured: ids missing from the index will not be looked up by title");
            None
        }
    };

    let resolver = Arc::new(StreamResolver::new(
        library,
        titles,
        Arc::new(ToolProbe::new()),
        TitleStyle::from_compact_flag(config.compact_titles),
        config.name.clone(),
        config.base_url(),
    ));
    let app = http::build_router(AppState::new(resolver, config.name.clone()));

    tracing::info!("lanstream \"{}\" on port {}", config.name, config.port);
    tracing::info!("  series: {}", config.series_dir.display());
    tracing::info!("  movies: {}", config.movies_dir.display());
    tracing::info!("Install in the player from {}/manifest.json", config.base_url());

    if config.localhost {
        run_localhost(config.port, app).await;
    } else {
        run_dual_stack(config.port, app).await;
    }
}

/// `lanstream add`: write one mapping and report the exit code.
fn add_entry(library: &Library, category: Category, imdb_id: &str, folder: &str) -> i32 {
    let shelf = library.shelf(category);
    match shelf.register(imdb_id.trim(), folder) {
        Ok(true) => {
            println!("Added: {} -> {} ({})", imdb_id, folder, category);
            0
        }
        Ok(false) => {
            shelf.index.load();
            let existing = shelf.index.lookup(imdb_id.trim()).into_option().unwrap_or_default();
            println!("Entry already exists: {} -> {}", imdb_id, existing);
            0
        }
        Err(e) => {
            eprintln!("error: {}", e);
            1
        }
    }
}

/// Serve on 127.0.0.1 only and wait for graceful shutdown.
async fn run_localhost(port: u16, app: Router) {
    let addr = format!("127.0.0.1:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            eprintln!("error: failed to bind {}: {}", addr, e);
            std::process::exit(1);
        });
    tracing::info!("Listening on http://{} (localhost only)", addr);

    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);
    let mut http_rx = shutdown_tx.subscribe();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = http_rx.recv().await;
            })
            .await
            .unwrap_or_else(|e| tracing::error!("HTTP server error: {}", e));
    });

    wait_for_shutdown().await;
    tracing::info!("Shutting down...");
    let _ = shutdown_tx.send(());
    let _ = tokio::time::timeout(std::time::Duration::from_secs(1), server).await;
    tracing::info!("Goodbye.");
}

/// Serve on both IPv4 (0.0.0.0) and IPv6 (::) and wait for graceful shutdown.
async fn run_dual_stack(port: u16, app: Router) {
    let ipv4_addr = format!("0.0.0.0:{}", port);
    let ipv4_listener = tokio::net::TcpListener::bind(&ipv4_addr)
        .await
        .unwrap_or_else(|e| {
            eprintln!("error: failed to bind IPv4 {}: {}", ipv4_addr, e);
            std::process::exit(1);
        });

    // IPV6_V6ONLY must be set explicitly: Linux shares the v4 port otherwise and the bind fails.
    let ipv6_listener = match bind_ipv6_only(port) {
        Ok(listener) => Some(listener),
        Err(e) => {
            tracing::warn!("IPv6 listener unavailable on port {}: {} -- serving IPv4 only", port, e);
            None
        }
    };
    tracing::info!(
        "Listening on port {} ({})",
        port,
        if ipv6_listener.is_some() { "IPv4 + IPv6" } else { "IPv4" }
    );

    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(2);

    let mut tasks = Vec::new();
    let mut v4_rx = shutdown_tx.subscribe();
    let app_v4 = app.clone();
    tasks.push(tokio::spawn(async move {
        axum::serve(ipv4_listener, app_v4)
            .with_graceful_shutdown(async move {
                let _ = v4_rx.recv().await;
            })
            .await
            .unwrap_or_else(|e| tracing::error!("IPv4 server error: {}", e));
    }));
    if let Some(listener) = ipv6_listener {
        let mut v6_rx = shutdown_tx.subscribe();
        tasks.push(tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = v6_rx.recv().await;
                })
                .await
                .unwrap_or_else(|e| tracing::error!("IPv6 server error: {}", e));
        }));
    }

    wait_for_shutdown().await;
    tracing::info!("Shutting down...");
    let _ = shutdown_tx.send(());
    let _ = tokio::time::timeout(
        std::time::Duration::from_secs(1),
        futures::future::join_all(tasks),
    )
    .await;
    tracing::info!("Goodbye.");
}

fn bind_ipv6_only(port: u16) -> std::io::Result<tokio::net::TcpListener> {
    let addr: std::net::SocketAddr = (std::net::Ipv6Addr::UNSPECIFIED, port).into();
    let socket = socket2::Socket::new(
        socket2::Domain::IPV6,
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;
    socket.set_only_v6(true)?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;
    tokio::net::TcpListener::from_std(socket.into())
}
