use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::library::{Category, UnknownCategory};

#[derive(Parser, Debug, Default)]
#[command(
    name = "lanstream",
    about = "Serve local series and movies to a media player over the LAN, resolved by IMDb id",
    long_about = None,
    version = env!("LANSTREAM_BUILD_VERSION"),
)]
pub struct Args {
    /// Root directory holding one folder per series (each with `Season NN` sub-folders)
    #[arg(long, global = true, env = "LANSTREAM_SERIES_DIR", value_name = "DIR")]
    pub series_dir: Option<PathBuf>,

    /// Root directory holding one folder per movie
    #[arg(long, global = true, env = "LANSTREAM_MOVIES_DIR", value_name = "DIR")]
    pub movies_dir: Option<PathBuf>,

    /// JSON file mapping series IMDb ids to folder names [default: series_map.json]
    #[arg(long, global = true, env = "LANSTREAM_SERIES_INDEX", value_name = "FILE")]
    pub series_index: Option<PathBuf>,

    /// JSON file mapping movie IMDb ids to folder names [default: movies_map.json]
    #[arg(long, global = true, env = "LANSTREAM_MOVIES_INDEX", value_name = "FILE")]
    pub movies_index: Option<PathBuf>,

    /// HTTP port to listen on [default: 7000]
    #[arg(short, long, env = "LANSTREAM_PORT")]
    pub port: Option<u16>,

    /// Addon name shown in the player [default: Local Files on LAN [<hostname>]]
    #[arg(short, long, env = "LANSTREAM_NAME")]
    pub name: Option<String>,

    /// Use single-line stream titles instead of the multi-line emoji layout
    #[arg(long, env = "LANSTREAM_COMPACT_TITLES")]
    pub compact_titles: bool,

    /// OMDb API key used to resolve ids missing from the index by title
    #[arg(long, env = "LANSTREAM_OMDB_API_KEY", hide_env_values = true)]
    pub omdb_api_key: Option<String>,

    /// Host or IP written into stream URLs [default: detected LAN address]
    #[arg(long, env = "LANSTREAM_PUBLIC_HOST")]
    pub public_host: Option<String>,

    /// Path to TOML config file (overrides default search: ./lanstream.toml, ~/.config/lanstream/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Bind to localhost only (127.0.0.1) instead of all interfaces (0.0.0.0 + :::)
    #[arg(long)]
    pub localhost: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Record an IMDb id -> folder mapping in an index and exit (for post-download hooks)
    Add {
        /// IMDb id, e.g. tt0903747
        imdb_id: String,

        /// Folder name under the series or movies root
        folder: String,

        /// Which index to write: series or movie
        #[arg(long = "type", value_name = "TYPE", default_value = "series", value_parser = parse_category)]
        category: Category,
    },
}

fn parse_category(raw: &str) -> Result<Category, UnknownCategory> {
    raw.trim().to_ascii_lowercase().parse()
}
