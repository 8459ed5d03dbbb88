//! LAN streaming addon: resolve IMDb ids to local media files and serve them with byte-range support.

pub mod cli;
pub mod config;
pub mod http;
pub mod library;
pub mod lookup;
pub mod media;
pub mod resolver;
