//! manga-cms: backend for a manga/comic reading site.
//!
//! Works ("obras") are stored with their chapters and pages in SQLite.
//! Chapters arrive as zip archives of page images which are extracted,
//! ordered naturally and published under the uploads directory.
//!
//! # Features
//!
//! - Atomic work and chapter uploads (rows and files commit together)
//! - Natural page ordering (`2.jpg` before `10.jpg`)
//! - Paginated, filterable work listing
//! - Chapter navigation and VIP chapter locking
//! - Genres, tags, user titles, comments and bug reports

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Configuration and CLI.
pub mod config;
/// Database operations.
pub mod db;
/// Error types.
pub mod error;
/// HTTP server.
pub mod server;
/// Title slugs.
pub mod slug;
/// Upload pipeline.
pub mod upload;


pub use config::{Cli, Command, Config};
pub use db::Database;
pub use error::{AppError, Result};
pub use server::AppState;
