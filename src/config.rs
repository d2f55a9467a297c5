use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Manga catalog backend with chapter archive uploads.
#[derive(Parser, Debug, Clone)]
#[command(name = "manga-cms")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file.
    #[arg(short, long, env = "MANGA_CMS_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the server (default if no command given).
    Serve {
        /// Address to bind the server to.
        #[arg(short, long)]
        bind: Option<SocketAddr>,

        /// Directory uploaded images are written to and served from.
        #[arg(short, long)]
        uploads: Option<PathBuf>,
    },

    /// Work management commands.
    Work {
        /// Work subcommand action.
        #[command(subcommand)]
        action: WorkCommand,
    },

    /// User management commands.
    User {
        /// User subcommand action.
        #[command(subcommand)]
        action: UserCommand,
    },

    /// Initialize database and create default config.
    Init {
        /// Force overwrite existing config.
        #[arg(short, long)]
        force: bool,
    },
}

/// Work management subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum WorkCommand {
    /// List works, newest first.
    List {
        /// Only works whose title contains this text.
        #[arg(short, long)]
        title: Option<String>,
    },

    /// Delete a work with all its chapters, pages and files.
    Del {
        /// Slug of the work.
        slug: String,
    },
}

/// User management subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum UserCommand {
    /// Add a new user.
    Add {
        /// Username.
        username: String,
        /// Grant VIP access.
        #[arg(long)]
        vip: bool,
    },

    /// Delete a user.
    Del {
        /// Username to delete.
        username: String,
    },

    /// List all users.
    List,
}

/// Main configuration from TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Upload storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Upload limits.
    #[serde(default)]
    pub upload: UploadConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to.
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::new(
        std::net::IpAddr::V4(std::net::Ipv4Addr::new(0, 0, 0, 0)),
        3001,
    )
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/mangas.db")
}

/// Where uploaded files live and how they are exposed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root of the public uploads tree.
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: PathBuf,

    /// Scratch directory for files that are received but not yet committed.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,

    /// URL prefix the uploads tree is served under.
    #[serde(default = "default_public_prefix")]
    pub public_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            uploads_dir: default_uploads_dir(),
            staging_dir: default_staging_dir(),
            public_prefix: default_public_prefix(),
        }
    }
}

fn default_uploads_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("data/staging")
}

fn default_public_prefix() -> String {
    "/uploads".to_string()
}

impl StorageConfig {
    /// Public prefix normalized to a leading slash and no trailing slash.
    pub fn url_prefix(&self) -> String {
        let trimmed = self.public_prefix.trim_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{}", trimmed)
        }
    }

    /// Public URL for a path relative to the uploads root.
    pub fn public_url(&self, relative: &str) -> String {
        format!("{}/{}", self.url_prefix(), relative.trim_start_matches('/'))
    }
}

/// Upload limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Maximum multipart body size in megabytes.
    #[serde(default = "default_max_body_mb")]
    pub max_body_mb: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_body_mb: default_max_body_mb(),
        }
    }
}

fn default_max_body_mb() -> usize {
    512
}

impl UploadConfig {
    /// Body limit in bytes.
    pub fn max_body_bytes(&self) -> usize {
        self.max_body_mb.saturating_mul(1024 * 1024)
    }
}

impl Config {
    /// Load configuration from file.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::error::AppError::Config(format!("Failed to read config file: {}", e))
        })?;

        toml::from_str(&content).map_err(|e| {
            crate::error::AppError::Config(format!("Failed to parse config file: {}", e))
        })
    }

    /// Find config file in default locations.
    pub fn find_config_file() -> Option<PathBuf> {
        let candidates = [
            PathBuf::from("config.toml"),
            PathBuf::from("manga-cms.toml"),
            dirs::config_dir()
                .map(|p| p.join("manga-cms").join("config.toml"))
                .unwrap_or_default(),
            PathBuf::from("/etc/manga-cms/config.toml"),
        ];

        candidates
            .into_iter()
            .find(|p| !p.as_os_str().is_empty() && p.exists())
    }

    /// Generate default config file content.
    pub fn generate_default() -> String {
        r#"# manga-cms configuration

[server]
bind = "0.0.0.0:3001"

[database]
# path = "/var/lib/manga-cms/mangas.db"

[storage]
# Uploaded covers and chapter pages
uploads_dir = "uploads"
# Files received but not yet committed
staging_dir = "data/staging"
# URL prefix the uploads directory is served under
public_prefix = "/uploads"

[upload]
# Maximum multipart request size in megabytes
max_body_mb = 512
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_parses() {
        let config: Config = toml::from_str(&Config::generate_default()).unwrap();
        assert_eq!(config.server.bind.port(), 3001);
        assert_eq!(config.storage.uploads_dir, PathBuf::from("uploads"));
        assert_eq!(config.upload.max_body_bytes(), 512 * 1024 * 1024);
    }

    #[test]
    fn test_public_url() {
        let mut storage = StorageConfig::default();
        assert_eq!(storage.public_url("one-piece/capa.jpg"), "/uploads/one-piece/capa.jpg");

        storage.public_prefix = "static/".to_string();
        assert_eq!(storage.public_url("/a/1.png"), "/static/a/1.png");
    }
}
