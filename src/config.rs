//! Configuration management for the image server.
//!
//! This module provides a configuration system that supports:
//! - Command-line arguments via clap
//! - Environment variables with `IMGRENDER_` prefix
//! - Sensible defaults for all optional settings
//!
//! # Example
//!
//! ```ignore
//! use clap::Parser;
//! use imgrender::config::{Cli, Command};
//!
//! match Cli::parse().into_command() {
//!     Command::Serve(config) => println!("Listening on {}", config.bind_address()),
//!     Command::InitDb(config) => println!("Resetting {}", config.database.display()),
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `IMGRENDER_HOST` - Server bind address (default: 0.0.0.0)
//! - `IMGRENDER_PORT` - Server port (default: 3000)
//! - `IMGRENDER_DATABASE` - SQLite database file (default: db.db)
//! - `IMGRENDER_FILES_DIR` - Directory of uploaded files (default: files)
//! - `IMGRENDER_CACHE_TTL` - Render cache lifetime in seconds (default: 3600)
//! - `IMGRENDER_WORKERS` - Concurrent render jobs, 0 = one per CPU (default: 0)
//! - `IMGRENDER_CHUNK_SIZE` - Response body chunk size (default: 4096)
//! - `IMGRENDER_MAX_UPLOAD_BYTES` - Upload size limit (default: 32 MiB)
//! - `IMGRENDER_CORS_ORIGINS` - Allowed CORS origins, comma-separated

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::server::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_UPLOAD_BYTES};

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default SQLite database file.
pub const DEFAULT_DATABASE: &str = "db.db";

/// Default directory for uploaded files.
pub const DEFAULT_FILES_DIR: &str = "files";

/// Default render cache lifetime in seconds (1 hour).
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3600;

/// Longest accepted render cache lifetime (1 week).
pub const MAX_CACHE_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Upper bound on render workers.
pub const MAX_WORKERS: usize = 1024;

// =============================================================================
// CLI Arguments
// =============================================================================

/// imgrender - resized images on demand.
///
/// Serves resized variants of uploaded images, rendering them lazily and
/// caching each size for a bounded time window.
#[derive(Parser, Debug, Clone)]
#[command(name = "imgrender")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the HTTP server.
    Serve(ServeConfig),

    /// Create a fresh database and empty the files directory.
    InitDb(InitDbConfig),
}

/// Options for `imgrender serve`.
#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "IMGRENDER_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "IMGRENDER_PORT")]
    pub port: u16,

    // =========================================================================
    // Storage Configuration
    // =========================================================================
    /// SQLite database holding image records.
    #[arg(long, default_value = DEFAULT_DATABASE, env = "IMGRENDER_DATABASE")]
    pub database: PathBuf,

    /// Directory holding uploaded image files.
    #[arg(long, default_value = DEFAULT_FILES_DIR, env = "IMGRENDER_FILES_DIR")]
    pub files_dir: PathBuf,

    // =========================================================================
    // Render Configuration
    // =========================================================================
    /// Seconds a rendered size stays cached (and the Cache-Control ceiling).
    #[arg(long, default_value_t = DEFAULT_CACHE_TTL_SECS, env = "IMGRENDER_CACHE_TTL")]
    pub cache_ttl: u64,

    /// Concurrent render jobs (0 = one per CPU).
    #[arg(long, default_value_t = 0, env = "IMGRENDER_WORKERS")]
    pub workers: usize,

    /// Response body chunk size in bytes.
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE, env = "IMGRENDER_CHUNK_SIZE")]
    pub chunk_size: usize,

    /// Largest accepted upload body in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_UPLOAD_BYTES, env = "IMGRENDER_MAX_UPLOAD_BYTES")]
    pub max_upload_bytes: usize,

    // =========================================================================
    // CORS Configuration
    // =========================================================================
    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "IMGRENDER_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.cache_ttl > MAX_CACHE_TTL_SECS {
            return Err(format!(
                "cache_ttl must be at most {} seconds",
                MAX_CACHE_TTL_SECS
            ));
        }

        if self.chunk_size == 0 {
            return Err("chunk_size must be greater than 0".to_string());
        }

        if self.max_upload_bytes < 1024 {
            return Err("max_upload_bytes must be at least 1024".to_string());
        }

        if self.workers > MAX_WORKERS {
            return Err(format!("workers must be at most {}", MAX_WORKERS));
        }

        if self.database.as_os_str().is_empty() {
            return Err("database path is required. Set --database or IMGRENDER_DATABASE".to_string());
        }
        if self.files_dir.as_os_str().is_empty() {
            return Err(
                "files directory is required. Set --files-dir or IMGRENDER_FILES_DIR".to_string(),
            );
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl)
    }
}

/// Options for `imgrender init-db`.
#[derive(Args, Debug, Clone)]
pub struct InitDbConfig {
    /// SQLite database to (re)create.
    #[arg(long, default_value = DEFAULT_DATABASE, env = "IMGRENDER_DATABASE")]
    pub database: PathBuf,

    /// Directory of uploaded files to empty.
    #[arg(long, default_value = DEFAULT_FILES_DIR, env = "IMGRENDER_FILES_DIR")]
    pub files_dir: PathBuf,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

// =============================================================================
// Tests
// =============================================================================
