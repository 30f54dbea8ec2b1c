//! qgo development server
//!
//! Serves a build output directory over HTTP and pushes `reload` events to
//! connected browsers through a server-sent events endpoint:
//! - [`ReloadHub`] is the shared subscriber registry
//! - [`bind`] picks a fixed or the first free port
//! - [`DevServer`] routes `/livereload` and the static files
//! - [`open_browser`] launches the platform browser

pub mod browser;
pub mod hub;
pub mod port;
pub mod server;

use thiserror::Error;

pub use browser::open_browser;
pub use hub::{ReloadHub, Subscription, RELOAD_TOKEN};
pub use port::{bind, PortChoice, DEFAULT_PORT};
pub use server::{DevServer, LIVERELOAD_PATH};

/// Dev server errors
#[derive(Error, Debug)]
pub enum ServeError {
    #[error("Cannot bind port {port}: {error}")]
    Bind { port: u16, error: std::io::Error },

    #[error("No open port found at or above {start}")]
    NoOpenPort { start: u16 },

    #[error("Failed to open browser at {url}: {reason}")]
    Browser { url: String, reason: String },

    #[error("Server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ServeResult<T> = Result<T, ServeError>;
