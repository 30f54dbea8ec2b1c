//! HTTP routes: static files plus the live-reload event stream

use crate::hub::ReloadHub;
use crate::ServeResult;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::Router;
use futures_util::{Stream, StreamExt};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};

/// Server-sent events endpoint
pub const LIVERELOAD_PATH: &str = "/livereload";

/// Static file server for a build output directory
#[derive(Debug, Clone)]
pub struct DevServer {
    root: PathBuf,
    hub: ReloadHub,
}

impl DevServer {
    pub fn new(root: impl Into<PathBuf>, hub: ReloadHub) -> Self {
        Self {
            root: root.into(),
            hub,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn hub(&self) -> &ReloadHub {
        &self.hub
    }

    pub fn router(&self) -> Router {
        let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);

        Router::new()
            .route(LIVERELOAD_PATH, get(livereload))
            .route_service("/", ServeFile::new(self.root.join("index.html")))
            .fallback_service(ServeDir::new(&self.root))
            .layer(cors)
            .with_state(self.hub.clone())
    }

    /// Serve on `listener` until the process exits
    pub async fn serve(self, listener: TcpListener) -> ServeResult<()> {
        let addr: Option<SocketAddr> = listener.local_addr().ok();
        tracing::debug!(?addr, root = %self.root.display(), "dev server listening");
        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}

/// Stream reload tokens until the client goes away; dropping the stream
/// unregisters the subscription.
async fn livereload(
    State(hub): State<ReloadHub>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = hub
        .subscribe()
        .map(|token| Ok::<_, Infallible>(Event::default().data(token)));
    Sse::new(stream).keep_alive(KeepAlive::default())
}
