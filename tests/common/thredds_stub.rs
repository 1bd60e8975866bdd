//! A local stand-in for the THREDDS `fileServer` endpoint.
//!
//! Serves files from a directory tree and records every requested path so
//! tests can assert how many downloads a fetch performed. Paths can be set
//! to answer with an error status a number of times before serving.

use axum::extract::{Path as UrlPath, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use gridmet_cfsv2::Catalog;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;

#[derive(Debug)]
struct StubState {
    root: PathBuf,
    requests: Mutex<Vec<String>>,
    failures: Mutex<HashMap<String, (StatusCode, usize)>>,
}

pub struct StubThredds {
    pub addr: SocketAddr,
    state: Arc<StubState>,
    task: JoinHandle<()>,
}

impl StubThredds {
    /// Serve `root` on an ephemeral local port.
    pub async fn start(root: PathBuf) -> Self {
        let state = Arc::new(StubState {
            root,
            requests: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
        });

        let app = Router::new()
            .route("/thredds/fileServer/*path", get(serve_file))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind stub server");
        let addr = listener.local_addr().expect("Stub server has no address");

        let task = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Stub server error");
        });

        Self { addr, state, task }
    }

    /// A catalog pointing at this server.
    pub fn catalog(&self) -> Catalog {
        Catalog::new("http", "127.0.0.1", self.addr.port())
    }

    /// Paths requested so far, below `/thredds/fileServer/`.
    pub fn requests(&self) -> Vec<String> {
        self.state.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.state.requests.lock().len()
    }

    /// Requests whose path ends with `suffix`.
    pub fn requests_for(&self, suffix: &str) -> usize {
        self.state
            .requests
            .lock()
            .iter()
            .filter(|p| p.ends_with(suffix))
            .count()
    }

    /// Answer the next `times` requests for `path` with `status`.
    pub fn fail(&self, path: &str, status: StatusCode, times: usize) {
        self.state
            .failures
            .lock()
            .insert(path.to_string(), (status, times));
    }
}

impl Drop for StubThredds {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve_file(State(state): State<Arc<StubState>>, UrlPath(path): UrlPath<String>) -> Response {
    state.requests.lock().push(path.clone());
    let injected = {
        let mut failures = state.failures.lock();
        match failures.get_mut(&path) {
            Some((status, remaining)) if *remaining > 0 => {
                *remaining -= 1;
                Some(*status)
            }
            _ => None,
        }
    };
    if let Some(status) = injected {
        return status.into_response();
    }
    match tokio::fs::read(state.root.join(&path)).await {
        Ok(bytes) => (StatusCode::OK, bytes).into_response(),
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}
