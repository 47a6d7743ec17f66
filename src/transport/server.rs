//! Transport server bootstrap
//!
//! The server runs on an execution context chosen by the caller: either an
//! existing tokio runtime ([`TransportServer::spawn`]) or a dedicated I/O
//! thread with its own single-threaded runtime
//! ([`TransportServer::start_background`]).

use axum::{routing::get, Router};
use parking_lot::Mutex;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use tokio::net::TcpListener;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::error::TransportError;
use crate::source::WebSocketAudioSource;
use crate::transport::handlers::{self, TransportStatus};
use crate::transport::websocket::{self, ActiveStream};

/// State shared with every request handler
pub struct TransportState {
    pub source: Arc<WebSocketAudioSource>,
    /// Connection currently holding the streaming slot
    pub(crate) active: Mutex<Option<ActiveStream>>,
    pub(crate) generation: AtomicU64,
    pub(crate) connections: AtomicU64,
}

impl TransportState {
    pub fn status(&self) -> TransportStatus {
        TransportStatus {
            source: self.source.status(),
            streaming: self.active.lock().is_some(),
            connections_total: self.connections.load(Ordering::Relaxed),
        }
    }
}

/// HTTP/WebSocket server feeding an audio source
pub struct TransportServer {
    state: Arc<TransportState>,
}

impl TransportServer {
    pub fn new(source: Arc<WebSocketAudioSource>) -> Self {
        Self {
            state: Arc::new(TransportState {
                source,
                active: Mutex::new(None),
                generation: AtomicU64::new(0),
                connections: AtomicU64::new(0),
            }),
        }
    }

    pub fn state(&self) -> Arc<TransportState> {
        self.state.clone()
    }

    /// Build the router: the audio route plus its status endpoint
    pub fn router(&self) -> Router {
        let config = self.state.source.config();

        Router::new()
            .route(&config.route, get(websocket::ws_handler))
            .route(&config.status_route(), get(handlers::get_status))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(CorsLayer::permissive()),
            )
            .with_state(self.state.clone())
    }

    /// Serve on `listener` until `shutdown` resolves
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), TransportError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.router();
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| TransportError::Serve(e.to_string()))
    }

    /// Bind and serve on an existing runtime
    pub fn spawn(self, handle: &Handle) -> Result<ServerHandle, TransportError> {
        let listener = self.bind()?;
        let local_addr = local_addr(&listener)?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let task = handle.spawn(async move {
            let listener = TcpListener::from_std(listener)
                .map_err(|e| TransportError::BindFailed(e.to_string()))?;
            self.serve(listener, async {
                let _ = shutdown_rx.await;
            })
            .await
        });

        tracing::info!("Audio endpoint listening @ ws://{}", local_addr);
        Ok(ServerHandle {
            local_addr,
            shutdown_tx: Some(shutdown_tx),
            task: Some(ServerTask::Task(task)),
        })
    }

    /// Bind, then serve on a dedicated I/O thread
    pub fn start_background(self) -> Result<ServerHandle, TransportError> {
        let listener = self.bind()?;
        let local_addr = local_addr(&listener)?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| TransportError::Runtime(e.to_string()))?;

        let thread = thread::Builder::new()
            .name("ws-audio-io".into())
            .spawn(move || {
                runtime.block_on(async move {
                    let listener = TcpListener::from_std(listener)
                        .map_err(|e| TransportError::BindFailed(e.to_string()))?;
                    self.serve(listener, async {
                        let _ = shutdown_rx.await;
                    })
                    .await
                })
            })
            .map_err(|e| TransportError::Runtime(e.to_string()))?;

        tracing::info!("Audio endpoint listening @ ws://{}", local_addr);
        Ok(ServerHandle {
            local_addr,
            shutdown_tx: Some(shutdown_tx),
            task: Some(ServerTask::Thread(thread)),
        })
    }

    fn bind(&self) -> Result<std::net::TcpListener, TransportError> {
        let addr = self.state.source.config().listen_addr()?;
        let listener = std::net::TcpListener::bind(addr)
            .map_err(|e| TransportError::BindFailed(format!("{}: {}", addr, e)))?;
        listener
            .set_nonblocking(true)
            .map_err(|e| TransportError::BindFailed(e.to_string()))?;
        Ok(listener)
    }
}

fn local_addr(listener: &std::net::TcpListener) -> Result<SocketAddr, TransportError> {
    listener
        .local_addr()
        .map_err(|e| TransportError::BindFailed(e.to_string()))
}

enum ServerTask {
    Task(tokio::task::JoinHandle<Result<(), TransportError>>),
    Thread(thread::JoinHandle<Result<(), TransportError>>),
}

/// Handle to a running transport server. Dropping it signals shutdown.
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<ServerTask>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// WebSocket URL for `route` on this server
    pub fn url(&self, route: &str) -> String {
        format!("ws://{}{}", self.local_addr, route)
    }

    pub fn is_running(&self) -> bool {
        match &self.task {
            Some(ServerTask::Task(task)) => !task.is_finished(),
            Some(ServerTask::Thread(thread)) => !thread.is_finished(),
            None => false,
        }
    }

    /// Signal graceful shutdown.
    ///
    /// For a background server this also joins the I/O thread, so it must
    /// not be called from inside an async context. A spawned server winds
    /// down on its own runtime.
    pub fn shutdown(mut self) -> Result<(), TransportError> {
        self.signal();
        match self.task.take() {
            Some(ServerTask::Thread(thread)) => thread
                .join()
                .map_err(|_| TransportError::Runtime("I/O thread panicked".into()))?,
            Some(ServerTask::Task(_)) | None => Ok(()),
        }
    }

    fn signal(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.signal();
    }
}
