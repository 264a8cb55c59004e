use axum::extract::Extension;
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::RwLock;
use tokio::sync::mpsc;

use crate::core::tracking::State;
use crate::core::types::Level;

#[derive(Debug)]
pub enum MonitorMessage {
    /// Level of the last committed block
    Head(Level),
    State(State),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Status {
    pub head: Level,
    pub state: String,
}

impl Default for Status {
    fn default() -> Self {
        Self {
            head: -1,
            state: State::Following.to_string(),
        }
    }
}

type SharedState = Arc<RwLock<Status>>;

pub struct Monitor {
    port: u16,
    state: SharedState,
    tx: mpsc::Sender<MonitorMessage>,
    rx: mpsc::Receiver<MonitorMessage>,
}

impl Monitor {
    pub fn new(port: u16) -> Self {
        let (tx, rx) = mpsc::channel(32);
        Self {
            port,
            state: SharedState::default(),
            tx,
            rx,
        }
    }

    pub fn sender(&self) -> mpsc::Sender<MonitorMessage> {
        self.tx.clone()
    }

    /// Current status, as served on `/status`.
    pub fn status(&self) -> Status {
        match self.state.read() {
            Ok(status) => status.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub async fn start(&mut self) {
        self.start_server();
        // Own sender keeps the channel open
        while let Some(msg) = self.rx.recv().await {
            self.handle(msg);
        }
    }

    fn handle(&self, msg: MonitorMessage) {
        let mut status = match self.state.write() {
            Ok(status) => status,
            Err(poisoned) => poisoned.into_inner(),
        };
        match msg {
            MonitorMessage::Head(level) => status.head = level,
            MonitorMessage::State(state) => status.state = state.to_string(),
        }
    }

    fn start_server(&self) {
        let app = router(self.state.clone());
        let address = SocketAddr::from(([0, 0, 0, 0], self.port));
        tokio::spawn(async move {
            tracing::info!("listening on {}", &address);
            if let Err(e) = axum::Server::bind(&address)
                .serve(app.into_make_service())
                .await
            {
                tracing::error!("monitor server stopped: {e}");
            }
        });
    }
}

fn router(state: SharedState) -> Router {
    Router::new()
        .route(
            "/",
            get(|| async { "Hey there, you're probably after /status" }),
        )
        .route("/status", get(status))
        .layer(Extension(state))
}

async fn status(Extension(state): Extension<SharedState>) -> Json<Status> {
    let status = match state.read() {
        Ok(status) => status.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    };
    Json(status)
}
