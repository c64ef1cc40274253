use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use parking_lot::Mutex;
use serde_json::json;

const SEATS: u32 = 20;

/// In memory stand-in for the ticket service.
#[derive(Debug, Default)]
pub struct MockState {
    sold: Mutex<HashSet<(u32, u32)>>,
    pub event_listings: AtomicUsize,
    pub logins: AtomicUsize,
    pub sales: AtomicUsize,
    pub conflicts: AtomicUsize,
    pub authorized_purchases: AtomicUsize,
    /// Logins after this many are rejected, zero for no limit
    pub max_logins: AtomicUsize,
}

impl MockState {
    fn sell_out(&self, event_id: u32) {
        let mut sold = self.sold.lock();
        for seat_id in 1..=SEATS {
            sold.insert((event_id, seat_id));
        }
    }
}

pub struct MockService {
    pub base_url: String,
    pub state: Arc<MockState>,
}

/// Start the mock on its own thread and runtime, since the runner blocks the test thread with a
/// runtime of its own.
pub fn start_mock_service(sold_out: bool) -> MockService {
    let state = Arc::new(MockState::default());
    if sold_out {
        state.sell_out(1);
    }

    let app = Router::new()
        .route("/api/events", get(list_events))
        .route("/api/login", post(login))
        .route(
            "/api/events/{event_id}/seats/{seat_id}/purchase",
            post(purchase),
        )
        .with_state(state.clone());

    let (addr_tx, addr_rx) = std::sync::mpsc::channel::<SocketAddr>();
    std::thread::spawn(move || {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async move {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            addr_tx.send(listener.local_addr().unwrap()).unwrap();
            axum::serve(listener, app).await.unwrap();
        });
    });

    let addr = addr_rx.recv().unwrap();
    MockService {
        base_url: format!("http://{addr}"),
        state,
    }
}

async fn list_events(State(state): State<Arc<MockState>>) -> Json<serde_json::Value> {
    state.event_listings.fetch_add(1, Ordering::SeqCst);

    Json(json!([
        { "id": 1, "name": "Rock Concert" },
        { "id": 2, "name": "Jazz Night" },
    ]))
}

async fn login(
    State(state): State<Arc<MockState>>,
    Form(fields): Form<HashMap<String, String>>,
) -> Response {
    let attempt = state.logins.fetch_add(1, Ordering::SeqCst) + 1;
    let max_logins = state.max_logins.load(Ordering::SeqCst);

    let valid = fields.get("username").map(String::as_str) == Some("demo")
        && fields.get("password").map(String::as_str) == Some("demo");
    if !valid || (max_logins > 0 && attempt > max_logins) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    Json(json!({ "access_token": "demo-token", "token_type": "bearer" })).into_response()
}

async fn purchase(
    State(state): State<Arc<MockState>>,
    Path((event_id, seat_id)): Path<(u32, u32)>,
    headers: HeaderMap,
) -> Response {
    if event_id != 1 || !(1..=SEATS).contains(&seat_id) {
        return StatusCode::NOT_FOUND.into_response();
    }

    if headers.get("authorization").and_then(|v| v.to_str().ok()) == Some("Bearer demo-token") {
        state.authorized_purchases.fetch_add(1, Ordering::SeqCst);
    }

    if state.sold.lock().insert((event_id, seat_id)) {
        state.sales.fetch_add(1, Ordering::SeqCst);
        Json(json!({ "order_id": seat_id })).into_response()
    } else {
        state.conflicts.fetch_add(1, Ordering::SeqCst);
        (StatusCode::CONFLICT, "Seat already sold").into_response()
    }
}
