//! Browser dashboard.
//!
//! A small axum application around a [`QaPipeline`]:
//!
//! - `GET /` renders the dashboard for the caller's session
//! - `POST /ask` submits the form and renders the answers
//! - `POST /api/ask` answers a JSON question
//! - `GET /health` reports liveness
//!
//! Sessions are identified by a `session` cookie holding a UUID and live in
//! memory. A session is created by the first form submission, never by a plain
//! page view, and at most [`MAX_SESSIONS`] are kept; the least recently used is
//! dropped beyond that. Each submission runs the pipeline once and waits for
//! it; there is no timeout.

pub mod error;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};
use uuid::Uuid;

pub use error::ApiError;

use crate::models::{sort_by_score, Answer, Filters};
use crate::pipeline::QaPipeline;
use crate::presentation::{
    clamp_year_range, render_page, FormInputs, Outcome, PageView, SessionState,
    EMPTY_QUESTION_MESSAGE, MAX_YEAR, MIN_YEAR, SUBMIT_BUTTON,
};

/// Errors that can occur while running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listen address could not be bound
    #[error("Failed to bind {addr}: {source}")]
    BindError {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// The server stopped with an I/O error
    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

const SESSION_COOKIE: &str = "session";

/// Sessions kept in memory before the least recently used one is dropped.
pub const MAX_SESSIONS: usize = 10_000;

struct SessionEntry {
    state: SessionState,
    last_seen: Instant,
}

impl SessionEntry {
    fn new() -> Self {
        let mut state = SessionState::new();
        state.register(SUBMIT_BUTTON);
        Self {
            state,
            last_seen: Instant::now(),
        }
    }
}

/// Shared dashboard state.
#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<dyn QaPipeline>,
    sessions: Arc<Mutex<HashMap<Uuid, SessionEntry>>>,
    session_limit: usize,
}

impl AppState {
    pub fn new(pipeline: Arc<dyn QaPipeline>) -> Self {
        Self {
            pipeline,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            session_limit: MAX_SESSIONS,
        }
    }

    /// Keep at most `limit` sessions (at least one).
    pub fn with_session_limit(mut self, limit: usize) -> Self {
        self.session_limit = limit.max(1);
        self
    }

    /// Known session named by the request cookie, if any.
    fn existing_session(&self, headers: &HeaderMap) -> Option<Uuid> {
        let sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        session_from_headers(headers).filter(|id| sessions.contains_key(id))
    }

    /// Session of the request, creating one when the cookie is missing or
    /// unknown. The flag is true for a new session.
    fn resolve_session(&self, headers: &HeaderMap) -> (Uuid, bool) {
        if let Some(id) = self.existing_session(headers) {
            return (id, false);
        }

        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        while sessions.len() >= self.session_limit {
            let oldest = sessions
                .iter()
                .min_by_key(|(_, entry)| entry.last_seen)
                .map(|(id, _)| *id);
            match oldest {
                Some(id) => {
                    debug!("Evicting session {}", id);
                    sessions.remove(&id);
                }
                None => break,
            }
        }

        let id = Uuid::new_v4();
        sessions.insert(id, SessionEntry::new());
        (id, true)
    }

    fn with_session<T>(&self, id: Uuid, f: impl FnOnce(&mut SessionState) -> T) -> T {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = sessions.entry(id).or_insert_with(SessionEntry::new);
        entry.last_seen = Instant::now();
        f(&mut entry.state)
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

fn session_from_headers(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().strip_prefix("session="))
        .find_map(|id| Uuid::parse_str(id).ok())
}

fn page_response(page: String, id: Uuid, new_session: bool) -> Response {
    let mut response = Html(page).into_response();
    if new_session {
        let cookie = format!("{SESSION_COOKIE}={id}; Path=/; HttpOnly; SameSite=Lax");
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            response.headers_mut().insert(header::SET_COOKIE, value);
        }
    }
    response
}

/// Create the dashboard router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ask", post(ask))
        .route("/api/ask", post(api_ask))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the dashboard on `addr` until the process stops.
pub async fn serve(addr: SocketAddr, state: AppState) -> ServerResult<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::BindError { addr, source })?;
    info!("Dashboard listening on http://{}", addr);
    axum::serve(listener, create_router(state)).await?;
    Ok(())
}

async fn index(State(state): State<AppState>, headers: HeaderMap) -> Response {
    match state.existing_session(&headers) {
        Some(id) => {
            let page = state.with_session(id, |session| render_page(&PageView::from_session(session)));
            page_response(page, id, false)
        }
        None => {
            let idle = SessionState::new();
            Html(render_page(&PageView::from_session(&idle))).into_response()
        }
    }
}

/// Dashboard form fields. Numbers arrive as text so empty inputs are accepted.
#[derive(Debug, Default, Deserialize)]
pub struct AskForm {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub year_start: String,
    #[serde(default)]
    pub year_end: String,
    #[serde(default)]
    pub top_k: String,
}

impl AskForm {
    fn inputs(&self) -> FormInputs {
        let year = |raw: &str, default: i32| raw.trim().parse::<i32>().unwrap_or(default);
        let (year_start, year_end) = clamp_year_range(
            year(&self.year_start, MIN_YEAR),
            year(&self.year_end, MAX_YEAR),
        );
        FormInputs {
            question: self.question.clone(),
            year_start,
            year_end,
            top_k: positive(self.top_k.trim().parse().ok()),
        }
    }
}

fn positive(top_k: Option<usize>) -> Option<usize> {
    top_k.filter(|k| *k > 0)
}

async fn ask(State(state): State<AppState>, headers: HeaderMap, Form(form): Form<AskForm>) -> Response {
    let (id, new_session) = state.resolve_session(&headers);
    let inputs = form.inputs();
    let question = inputs.question.trim().to_string();
    let filters = Filters::from_year_range(inputs.year_start, inputs.year_end);
    let top_k = inputs.top_k;

    state.with_session(id, |session| {
        session.submit(SUBMIT_BUTTON);
        session.set_inputs(inputs);
    });

    let outcome = if question.is_empty() {
        Outcome::EmptyQuestion
    } else {
        run_query(state.pipeline.as_ref(), &question, &filters, top_k).await
    };

    let page = state.with_session(id, |session| {
        session.set_outcome(outcome);
        render_page(&PageView::from_session(session))
    });
    page_response(page, id, new_session)
}

async fn run_query(
    pipeline: &dyn QaPipeline,
    question: &str,
    filters: &Filters,
    top_k: Option<usize>,
) -> Outcome {
    let started = Instant::now();
    match pipeline.answer(question, filters).await {
        Ok(output) => {
            let mut answers = output.answers;
            sort_by_score(&mut answers);
            if let Some(k) = top_k {
                answers.truncate(k);
            }
            let elapsed = started.elapsed();
            info!("{} answers in {:.2}s", answers.len(), elapsed.as_secs_f64());
            Outcome::Answered { answers, elapsed }
        }
        Err(e) => {
            error!("Question failed: {}", e);
            Outcome::Failed(e.to_string())
        }
    }
}

/// Request body for `POST /api/ask`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskRequest {
    pub question: String,

    /// Inclusive `[start, end]` year range, clamped to the selectable years
    #[serde(default)]
    pub year_range: Option<[i32; 2]>,

    #[serde(default)]
    pub categories: Vec<String>,

    /// Keep at most this many answers; zero is ignored
    #[serde(default)]
    pub top_k: Option<usize>,
}

/// Response body for `POST /api/ask`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskResponse {
    /// Answers, highest score first
    pub answers: Vec<Answer>,
    pub elapsed_seconds: f64,
}

async fn api_ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskResponse>, ApiError> {
    let question = request.question.trim();
    if question.is_empty() {
        return Err(ApiError::BadRequest(EMPTY_QUESTION_MESSAGE.to_string()));
    }

    let filters = match request.year_range {
        Some([start, end]) => {
            let (start, end) = clamp_year_range(start, end);
            Filters::from_year_range(start, end)
        }
        None => Filters::default(),
    }
    .with_categories(request.categories);

    let started = Instant::now();
    let output = state.pipeline.answer(question, &filters).await?;
    let mut answers = output.answers;
    sort_by_score(&mut answers);
    if let Some(k) = positive(request.top_k) {
        answers.truncate(k);
    }

    Ok(Json(AskResponse {
        answers,
        elapsed_seconds: started.elapsed().as_secs_f64(),
    }))
}

/// Response body for `GET /health`.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: crate::VERSION.to_string(),
    })
}
