use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use oidc_rp_core::{default_trace, HttpError};
use oidc_rp_session::{Session, SessionId, SessionStore};
use serde::Serialize;
use tracing::warn;

use crate::handshake::{CallbackParams, HandshakeController};

/// Name of the cookie carrying the [`SessionId`].
pub const SESSION_COOKIE: &str = "oidc_rp_session";

/// Shared state for every route.
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<HandshakeController>,
    pub sessions: Arc<dyn SessionStore>,
}

impl AppState {
    pub fn new(controller: Arc<HandshakeController>, sessions: Arc<dyn SessionStore>) -> Self {
        Self {
            controller,
            sessions,
        }
    }

    /// The session named by the request cookie, if it carries a well-formed id.
    fn existing_session(&self, jar: &CookieJar) -> Option<Session> {
        let id = SessionId::parse(jar.get(SESSION_COOKIE)?.value())?;
        Some(Session::new(id, self.sessions.clone()))
    }

    /// The request's session, creating one and setting its cookie when absent.
    fn session_or_new(&self, jar: CookieJar) -> (CookieJar, Session) {
        if let Some(session) = self.existing_session(&jar) {
            return (jar, session);
        }
        let session = Session::new(SessionId::generate(), self.sessions.clone());
        let settings = self.controller.settings();
        let cookie = session_cookie(
            session.id(),
            settings.session_ttl_secs,
            settings.session_cookie_secure,
        );
        (jar.add(cookie), session)
    }
}

fn session_cookie(id: &SessionId, ttl_secs: u64, secure: bool) -> Cookie<'static> {
    let ttl = time::Duration::seconds(i64::try_from(ttl_secs).unwrap_or(i64::MAX));
    Cookie::build((SESSION_COOKIE, id.as_str().to_string()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(ttl)
        .build()
}

fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

/// What the browser sees after a successful login.
#[derive(Debug, Serialize)]
struct LoginSummary {
    authenticated: bool,
    subject: String,
    email: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

const LANDING_PAGE: &str = r#"<!doctype html>
<html>
  <head><title>Sign in</title></head>
  <body>
    <h1>Welcome</h1>
    <p><a href="/auth/start">Sign in</a></p>
  </body>
</html>
"#;

/// GET /
async fn landing() -> Html<&'static str> {
    Html(LANDING_PAGE)
}

/// GET /health
async fn health() -> &'static str {
    "OK"
}

/// GET /auth/start
async fn start(State(state): State<AppState>, jar: CookieJar) -> Response {
    let (jar, session) = state.session_or_new(jar);
    match state.controller.begin_login(&session).await {
        Ok(url) => (jar, found(url.as_str())).into_response(),
        Err(err) => {
            warn!(kind = err.kind(), error = %err, "Could not start login");
            (jar, HttpError::from(err)).into_response()
        }
    }
}

/// GET /auth/callback
async fn callback(
    State(state): State<AppState>,
    jar: CookieJar,
    query: Result<Query<CallbackParams>, QueryRejection>,
) -> Response {
    // An unparseable query still consumes the attempt, as an invalid_request callback.
    let params = match query {
        Ok(Query(params)) => params,
        Err(rejection) => {
            warn!(error = %rejection, "Rejected callback query");
            CallbackParams::with_error("invalid_request")
        }
    };

    // A callback without a session cookie still runs, and fails as MissingNonce.
    let session = state
        .existing_session(&jar)
        .unwrap_or_else(|| Session::new(SessionId::generate(), state.sessions.clone()));

    match state.controller.complete_login(&session, &params).await {
        Ok(claims) => Json(LoginSummary {
            authenticated: true,
            subject: claims.subject,
            email: claims.email,
            name: claims.name,
            picture: claims.picture,
        })
        .into_response(),
        Err(_) => found(&state.controller.settings().failure_redirect),
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(landing))
        .route("/health", get(health))
        .route("/auth/start", get(start))
        .route("/auth/callback", get(callback))
        .layer(default_trace())
        .with_state(state)
}
