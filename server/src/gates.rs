use axum::http::{
    HeaderMap,
    header::{COOKIE, HeaderValue, SET_COOKIE},
};
use axum::response::Response;
use minibox_auth::{AuthContext, AuthGate};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const COOKIE_NAME: &str = "session_id";
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// One gate per browser, keyed by the `session_id` cookie. Every gate shares
/// the context's HTTP client and JWKS cache.
///
/// Gates that have been idle for longer than the idle timeout and hold no
/// live session are dropped whenever a new browser shows up.
#[derive(Clone)]
pub struct GateRegistry {
    context: AuthContext,
    idle_timeout: Duration,
    gates: Arc<Mutex<HashMap<String, Entry>>>,
}

struct Entry {
    gate: Arc<AuthGate>,
    last_seen: Instant,
}

impl Entry {
    fn touch(&mut self) -> Arc<AuthGate> {
        self.last_seen = Instant::now();
        self.gate.clone()
    }

    fn is_stale(&self, idle_timeout: Duration, now: i64) -> bool {
        let live = self
            .gate
            .session()
            .tokens()
            .is_some_and(|tokens| !tokens.is_expired_at(now));
        !live && self.last_seen.elapsed() >= idle_timeout
    }
}

/// A browser's gate, and whether its cookie still has to be set.
pub struct BrowserGate {
    pub id: String,
    pub gate: Arc<AuthGate>,
    pub is_new: bool,
}

impl GateRegistry {
    pub fn new(context: AuthContext) -> Self {
        Self {
            context,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            gates: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// The gate for the browser sending `headers`, created on first visit.
    pub fn for_request(&self, headers: &HeaderMap) -> minibox_auth::Result<BrowserGate> {
        let mut gates = self.gates.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(id) = session_cookie(headers) {
            if let Some(entry) = gates.get_mut(id) {
                return Ok(BrowserGate {
                    id: id.to_string(),
                    gate: entry.touch(),
                    is_new: false,
                });
            }
        }

        let now = chrono::Utc::now().timestamp();
        let before = gates.len();
        gates.retain(|_, entry| !entry.is_stale(self.idle_timeout, now));
        if gates.len() < before {
            tracing::debug!("evicted {} idle browser sessions", before - gates.len());
        }

        let id = minibox_auth::random::random_hex(16)?;
        let gate = Arc::new(self.context.gate());
        gates.insert(
            id.clone(),
            Entry {
                gate: gate.clone(),
                last_seen: Instant::now(),
            },
        );
        tracing::debug!("new browser session, {} active", gates.len());

        Ok(BrowserGate {
            id,
            gate,
            is_new: true,
        })
    }

    /// Existing gate only; never creates one.
    pub fn existing(&self, headers: &HeaderMap) -> Option<Arc<AuthGate>> {
        let id = session_cookie(headers)?;
        let mut gates = self.gates.lock().unwrap_or_else(|e| e.into_inner());
        gates.get_mut(id).map(Entry::touch)
    }

    pub fn remove(&self, headers: &HeaderMap) -> Option<Arc<AuthGate>> {
        let id = session_cookie(headers)?;
        let mut gates = self.gates.lock().unwrap_or_else(|e| e.into_inner());
        gates.remove(id).map(|entry| entry.gate)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.gates.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl BrowserGate {
    /// Attach the session cookie to `response` if the browser lacks it.
    pub fn set_cookie(&self, mut response: Response) -> Response {
        if self.is_new {
            let cookie = format!("{}={}; Path=/; HttpOnly; SameSite=Lax", COOKIE_NAME, self.id);
            if let Ok(value) = HeaderValue::from_str(&cookie) {
                response.headers_mut().append(SET_COOKIE, value);
            }
        }
        response
    }
}

fn session_cookie(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .find_map(|cookie| {
            let cookie = cookie.trim();
            cookie
                .strip_prefix(COOKIE_NAME)
                .and_then(|rest| rest.strip_prefix('='))
        })
        .filter(|id| !id.is_empty())
}
