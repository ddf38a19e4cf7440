//! Web server for the PyroGuard dashboard.
//!
//! Provides the operator dashboard using:
//! - Axum for HTTP server
//! - SSE (Server-Sent Events) pushing a JSON view after every state change
//! - Leaflet for the map
//!
//! Every page load creates its own session actor. A session outlives short
//! stream drops and is reaped once no stream has been attached for a grace
//! period, so a reload starts from defaults.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{
        Html,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::WatchStream;

use crate::client::{BackendClient, Endpoints, http_client};
use crate::dashboard::DashboardView;
use crate::errors::PyroguardError;
use crate::models::AssessmentRequest;
use crate::orchestrator::{Command, SessionHandle, spawn_session};
use crate::resolver::LocationResolver;
use crate::sync::FormField;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub endpoints: Endpoints,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "127.0.0.1".to_string(),
            endpoints: Endpoints::default(),
        }
    }
}

/// How long a session survives with no event stream attached. Covers the
/// gap between `POST /sessions` and the first stream as well as
/// `EventSource` reconnects.
const SESSION_GRACE: Duration = Duration::from_secs(30);

struct SessionEntry {
    handle: SessionHandle,
    streams: usize,
    /// Bumped every time the last stream detaches
    detached: u64,
}

/// Live sessions, reaped once they stay detached for the grace period.
struct SessionRegistry {
    entries: Mutex<HashMap<u64, SessionEntry>>,
    grace: Duration,
}

type Sessions = Arc<SessionRegistry>;

impl SessionRegistry {
    fn new(grace: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            grace,
        }
    }

    fn insert(self: &Arc<Self>, id: u64, handle: SessionHandle) -> Result<(), StatusCode> {
        self.entries
            .lock()
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            .insert(
                id,
                SessionEntry {
                    handle,
                    streams: 0,
                    detached: 0,
                },
            );
        self.schedule_reap(id, 0);
        Ok(())
    }

    fn get(&self, id: u64) -> Option<SessionHandle> {
        let entries = self.entries.lock().ok()?;
        entries.get(&id).map(|entry| entry.handle.clone())
    }

    /// Register a new event stream for `id`.
    fn attach(self: &Arc<Self>, id: u64) -> Option<(SessionHandle, SessionGuard)> {
        let mut entries = self.entries.lock().ok()?;
        let entry = entries.get_mut(&id)?;
        entry.streams += 1;
        let guard = SessionGuard {
            sessions: Arc::clone(self),
            id,
        };
        Some((entry.handle.clone(), guard))
    }

    fn detach(self: &Arc<Self>, id: u64) {
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        let Some(entry) = entries.get_mut(&id) else {
            return;
        };
        entry.streams = entry.streams.saturating_sub(1);
        if entry.streams == 0 {
            entry.detached += 1;
            let generation = entry.detached;
            drop(entries);
            tracing::debug!("session {} detached", id);
            self.schedule_reap(id, generation);
        }
    }

    /// Remove `id` after the grace period unless a stream attached since
    /// detach number `generation`.
    fn schedule_reap(self: &Arc<Self>, id: u64, generation: u64) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let registry = Arc::clone(self);
        runtime.spawn(async move {
            tokio::time::sleep(registry.grace).await;
            let Ok(mut entries) = registry.entries.lock() else {
                return;
            };
            let idle = entries
                .get(&id)
                .is_some_and(|entry| entry.streams == 0 && entry.detached == generation);
            if idle {
                // Dropping the last handle stops the actor
                entries.remove(&id);
                tracing::info!("session {} closed", id);
            }
        });
    }

    fn len(&self) -> usize {
        self.entries.lock().map_or(0, |entries| entries.len())
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    backend: Arc<BackendClient>,
    resolver: Arc<LocationResolver>,
    sessions: Sessions,
    next_session: Arc<AtomicU64>,
}

impl AppState {
    /// Build the shared clients for `endpoints`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialized.
    pub fn new(endpoints: &Endpoints) -> Result<Self, PyroguardError> {
        Self::with_session_grace(endpoints, SESSION_GRACE)
    }

    fn with_session_grace(endpoints: &Endpoints, grace: Duration) -> Result<Self, PyroguardError> {
        let client = http_client()?;
        Ok(Self {
            backend: Arc::new(BackendClient::new(client.clone(), endpoints.backend.clone())),
            resolver: Arc::new(LocationResolver::new(
                client,
                endpoints.geocoder.clone(),
                endpoints.weather.clone(),
            )),
            sessions: Arc::new(SessionRegistry::new(grace)),
            next_session: Arc::new(AtomicU64::new(0)),
        })
    }

    fn session(&self, id: u64) -> Option<SessionHandle> {
        self.sessions.get(id)
    }
}

/// Detaches one event stream from its session when dropped.
struct SessionGuard {
    sessions: Sessions,
    id: u64,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.sessions.detach(self.id);
    }
}

/// Create the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/sessions", post(create_session_handler))
        .route("/sessions/{id}/stream", get(sse_handler))
        .route("/sessions/{id}/view", get(view_handler))
        .route("/sessions/{id}/search", post(search_handler))
        .route("/sessions/{id}/fields", post(field_handler))
        .route("/sessions/{id}/submit", post(submit_handler))
        .route("/sessions/{id}/assess", post(assess_handler))
        .route("/sessions/{id}/layout", post(layout_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Start the web server.
pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let state = AppState::new(&config.endpoints)?;
    let app = create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("🔥 PyroGuard dashboard starting at http://{}", addr);
    tracing::info!("prediction backend: {}", config.endpoints.backend);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Route Handlers
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct SessionCreated {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct SearchBody {
    query: String,
}

#[derive(Debug, Deserialize)]
struct FieldBody {
    field: FormField,
    /// Missing or null means the input was cleared
    value: Option<f64>,
}

/// Main page handler - serves the HTML UI.
async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Create a session and run its bootstrap fetches.
async fn create_session_handler(
    State(state): State<AppState>,
) -> Result<Json<SessionCreated>, StatusCode> {
    let id = state.next_session.fetch_add(1, Ordering::Relaxed) + 1;
    let handle = spawn_session(Arc::clone(&state.backend), Arc::clone(&state.resolver));
    handle
        .send(Command::Bootstrap)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    state.sessions.insert(id, handle)?;
    tracing::info!("session {} opened ({} live)", id, state.sessions.len());

    Ok(Json(SessionCreated { id }))
}

/// SSE stream of dashboard views for one session.
async fn sse_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>, StatusCode> {
    let (handle, guard) = state.sessions.attach(id).ok_or(StatusCode::NOT_FOUND)?;

    let stream = WatchStream::new(handle.subscribe()).filter_map(move |view| {
        let _ = &guard;
        match Event::default().event("view").json_data(&view) {
            Ok(event) => Some(Ok(event)),
            Err(e) => {
                tracing::warn!("failed to encode view: {}", e);
                None
            }
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Current view as JSON.
async fn view_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<DashboardView>, StatusCode> {
    let handle = state.session(id).ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(handle.snapshot()))
}

async fn dispatch(state: &AppState, id: u64, command: Command) -> StatusCode {
    let Some(handle) = state.session(id) else {
        return StatusCode::NOT_FOUND;
    };
    match handle.send(command).await {
        Ok(()) => StatusCode::ACCEPTED,
        Err(_) => StatusCode::GONE,
    }
}

async fn search_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(body): Json<SearchBody>,
) -> StatusCode {
    dispatch(&state, id, Command::Search(body.query)).await
}

async fn field_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(body): Json<FieldBody>,
) -> StatusCode {
    let command = Command::EditField {
        field: body.field,
        value: body.value.unwrap_or(0.0),
    };
    dispatch(&state, id, command).await
}

async fn submit_handler(State(state): State<AppState>, Path(id): Path<u64>) -> StatusCode {
    dispatch(&state, id, Command::SubmitForm).await
}

async fn assess_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(request): Json<AssessmentRequest>,
) -> StatusCode {
    dispatch(&state, id, Command::Submit(request)).await
}

async fn layout_handler(State(state): State<AppState>, Path(id): Path<u64>) -> StatusCode {
    dispatch(&state, id, Command::LayoutChanged).await
}

/// Health check endpoint.
async fn health_handler() -> &'static str {
    "OK"
}

// ============================================================================
// HTML Template (embedded for single-binary deployment)
// ============================================================================

const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>PyroGuard — Fire Risk Dashboard</title>

    <link rel="preconnect" href="https://fonts.googleapis.com">
    <link rel="preconnect" href="https://fonts.gstatic.com" crossorigin>
    <link href="https://fonts.googleapis.com/css2?family=Inter:wght@400;500;600;700&display=swap" rel="stylesheet">

    <!-- Leaflet -->
    <link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css" />
    <script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"></script>

    <style>
        :root {
            --bg: #0b0b0f;
            --card: rgba(255,255,255,0.04);
            --border: rgba(255,255,255,0.10);
            --text: #e5e7eb;
            --muted: #9ca3af;
            --accent: #f97316;
        }
        * { box-sizing: border-box; }
        body { margin: 0; background: var(--bg); color: var(--text); font-family: 'Inter', system-ui, sans-serif; }
        header { display: flex; align-items: center; justify-content: space-between; padding: 24px 48px; }
        h1 { margin: 0; font-size: 28px; }
        .subtitle { color: var(--muted); font-size: 14px; }
        .status-pill { border: 1px solid var(--border); border-radius: 999px; padding: 6px 14px; font-size: 13px; color: var(--muted); }
        main { display: grid; grid-template-columns: 4fr 8fr; gap: 32px; padding: 0 48px 48px; }
        @media (max-width: 1000px) { main { grid-template-columns: 1fr; padding: 0 16px 32px; } }
        .card { background: var(--card); border: 1px solid var(--border); border-radius: 16px; padding: 24px; }
        .stack { display: flex; flex-direction: column; gap: 24px; }
        label { display: block; font-size: 13px; color: var(--muted); margin: 12px 0 4px; }
        input { width: 100%; background: rgba(255,255,255,0.05); border: 1px solid var(--border); border-radius: 10px; padding: 10px 12px; color: var(--text); font-size: 15px; }
        button { background: var(--accent); color: white; border: 0; border-radius: 10px; padding: 12px; font-weight: 600; cursor: pointer; width: 100%; margin-top: 16px; }
        button:disabled { opacity: 0.5; cursor: wait; }
        .search { display: flex; gap: 8px; max-width: 520px; margin: 0 auto 24px; }
        .search button { width: auto; margin: 0; padding: 0 20px; }
        .gauge { position: relative; width: 200px; height: 100px; overflow: hidden; margin: 0 auto; }
        .gauge .track, .gauge .arc { position: absolute; top: 0; left: 0; width: 200px; height: 200px; border-radius: 50%; border: 14px solid rgba(255,255,255,0.1); }
        .gauge .arc { border-color: transparent; border-top-color: var(--band); border-left-color: var(--band); transform: rotate(-180deg); transform-origin: 50% 50%; }
        .pct { font-size: 48px; font-weight: 700; text-align: center; margin-top: 8px; }
        .badge { display: block; width: fit-content; margin: 8px auto 0; padding: 4px 14px; border-radius: 999px; border: 1px solid var(--band); color: var(--band); font-weight: 700; text-transform: uppercase; letter-spacing: 0.05em; font-size: 13px; }
        .advisory { color: var(--muted); text-align: center; font-size: 14px; margin-top: 16px; }
        #result-card { display: none; }
        #map { height: 400px; border-radius: 12px; }
        #trend { width: 100%; height: 160px; }
        .toast { position: fixed; bottom: 24px; left: 50%; transform: translateX(-50%); background: #7f1d1d; color: white; padding: 12px 20px; border-radius: 10px; display: none; }
        .place { color: var(--muted); text-align: center; font-size: 13px; margin-top: 8px; }
    </style>
</head>
<body>
    <header>
        <div>
            <h1>🔥 PyroGuard</h1>
            <div class="subtitle">Forest fire risk assessment</div>
        </div>
        <div class="status-pill" id="status">Connecting…</div>
    </header>

    <form class="search" id="search-form">
        <input type="text" id="city" placeholder="Search city for real-time risk analysis...">
        <button type="submit" id="locate">📍 Locate</button>
    </form>

    <main>
        <div class="stack">
            <form class="card" id="params-form">
                <h2>Environmental Data</h2>
                <label for="temperature">🌡 Temperature (°C)</label>
                <input type="number" step="0.1" name="temperature" id="temperature" required>
                <label for="humidity">💧 Humidity (%)</label>
                <input type="number" step="0.1" name="humidity" id="humidity" required>
                <label for="wind_speed">🌬 Wind Speed (km/h)</label>
                <input type="number" step="0.1" name="wind_speed" id="wind_speed" required>
                <label for="rainfall">🌧 Rainfall (mm)</label>
                <input type="number" step="0.1" name="rainfall" id="rainfall" required>
                <label for="vegetation">🌳 Vegetation Index (0-1)</label>
                <input type="number" step="0.01" min="0" max="1" name="vegetation" id="vegetation" required>
                <button type="submit" id="analyze">Analyze Risk</button>
            </form>

            <div class="card">
                <h3>30-Day Risk Trend</h3>
                <svg id="trend" viewBox="0 0 300 100" preserveAspectRatio="none">
                    <polyline id="trend-line" fill="none" stroke="#f97316" stroke-width="2" points=""></polyline>
                    <g id="trend-points" fill="#f97316"></g>
                </svg>
            </div>
        </div>

        <div class="stack">
            <div class="card" id="result-card">
                <h3 style="text-align:center">Fire Risk Assessment</h3>
                <div class="gauge"><div class="track"></div><div class="arc" id="arc"></div></div>
                <div class="pct" id="pct">0%</div>
                <span class="badge" id="badge"></span>
                <p class="advisory" id="advisory"></p>
                <p class="place" id="place"></p>
            </div>

            <div class="card">
                <h2>🗺 Live Surveillance</h2>
                <div id="map"></div>
            </div>
        </div>
    </main>

    <div class="toast" id="toast"></div>

    <script>
        const FIELDS = ['temperature', 'humidity', 'wind_speed', 'rainfall', 'vegetation'];
        let session = null;
        let events = null;
        let map = null;
        let markerLayer = null;
        let queue = Promise.resolve();
        let seen = {};

        // Commands are sent strictly in order
        function post(path, body) {
            queue = queue.then(() => fetch(`/sessions/${session}/${path}`, {
                method: 'POST',
                headers: { 'Content-Type': 'application/json' },
                body: body === undefined ? null : JSON.stringify(body),
            })).then(res => {
                // Session was reaped: start over like a reload
                if (res.status === 404 || res.status === 410) return connect();
            }).catch(e => console.error(path, e));
            return queue;
        }

        function setStatus(text) {
            document.getElementById('status').textContent = text;
        }

        function renderFields(v) {
            const values = {
                temperature: v.fields.temperature,
                humidity: v.fields.humidity,
                wind_speed: v.fields.wind_speed,
                rainfall: v.fields.rainfall,
                vegetation: v.fields.vegetation,
            };
            for (const name of FIELDS) {
                const input = document.getElementById(name);
                if (document.activeElement !== input) input.value = values[name];
            }
            const analyze = document.getElementById('analyze');
            analyze.disabled = v.loading;
            analyze.textContent = v.loading ? 'Analyzing…' : 'Analyze Risk';
            document.getElementById('locate').disabled = v.resolving;
        }

        function renderGauge(v) {
            if (!v.gauge) return;
            const card = document.getElementById('result-card');
            card.style.display = 'block';
            card.style.setProperty('--band', v.gauge.reading.color);
            document.getElementById('pct').textContent = `${v.gauge.reading.display_percentage}%`;
            document.getElementById('badge').textContent = `${v.gauge.risk_label} Risk`;
            document.getElementById('advisory').textContent = v.gauge.advisory || '';
            document.getElementById('place').textContent = v.last_place || '';

            const sweep = JSON.stringify(v.gauge.sweep);
            if (sweep === seen.sweep) return;
            seen.sweep = sweep;
            const arc = document.getElementById('arc');
            arc.style.transition = 'none';
            arc.style.transform = `rotate(${v.gauge.sweep.from_angle}deg)`;
            void arc.offsetWidth;
            arc.style.transition = `transform ${v.gauge.sweep.duration_ms}ms cubic-bezier(0.33, 1, 0.68, 1)`;
            arc.style.transform = `rotate(${v.gauge.sweep.to_angle}deg)`;
        }

        function renderMap(m) {
            if (m.fly_to && m.fly_to.generation > seen.fly) {
                seen.fly = m.fly_to.generation;
                map.flyTo([m.fly_to.target.lat, m.fly_to.target.lng], m.zoom, { duration: m.fly_to.duration_ms / 1000 });
            }
            if (m.marker_generation !== seen.markers) {
                seen.markers = m.marker_generation;
                markerLayer.clearLayers();
                for (const mk of m.markers) {
                    L.circleMarker([mk.position.lat, mk.position.lng], {
                        radius: mk.radius, color: mk.color, fillColor: mk.color, fillOpacity: mk.fill_opacity,
                    }).bindPopup(mk.label).addTo(markerLayer);
                }
            }
            if (m.invalidate.generation > seen.invalidate) {
                seen.invalidate = m.invalidate.generation;
                setTimeout(() => map.invalidateSize(), m.invalidate.delay_ms);
            }
        }

        function renderTrend(points) {
            const key = JSON.stringify(points);
            if (!points.length || key === seen.trend) return;
            seen.trend = key;
            const step = points.length > 1 ? 300 / (points.length - 1) : 0;
            const xy = points.map((p, i) => [i * step, 100 - p.risk * 100]);
            document.getElementById('trend-line')
                .setAttribute('points', xy.map(([x, y]) => `${x.toFixed(1)},${y.toFixed(1)}`).join(' '));

            // Hover readout per day
            const dots = document.getElementById('trend-points');
            dots.replaceChildren();
            const ns = 'http://www.w3.org/2000/svg';
            points.forEach((p, i) => {
                const dot = document.createElementNS(ns, 'circle');
                dot.setAttribute('cx', xy[i][0].toFixed(1));
                dot.setAttribute('cy', xy[i][1].toFixed(1));
                dot.setAttribute('r', '3');
                const title = document.createElementNS(ns, 'title');
                title.textContent = `${p.day}: ${Math.round(p.risk * 100)}% risk`;
                dot.appendChild(title);
                dots.appendChild(dot);
            });
        }

        function renderStats(s) {
            const parts = [`${s.applied}/${s.issued} assessments`];
            if (s.superseded) parts.push(`${s.superseded} superseded`);
            if (s.failed) parts.push(`${s.failed} failed`);
            setStatus(`● System Active · ${parts.join(' · ')}`);
        }

        function renderNotice(n) {
            if (!n || n.id <= seen.notice) return;
            seen.notice = n.id;
            const toast = document.getElementById('toast');
            toast.textContent = n.message;
            toast.style.display = 'block';
            setTimeout(() => { toast.style.display = 'none'; }, 4000);
        }

        function render(v) {
            renderFields(v);
            renderGauge(v);
            renderMap(v.map);
            renderTrend(v.history);
            renderNotice(v.notice);
            renderStats(v.stats);
        }

        // Open a fresh session and follow its views. EventSource retries on
        // its own; once the server has forgotten the session the stream is
        // closed for good and a new session is opened instead.
        async function connect() {
            if (events) events.close();
            seen = { fly: 0, markers: 0, invalidate: 0, notice: 0, sweep: '', trend: '' };
            try {
                const res = await fetch('/sessions', { method: 'POST' });
                session = (await res.json()).id;
            } catch (e) {
                setStatus('○ Disconnected');
                setTimeout(connect, 3000);
                return;
            }

            const stream = new EventSource(`/sessions/${session}/stream`);
            events = stream;
            stream.addEventListener('view', e => render(JSON.parse(e.data)));
            stream.onopen = () => setStatus('● System Active');
            stream.onerror = () => {
                setStatus('○ Disconnected');
                if (stream === events && stream.readyState === EventSource.CLOSED) {
                    setTimeout(connect, 1000);
                }
            };
        }

        async function start() {
            map = L.map('map', { scrollWheelZoom: false }).setView([37.7749, -122.4194], 6);
            L.tileLayer('https://{s}.basemaps.cartocdn.com/dark_all/{z}/{x}/{y}{r}.png', {
                attribution: '&copy; OpenStreetMap contributors',
            }).addTo(map);
            markerLayer = L.layerGroup().addTo(map);
            await connect();

            for (const name of FIELDS) {
                document.getElementById(name).addEventListener('change', e => {
                    const raw = e.target.value;
                    post('fields', { field: name, value: raw === '' ? null : parseFloat(raw) });
                });
            }
            document.getElementById('params-form').addEventListener('submit', e => {
                e.preventDefault();
                post('submit');
            });
            document.getElementById('search-form').addEventListener('submit', e => {
                e.preventDefault();
                const input = document.getElementById('city');
                if (!input.value.trim()) return;
                post('search', { query: input.value });
                input.value = '';
            });
            window.addEventListener('resize', () => post('layout'));
        }

        start();
    </script>
</body>
</html>
"##;
