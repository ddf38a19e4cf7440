//! Session actor.
//!
//! Each dashboard session is one tokio task that owns a [`DashboardState`]
//! and processes commands and request completions one at a time. Outbound
//! calls run as spawned tasks and post their completion back over a
//! channel; the actor publishes a fresh [`DashboardView`] after every event.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::client::PredictionService;
use crate::dashboard::{DashboardState, DashboardView, LookupTicket, Ticket};
use crate::errors::PyroguardError;
use crate::models::{AssessmentRequest, AssessmentResult, HistoryPoint, Hotspot, WeatherObservation};
use crate::resolver::LocationLookup;
use crate::sync::FormField;

/// Bounded command queue per session.
const COMMAND_BUFFER: usize = 64;

/// Operations a session accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Fetch history and hotspots
    Bootstrap,
    /// Send an explicit request
    Submit(AssessmentRequest),
    /// Send the current form values
    SubmitForm,
    /// Manual edit of one form field
    EditField { field: FormField, value: f64 },
    /// Resolve a city and auto-assess it
    Search(String),
    /// Map container resized
    LayoutChanged,
}

enum Completion {
    History(Result<Vec<HistoryPoint>, PyroguardError>),
    Hotspots(Result<Vec<Hotspot>, PyroguardError>),
    Assessment {
        ticket: Ticket,
        stamp: u64,
        outcome: Result<AssessmentResult, PyroguardError>,
    },
    Resolved {
        ticket: LookupTicket,
        outcome: Result<WeatherObservation, PyroguardError>,
    },
}

/// Cloneable handle to a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<DashboardView>,
}

impl SessionHandle {
    /// Queue a command.
    ///
    /// # Errors
    ///
    /// Returns `SessionClosed` if the actor has stopped.
    pub async fn send(&self, command: Command) -> Result<(), PyroguardError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| PyroguardError::SessionClosed)
    }

    /// Latest published view.
    #[must_use]
    pub fn snapshot(&self) -> DashboardView {
        self.view.borrow().clone()
    }

    /// Receiver that wakes on every published view.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<DashboardView> {
        self.view.clone()
    }
}

/// Start a session on the current tokio runtime.
///
/// The actor stops once every handle has been dropped.
pub fn spawn_session<P, L>(prediction: Arc<P>, resolver: Arc<L>) -> SessionHandle
where
    P: PredictionService,
    L: LocationLookup,
{
    let state = DashboardState::new(Instant::now());
    let (view_tx, view_rx) = watch::channel(state.view());
    let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
    let (done_tx, done_rx) = mpsc::unbounded_channel();

    let actor = Orchestrator {
        prediction,
        resolver,
        state,
        done_tx,
        completion_clock: Arc::new(AtomicU64::new(0)),
        view_tx,
    };
    tokio::spawn(actor.run(command_rx, done_rx));

    SessionHandle {
        commands: command_tx,
        view: view_rx,
    }
}

struct Orchestrator<P, L> {
    prediction: Arc<P>,
    resolver: Arc<L>,
    state: DashboardState,
    done_tx: mpsc::UnboundedSender<Completion>,
    /// Stamps assessments in the order they finish
    completion_clock: Arc<AtomicU64>,
    view_tx: watch::Sender<DashboardView>,
}

impl<P, L> Orchestrator<P, L>
where
    P: PredictionService,
    L: LocationLookup,
{
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut done: mpsc::UnboundedReceiver<Completion>,
    ) {
        debug!("session started");
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(completion) = done.recv() => self.handle_completion(completion),
            }
            self.view_tx.send_replace(self.state.view());
        }
        debug!("session ended");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Bootstrap => self.bootstrap(),
            Command::Submit(request) => self.submit(request),
            Command::SubmitForm => self.submit(self.state.form_request()),
            Command::EditField { field, value } => {
                // Rejections surface as a notice in the view
                let _ = self.state.edit_field(field, value);
            }
            Command::Search(query) => self.search(query),
            Command::LayoutChanged => self.state.layout_changed(),
        }
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::History(outcome) => self.state.history_loaded(outcome),
            Completion::Hotspots(outcome) => self.state.hotspots_loaded(outcome),
            Completion::Assessment {
                ticket,
                stamp,
                outcome,
            } => {
                self.state
                    .complete_assessment(ticket, stamp, outcome, Instant::now());
            }
            Completion::Resolved {
                ticket,
                outcome: Ok(observation),
            } => {
                info!("lookup #{} resolved '{}'", ticket.seq, observation.place_name);
                if let Some(request) =
                    self.state
                        .location_resolved(ticket, observation, Instant::now())
                {
                    self.submit(request);
                }
            }
            Completion::Resolved {
                ticket,
                outcome: Err(e),
            } => self.state.resolution_failed(ticket, &e),
        }
    }

    /// Fetch history and hotspots independently of each other.
    fn bootstrap(&self) {
        let prediction = Arc::clone(&self.prediction);
        let done = self.done_tx.clone();
        tokio::spawn(async move {
            let outcome = prediction.history().await;
            let _ = done.send(Completion::History(outcome));
        });

        let prediction = Arc::clone(&self.prediction);
        let done = self.done_tx.clone();
        tokio::spawn(async move {
            let outcome = prediction.hotspots().await;
            let _ = done.send(Completion::Hotspots(outcome));
        });
    }

    fn submit(&mut self, request: AssessmentRequest) {
        let Ok((ticket, request)) = self.state.begin_assessment(request) else {
            return;
        };
        debug!("assessment #{} issued", ticket.seq);

        let prediction = Arc::clone(&self.prediction);
        let clock = Arc::clone(&self.completion_clock);
        let done = self.done_tx.clone();
        tokio::spawn(async move {
            let outcome = prediction
                .predict(request)
                .await
                .map_err(PyroguardError::into_assessment);
            let stamp = clock.fetch_add(1, Ordering::SeqCst) + 1;
            let _ = done.send(Completion::Assessment {
                ticket,
                stamp,
                outcome,
            });
        });
    }

    fn search(&mut self, query: String) {
        let query = query.trim().to_string();
        if query.is_empty() {
            return;
        }
        let ticket = self.state.begin_resolution();
        debug!("lookup #{} issued for '{}'", ticket.seq, query);

        let resolver = Arc::clone(&self.resolver);
        let done = self.done_tx.clone();
        tokio::spawn(async move {
            let outcome = resolver.resolve(query).await;
            let _ = done.send(Completion::Resolved { ticket, outcome });
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use tokio::sync::oneshot;

    use crate::models::RiskLevel;

    const WAIT: Duration = Duration::from_secs(5);

    /// Backend whose predictions echo `temperature / 100` as probability.
    /// Requests whose temperature has a gate wait until it is released.
    #[derive(Default)]
    struct FakeBackend {
        predictions: AtomicUsize,
        requests: Mutex<Vec<AssessmentRequest>>,
        gates: Mutex<HashMap<u64, oneshot::Receiver<()>>>,
        fail_history: bool,
        fail_hotspots: bool,
    }

    impl FakeBackend {
        fn gate(&self, temperature: f64) -> oneshot::Sender<()> {
            let (tx, rx) = oneshot::channel();
            self.gates
                .lock()
                .unwrap()
                .insert(temperature.to_bits(), rx);
            tx
        }
    }

    impl PredictionService for FakeBackend {
        async fn history(&self) -> Result<Vec<HistoryPoint>, PyroguardError> {
            if self.fail_history {
                return Err(PyroguardError::Api {
                    status: 500,
                    message: "history down".into(),
                });
            }
            Ok(vec![HistoryPoint {
                day: "Day 1".into(),
                risk: 0.3,
            }])
        }

        async fn hotspots(&self) -> Result<Vec<Hotspot>, PyroguardError> {
            if self.fail_hotspots {
                return Err(PyroguardError::Api {
                    status: 500,
                    message: "hotspots down".into(),
                });
            }
            Ok(vec![Hotspot {
                lat: 37.8,
                lng: -122.3,
                risk_level: RiskLevel::Critical,
            }])
        }

        async fn predict(&self, request: AssessmentRequest) -> Result<AssessmentResult, PyroguardError> {
            self.predictions.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request);
            let gate = self
                .gates
                .lock()
                .unwrap()
                .remove(&request.temperature.to_bits());
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            Ok(AssessmentResult {
                probability: request.temperature / 100.0,
                risk_level: RiskLevel::Medium,
                alert: false,
                analysis: Vec::new(),
            })
        }
    }

    struct FakeResolver;

    impl LocationLookup for FakeResolver {
        async fn resolve(&self, query: String) -> Result<WeatherObservation, PyroguardError> {
            let (temperature, lat, lng) = match query.as_str() {
                "Paris" => (22.0, 48.85, 2.35),
                "Lyon" => (27.0, 45.76, 4.83),
                _ => return Err(PyroguardError::ResolutionNotFound { query }),
            };
            Ok(WeatherObservation {
                temperature,
                humidity: 55.0,
                wind_speed: 10.0,
                rainfall: 0.0,
                lat,
                lng,
                place_name: query,
                observed_at: None,
            })
        }
    }

    /// Resolver where "Paris" waits until released.
    struct SlowParis {
        gate: Mutex<Option<oneshot::Receiver<()>>>,
    }

    impl LocationLookup for SlowParis {
        async fn resolve(&self, query: String) -> Result<WeatherObservation, PyroguardError> {
            if query == "Paris" {
                let gate = self.gate.lock().unwrap().take();
                if let Some(gate) = gate {
                    let _ = gate.await;
                }
            }
            FakeResolver.resolve(query).await
        }
    }

    async fn wait_for(
        handle: &SessionHandle,
        condition: impl FnMut(&DashboardView) -> bool,
    ) -> DashboardView {
        let mut rx = handle.subscribe();
        tokio::time::timeout(WAIT, rx.wait_for(condition))
            .await
            .expect("timed out waiting for view")
            .expect("session closed")
            .clone()
    }

    #[tokio::test]
    async fn test_search_auto_submits_once_per_place() {
        let backend = Arc::new(FakeBackend::default());
        let handle = spawn_session(Arc::clone(&backend), Arc::new(FakeResolver));

        handle.send(Command::Search("Paris".into())).await.unwrap();
        let view = wait_for(&handle, |v| v.result.is_some() && !v.loading).await;

        assert_eq!(view.fields.temperature, 22.0);
        assert_eq!(view.fields.vegetation_index, 0.5);
        assert_eq!(view.map.center.lat, 48.85);
        assert_eq!(view.map.center.lng, 2.35);
        assert_eq!(view.gauge.map(|g| g.reading.display_percentage), Some(22));

        handle.send(Command::Search("Paris".into())).await.unwrap();
        let view = wait_for(&handle, |v| v.stats.resolutions == 2 && !v.resolving).await;

        assert_eq!(view.stats.auto_triggers, 1);
        assert_eq!(backend.predictions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_distinct_places_submit_their_own_values() {
        let backend = Arc::new(FakeBackend::default());
        let handle = spawn_session(Arc::clone(&backend), Arc::new(FakeResolver));

        handle.send(Command::Search("Paris".into())).await.unwrap();
        wait_for(&handle, |v| v.stats.applied == 1).await;
        handle.send(Command::Search("Lyon".into())).await.unwrap();
        wait_for(&handle, |v| v.stats.applied == 2).await;

        let requests = backend.requests.lock().unwrap().clone();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].temperature, 22.0);
        assert_eq!(requests[1].temperature, 27.0);
        assert!(requests.iter().all(|r| r.vegetation_index == 0.5));
    }

    #[tokio::test]
    async fn test_manual_edit_does_not_retrigger() {
        let backend = Arc::new(FakeBackend::default());
        let handle = spawn_session(Arc::clone(&backend), Arc::new(FakeResolver));

        handle.send(Command::Search("Paris".into())).await.unwrap();
        wait_for(&handle, |v| v.stats.applied == 1).await;

        handle
            .send(Command::EditField {
                field: FormField::Vegetation,
                value: 0.9,
            })
            .await
            .unwrap();
        handle.send(Command::LayoutChanged).await.unwrap();
        let view = wait_for(&handle, |v| v.fields.vegetation_index == 0.9).await;

        assert_eq!(view.last_place.as_deref(), Some("Paris"));
        assert_eq!(backend.predictions.load(Ordering::SeqCst), 1);

        handle.send(Command::SubmitForm).await.unwrap();
        wait_for(&handle, |v| v.stats.applied == 2).await;
        let last = backend.requests.lock().unwrap().last().copied().unwrap();
        assert_eq!(last.vegetation_index, 0.9);
    }

    #[tokio::test]
    async fn test_last_completion_wins() {
        let backend = Arc::new(FakeBackend::default());
        let release_a = backend.gate(10.0);
        let release_b = backend.gate(20.0);
        let handle = spawn_session(Arc::clone(&backend), Arc::new(FakeResolver));

        let mut request = crate::sync::INITIAL_FIELDS;
        request.temperature = 10.0;
        handle.send(Command::Submit(request)).await.unwrap();
        request.temperature = 20.0;
        handle.send(Command::Submit(request)).await.unwrap();
        wait_for(&handle, |v| v.stats.issued == 2).await;

        release_b.send(()).unwrap();
        let view = wait_for(&handle, |v| v.stats.applied == 1).await;
        assert_eq!(view.result.map(|r| r.probability), Some(0.2));
        assert!(view.loading);

        release_a.send(()).unwrap();
        let view = wait_for(&handle, |v| v.stats.applied == 2).await;
        assert_eq!(view.result.map(|r| r.probability), Some(0.1));
        assert!(!view.loading);
    }

    #[tokio::test]
    async fn test_history_failure_does_not_block_hotspots() {
        let backend = Arc::new(FakeBackend {
            fail_history: true,
            ..FakeBackend::default()
        });
        let handle = spawn_session(backend, Arc::new(FakeResolver));

        handle.send(Command::Bootstrap).await.unwrap();
        let view = wait_for(&handle, |v| !v.map.markers.is_empty()).await;

        assert!(view.history.is_empty());
        assert!(view.notice.is_none());
    }

    #[tokio::test]
    async fn test_hotspot_failure_does_not_block_history() {
        let backend = Arc::new(FakeBackend {
            fail_hotspots: true,
            ..FakeBackend::default()
        });
        let handle = spawn_session(backend, Arc::new(FakeResolver));

        handle.send(Command::Bootstrap).await.unwrap();
        let view = wait_for(&handle, |v| !v.history.is_empty()).await;

        assert!(view.map.markers.is_empty());
        assert!(view.notice.is_none());
    }

    #[tokio::test]
    async fn test_older_search_finishing_last_is_ignored() {
        let backend = Arc::new(FakeBackend::default());
        let (release_paris, gate) = oneshot::channel();
        let resolver = Arc::new(SlowParis {
            gate: Mutex::new(Some(gate)),
        });
        let handle = spawn_session(Arc::clone(&backend), resolver);

        handle.send(Command::Search("Paris".into())).await.unwrap();
        handle.send(Command::Search("Lyon".into())).await.unwrap();
        let view = wait_for(&handle, |v| v.stats.applied == 1).await;
        assert_eq!(view.last_place.as_deref(), Some("Lyon"));

        release_paris.send(()).unwrap();
        let view = wait_for(&handle, |v| v.stats.stale_lookups == 1).await;

        assert!(!view.resolving);
        assert_eq!(view.last_place.as_deref(), Some("Lyon"));
        assert_eq!(view.map.center.lat, 45.76);
        assert_eq!(backend.predictions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_city_raises_notice_and_allows_retry() {
        let backend = Arc::new(FakeBackend::default());
        let handle = spawn_session(Arc::clone(&backend), Arc::new(FakeResolver));

        handle.send(Command::Search("Atlantis".into())).await.unwrap();
        let view = wait_for(&handle, |v| v.notice.is_some()).await;
        assert!(view.last_place.is_none());
        assert_eq!(backend.predictions.load(Ordering::SeqCst), 0);

        handle.send(Command::Search("   ".into())).await.unwrap();
        handle.send(Command::Search("Paris".into())).await.unwrap();
        let view = wait_for(&handle, |v| v.stats.applied == 1).await;
        assert_eq!(view.last_place.as_deref(), Some("Paris"));
    }
}
