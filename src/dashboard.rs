//! Dashboard state record.
//!
//! One owned record holds everything the page shows: the current result,
//! the form, the resolved location, the map and the trend. Mutation only
//! happens through the methods below; renderers read a [`DashboardView`].

use std::time::Instant;

use serde::Serialize;

use crate::errors::PyroguardError;
use crate::gauge::{self, GaugeAnimation, GaugeView};
use crate::map::{MapFocusController, MapView};
use crate::models::{AssessmentRequest, AssessmentResult, HistoryPoint, Hotspot, WeatherObservation};
use crate::sync::{FormField, InputSynchronizer};

/// Issue-order handle for one outgoing assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    pub seq: u64,
}

/// What happened to a completed assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Became the current result
    Current,
    /// A later-completing result was already shown
    Superseded,
    /// Request failed; previous result kept
    Failed,
}

/// User-visible failure message. `id` increases with every notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub id: u64,
    pub message: String,
}

/// Issue-order handle for one city lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupTicket {
    pub seq: u64,
}

/// Session counters, rendered in the page's status pill.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub issued: u64,
    pub applied: u64,
    pub superseded: u64,
    pub failed: u64,
    pub auto_triggers: u64,
    pub resolutions: u64,
    /// Lookups answered after a newer search was issued
    pub stale_lookups: u64,
}

/// Read-only snapshot handed to renderers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardView {
    pub loading: bool,
    pub resolving: bool,
    pub result: Option<AssessmentResult>,
    pub gauge: Option<GaugeView>,
    pub fields: AssessmentRequest,
    pub last_place: Option<String>,
    pub observation: Option<WeatherObservation>,
    pub history: Vec<HistoryPoint>,
    pub map: MapView,
    pub notice: Option<Notice>,
    pub stats: Stats,
}

#[derive(Debug)]
pub struct DashboardState {
    result: Option<AssessmentResult>,
    gauge: Option<GaugeView>,
    needle: GaugeAnimation,
    /// Completion stamp of the current result
    applied_stamp: u64,
    in_flight: usize,
    pending_resolutions: usize,
    /// Sequence of the most recently issued lookup
    lookup_seq: u64,
    history: Vec<HistoryPoint>,
    observation: Option<WeatherObservation>,
    form: InputSynchronizer,
    map: MapFocusController,
    notice: Option<Notice>,
    next_notice: u64,
    stats: Stats,
}

impl DashboardState {
    #[must_use]
    pub fn new(now: Instant) -> Self {
        Self {
            result: None,
            gauge: None,
            needle: GaugeAnimation::new(now),
            applied_stamp: 0,
            in_flight: 0,
            pending_resolutions: 0,
            lookup_seq: 0,
            history: Vec::new(),
            observation: None,
            form: InputSynchronizer::new(),
            map: MapFocusController::new(),
            notice: None,
            next_notice: 0,
            stats: Stats::default(),
        }
    }

    /// Validate and register an outgoing assessment; sets the loading flag.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` (and raises a notice) if the request cannot
    /// be sent.
    pub fn begin_assessment(
        &mut self,
        request: AssessmentRequest,
    ) -> Result<(Ticket, AssessmentRequest), PyroguardError> {
        let request = match request.validated() {
            Ok(request) => request,
            Err(e) => {
                self.notify(&e);
                return Err(e);
            }
        };

        self.stats.issued += 1;
        self.in_flight += 1;
        Ok((Ticket { seq: self.stats.issued }, request))
    }

    /// Apply a finished assessment.
    ///
    /// `stamp` is the completion order: the result with the highest stamp
    /// is the one shown, regardless of issue order.
    pub fn complete_assessment(
        &mut self,
        ticket: Ticket,
        stamp: u64,
        outcome: Result<AssessmentResult, PyroguardError>,
        now: Instant,
    ) -> Applied {
        self.in_flight = self.in_flight.saturating_sub(1);

        match outcome {
            Ok(result) if stamp > self.applied_stamp => {
                tracing::debug!(
                    "assessment #{} applied (p={:.2}, stamp {})",
                    ticket.seq,
                    result.probability,
                    stamp
                );
                self.gauge = Some(gauge::present(&result, &mut self.needle, now));
                self.result = Some(result);
                self.applied_stamp = stamp;
                self.stats.applied += 1;
                Applied::Current
            }
            Ok(_) => {
                tracing::debug!(
                    "assessment #{} superseded (stamp {} <= {})",
                    ticket.seq,
                    stamp,
                    self.applied_stamp
                );
                self.stats.superseded += 1;
                Applied::Superseded
            }
            Err(e) => {
                tracing::warn!("assessment #{} failed: {}", ticket.seq, e);
                self.stats.failed += 1;
                self.notify(&e);
                Applied::Failed
            }
        }
    }

    /// A city search was started. Only the newest search may move the
    /// dashboard.
    pub fn begin_resolution(&mut self) -> LookupTicket {
        self.pending_resolutions += 1;
        self.lookup_seq += 1;
        LookupTicket {
            seq: self.lookup_seq,
        }
    }

    /// Settle a lookup; false when a newer search superseded it.
    fn settle_lookup(&mut self, ticket: LookupTicket) -> bool {
        self.pending_resolutions = self.pending_resolutions.saturating_sub(1);
        if ticket.seq < self.lookup_seq {
            tracing::debug!(
                "lookup #{} dropped, #{} is newer",
                ticket.seq,
                self.lookup_seq
            );
            self.stats.stale_lookups += 1;
            return false;
        }
        true
    }

    /// Store a resolved observation, move the map and reconcile the form.
    ///
    /// Returns the request to auto-submit when the place is new. Results of
    /// superseded searches change nothing.
    pub fn location_resolved(
        &mut self,
        ticket: LookupTicket,
        observation: WeatherObservation,
        now: Instant,
    ) -> Option<AssessmentRequest> {
        if !self.settle_lookup(ticket) {
            return None;
        }
        self.stats.resolutions += 1;

        self.map.focus(observation.coordinates().into(), now);
        let auto = self.form.reconcile(&observation).auto_request();
        self.observation = Some(observation);
        auto
    }

    /// A city search failed. Nothing but the notice changes.
    pub fn resolution_failed(&mut self, ticket: LookupTicket, error: &PyroguardError) {
        if !self.settle_lookup(ticket) {
            return;
        }
        tracing::warn!("location lookup failed: {}", error);
        self.notify(error);
    }

    pub fn history_loaded(&mut self, outcome: Result<Vec<HistoryPoint>, PyroguardError>) {
        match outcome {
            Ok(points) => self.history = points,
            Err(e) => tracing::warn!("history unavailable, chart stays empty: {}", e),
        }
    }

    pub fn hotspots_loaded(&mut self, outcome: Result<Vec<Hotspot>, PyroguardError>) {
        match outcome {
            Ok(spots) => {
                self.map.set_hotspots(&spots);
            }
            Err(e) => tracing::warn!("hotspots unavailable, map stays empty: {}", e),
        }
    }

    /// Manual edit of one form field.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` (and raises a notice) for non-finite values.
    pub fn edit_field(&mut self, field: FormField, value: f64) -> Result<(), PyroguardError> {
        if !value.is_finite() {
            let err = PyroguardError::InvalidRequest(format!(
                "{} must be a finite number",
                field.as_str()
            ));
            self.notify(&err);
            return Err(err);
        }
        self.form.edit(field, value);
        Ok(())
    }

    /// Current form values for a manual submit.
    #[must_use]
    pub fn form_request(&self) -> AssessmentRequest {
        self.form.fields()
    }

    pub fn layout_changed(&mut self) {
        self.map.layout_changed();
    }

    fn notify(&mut self, error: &PyroguardError) {
        self.next_notice += 1;
        self.notice = Some(Notice {
            id: self.next_notice,
            message: error.user_message(),
        });
    }

    #[must_use]
    pub fn view(&self) -> DashboardView {
        DashboardView {
            loading: self.in_flight > 0,
            resolving: self.pending_resolutions > 0,
            result: self.result.clone(),
            gauge: self.gauge.clone(),
            fields: self.form.fields(),
            last_place: self.form.last_place().map(str::to_string),
            observation: self.observation.clone(),
            history: self.history.clone(),
            map: self.map.view(),
            notice: self.notice.clone(),
            stats: Stats {
                auto_triggers: self.form.auto_triggers(),
                ..self.stats
            },
        }
    }
}
