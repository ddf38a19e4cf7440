//! Map focus controller.
//!
//! Reacts to two inputs: the active center coordinate and the hotspot
//! collection. A new center starts (or retargets) a camera flight; a new
//! hotspot set rebuilds the markers. Layout changes schedule a delayed
//! size invalidation so the map re-measures its container.

use std::time::{Duration, Instant};

use serde::Serialize;

use crate::models::{Hotspot, RiskLevel};

/// Fallback center until a location is resolved.
pub const DEFAULT_CENTER: LatLng = LatLng {
    lat: 37.7749,
    lng: -122.4194,
};

pub const DEFAULT_ZOOM: u8 = 6;

/// Camera flight length.
pub const FLY_DURATION: Duration = Duration::from_millis(1500);

/// Wait before re-measuring the container after a layout change.
pub const INVALIDATE_DELAY: Duration = Duration::from_millis(250);

const MARKER_RADIUS: u32 = 15;
const MARKER_FILL_OPACITY: f64 = 0.6;
const CRITICAL_COLOR: &str = "#ef4444";
const ELEVATED_COLOR: &str = "#f97316";

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl From<(f64, f64)> for LatLng {
    fn from((lat, lng): (f64, f64)) -> Self {
        Self { lat, lng }
    }
}

/// Externally observable camera state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FocusState {
    Idle,
    Focused,
}

/// One circle marker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub position: LatLng,
    pub color: &'static str,
    pub fill_opacity: f64,
    pub radius: u32,
    pub label: String,
}

impl From<&Hotspot> for Marker {
    fn from(spot: &Hotspot) -> Self {
        // Critical vs everything else
        let color = if spot.risk_level == RiskLevel::Critical {
            CRITICAL_COLOR
        } else {
            ELEVATED_COLOR
        };

        Self {
            position: LatLng {
                lat: spot.lat,
                lng: spot.lng,
            },
            color,
            fill_opacity: MARKER_FILL_OPACITY,
            radius: MARKER_RADIUS,
            label: format!("Risk: {}", spot.risk_level),
        }
    }
}

/// Camera move request for the browser.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FlyTo {
    pub generation: u64,
    pub from: LatLng,
    pub target: LatLng,
    pub duration_ms: u64,
}

/// Delayed size invalidation request for the browser.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Invalidate {
    pub generation: u64,
    pub delay_ms: u64,
}

/// Snapshot of the map for rendering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapView {
    pub state: FocusState,
    pub center: LatLng,
    pub zoom: u8,
    pub fly_to: Option<FlyTo>,
    pub markers: Vec<Marker>,
    pub marker_generation: u64,
    pub invalidate: Invalidate,
}

#[derive(Debug, Clone, Copy)]
struct Flight {
    from: LatLng,
    to: LatLng,
    started: Instant,
}

impl Flight {
    fn position_at(&self, now: Instant) -> LatLng {
        let elapsed = now.saturating_duration_since(self.started);
        let t = (elapsed.as_secs_f64() / FLY_DURATION.as_secs_f64()).clamp(0.0, 1.0);
        // smoothstep
        let k = t * t * (3.0 - 2.0 * t);
        LatLng {
            lat: self.from.lat + (self.to.lat - self.from.lat) * k,
            lng: self.from.lng + (self.to.lng - self.from.lng) * k,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MapFocusController {
    center: LatLng,
    flight: Option<Flight>,
    fly_to: Option<FlyTo>,
    hotspots: Vec<Hotspot>,
    markers: Vec<Marker>,
    marker_generation: u64,
    invalidate: Invalidate,
}

impl MapFocusController {
    /// Controller at the fallback center. The first layout pass is
    /// scheduled immediately.
    #[must_use]
    pub fn new() -> Self {
        Self {
            center: DEFAULT_CENTER,
            flight: None,
            fly_to: None,
            hotspots: Vec::new(),
            markers: Vec::new(),
            marker_generation: 0,
            invalidate: Invalidate {
                generation: 1,
                delay_ms: delay_ms(INVALIDATE_DELAY),
            },
        }
    }

    #[must_use]
    pub fn state(&self) -> FocusState {
        if self.flight.is_some() {
            FocusState::Focused
        } else {
            FocusState::Idle
        }
    }

    /// Where the camera is at `now`, accounting for an in-flight move.
    #[must_use]
    pub fn camera_at(&self, now: Instant) -> LatLng {
        self.flight.map_or(self.center, |f| f.position_at(now))
    }

    /// Move the camera to a new center. Returns `None` when the center did
    /// not change.
    pub fn focus(&mut self, center: LatLng, now: Instant) -> Option<FlyTo> {
        if center == self.center {
            return None;
        }

        let from = self.camera_at(now);
        self.flight = Some(Flight {
            from,
            to: center,
            started: now,
        });
        self.center = center;

        let generation = self.fly_to.map_or(1, |f| f.generation + 1);
        let fly_to = FlyTo {
            generation,
            from,
            target: center,
            duration_ms: delay_ms(FLY_DURATION),
        };
        self.fly_to = Some(fly_to);
        tracing::debug!(
            "map focus -> ({:.4}, {:.4}) gen {}",
            center.lat,
            center.lng,
            generation
        );
        Some(fly_to)
    }

    /// Replace the hotspot collection. Returns `true` if markers were rebuilt.
    pub fn set_hotspots(&mut self, hotspots: &[Hotspot]) -> bool {
        if hotspots == self.hotspots.as_slice() && self.marker_generation > 0 {
            return false;
        }

        self.hotspots = hotspots.to_vec();
        self.markers = hotspots.iter().map(Marker::from).collect();
        self.marker_generation += 1;
        true
    }

    /// Container resized or layout settled.
    pub fn layout_changed(&mut self) -> Invalidate {
        self.invalidate.generation += 1;
        self.invalidate
    }

    #[must_use]
    pub fn view(&self) -> MapView {
        MapView {
            state: self.state(),
            center: self.center,
            zoom: DEFAULT_ZOOM,
            fly_to: self.fly_to,
            markers: self.markers.clone(),
            marker_generation: self.marker_generation,
            invalidate: self.invalidate,
        }
    }
}

impl Default for MapFocusController {
    fn default() -> Self {
        Self::new()
    }
}

fn delay_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
