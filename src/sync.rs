//! Form field state and weather reconciliation.
//!
//! Holds the five editable assessment inputs plus an idempotence key: the
//! place name of the last observation copied into the form. A resolved
//! observation fires at most one automatic assessment.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::models::{AssessmentRequest, DEFAULT_VEGETATION_INDEX, WeatherObservation};

/// The editable inputs of an assessment request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormField {
    Temperature,
    Humidity,
    WindSpeed,
    Rainfall,
    Vegetation,
}

impl FormField {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
            Self::WindSpeed => "wind_speed",
            Self::Rainfall => "rainfall",
            Self::Vegetation => "vegetation",
        }
    }
}

impl FromStr for FormField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "temperature" => Ok(Self::Temperature),
            "humidity" => Ok(Self::Humidity),
            "wind_speed" => Ok(Self::WindSpeed),
            "rainfall" => Ok(Self::Rainfall),
            "vegetation" => Ok(Self::Vegetation),
            _ => Err(format!("unknown field: {s}")),
        }
    }
}

/// Values shown in the form before anything is entered.
pub const INITIAL_FIELDS: AssessmentRequest = AssessmentRequest {
    temperature: 30.0,
    humidity: 40.0,
    wind_speed: 15.0,
    rainfall: 0.0,
    vegetation_index: DEFAULT_VEGETATION_INDEX,
};

/// Outcome of reconciling an observation into the form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyncOutcome {
    /// New place: fields overwritten, this request must be submitted
    Triggered(AssessmentRequest),
    /// Same place as last time: nothing changed
    Unchanged,
}

impl SyncOutcome {
    /// The request to auto-submit, if any.
    #[must_use]
    pub fn auto_request(self) -> Option<AssessmentRequest> {
        match self {
            Self::Triggered(request) => Some(request),
            Self::Unchanged => None,
        }
    }
}

/// Editable form state with the last-reconciled place marker.
#[derive(Debug, Clone)]
pub struct InputSynchronizer {
    fields: AssessmentRequest,
    /// Place name of the last reconciled observation
    last_place: Option<String>,
    /// Total automatic triggers (for stats)
    auto_triggers: u64,
}

impl InputSynchronizer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            fields: INITIAL_FIELDS,
            last_place: None,
            auto_triggers: 0,
        }
    }

    /// Copy a resolved observation into the form, once per place name.
    ///
    /// On a new place the marker is swapped, all five fields are
    /// overwritten (vegetation gets the default index) and the caller must
    /// submit the returned request.
    pub fn reconcile(&mut self, observation: &WeatherObservation) -> SyncOutcome {
        if self.last_place.as_deref() == Some(observation.place_name.as_str()) {
            return SyncOutcome::Unchanged;
        }

        self.last_place = Some(observation.place_name.clone());
        self.fields = observation.to_request();
        self.auto_triggers += 1;
        SyncOutcome::Triggered(self.fields)
    }

    /// Manual edit of one field. Never touches the marker.
    pub fn edit(&mut self, field: FormField, value: f64) {
        match field {
            FormField::Temperature => self.fields.temperature = value,
            FormField::Humidity => self.fields.humidity = value,
            FormField::WindSpeed => self.fields.wind_speed = value,
            FormField::Rainfall => self.fields.rainfall = value,
            FormField::Vegetation => self.fields.vegetation_index = value,
        }
    }

    /// Current field values, as a manual submit would send them.
    #[must_use]
    pub fn fields(&self) -> AssessmentRequest {
        self.fields
    }

    #[must_use]
    pub fn last_place(&self) -> Option<&str> {
        self.last_place.as_deref()
    }

    #[must_use]
    pub fn auto_triggers(&self) -> u64 {
        self.auto_triggers
    }
}

impl Default for InputSynchronizer {
    fn default() -> Self {
        Self::new()
    }
}
