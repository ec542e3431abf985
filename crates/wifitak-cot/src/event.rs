//! Canonical CoT event model

use crate::clock::{Clock, SystemClock};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Conventional "accuracy unknown" value for ce/le, in meters.
pub const UNKNOWN_ERROR: f64 = 9_999_999.0;

/// Default freshness window applied to a newly constructed event, in seconds.
pub const DEFAULT_STALE_SECS: i64 = 3600;

/// A single Cursor on Target event.
///
/// Every field carries a defined default so a freshly constructed event is
/// always serializable; validity (non-empty type/uid, usable position) is a
/// separate concern checked by [`crate::validate::validate_event`].
///
/// An event is single-owner: it is mutated only between construction and
/// hand-off to the wire codec, then treated as immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CotEvent {
    /// Hierarchical CoT type classifier (e.g. "a-u-G" for atom-unknown-ground)
    #[serde(rename = "type")]
    pub event_type: String,
    /// Unique identifier of the reporting entity
    pub uid: String,
    /// Method of generation (e.g. "m-g" for machine-generated)
    pub how: String,
    /// Send timestamp
    pub time: DateTime<Utc>,
    /// Validity start timestamp
    pub start: DateTime<Utc>,
    /// Instant after which consumers should consider the event expired
    pub stale: DateTime<Utc>,
    /// Latitude in decimal degrees
    pub lat: f64,
    /// Longitude in decimal degrees
    pub lon: f64,
    /// Height above ellipsoid in meters
    pub hae: f64,
    /// Circular error in meters
    pub ce: f64,
    /// Linear error in meters
    pub le: f64,
    /// Free-text or opaque detail payload, carried without interpretation
    pub detail: String,
    /// Access routing attribute
    pub access: String,
    /// Operational/exercise flag
    pub opex: String,
    /// Quality of service marking
    pub qos: String,
}

impl CotEvent {
    /// Create a fully defaulted event with timestamps drawn from `clock`.
    ///
    /// `time` and `start` are the current instant; `stale` is offset by
    /// [`DEFAULT_STALE_SECS`]. `event_type` and `uid` default to empty
    /// strings, which a validity check rejects: there is no default that
    /// implies a dispatchable event.
    pub fn new(clock: &dyn Clock) -> Self {
        let now = clock.now();
        Self {
            event_type: String::new(),
            uid: String::new(),
            how: "m-g".to_string(),
            time: now,
            start: now,
            stale: now + Duration::seconds(DEFAULT_STALE_SECS),
            lat: 0.0,
            lon: 0.0,
            hae: 0.0,
            ce: UNKNOWN_ERROR,
            le: UNKNOWN_ERROR,
            detail: String::new(),
            access: "true".to_string(),
            opex: "false".to_string(),
            qos: "0".to_string(),
        }
    }

    /// Send time as microseconds since epoch (TAK protobuf representation).
    pub fn time_micros(&self) -> u64 {
        datetime_to_micros(&self.time)
    }

    /// Start time as microseconds since epoch.
    pub fn start_micros(&self) -> u64 {
        datetime_to_micros(&self.start)
    }

    /// Stale time as microseconds since epoch.
    pub fn stale_micros(&self) -> u64 {
        datetime_to_micros(&self.stale)
    }
}

impl Default for CotEvent {
    fn default() -> Self {
        Self::new(&SystemClock)
    }
}

impl fmt::Display for CotEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CotEvent(type={}, uid={}, how={}, lat={}, lon={}, stale={})",
            self.event_type, self.uid, self.how, self.lat, self.lon, self.stale
        )
    }
}

/// Convert a UTC datetime to microseconds since epoch.
pub(crate) fn datetime_to_micros(dt: &DateTime<Utc>) -> u64 {
    dt.timestamp_micros().max(0) as u64
}

/// Convert microseconds since epoch to a UTC datetime.
pub(crate) fn micros_to_datetime(micros: u64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::TimeZone;

    #[test]
    fn fresh_event_has_documented_defaults() {
        let clock = FixedClock(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap());
        let event = CotEvent::new(&clock);

        assert_eq!(event.event_type, "");
        assert_eq!(event.uid, "");
        assert_eq!(event.how, "m-g");
        assert_eq!(event.time, clock.0);
        assert_eq!(event.start, clock.0);
        assert_eq!(event.stale, clock.0 + Duration::seconds(3600));
        assert_eq!(event.lat, 0.0);
        assert_eq!(event.lon, 0.0);
        assert_eq!(event.hae, 0.0);
        assert_eq!(event.ce, UNKNOWN_ERROR);
        assert_eq!(event.le, UNKNOWN_ERROR);
        assert_eq!(event.detail, "");
        assert_eq!(event.access, "true");
        assert_eq!(event.opex, "false");
        assert_eq!(event.qos, "0");
    }

    #[test]
    fn micros_roundtrip() {
        let dt = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap()
            + Duration::microseconds(123_456);
        let micros = datetime_to_micros(&dt);
        assert_eq!(micros_to_datetime(micros), Some(dt));
    }

    #[test]
    fn micros_clamps_pre_epoch_times() {
        let dt = Utc.with_ymd_and_hms(1960, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(datetime_to_micros(&dt), 0);
    }
}
