//! Detection record → CoT event mapping

use crate::fields::{field_or, FieldMap};
use chrono::Duration;
use serde_json::{Map, Value};
use wifitak_cot::{Clock, CotEvent};

/// CoT type for WiFi detections: atom, unknown affiliation, ground.
const DETECTION_TYPE: &str = "a-u-G";

/// Method of generation for feed-derived events: machine-generated.
const DETECTION_HOW: &str = "m-g";

/// Uid used when the feed never learned a device name.
const UNKNOWN_UID: &str = "UNK";

/// Map one detection record into a CoT event.
///
/// Returns `None` when the record has no usable position: a missing, null,
/// malformed, or all-zero geopoint. (0,0) doubles as the "no position"
/// sentinel downstream, so emitting an event there would be ambiguous;
/// skipping the record is deliberate policy, not an error.
pub fn map_detection(
    record: &Map<String, Value>,
    fields: &FieldMap,
    clock: &dyn Clock,
    stale_secs: i64,
) -> Option<CotEvent> {
    // Kismet geopoints are GeoJSON-ordered: [lon, lat].
    let (lon, lat) = position(record, &fields.geopoint.alias)?;

    let manuf = field_or(record, &fields.manuf.alias, UNKNOWN_UID);
    let ssid = field_or(record, &fields.ssid.alias, UNKNOWN_UID);
    let rssi = field_or(record, &fields.rssi.alias, "0");
    let mac = field_or(record, &fields.mac.alias, UNKNOWN_UID);
    let alt = field_or(record, &fields.alt.alias, "0");

    let mut event = CotEvent::new(clock);
    event.event_type = DETECTION_TYPE.to_string();
    event.how = DETECTION_HOW.to_string();
    event.uid = field_or(record, &fields.name.alias, UNKNOWN_UID);
    event.lat = lat;
    event.lon = lon;
    event.hae = alt.parse().unwrap_or(0.0);
    event.stale = event.start + Duration::seconds(stale_secs);
    event.detail = format!("Manf={manuf} SSID={ssid} RSSI={rssi} MAC={mac} Alt={alt}");

    Some(event)
}

fn position(record: &Map<String, Value>, alias: &str) -> Option<(f64, f64)> {
    let arr = record.get(alias)?.as_array()?;
    if arr.len() != 2 {
        return None;
    }

    let lon = arr[0].as_f64()?;
    let lat = arr[1].as_f64()?;
    if lon == 0.0 && lat == 0.0 {
        return None;
    }

    Some((lon, lat))
}
