//! Field map table: which Kismet fields the feed should send, and the
//! short aliases they arrive under.
//!
//! The same table serves two purposes: it is serialized into the websocket
//! subscription request (Kismet's `[field, rename]` form, so the feed only
//! sends what the mapper needs), and the mapper resolves detection records
//! through the aliases it declares.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// One `(source_key, alias)` pair of the field map table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Fully qualified Kismet field name
    pub key: String,
    /// Short name the field arrives under after renaming
    pub alias: String,
}

impl FieldSpec {
    fn new(key: &str, alias: &str) -> Self {
        Self {
            key: key.to_string(),
            alias: alias.to_string(),
        }
    }
}

/// The ordered field map table for the Kismet device monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldMap {
    pub name: FieldSpec,
    pub mac: FieldSpec,
    pub manuf: FieldSpec,
    pub ssid: FieldSpec,
    pub rssi: FieldSpec,
    pub geopoint: FieldSpec,
    pub alt: FieldSpec,
}

impl Default for FieldMap {
    fn default() -> Self {
        Self {
            name: FieldSpec::new("kismet.device.base.name", "name"),
            mac: FieldSpec::new("kismet.device.base.macaddr", "mac"),
            manuf: FieldSpec::new("kismet.device.base.manuf", "manuf"),
            ssid: FieldSpec::new("dot11.advertisedssid.ssid", "ssid"),
            rssi: FieldSpec::new("kismet.common.signal.last_signal", "rssi"),
            geopoint: FieldSpec::new("kismet.common.location.geopoint", "geopoint"),
            alt: FieldSpec::new("kismet.common.location.alt", "alt"),
        }
    }
}

impl FieldMap {
    /// Table rows in declaration order.
    pub fn specs(&self) -> [&FieldSpec; 7] {
        [
            &self.name,
            &self.mac,
            &self.manuf,
            &self.ssid,
            &self.rssi,
            &self.geopoint,
            &self.alt,
        ]
    }

    /// The `fields` entry of the monitor subscription request.
    pub fn subscription_fields(&self) -> Value {
        Value::Array(
            self.specs()
                .iter()
                .map(|spec| json!([spec.key, spec.alias]))
                .collect(),
        )
    }

    /// Full subscription request for the device monitor endpoint.
    pub fn subscription_request(&self, rate: u32) -> Value {
        json!({
            "monitor": "*",
            "request": 1,
            "rate": rate,
            "fields": self.subscription_fields(),
        })
    }
}

/// Resolve an optional scalar field from a detection record.
///
/// Absent keys, nulls, and non-scalar values all fall back to `default`;
/// numbers and booleans are stringified. Every optional field goes through
/// this one routine so type coercion lives in exactly one place.
pub fn field_or(record: &Map<String, Value>, key: &str, default: &str) -> String {
    match record.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        None | Some(Value::Null) | Some(Value::Array(_)) | Some(Value::Object(_)) => {
            default.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(json: Value) -> Map<String, Value> {
        json.as_object().unwrap().clone()
    }

    #[test]
    fn subscription_request_lists_fields_in_order() {
        let map = FieldMap::default();
        let request = map.subscription_request(1);

        assert_eq!(request["monitor"], "*");
        assert_eq!(request["request"], 1);
        assert_eq!(request["rate"], 1);

        let fields = request["fields"].as_array().unwrap();
        assert_eq!(fields.len(), 7);
        assert_eq!(fields[0], json!(["kismet.device.base.name", "name"]));
        assert_eq!(
            fields[5],
            json!(["kismet.common.location.geopoint", "geopoint"])
        );
    }

    #[test]
    fn field_or_returns_present_string() {
        let rec = record(json!({"ssid": "corp"}));
        assert_eq!(field_or(&rec, "ssid", "UNK"), "corp");
    }

    #[test]
    fn field_or_stringifies_numbers() {
        let rec = record(json!({"rssi": -61, "alt": 212.5}));
        assert_eq!(field_or(&rec, "rssi", "0"), "-61");
        assert_eq!(field_or(&rec, "alt", "0"), "212.5");
    }

    #[test]
    fn field_or_defaults_absent_null_and_unexpected_types() {
        let rec = record(json!({"a": null, "b": [1, 2], "c": {"x": 1}}));
        assert_eq!(field_or(&rec, "missing", "UNK"), "UNK");
        assert_eq!(field_or(&rec, "a", "UNK"), "UNK");
        assert_eq!(field_or(&rec, "b", "UNK"), "UNK");
        assert_eq!(field_or(&rec, "c", "UNK"), "UNK");
    }

    #[test]
    fn overriding_a_source_key_keeps_the_table_consistent() {
        let mut map = FieldMap::default();
        map.geopoint.key = "kismet.historic.location.geopoint".to_string();

        let fields = map.subscription_fields();
        assert_eq!(
            fields[5],
            json!(["kismet.historic.location.geopoint", "geopoint"])
        );
    }
}
