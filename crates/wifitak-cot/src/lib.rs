//! Cursor on Target (CoT) event model and wire codec
//!
//! Canonical in-memory representation of a CoT event plus lossless
//! conversion to and from the three wire formats this bridge speaks:
//!
//! - CoT XML (`<event version="2.0">...`)
//! - TAK Protocol Version 1 Mesh (magic header + protobuf)
//! - TAK Protocol Version 1 Stream (magic header + varint-delimited protobuf)
//!
//! # Example
//!
//! ```rust
//! use wifitak_cot::{CotEvent, SystemClock, WireFormat, encode};
//!
//! let mut event = CotEvent::new(&SystemClock);
//! event.event_type = "a-u-G".to_string();
//! event.uid = "WIFI-AABBCC".to_string();
//! event.lat = 40.0;
//! event.lon = -84.0;
//!
//! let xml = encode(&event, WireFormat::Xml).expect("encode failed");
//! assert!(std::str::from_utf8(&xml).unwrap().contains(r#"uid="WIFI-AABBCC""#));
//! ```

pub mod clock;
pub mod event;
pub mod proto;
pub mod validate;
pub mod xml;

pub use clock::{Clock, FixedClock, SystemClock};
pub use event::{CotEvent, DEFAULT_STALE_SECS, UNKNOWN_ERROR};
pub use proto::{
    decode_mesh, decode_stream, encode_mesh, encode_stream, ProtoError, MESH_HEADER, STREAM_HEADER,
};
pub use validate::{is_valid, validate_event, ValidationError};
pub use xml::{format_cot_time, from_xml, from_xml_bytes, parse_cot_time, to_xml, ParseError};

use serde::{Deserialize, Serialize};

/// Wire format selector. Always explicit on encode; there is no
/// auto-detection in this codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// CoT XML document
    Xml,
    /// Magic header + single protobuf message (datagram transports)
    Mesh,
    /// Magic header + varint length prefix + protobuf message (byte streams)
    Stream,
}

impl std::fmt::Display for WireFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WireFormat::Xml => write!(f, "xml"),
            WireFormat::Mesh => write!(f, "mesh"),
            WireFormat::Stream => write!(f, "stream"),
        }
    }
}

/// Errors from either side of the codec.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error(transparent)]
    Xml(#[from] ParseError),

    #[error(transparent)]
    Proto(#[from] ProtoError),
}

impl CodecError {
    /// True when the input was merely incomplete rather than malformed;
    /// stream consumers should buffer more bytes and retry.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, CodecError::Proto(ProtoError::NeedMoreData))
    }
}

/// Encode an event in the selected wire format.
pub fn encode(event: &CotEvent, format: WireFormat) -> Result<Vec<u8>, CodecError> {
    match format {
        WireFormat::Xml => Ok(to_xml(event).into_bytes()),
        WireFormat::Mesh => Ok(encode_mesh(event)?),
        WireFormat::Stream => Ok(encode_stream(event)?),
    }
}

/// Decode a complete buffer in the selected wire format.
///
/// For `Stream`, trailing bytes beyond the first frame are an error from
/// this entry point; use [`decode_stream`] directly to drain a stream.
pub fn decode(data: &[u8], format: WireFormat) -> Result<CotEvent, CodecError> {
    match format {
        WireFormat::Xml => Ok(from_xml_bytes(data)?),
        WireFormat::Mesh => Ok(decode_mesh(data)?),
        WireFormat::Stream => {
            let (event, consumed) = decode_stream(data)?;
            if consumed != data.len() {
                return Err(ProtoError::Decode(prost::DecodeError::new(
                    "trailing bytes after stream frame",
                ))
                .into());
            }
            Ok(event)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sample_event() -> CotEvent {
        let clock = FixedClock(Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap());
        let mut event = CotEvent::new(&clock);
        event.event_type = "a-u-G".to_string();
        event.uid = "WIFI-AABBCC".to_string();
        event.lat = 40.0;
        event.lon = -84.0;
        event
    }

    #[test]
    fn round_trip_through_every_format() {
        let event = sample_event();
        for format in [WireFormat::Xml, WireFormat::Mesh, WireFormat::Stream] {
            let wire = encode(&event, format).expect("encode failed");
            let decoded = decode(&wire, format).expect("decode failed");
            assert_eq!(decoded, event, "format {format} did not round trip");
        }
    }

    #[test]
    fn incomplete_stream_is_distinguishable() {
        let wire = encode(&sample_event(), WireFormat::Stream).unwrap();
        let err = decode(&wire[..4], WireFormat::Stream).unwrap_err();
        assert!(err.is_incomplete());

        let err = decode(b"garbage", WireFormat::Xml).unwrap_err();
        assert!(!err.is_incomplete());
    }
}
