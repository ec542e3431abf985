//! TAK Protocol Version 1 protobuf support for CoT events
//!
//! Two framings share one message schema:
//!
//! - **Mesh**: `0xBF 0x01 0xBF` magic followed by a single `TakMessage`.
//!   Datagram transports carry the message boundary, so no length prefix.
//! - **Stream**: `0xBF` magic followed by a varint length prefix and the
//!   `TakMessage` body, so messages can be concatenated on a byte stream.
//!
//! Timestamps travel as integer microseconds since epoch; the XML codec
//! displays them truncated to milliseconds. Both sides of that asymmetry
//! are load-bearing for wire compatibility.

use crate::event::{micros_to_datetime, CotEvent};
use prost::Message;
use thiserror::Error;

/// Magic header for Mesh framing.
pub const MESH_HEADER: &[u8] = &[0xBF, 0x01, 0xBF];

/// Magic header for Stream framing.
pub const STREAM_HEADER: &[u8] = &[0xBF];

/// Hand-written messages carrying the TAK Protocol Version 1 tag numbers.
///
/// The schema is small and frozen, so the structs are maintained by hand
/// instead of through protoc codegen; tags below must not change.
pub mod pb {
    /// Top-level envelope: control metadata plus one CoT event.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct TakMessage {
        #[prost(message, optional, tag = "1")]
        pub tak_control: Option<TakControl>,
        #[prost(message, optional, tag = "2")]
        pub cot_event: Option<CotEvent>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct TakControl {
        #[prost(uint32, tag = "1")]
        pub min_proto_version: u32,
        #[prost(uint32, tag = "2")]
        pub max_proto_version: u32,
        #[prost(string, tag = "3")]
        pub contact_uid: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct CotEvent {
        #[prost(string, tag = "1")]
        pub r#type: String,
        #[prost(string, tag = "2")]
        pub access: String,
        #[prost(string, tag = "3")]
        pub qos: String,
        #[prost(string, tag = "4")]
        pub opex: String,
        #[prost(string, tag = "5")]
        pub uid: String,
        #[prost(uint64, tag = "6")]
        pub send_time: u64,
        #[prost(uint64, tag = "7")]
        pub start_time: u64,
        #[prost(uint64, tag = "8")]
        pub stale_time: u64,
        #[prost(string, tag = "9")]
        pub how: String,
        #[prost(double, tag = "10")]
        pub lat: f64,
        #[prost(double, tag = "11")]
        pub lon: f64,
        #[prost(double, tag = "12")]
        pub hae: f64,
        #[prost(double, tag = "13")]
        pub ce: f64,
        #[prost(double, tag = "14")]
        pub le: f64,
        #[prost(message, optional, tag = "15")]
        pub detail: Option<Detail>,
    }

    /// Detail section. This bridge only populates the raw `xml_detail`
    /// blob; the structured fields exist so messages from full TAK
    /// producers decode without loss of framing.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Detail {
        #[prost(string, tag = "1")]
        pub xml_detail: String,
        #[prost(message, optional, tag = "2")]
        pub contact: Option<Contact>,
        #[prost(message, optional, tag = "3")]
        pub group: Option<Group>,
        #[prost(message, optional, tag = "4")]
        pub precision_location: Option<PrecisionLocation>,
        #[prost(message, optional, tag = "5")]
        pub status: Option<Status>,
        #[prost(message, optional, tag = "6")]
        pub takv: Option<Takv>,
        #[prost(message, optional, tag = "7")]
        pub track: Option<Track>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Contact {
        #[prost(string, tag = "1")]
        pub endpoint: String,
        #[prost(string, tag = "2")]
        pub callsign: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Group {
        #[prost(string, tag = "1")]
        pub name: String,
        #[prost(string, tag = "2")]
        pub role: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct PrecisionLocation {
        #[prost(string, tag = "1")]
        pub geopointsrc: String,
        #[prost(string, tag = "2")]
        pub altsrc: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Status {
        #[prost(uint32, tag = "1")]
        pub battery: u32,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Takv {
        #[prost(string, tag = "1")]
        pub device: String,
        #[prost(string, tag = "2")]
        pub platform: String,
        #[prost(string, tag = "3")]
        pub os: String,
        #[prost(string, tag = "4")]
        pub version: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Track {
        #[prost(double, tag = "1")]
        pub speed: f64,
        #[prost(double, tag = "2")]
        pub course: f64,
    }
}

#[derive(Error, Debug)]
pub enum ProtoError {
    #[error("protobuf encoding error: {0}")]
    Encode(#[from] prost::EncodeError),

    #[error("protobuf decoding error: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("bad magic header")]
    BadMagic,

    /// The buffer ends before the framed message does. Recoverable: the
    /// caller should read more bytes and retry.
    #[error("incomplete frame, need more data")]
    NeedMoreData,

    #[error("varint length prefix exceeds 10 bytes")]
    InvalidVarint,

    #[error("invalid timestamp on wire: {0} us")]
    InvalidTimestamp(u64),

    #[error("missing cotEvent submessage")]
    MissingEvent,
}

impl From<&CotEvent> for pb::CotEvent {
    fn from(event: &CotEvent) -> Self {
        pb::CotEvent {
            r#type: event.event_type.clone(),
            access: event.access.clone(),
            qos: event.qos.clone(),
            opex: event.opex.clone(),
            uid: event.uid.clone(),
            send_time: event.time_micros(),
            start_time: event.start_micros(),
            stale_time: event.stale_micros(),
            how: event.how.clone(),
            lat: event.lat,
            lon: event.lon,
            hae: event.hae,
            ce: event.ce,
            le: event.le,
            detail: Some(pb::Detail {
                xml_detail: event.detail.clone(),
                ..Default::default()
            }),
        }
    }
}

impl From<&CotEvent> for pb::TakMessage {
    fn from(event: &CotEvent) -> Self {
        pb::TakMessage {
            tak_control: Some(pb::TakControl {
                min_proto_version: 1,
                max_proto_version: 1,
                contact_uid: event.uid.clone(),
            }),
            cot_event: Some(pb::CotEvent::from(event)),
        }
    }
}

impl TryFrom<pb::CotEvent> for CotEvent {
    type Error = ProtoError;

    fn try_from(proto: pb::CotEvent) -> Result<Self, Self::Error> {
        let time = micros_to_datetime(proto.send_time)
            .ok_or(ProtoError::InvalidTimestamp(proto.send_time))?;
        let start = micros_to_datetime(proto.start_time)
            .ok_or(ProtoError::InvalidTimestamp(proto.start_time))?;
        let stale = micros_to_datetime(proto.stale_time)
            .ok_or(ProtoError::InvalidTimestamp(proto.stale_time))?;

        Ok(CotEvent {
            event_type: proto.r#type,
            uid: proto.uid,
            how: proto.how,
            time,
            start,
            stale,
            lat: proto.lat,
            lon: proto.lon,
            hae: proto.hae,
            ce: proto.ce,
            le: proto.le,
            detail: proto.detail.map(|d| d.xml_detail).unwrap_or_default(),
            access: proto.access,
            opex: proto.opex,
            qos: proto.qos,
        })
    }
}

/// Encode an event with Mesh framing: magic header + one TakMessage.
pub fn encode_mesh(event: &CotEvent) -> Result<Vec<u8>, ProtoError> {
    let message = pb::TakMessage::from(event);
    let mut buf = Vec::with_capacity(MESH_HEADER.len() + message.encoded_len());
    buf.extend_from_slice(MESH_HEADER);
    message.encode(&mut buf)?;
    Ok(buf)
}

/// Decode an event from a Mesh-framed buffer (one complete datagram).
pub fn decode_mesh(data: &[u8]) -> Result<CotEvent, ProtoError> {
    let body = data.strip_prefix(MESH_HEADER).ok_or(ProtoError::BadMagic)?;
    let message = pb::TakMessage::decode(body)?;
    message
        .cot_event
        .ok_or(ProtoError::MissingEvent)?
        .try_into()
}

/// Encode an event with Stream framing: magic header + varint length +
/// TakMessage, suitable for concatenation on a byte stream.
pub fn encode_stream(event: &CotEvent) -> Result<Vec<u8>, ProtoError> {
    let message = pb::TakMessage::from(event);
    let body_len = message.encoded_len();

    let mut buf = Vec::with_capacity(STREAM_HEADER.len() + 5 + body_len);
    buf.extend_from_slice(STREAM_HEADER);
    write_varint(&mut buf, body_len as u64);
    message.encode(&mut buf)?;
    Ok(buf)
}

/// Decode the first Stream-framed event from a buffer.
///
/// Returns the event and the number of bytes consumed, so callers draining
/// a TCP stream can advance past the frame and try the next one. A buffer
/// that ends mid-varint or mid-body is [`ProtoError::NeedMoreData`].
pub fn decode_stream(data: &[u8]) -> Result<(CotEvent, usize), ProtoError> {
    if data.is_empty() {
        return Err(ProtoError::NeedMoreData);
    }

    let body = data.strip_prefix(STREAM_HEADER).ok_or(ProtoError::BadMagic)?;
    let (msg_len, varint_len) = read_varint(body)?;
    let msg_len = msg_len as usize;

    let body = &body[varint_len..];
    if body.len() < msg_len {
        return Err(ProtoError::NeedMoreData);
    }

    let message = pb::TakMessage::decode(&body[..msg_len])?;
    let event = message
        .cot_event
        .ok_or(ProtoError::MissingEvent)?
        .try_into()?;

    Ok((event, STREAM_HEADER.len() + varint_len + msg_len))
}

fn write_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// Read a varint from the front of `data`, returning (value, bytes read).
fn read_varint(data: &[u8]) -> Result<(u64, usize), ProtoError> {
    let mut result: u64 = 0;
    let mut shift = 0;

    for (i, byte) in data.iter().enumerate() {
        if i >= 10 {
            return Err(ProtoError::InvalidVarint);
        }
        result |= ((byte & 0x7F) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok((result, i + 1));
        }
        shift += 7;
    }

    // Every byte so far had the continuation bit set.
    if data.len() >= 10 {
        Err(ProtoError::InvalidVarint)
    } else {
        Err(ProtoError::NeedMoreData)
    }
}
