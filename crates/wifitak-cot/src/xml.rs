//! CoT XML serialization and parsing

use crate::event::{CotEvent, UNKNOWN_ERROR};
use chrono::{DateTime, Utc};
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event as XmlEvent};
use quick_xml::Reader;
use std::fmt::Write;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("XML parsing error: {0}")]
    XmlError(#[from] quick_xml::Error),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid datetime format: {0}")]
    InvalidDateTime(String),

    #[error("invalid number format: {0}")]
    InvalidNumber(String),

    #[error("invalid event structure: {0}")]
    InvalidStructure(String),

    #[error("invalid UTF-8 in document")]
    InvalidUtf8,
}

/// Format a timestamp the way CoT XML expects: ISO-8601 UTC with exactly
/// three fractional digits. chrono's `%.3f` truncates the sub-second part,
/// which is the required behavior here (never round).
pub fn format_cot_time(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Parse a CoT timestamp string into a UTC instant.
pub fn parse_cot_time(s: &str) -> Result<DateTime<Utc>, ParseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| ParseError::InvalidDateTime(s.to_string()))
}

/// Serialize an event to a CoT XML document.
///
/// Attribute values and the detail payload are XML-escaped so any event
/// content survives a round trip.
pub fn to_xml(event: &CotEvent) -> String {
    let mut xml = String::new();

    write!(
        xml,
        r#"<event version="2.0" type="{}" uid="{}" how="{}" time="{}" start="{}" stale="{}" access="{}" opex="{}" qos="{}">"#,
        escape(&event.event_type),
        escape(&event.uid),
        escape(&event.how),
        format_cot_time(&event.time),
        format_cot_time(&event.start),
        format_cot_time(&event.stale),
        escape(&event.access),
        escape(&event.opex),
        escape(&event.qos),
    )
    .expect("writing to String cannot fail");

    // {:?} keeps a trailing .0 on whole-number coordinates, matching the
    // decimal-text convention of existing CoT producers.
    write!(
        xml,
        r#"<point lat="{:?}" lon="{:?}" hae="{:?}" ce="{:?}" le="{:?}"/>"#,
        event.lat, event.lon, event.hae, event.ce, event.le
    )
    .expect("writing to String cannot fail");

    write!(xml, "<detail>{}</detail>", escape(&event.detail))
        .expect("writing to String cannot fail");

    xml.push_str("</event>");
    xml
}

#[derive(Default)]
struct EventAttrs {
    event_type: Option<String>,
    uid: Option<String>,
    how: Option<String>,
    time: Option<DateTime<Utc>>,
    start: Option<DateTime<Utc>>,
    stale: Option<DateTime<Utc>>,
    access: Option<String>,
    opex: Option<String>,
    qos: Option<String>,
}

/// Parse a CoT XML document into an event.
///
/// Malformed XML, missing required attributes, and unparsable timestamps
/// are hard failures; nothing is silently defaulted into a usable event.
pub fn from_xml(xml: &str) -> Result<CotEvent, ParseError> {
    from_xml_bytes(xml.as_bytes())
}

/// Parse a CoT XML document from raw bytes.
pub fn from_xml_bytes(xml: &[u8]) -> Result<CotEvent, ParseError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();

    let mut attrs = EventAttrs::default();
    let mut point: Option<(f64, f64, f64, f64, f64)> = None;
    let mut detail: Option<String> = None;
    let mut saw_event = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(XmlEvent::Start(e)) => match e.name().as_ref() {
                b"event" => {
                    saw_event = true;
                    parse_event_attrs(&e, &mut attrs)?;
                }
                b"point" => point = Some(parse_point_attrs(&e)?),
                b"detail" => {
                    let mut detail_buf = Vec::new();
                    detail = Some(read_detail(&mut reader, &mut detail_buf)?);
                }
                _ => {}
            },
            Ok(XmlEvent::Empty(e)) => match e.name().as_ref() {
                b"event" => {
                    saw_event = true;
                    parse_event_attrs(&e, &mut attrs)?;
                }
                b"point" => point = Some(parse_point_attrs(&e)?),
                b"detail" => detail = Some(String::new()),
                _ => {}
            },
            Ok(XmlEvent::Eof) => break,
            Err(e) => return Err(ParseError::XmlError(e)),
            _ => {}
        }
        buf.clear();
    }

    if !saw_event {
        return Err(ParseError::MissingField("event".into()));
    }

    let (lat, lon, hae, ce, le) =
        point.ok_or_else(|| ParseError::MissingField("point".into()))?;

    Ok(CotEvent {
        event_type: attrs
            .event_type
            .ok_or_else(|| ParseError::MissingField("type".into()))?,
        uid: attrs.uid.ok_or_else(|| ParseError::MissingField("uid".into()))?,
        how: attrs.how.ok_or_else(|| ParseError::MissingField("how".into()))?,
        time: attrs.time.ok_or_else(|| ParseError::MissingField("time".into()))?,
        start: attrs
            .start
            .ok_or_else(|| ParseError::MissingField("start".into()))?,
        stale: attrs
            .stale
            .ok_or_else(|| ParseError::MissingField("stale".into()))?,
        lat,
        lon,
        hae,
        ce,
        le,
        detail: detail.unwrap_or_default(),
        access: attrs.access.unwrap_or_else(|| "true".to_string()),
        opex: attrs.opex.unwrap_or_else(|| "false".to_string()),
        qos: attrs.qos.unwrap_or_else(|| "0".to_string()),
    })
}

fn parse_event_attrs(e: &BytesStart, out: &mut EventAttrs) -> Result<(), ParseError> {
    for attr in e.attributes() {
        let attr = attr.map_err(|e| ParseError::XmlError(quick_xml::Error::InvalidAttr(e)))?;
        let value = attr.unescape_value()?.into_owned();
        match attr.key.as_ref() {
            b"type" => out.event_type = Some(value),
            b"uid" => out.uid = Some(value),
            b"how" => out.how = Some(value),
            b"time" => out.time = Some(parse_cot_time(&value)?),
            b"start" => out.start = Some(parse_cot_time(&value)?),
            b"stale" => out.stale = Some(parse_cot_time(&value)?),
            b"access" => out.access = Some(value),
            b"opex" => out.opex = Some(value),
            b"qos" => out.qos = Some(value),
            _ => {}
        }
    }
    Ok(())
}

fn parse_point_attrs(e: &BytesStart) -> Result<(f64, f64, f64, f64, f64), ParseError> {
    let mut lat = None;
    let mut lon = None;
    let mut hae = None;
    let mut ce = None;
    let mut le = None;

    for attr in e.attributes() {
        let attr = attr.map_err(|e| ParseError::XmlError(quick_xml::Error::InvalidAttr(e)))?;
        let value = attr.unescape_value()?;
        match attr.key.as_ref() {
            b"lat" => lat = Some(parse_f64(&value)?),
            b"lon" => lon = Some(parse_f64(&value)?),
            b"hae" => hae = Some(parse_f64(&value)?),
            b"ce" => ce = Some(parse_f64(&value)?),
            b"le" => le = Some(parse_f64(&value)?),
            _ => {}
        }
    }

    Ok((
        lat.ok_or_else(|| ParseError::MissingField("lat".into()))?,
        lon.ok_or_else(|| ParseError::MissingField("lon".into()))?,
        hae.unwrap_or(0.0),
        ce.unwrap_or(UNKNOWN_ERROR),
        le.unwrap_or(UNKNOWN_ERROR),
    ))
}

/// Read everything up to the matching `</detail>` as an opaque payload.
///
/// Plain text is unescaped; nested markup from other producers is carried
/// through verbatim without schema interpretation.
fn read_detail(reader: &mut Reader<&[u8]>, buf: &mut Vec<u8>) -> Result<String, ParseError> {
    let mut payload = String::new();
    let mut depth = 1u32;

    loop {
        match reader.read_event_into(buf) {
            Ok(XmlEvent::Text(t)) => {
                payload.push_str(&t.unescape()?);
            }
            Ok(XmlEvent::CData(t)) => {
                payload.push_str(std::str::from_utf8(&t).map_err(|_| ParseError::InvalidUtf8)?);
            }
            Ok(XmlEvent::Start(e)) => {
                depth += 1;
                let raw = std::str::from_utf8(&e).map_err(|_| ParseError::InvalidUtf8)?;
                payload.push('<');
                payload.push_str(raw);
                payload.push('>');
            }
            Ok(XmlEvent::Empty(e)) => {
                let raw = std::str::from_utf8(&e).map_err(|_| ParseError::InvalidUtf8)?;
                payload.push('<');
                payload.push_str(raw);
                payload.push_str("/>");
            }
            Ok(XmlEvent::End(e)) => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
                let name = e.name();
                let raw =
                    std::str::from_utf8(name.as_ref()).map_err(|_| ParseError::InvalidUtf8)?;
                payload.push_str("</");
                payload.push_str(raw);
                payload.push('>');
            }
            Ok(XmlEvent::Eof) => {
                return Err(ParseError::InvalidStructure(
                    "unterminated detail element".to_string(),
                ));
            }
            Err(e) => return Err(ParseError::XmlError(e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(payload)
}

fn parse_f64(s: &str) -> Result<f64, ParseError> {
    s.parse::<f64>()
        .map_err(|_| ParseError::InvalidNumber(s.to_string()))
}
