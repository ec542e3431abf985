//! Kismet detection ingestion
//!
//! Connects to a Kismet server's device monitor websocket, maps each
//! detection record into a CoT event, and feeds the validated events into
//! the outbound pipeline. The connection lifecycle retries transient
//! failures on a fixed interval; only rejected credentials abort the loop.
//!
//! The [`DetectionSource`] trait is the seam between the retry loop and
//! the live server, so the loop's behavior is testable with scripted
//! sources.

pub mod fields;
pub mod ingest;
pub mod mapper;
pub mod source;

pub use fields::{FieldMap, FieldSpec};
pub use ingest::{run_ingest, IngestConfig, IngestStats};
pub use mapper::map_detection;
pub use source::{DetectionSource, DetectionStream, KismetConfig, KismetSource, SourceError};
