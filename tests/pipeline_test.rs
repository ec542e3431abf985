//! End-to-end pipeline test: scripted detection feed through ingestion,
//! the shared queue, and the fan-out dispatcher.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use wifitak_cot::{decode, FixedClock, WireFormat, MESH_HEADER};
use wifitak_kismet::{
    run_ingest, DetectionSource, DetectionStream, FieldMap, IngestConfig, SourceError,
};
use wifitak_transport::{run_dispatch, CotSender, DispatchConfig, SendError};

struct ScriptedFeed {
    messages: Vec<String>,
}

#[async_trait]
impl DetectionSource for ScriptedFeed {
    async fn connect(&mut self) -> Result<DetectionStream, SourceError> {
        let items: Vec<Result<String, SourceError>> = self.messages.drain(..).map(Ok).collect();
        Ok(Box::pin(futures_util::stream::iter(items)))
    }
}

struct CollectingSender {
    format: WireFormat,
    payloads: flume::Sender<Vec<u8>>,
}

#[async_trait]
impl CotSender for CollectingSender {
    fn name(&self) -> &str {
        "collector"
    }

    fn format(&self) -> WireFormat {
        self.format
    }

    async fn send(&mut self, payload: &[u8]) -> Result<(), SendError> {
        let _ = self.payloads.send(payload.to_vec());
        Ok(())
    }
}

fn fixed_clock() -> Arc<FixedClock> {
    Arc::new(FixedClock(
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
    ))
}

#[tokio::test(start_paused = true)]
async fn detections_flow_from_feed_to_senders() {
    let feed = ScriptedFeed {
        messages: vec![
            r#"{"name":"CoffeeShopAP","mac":"AA:BB:CC:DD:EE:FF","manuf":"Acme","ssid":"espresso","rssi":-61,"geopoint":[-84.0,40.0],"alt":212.5}"#.to_string(),
            // no position fix yet, must be skipped silently
            r#"{"name":"Hidden","geopoint":0}"#.to_string(),
        ],
    };

    let (xml_tx, xml_payloads) = flume::unbounded();
    let (mesh_tx, mesh_payloads) = flume::unbounded();
    let senders: Vec<Box<dyn CotSender>> = vec![
        Box::new(CollectingSender {
            format: WireFormat::Xml,
            payloads: xml_tx,
        }),
        Box::new(CollectingSender {
            format: WireFormat::Mesh,
            payloads: mesh_tx,
        }),
    ];

    let (tx, rx) = flume::bounded(16);
    let cancel = CancellationToken::new();

    let ingest = tokio::spawn(run_ingest(
        feed,
        FieldMap::default(),
        IngestConfig::default(),
        fixed_clock(),
        tx,
        cancel.clone(),
    ));
    let dispatch = tokio::spawn(run_dispatch(
        rx,
        senders,
        DispatchConfig::default(),
        cancel.clone(),
    ));

    let xml = xml_payloads.recv_async().await.unwrap();
    let mesh = mesh_payloads.recv_async().await.unwrap();
    cancel.cancel();

    let ingest_stats = ingest.await.unwrap().unwrap();
    assert_eq!(ingest_stats.received, 2);
    assert_eq!(ingest_stats.forwarded, 1);
    assert_eq!(ingest_stats.skipped_no_position, 1);
    dispatch.await.unwrap();

    // XML copy carries the mapped identity and position
    let text = String::from_utf8(xml).unwrap();
    assert!(text.starts_with(r#"<event version="2.0" type="a-u-G" uid="CoffeeShopAP""#));
    assert!(text.contains(r#"lat="40.0""#));
    assert!(text.contains(r#"lon="-84.0""#));
    assert!(text.contains(r#"hae="212.5""#));
    assert!(text.contains("Manf=Acme SSID=espresso RSSI=-61 MAC=AA:BB:CC:DD:EE:FF Alt=212.5"));

    // mesh copy is framed protobuf and decodes back to the same event
    assert!(mesh.starts_with(MESH_HEADER));
    let event = decode(&mesh, WireFormat::Mesh).unwrap();
    assert_eq!(event.uid, "CoffeeShopAP");
    assert_eq!(event.lat, 40.0);
    assert_eq!(event.lon, -84.0);
    assert_eq!(event.time, fixed_clock().0);
}

#[tokio::test(start_paused = true)]
async fn skipped_records_produce_no_output() {
    let feed = ScriptedFeed {
        messages: vec![
            r#"{"name":"NoFix"}"#.to_string(),
            r#"{"name":"Origin","geopoint":[0.0,0.0]}"#.to_string(),
        ],
    };

    let (payload_tx, payloads) = flume::unbounded();
    let senders: Vec<Box<dyn CotSender>> = vec![Box::new(CollectingSender {
        format: WireFormat::Xml,
        payloads: payload_tx,
    })];

    let (tx, rx) = flume::bounded(16);
    let cancel = CancellationToken::new();

    let ingest = tokio::spawn(run_ingest(
        feed,
        FieldMap::default(),
        IngestConfig::default(),
        fixed_clock(),
        tx,
        cancel.clone(),
    ));
    let dispatch = tokio::spawn(run_dispatch(
        rx,
        senders,
        DispatchConfig::default(),
        cancel.clone(),
    ));

    // let the feed drain and one reconnect cycle pass
    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
    cancel.cancel();

    let stats = ingest.await.unwrap().unwrap();
    assert_eq!(stats.forwarded, 0);
    assert_eq!(stats.skipped_no_position, 2);
    dispatch.await.unwrap();

    assert!(payloads.is_empty());
}
