use crate::engine::{EngineError, EngineHandle};
use lookalike_core::{NewIdentity, PipelineError, RecordStore, RecordSummary};
use std::sync::Arc;
use zbus::interface;

pub const BUS_NAME: &str = "org.lookalike.Lookalike1";
pub const OBJECT_PATH: &str = "/org/lookalike/Lookalike1";

/// Static facts reported by `Status()`.
#[derive(Debug, Clone)]
pub struct ServiceInfo {
    pub camera_device: String,
    pub db_path: String,
    pub match_threshold: f64,
}

/// D-Bus interface for the Lookalike daemon.
///
/// Bus name: org.lookalike.Lookalike1
/// Object path: /org/lookalike/Lookalike1
pub struct LookalikeService {
    engine: EngineHandle,
    store: Arc<dyn RecordStore + Send + Sync>,
    info: ServiceInfo,
}

impl LookalikeService {
    pub fn new(
        engine: EngineHandle,
        store: Arc<dyn RecordStore + Send + Sync>,
        info: ServiceInfo,
    ) -> Self {
        Self {
            engine,
            store,
            info,
        }
    }
}

#[interface(name = "org.lookalike.Lookalike1")]
impl LookalikeService {
    /// Capture a frame and enroll it under `name`/`age`. Returns the record id.
    async fn enroll(&self, name: &str, age: i64) -> zbus::fdo::Result<i64> {
        tracing::info!(name, age, "enroll requested");
        let identity = NewIdentity::new(name, age).map_err(|e| {
            tracing::info!(error = %e, "enroll rejected");
            zbus::fdo::Error::InvalidArgs(e.to_string())
        })?;
        self.engine.enroll(identity).await.map_err(to_fdo)
    }

    /// Capture a frame and match it against enrolled records.
    ///
    /// Returns a JSON `MatchResult`.
    async fn detect(&self) -> zbus::fdo::Result<String> {
        tracing::info!("detect requested");
        let result = self.engine.detect().await.map_err(to_fdo)?;
        serde_json::to_string(&result).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// List enrolled records (without photos) as a JSON array.
    async fn list_records(&self) -> zbus::fdo::Result<String> {
        tracing::info!("list_records requested");
        let store = Arc::clone(&self.store);
        let summaries = tokio::task::spawn_blocking(move || list_summaries(store.as_ref()))
            .await
            .map_err(|e| zbus::fdo::Error::Failed(format!("list task failed: {e}")))??;
        serde_json::to_string(&summaries).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        Ok(status_json(&self.info).to_string())
    }
}

fn list_summaries(store: &dyn RecordStore) -> zbus::fdo::Result<Vec<RecordSummary>> {
    let records = store
        .list_all()
        .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
    Ok(records.iter().map(|r| r.summary()).collect())
}

fn status_json(info: &ServiceInfo) -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "camera": info.camera_device,
        "database": info.db_path,
        "match_threshold": info.match_threshold,
    })
}

/// Map engine failures onto D-Bus errors. Capture and image problems are
/// ordinary request failures; everything else is reported as a daemon fault.
pub fn to_fdo(err: EngineError) -> zbus::fdo::Error {
    match &err {
        EngineError::Pipeline(PipelineError::Capture(_))
        | EngineError::Pipeline(PipelineError::Signature(_)) => {
            tracing::warn!(error = %err, "request failed");
            zbus::fdo::Error::Failed(err.to_string())
        }
        _ => {
            tracing::error!(error = %err, "engine fault");
            zbus::fdo::Error::IOError(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::spawn_engine;
    use image::{Rgb, RgbImage};
    use lookalike_core::{Capture, CaptureError, MemoryStore, Pipeline};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Capture source that counts how many frames were requested.
    struct CountingCapture {
        frames: Arc<AtomicUsize>,
    }

    impl Capture for CountingCapture {
        fn capture(&mut self) -> Result<RgbImage, CaptureError> {
            self.frames.fetch_add(1, Ordering::SeqCst);
            Ok(RgbImage::from_fn(16, 16, |x, y| {
                let v = (x * 16 + y) as u8;
                Rgb([v, v, v])
            }))
        }
    }

    fn test_info() -> ServiceInfo {
        ServiceInfo {
            camera_device: "/dev/video0".into(),
            db_path: "/tmp/records.db".into(),
            match_threshold: 0.9,
        }
    }

    fn service_over(store: Arc<MemoryStore>, frames: Arc<AtomicUsize>) -> LookalikeService {
        let capture = CountingCapture { frames };
        let engine = spawn_engine(Pipeline::new(Arc::clone(&store), capture)).unwrap();
        LookalikeService::new(engine, store, test_info())
    }

    #[tokio::test]
    async fn test_invalid_enroll_rejected_before_capture() {
        let store = Arc::new(MemoryStore::new());
        let frames = Arc::new(AtomicUsize::new(0));
        let service = service_over(Arc::clone(&store), Arc::clone(&frames));

        for (name, age) in [("", 30), ("   ", 30), ("Eve", -1)] {
            match service.enroll(name, age).await {
                Err(zbus::fdo::Error::InvalidArgs(_)) => {}
                other => panic!("enroll({name:?}, {age}) returned {other:?}"),
            }
        }
        assert!(store.is_empty());
        assert_eq!(frames.load(Ordering::SeqCst), 0);

        let id = service.enroll("Eve", 29).await.unwrap();
        assert_eq!(id, 1);
        assert_eq!(store.len(), 1);
        assert_eq!(frames.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_list_records_reads_shared_store() {
        let store = Arc::new(MemoryStore::new());
        let service = service_over(Arc::clone(&store), Arc::new(AtomicUsize::new(0)));

        service.enroll("Alice", 30).await.unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&service.list_records().await.unwrap()).unwrap();
        assert_eq!(json[0]["name"], "Alice");
        assert_eq!(json[0]["age"], 30);
    }

    #[test]
    fn test_capture_failure_maps_to_failed() {
        let err = EngineError::Pipeline(PipelineError::Capture(CaptureError::Failed(
            "no camera".into(),
        )));
        match to_fdo(err) {
            zbus::fdo::Error::Failed(msg) => assert!(msg.contains("no camera")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_channel_closed_maps_to_io_error() {
        assert!(matches!(
            to_fdo(EngineError::ChannelClosed),
            zbus::fdo::Error::IOError(_)
        ));
    }

    #[test]
    fn test_list_summaries_omits_photos() {
        let store = MemoryStore::new();
        store
            .append(&NewIdentity::new("Alice", 30).unwrap(), &[1, 2, 3])
            .unwrap();
        let summaries = list_summaries(&store).unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].photo_bytes, 3);

        let json = serde_json::to_value(&summaries).unwrap();
        assert!(json[0].get("photo").is_none());
    }

    #[test]
    fn test_status_json_fields() {
        let json = status_json(&test_info());
        assert_eq!(json["camera"], "/dev/video0");
        assert_eq!(json["match_threshold"], 0.9);
    }
}
