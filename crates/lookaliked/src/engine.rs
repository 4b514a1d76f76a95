use lookalike_core::{Capture, MatchResult, NewIdentity, Pipeline, PipelineError, RecordId, RecordStore};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("engine thread exited")]
    ChannelClosed,
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Messages sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    Enroll {
        identity: NewIdentity,
        reply: oneshot::Sender<Result<RecordId, EngineError>>,
    },
    Detect {
        reply: oneshot::Sender<Result<MatchResult, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Request enrollment: capture a frame and store it under `identity`.
    pub async fn enroll(&self, identity: NewIdentity) -> Result<RecordId, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Enroll {
                identity,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Request detection: capture a frame and match it against the store.
    pub async fn detect(&self) -> Result<MatchResult, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Detect { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread owns the pipeline (and with it the camera and the signature
/// cache) and serves one request at a time, so captures never interleave.
/// It exits once every [`EngineHandle`] has been dropped.
pub fn spawn_engine<S, C>(mut pipeline: Pipeline<S, C>) -> Result<EngineHandle, EngineError>
where
    S: RecordStore + Send + 'static,
    C: Capture + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("lookalike-engine".into())
        .spawn(move || {
            tracing::info!(threshold = pipeline.threshold(), "engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Enroll { identity, reply } => {
                        let result = pipeline.enroll(&identity).map_err(EngineError::from);
                        let _ = reply.send(result);
                    }
                    EngineRequest::Detect { reply } => {
                        let result = pipeline.detect().map_err(EngineError::from);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx })
}
