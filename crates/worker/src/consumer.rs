//! AMQP consumer loop.
//!
//! Deliveries are processed strictly one at a time (prefetch 1) and
//! acknowledged only after the pipeline returns. A delivery interrupted by
//! shutdown is left unacknowledged so the broker hands it out again.

use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicQosOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{Connection, ConnectionProperties};
use tokio_util::sync::CancellationToken;

use modelforge_core::types::DbId;
use modelforge_pipeline::{JobPipeline, PipelineError};

use crate::config::QueueConfig;

/// At most one unacknowledged delivery per consumer.
const PREFETCH_COUNT: u16 = 1;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConsumerError {
    #[error("AMQP error while {context}: {source}")]
    Amqp {
        context: &'static str,
        #[source]
        source: lapin::Error,
    },

    #[error("Delivery stream closed by broker")]
    StreamClosed,
}

impl ConsumerError {
    fn amqp(context: &'static str) -> impl FnOnce(lapin::Error) -> Self {
        move |source| Self::Amqp { context, source }
    }
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("payload is not valid UTF-8")]
    NotUtf8,

    #[error("payload {0:?} is not a job id")]
    NotAnId(String),
}

// ---------------------------------------------------------------------------
// Handling
// ---------------------------------------------------------------------------

/// Something that executes one job to completion.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job_id: DbId, cancel: &CancellationToken) -> Result<(), PipelineError>;
}

#[async_trait]
impl JobHandler for JobPipeline {
    async fn handle(&self, job_id: DbId, cancel: &CancellationToken) -> Result<(), PipelineError> {
        self.run(job_id, cancel).await.map(|_| ())
    }
}

/// What happened to a single delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    Completed(DbId),
    /// The pipeline returned an error; the job's status records it.
    Failed(DbId),
    /// Payload could not be decoded and is dropped.
    Malformed,
    /// Shutdown interrupted the job.
    Cancelled(DbId),
}

impl HandleOutcome {
    pub fn should_ack(self) -> bool {
        !matches!(self, Self::Cancelled(_))
    }
}

/// Message bodies are the job id as plain text.
pub fn decode_job_id(payload: &[u8]) -> Result<DbId, DecodeError> {
    let text = std::str::from_utf8(payload).map_err(|_| DecodeError::NotUtf8)?;
    let trimmed = text.trim();
    trimmed
        .parse::<DbId>()
        .map_err(|_| DecodeError::NotAnId(trimmed.to_string()))
}

/// Decode `payload` and run the job it names.
pub async fn handle_payload<H: JobHandler + ?Sized>(
    handler: &H,
    payload: &[u8],
    cancel: &CancellationToken,
) -> HandleOutcome {
    let job_id = match decode_job_id(payload) {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!(error = %e, size = payload.len(), "Dropping malformed message");
            return HandleOutcome::Malformed;
        }
    };

    tracing::info!(job_id, "Message received");
    match handler.handle(job_id, cancel).await {
        Ok(()) => HandleOutcome::Completed(job_id),
        Err(PipelineError::Cancelled) => HandleOutcome::Cancelled(job_id),
        Err(e) => {
            tracing::error!(job_id, error = %e, "Job failed");
            HandleOutcome::Failed(job_id)
        }
    }
}

// ---------------------------------------------------------------------------
// Consumer loop
// ---------------------------------------------------------------------------

/// Consume `config.queue_name` until `shutdown` fires or the connection fails.
///
/// Returns `Ok(())` only on a requested shutdown.
pub async fn run<H: JobHandler + ?Sized>(
    config: &QueueConfig,
    handler: &H,
    shutdown: CancellationToken,
) -> Result<(), ConsumerError> {
    let connection = Connection::connect(&config.connection_string, ConnectionProperties::default())
        .await
        .map_err(ConsumerError::amqp("connecting"))?;
    let channel = connection
        .create_channel()
        .await
        .map_err(ConsumerError::amqp("opening channel"))?;

    channel
        .queue_declare(
            &config.queue_name,
            QueueDeclareOptions {
                durable: true,
                ..QueueDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(ConsumerError::amqp("declaring queue"))?;
    channel
        .basic_qos(PREFETCH_COUNT, BasicQosOptions::default())
        .await
        .map_err(ConsumerError::amqp("setting prefetch"))?;

    let consumer_tag = format!("modelforge-worker-{}", uuid::Uuid::new_v4());
    let mut deliveries = channel
        .basic_consume(
            &config.queue_name,
            &consumer_tag,
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(ConsumerError::amqp("starting consumer"))?;

    tracing::info!(queue = %config.queue_name, consumer_tag = %consumer_tag, "Waiting for jobs");

    loop {
        let delivery = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            next = deliveries.next() => match next {
                Some(Ok(delivery)) => delivery,
                Some(Err(e)) => return Err(ConsumerError::amqp("receiving delivery")(e)),
                None => return Err(ConsumerError::StreamClosed),
            },
        };

        let outcome = handle_payload(handler, &delivery.data, &shutdown).await;
        if !outcome.should_ack() {
            tracing::warn!(?outcome, delivery_tag = delivery.delivery_tag, "Leaving delivery unacknowledged");
            break;
        }

        delivery
            .acker
            .ack(BasicAckOptions::default())
            .await
            .map_err(ConsumerError::amqp("acknowledging delivery"))?;
        tracing::debug!(?outcome, delivery_tag = delivery.delivery_tag, "Delivery acknowledged");
    }

    tracing::info!("Consumer stopping");
    if let Err(e) = channel.close(200, "worker shutdown").await {
        tracing::warn!(error = %e, "Failed to close channel");
    }
    if let Err(e) = connection.close(200, "worker shutdown").await {
        tracing::warn!(error = %e, "Failed to close connection");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use assert_matches::assert_matches;

    use super::*;

    /// Replays a fixed result and records the ids it was asked to run.
    struct ScriptedHandler {
        result: fn(DbId) -> Result<(), PipelineError>,
        seen: Mutex<Vec<DbId>>,
    }

    impl ScriptedHandler {
        fn new(result: fn(DbId) -> Result<(), PipelineError>) -> Self {
            Self {
                result,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl JobHandler for ScriptedHandler {
        async fn handle(&self, job_id: DbId, _cancel: &CancellationToken) -> Result<(), PipelineError> {
            self.seen.lock().unwrap().push(job_id);
            (self.result)(job_id)
        }
    }

    #[test]
    fn decodes_trimmed_integer() {
        assert_eq!(decode_job_id(b"42"), Ok(42));
        assert_eq!(decode_job_id(b" 7\n"), Ok(7));
    }

    #[test]
    fn rejects_non_numeric_payloads() {
        assert_matches!(decode_job_id(b"abc"), Err(DecodeError::NotAnId(s)) if s == "abc");
        assert_matches!(decode_job_id(b""), Err(DecodeError::NotAnId(_)));
        assert_eq!(decode_job_id(&[0xff, 0xfe]), Err(DecodeError::NotUtf8));
    }

    #[tokio::test]
    async fn successful_job_is_acked() {
        let handler = ScriptedHandler::new(|_| Ok(()));
        let outcome = handle_payload(&handler, b"42", &CancellationToken::new()).await;

        assert_eq!(outcome, HandleOutcome::Completed(42));
        assert!(outcome.should_ack());
        assert_eq!(*handler.seen.lock().unwrap(), vec![42]);
    }

    #[tokio::test]
    async fn failed_job_is_still_acked() {
        let handler = ScriptedHandler::new(|id| Err(PipelineError::NoFiles(id)));
        let outcome = handle_payload(&handler, b"7", &CancellationToken::new()).await;

        assert_eq!(outcome, HandleOutcome::Failed(7));
        assert!(outcome.should_ack());
    }

    #[tokio::test]
    async fn malformed_payload_is_dropped_without_running() {
        let handler = ScriptedHandler::new(|_| Ok(()));
        let outcome = handle_payload(&handler, b"not-a-number", &CancellationToken::new()).await;

        assert_eq!(outcome, HandleOutcome::Malformed);
        assert!(outcome.should_ack());
        assert!(handler.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancelled_job_is_not_acked() {
        let handler = ScriptedHandler::new(|_| Err(PipelineError::Cancelled));
        let outcome = handle_payload(&handler, b"9", &CancellationToken::new()).await;

        assert_eq!(outcome, HandleOutcome::Cancelled(9));
        assert!(!outcome.should_ack());
    }
}
