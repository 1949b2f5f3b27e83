//! Worker consumer loop: round-robin over the input job streams.
//!
//! Non-poisoning semantics: malformed messages and unknown job types are
//! acknowledged and dropped; handler failures retry with backoff by NOT
//! acknowledging (the broker redelivers) until the attempt budget is
//! spent, at which point the job is marked failed and the message acked.
//! A message redelivered after its job already reached a terminal status
//! is acknowledged without touching the model.

use crate::error::Result;
use crate::store::JobType;
use crate::streams::{
    notify_type_for_job, Broker, JobMessage, Notification, OutboundPublisher, StreamEntry,
    GROUP_LLM_WORKER, NOTIFY_EVENT_CONFIRMATION, NOTIFY_JOB_FAILED, STREAM_EMAIL_EXTRACT,
    STREAM_FOLLOWUP, STREAM_IMAGE_TAG, STREAM_INTENT, STREAM_TASK_MATCH,
};
use crate::worker::{CoreApi, JobHandler, RetryTracker};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Duration;

/// Message acknowledgement seam, so the consumer is testable without a
/// broker.
#[async_trait::async_trait]
pub trait StreamAck: Send + Sync {
    async fn ack_message(&self, stream: &str, group: &str, message_id: &str) -> Result<()>;
}

#[async_trait::async_trait]
impl StreamAck for Broker {
    async fn ack_message(&self, stream: &str, group: &str, message_id: &str) -> Result<()> {
        self.ack(stream, group, message_id).await
    }
}

/// Everything a replica needs to process messages.
pub struct WorkerContext {
    pub handlers: HashMap<String, Arc<dyn JobHandler>>,
    pub core: Arc<dyn CoreApi>,
    pub publisher: Arc<dyn OutboundPublisher>,
    pub acker: Arc<dyn StreamAck>,
    pub consumer_name: String,
}

/// Process one delivered stream entry.
pub async fn process_message(
    ctx: &WorkerContext,
    stream: &str,
    entry: &StreamEntry,
    retry: &mut RetryTracker,
) -> Result<()> {
    let ack = || ctx.acker.ack_message(stream, GROUP_LLM_WORKER, &entry.id);

    // Malformed: no data field, bad JSON, or missing job_id/job_type.
    let message: JobMessage = match &entry.data {
        Some(data) => match serde_json::from_value(data.clone()) {
            Ok(message) => message,
            Err(error) => {
                tracing::warn!(message_id = %entry.id, %error, "malformed job message, acking");
                return ack().await;
            }
        },
        None => {
            tracing::warn!(message_id = %entry.id, "job message has no decodable data, acking");
            return ack().await;
        }
    };
    if message.job_id.is_empty() || message.job_type.is_empty() {
        tracing::warn!(message_id = %entry.id, "job message missing job_id or job_type, acking");
        return ack().await;
    }

    let Some(handler) = ctx.handlers.get(&message.job_type) else {
        tracing::warn!(job_type = %message.job_type, "no handler for job type, acking");
        return ack().await;
    };

    // Redelivery of a terminal job must not re-invoke the model. Skip the
    // check (and proceed) if Core cannot be consulted right now.
    match ctx.core.job_status(&message.job_id).await {
        Ok(Some(status)) if status.is_terminal() => {
            tracing::info!(job_id = %message.job_id, %status, "job already terminal, acking redelivery");
            retry.clear(&message.job_id);
            return ack().await;
        }
        Ok(_) => {}
        Err(error) => {
            tracing::warn!(job_id = %message.job_id, %error, "could not consult job status, proceeding");
        }
    }

    let attempt = retry.record_attempt(&message.job_id);
    let retries_left = retry.should_retry(&message.job_id);

    match handler
        .handle(&message.job_id, &message.payload, message.user_id)
        .await
    {
        Ok(Some(result)) => {
            ctx.core
                .update_job(
                    &message.job_id,
                    crate::store::JobStatus::Completed,
                    Some(result.clone()),
                    None,
                )
                .await?;
            retry.clear(&message.job_id);

            let kind = JobType::parse(&message.job_type)
                .map(notify_type_for_job)
                .unwrap_or(NOTIFY_EVENT_CONFIRMATION);
            let mut fields = serde_json::Map::new();
            fields.insert("job_id".into(), serde_json::json!(message.job_id));
            fields.insert(
                "memory_id".into(),
                message
                    .payload
                    .get("memory_id")
                    .cloned()
                    .unwrap_or(serde_json::Value::Null),
            );
            if let serde_json::Value::Object(result_fields) = result {
                for (key, value) in result_fields {
                    fields.insert(key, value);
                }
            }

            ctx.publisher
                .publish_notification(&Notification {
                    kind: kind.to_string(),
                    user_id: message.user_id,
                    fields,
                })
                .await?;

            ack().await
        }
        Ok(None) => {
            ctx.core
                .update_job(&message.job_id, crate::store::JobStatus::Completed, None, None)
                .await?;
            retry.clear(&message.job_id);
            ack().await
        }
        Err(error) => {
            let error_message = error.to_string();
            tracing::error!(job_id = %message.job_id, attempt, error = %error_message, "job handler failed");

            if retries_left {
                ctx.core
                    .update_job(&message.job_id, crate::store::JobStatus::Processing, None, None)
                    .await?;
                tracing::info!(job_id = %message.job_id, attempt, "will retry via redelivery");
                // Not acked: the broker redelivers after the idle timeout.
                tokio::time::sleep(Duration::from_secs_f64(
                    retry.backoff_seconds(&message.job_id),
                ))
                .await;
                Ok(())
            } else {
                tracing::error!(job_id = %message.job_id, attempt, "job failed after final attempt");
                ctx.core
                    .update_job(
                        &message.job_id,
                        crate::store::JobStatus::Failed,
                        None,
                        Some(error_message.clone()),
                    )
                    .await?;

                ctx.publisher
                    .publish_notification(&Notification::new(
                        NOTIFY_JOB_FAILED,
                        message.user_id,
                        serde_json::json!({
                            "job_id": message.job_id,
                            "job_type": message.job_type,
                            "memory_id": message.payload.get("memory_id").cloned(),
                            "error_message": error_message,
                        }),
                    ))
                    .await?;

                retry.clear(&message.job_id);
                ack().await
            }
        }
    }
}

/// Run the consumer loop until shutdown: create the consumer groups, then
/// round-robin the input streams with a ~1 s blocking read each, yielding
/// briefly between full rounds.
pub async fn run_consumer(
    broker: Broker,
    ctx: WorkerContext,
    max_retries: u32,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) -> Result<()> {
    const STREAMS: [&str; 5] = [
        STREAM_IMAGE_TAG,
        STREAM_INTENT,
        STREAM_FOLLOWUP,
        STREAM_TASK_MATCH,
        STREAM_EMAIL_EXTRACT,
    ];

    for stream in STREAMS {
        broker.ensure_group(stream, GROUP_LLM_WORKER).await?;
    }

    tracing::info!(
        consumer = %ctx.consumer_name,
        streams = STREAMS.len(),
        max_retries,
        "worker consumer started"
    );

    let mut retry = RetryTracker::new(max_retries);

    loop {
        if *shutdown.borrow() {
            break;
        }

        for stream in STREAMS {
            if *shutdown.borrow() {
                break;
            }

            let entries = match broker
                .read_group(stream, GROUP_LLM_WORKER, &ctx.consumer_name, 1, 1000)
                .await
            {
                Ok(entries) => entries,
                Err(error) => {
                    tracing::error!(%stream, %error, "stream read failed, backing off");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            for entry in entries {
                tracing::info!(message_id = %entry.id, %stream, "processing job message");
                if let Err(error) = process_message(&ctx, stream, &entry, &mut retry).await {
                    tracing::error!(message_id = %entry.id, %error, "error processing job message");
                }
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(100)) => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    tracing::info!("worker consumer stopped");
    Ok(())
}
