//! Redis Streams plumbing shared by all services.
//!
//! Messages are single-field records: the `data` field holds a JSON
//! object. Input job streams (one per job type) carry
//! `{job_id, job_type, payload, user_id}`; the outbound notification
//! stream carries `{type, user_id, ...}`. Consumer groups are created
//! from offset 0 with MKSTREAM, and BUSYGROUP on re-creation is ignored.

use crate::error::{Result, StreamError};
use crate::store::JobType;
use crate::UserId;
use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands as _;
use serde::{Deserialize, Serialize};

// Input job streams, one per job type.
pub const STREAM_IMAGE_TAG: &str = "llm:image_tag";
pub const STREAM_INTENT: &str = "llm:intent";
pub const STREAM_FOLLOWUP: &str = "llm:followup";
pub const STREAM_TASK_MATCH: &str = "llm:task_match";
pub const STREAM_EMAIL_EXTRACT: &str = "llm:email_extract";

/// Outbound notification stream consumed by the gateway.
pub const STREAM_NOTIFY: &str = "notify:out";

pub const GROUP_LLM_WORKER: &str = "llm-worker-group";
pub const GROUP_GATEWAY: &str = "gateway-group";

// Notification types on the outbound stream.
pub const NOTIFY_REMINDER: &str = "reminder";
pub const NOTIFY_EVENT_REPROMPT: &str = "event_reprompt";
pub const NOTIFY_IMAGE_TAG_RESULT: &str = "image_tag_result";
pub const NOTIFY_INTENT_RESULT: &str = "intent_result";
pub const NOTIFY_FOLLOWUP_RESULT: &str = "followup_result";
pub const NOTIFY_TASK_MATCH_RESULT: &str = "task_match_result";
pub const NOTIFY_EVENT_CONFIRMATION: &str = "event_confirmation";
pub const NOTIFY_JOB_FAILED: &str = "job_failed";

/// The input stream a job type is published to.
pub fn stream_for_job_type(job_type: JobType) -> &'static str {
    match job_type {
        JobType::ImageTag => STREAM_IMAGE_TAG,
        JobType::IntentClassify => STREAM_INTENT,
        JobType::Followup => STREAM_FOLLOWUP,
        JobType::TaskMatch => STREAM_TASK_MATCH,
        JobType::EmailExtract => STREAM_EMAIL_EXTRACT,
    }
}

/// The notification type a successful job of this type produces.
pub fn notify_type_for_job(job_type: JobType) -> &'static str {
    match job_type {
        JobType::ImageTag => NOTIFY_IMAGE_TAG_RESULT,
        JobType::IntentClassify => NOTIFY_INTENT_RESULT,
        JobType::Followup => NOTIFY_FOLLOWUP_RESULT,
        JobType::TaskMatch => NOTIFY_TASK_MATCH_RESULT,
        JobType::EmailExtract => NOTIFY_EVENT_CONFIRMATION,
    }
}

/// Message published on an input job stream when an LLM job is created.
///
/// `job_type` stays a string here: the worker must be able to ack-and-drop
/// messages whose type it has no handler for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMessage {
    pub job_id: String,
    pub job_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub user_id: Option<UserId>,
}

/// Message on the outbound notification stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl Notification {
    pub fn new(kind: &str, user_id: Option<UserId>, fields: serde_json::Value) -> Self {
        let fields = match fields {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        Self {
            kind: kind.to_string(),
            user_id,
            fields,
        }
    }

    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.fields.get(name)
    }

    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(|v| v.as_str())
    }
}

/// One delivered stream entry. `data` is None when the `data` field is
/// missing or not valid JSON; such entries are acked and dropped by the
/// consumer.
#[derive(Debug, Clone)]
pub struct StreamEntry {
    pub id: String,
    pub data: Option<serde_json::Value>,
}

/// Sink for outbound notifications. The broker publishes to the notify
/// stream; tests substitute a recorder.
#[async_trait::async_trait]
pub trait OutboundPublisher: Send + Sync {
    async fn publish_notification(&self, notification: &Notification) -> Result<()>;
}

/// Thin wrapper over a Redis connection manager for stream operations.
/// The manager reconnects automatically on connection loss.
#[derive(Clone)]
pub struct Broker {
    conn: ConnectionManager,
}

impl Broker {
    /// Connect and verify the broker with a PING.
    pub async fn connect(url: &str) -> Result<Self> {
        tracing::info!(%url, "connecting to stream broker");

        let client = redis::Client::open(url).map_err(StreamError::Redis)?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(StreamError::Redis)?;

        let mut ping_conn = conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut ping_conn)
            .await
            .map_err(StreamError::Redis)?;

        Ok(Self { conn })
    }

    /// Publish a JSON object as a single-field stream record. Returns the
    /// message id assigned by the broker.
    pub async fn publish<T: Serialize>(&self, stream: &str, message: &T) -> Result<String> {
        let json = serde_json::to_string(message)
            .map_err(|e| StreamError::Payload(format!("serialize: {e}")))?;

        let mut conn = self.conn.clone();
        let message_id: String = redis::cmd("XADD")
            .arg(stream)
            .arg("*")
            .arg("data")
            .arg(&json)
            .query_async(&mut conn)
            .await
            .map_err(StreamError::Redis)?;

        tracing::debug!(%stream, %message_id, "published stream message");
        Ok(message_id)
    }

    /// Create a consumer group from offset 0, creating the stream if
    /// absent. BUSYGROUP (group already exists) is ignored.
    pub async fn ensure_group(&self, stream: &str, group: &str) -> Result<()> {
        let mut conn = self.conn.clone();

        let result: std::result::Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(stream)
            .arg(group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(()) => {
                tracing::info!(%stream, %group, "created consumer group");
                Ok(())
            }
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(StreamError::ConsumerGroup(e.to_string()).into()),
        }
    }

    /// Read new messages for a consumer group with a short blocking wait.
    /// A block timeout with no messages returns an empty vec.
    pub async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block_ms: usize,
    ) -> Result<Vec<StreamEntry>> {
        let mut conn = self.conn.clone();

        let opts = StreamReadOptions::default()
            .group(group, consumer)
            .count(count)
            .block(block_ms);

        let result: std::result::Result<StreamReadReply, _> =
            conn.xread_options(&[stream], &[">"], &opts).await;

        let reply = match result {
            Ok(reply) => reply,
            // A BLOCK timeout surfaces as nil on some connection layers.
            Err(e) => {
                let text = e.to_string().to_lowercase();
                if text.contains("timeout") || text.contains("timed out") || text.contains("nil") {
                    return Ok(Vec::new());
                }
                return Err(StreamError::Redis(e).into());
            }
        };

        let mut entries = Vec::new();
        for key in reply.keys {
            for message in key.ids {
                let data = message
                    .map
                    .get("data")
                    .and_then(value_as_string)
                    .and_then(|raw| serde_json::from_str(&raw).ok());
                entries.push(StreamEntry {
                    id: message.id,
                    data,
                });
            }
        }

        Ok(entries)
    }

    /// Acknowledge one message for a consumer group.
    pub async fn ack(&self, stream: &str, group: &str, message_id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .xack(stream, group, &[message_id])
            .await
            .map_err(StreamError::Redis)?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl OutboundPublisher for Broker {
    async fn publish_notification(&self, notification: &Notification) -> Result<()> {
        self.publish(STREAM_NOTIFY, notification).await?;
        Ok(())
    }
}

fn value_as_string(value: &redis::Value) -> Option<String> {
    match value {
        redis::Value::BulkString(bytes) => Some(String::from_utf8_lossy(bytes).to_string()),
        redis::Value::SimpleString(s) => Some(s.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_message_round_trip() {
        let message = JobMessage {
            job_id: "j1".into(),
            job_type: "image_tag".into(),
            payload: serde_json::json!({"memory_id": "m1", "image_path": "/tmp/a.jpg"}),
            user_id: Some(42),
        };

        let json = serde_json::to_string(&message).unwrap();
        let back: JobMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back.job_id, "j1");
        assert_eq!(back.job_type, "image_tag");
        assert_eq!(back.user_id, Some(42));
        assert_eq!(back.payload["memory_id"], "m1");
    }

    #[test]
    fn test_job_message_tolerates_missing_optional_fields() {
        let back: JobMessage =
            serde_json::from_str(r#"{"job_id": "j2", "job_type": "followup"}"#).unwrap();
        assert_eq!(back.user_id, None);
        assert!(back.payload.is_null());
    }

    #[test]
    fn test_notification_flattens_fields() {
        let notification = Notification::new(
            NOTIFY_REMINDER,
            Some(7),
            serde_json::json!({"reminder_id": "r1", "memory_content": "buy milk"}),
        );

        let value = serde_json::to_value(&notification).unwrap();
        assert_eq!(value["type"], "reminder");
        assert_eq!(value["user_id"], 7);
        assert_eq!(value["reminder_id"], "r1");

        let back: Notification = serde_json::from_value(value).unwrap();
        assert_eq!(back.kind, NOTIFY_REMINDER);
        assert_eq!(back.field_str("memory_content"), Some("buy milk"));
    }

    #[test]
    fn test_stream_mapping_covers_all_job_types() {
        use crate::store::JobType;

        let streams: Vec<&str> = JobType::ALL.iter().map(|t| stream_for_job_type(*t)).collect();
        assert_eq!(
            streams,
            vec![
                STREAM_IMAGE_TAG,
                STREAM_INTENT,
                STREAM_FOLLOWUP,
                STREAM_TASK_MATCH,
                STREAM_EMAIL_EXTRACT
            ]
        );
        assert_eq!(notify_type_for_job(JobType::EmailExtract), NOTIFY_EVENT_CONFIRMATION);
    }

    #[tokio::test]
    #[ignore] // Requires a running Redis
    async fn test_connect_and_publish() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
        let broker = Broker::connect(&url).await.unwrap();

        broker.ensure_group(STREAM_NOTIFY, GROUP_GATEWAY).await.unwrap();
        let id = broker
            .publish(
                STREAM_NOTIFY,
                &Notification::new(NOTIFY_REMINDER, Some(1), serde_json::json!({})),
            )
            .await
            .unwrap();
        assert!(!id.is_empty());
    }
}
