//! Outbound notification consumer.
//!
//! Reads the notify stream with the gateway's own consumer group, renders
//! each notification to user-facing text, and delivers it through the
//! platform adapter. Malformed entries are acked and skipped; a delivery
//! failure leaves the message unacked so the broker redelivers it.

use crate::error::Result;
use crate::gateway::ChatInterface;
use crate::streams::{
    Broker, Notification, StreamEntry, GROUP_GATEWAY, NOTIFY_EVENT_CONFIRMATION,
    NOTIFY_EVENT_REPROMPT, NOTIFY_FOLLOWUP_RESULT, NOTIFY_IMAGE_TAG_RESULT, NOTIFY_INTENT_RESULT,
    NOTIFY_JOB_FAILED, NOTIFY_REMINDER, NOTIFY_TASK_MATCH_RESULT, STREAM_NOTIFY,
};
use std::sync::Arc;
use tokio::time::Duration;

/// Shown when a background job failed on the user's behalf.
const TRY_AGAIN_MESSAGE: &str =
    "Sorry, something went wrong processing your request. Please try again.";

/// Render a notification to the text the user sees. Returns None for
/// types that produce no user-facing message.
pub fn render_notification(notification: &Notification) -> Option<String> {
    match notification.kind.as_str() {
        NOTIFY_REMINDER => {
            let text = notification
                .field_str("memory_content")
                .unwrap_or("you asked me to remind you about something");
            Some(format!("⏰ Reminder: {text}"))
        }
        NOTIFY_EVENT_REPROMPT => {
            let description = notification.field_str("description").unwrap_or("an event");
            let date = notification.field_str("event_date").unwrap_or("an unknown date");
            Some(format!(
                "You still have a pending event: \"{description}\" on {date}. Confirm or reject it?"
            ))
        }
        NOTIFY_IMAGE_TAG_RESULT => {
            let description = notification.field_str("description").unwrap_or_default();
            let tags = notification
                .field("tags")
                .and_then(|v| v.as_array())
                .map(|a| {
                    a.iter()
                        .filter_map(|t| t.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .unwrap_or_default();

            if tags.is_empty() {
                Some(format!("I looked at your photo: {description}"))
            } else {
                Some(format!(
                    "I looked at your photo: {description}\nSuggested tags: {tags}"
                ))
            }
        }
        NOTIFY_INTENT_RESULT => {
            let query = notification.field_str("query").unwrap_or_default();
            let intent = notification.field_str("intent").unwrap_or("ambiguous");
            Some(format!("Your search \"{query}\" looks like a {intent} request."))
        }
        NOTIFY_FOLLOWUP_RESULT => notification.field_str("question").map(str::to_string),
        NOTIFY_TASK_MATCH_RESULT => {
            let description = notification
                .field_str("task_description")
                .unwrap_or("one of your tasks");
            Some(format!("Does this mean you finished \"{description}\"?"))
        }
        NOTIFY_EVENT_CONFIRMATION => {
            let description = notification.field_str("description")?;
            let date = notification.field_str("event_date").unwrap_or("an unknown date");
            Some(format!(
                "I found an event in that email: \"{description}\" on {date}. Should I save it?"
            ))
        }
        NOTIFY_JOB_FAILED => Some(TRY_AGAIN_MESSAGE.to_string()),
        other => {
            tracing::warn!(kind = %other, "unknown notification type");
            None
        }
    }
}

/// Handle one delivered notify-stream entry. Returns true when the entry
/// should be acknowledged.
pub async fn handle_notification(
    entry: &StreamEntry,
    interface: &dyn ChatInterface,
) -> Result<bool> {
    let Some(data) = &entry.data else {
        tracing::warn!(message_id = %entry.id, "notification has no decodable data, acking");
        return Ok(true);
    };

    let notification: Notification = match serde_json::from_value(data.clone()) {
        Ok(notification) => notification,
        Err(error) => {
            tracing::warn!(message_id = %entry.id, %error, "malformed notification, acking");
            return Ok(true);
        }
    };

    let Some(user_id) = notification.user_id else {
        tracing::warn!(message_id = %entry.id, kind = %notification.kind, "notification without user_id, acking");
        return Ok(true);
    };

    let Some(text) = render_notification(&notification) else {
        return Ok(true);
    };

    // A failed send leaves the message unacked; the broker redelivers it
    // after the idle timeout.
    interface.send_message(user_id, &text).await?;
    Ok(true)
}

/// Run the notify consumer until shutdown.
pub async fn run_notify_consumer(
    broker: Broker,
    interface: Arc<dyn ChatInterface>,
    consumer_name: &str,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) -> Result<()> {
    broker.ensure_group(STREAM_NOTIFY, GROUP_GATEWAY).await?;
    tracing::info!(consumer = %consumer_name, "notify consumer started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        let entries = match broker
            .read_group(STREAM_NOTIFY, GROUP_GATEWAY, consumer_name, 10, 1000)
            .await
        {
            Ok(entries) => entries,
            Err(error) => {
                tracing::error!(%error, "notify stream read failed, backing off");
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                    _ = shutdown.changed() => {}
                }
                continue;
            }
        };

        for entry in entries {
            match handle_notification(&entry, interface.as_ref()).await {
                Ok(true) => {
                    if let Err(error) = broker.ack(STREAM_NOTIFY, GROUP_GATEWAY, &entry.id).await {
                        tracing::error!(message_id = %entry.id, %error, "failed to ack notification");
                    }
                }
                Ok(false) => {}
                Err(error) => {
                    tracing::error!(message_id = %entry.id, %error, "failed to deliver notification");
                }
            }
        }
    }

    tracing::info!("notify consumer stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::UserId;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingInterface {
        sent: Mutex<Vec<(UserId, String)>>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl ChatInterface for RecordingInterface {
        async fn send_message(&self, user_id: UserId, text: &str) -> Result<()> {
            if self.fail {
                return Err(anyhow::anyhow!("platform down").into());
            }
            self.sent.lock().unwrap().push((user_id, text.to_string()));
            Ok(())
        }
    }

    fn entry(data: serde_json::Value) -> StreamEntry {
        StreamEntry {
            id: "1-0".into(),
            data: Some(data),
        }
    }

    #[test]
    fn test_render_reminder_and_event_types() {
        let reminder = Notification::new(
            NOTIFY_REMINDER,
            Some(1),
            serde_json::json!({"memory_content": "buy milk"}),
        );
        assert_eq!(render_notification(&reminder).unwrap(), "⏰ Reminder: buy milk");

        let reprompt = Notification::new(
            NOTIFY_EVENT_REPROMPT,
            Some(1),
            serde_json::json!({"description": "dentist", "event_date": "2026-08-04"}),
        );
        let text = render_notification(&reprompt).unwrap();
        assert!(text.contains("dentist"));
        assert!(text.contains("2026-08-04"));

        let failed = Notification::new(NOTIFY_JOB_FAILED, Some(1), serde_json::json!({}));
        assert_eq!(render_notification(&failed).unwrap(), TRY_AGAIN_MESSAGE);
    }

    #[test]
    fn test_render_image_tags_and_followup() {
        let tagged = Notification::new(
            NOTIFY_IMAGE_TAG_RESULT,
            Some(1),
            serde_json::json!({"description": "a cat on a sofa", "tags": ["cat", "sofa"]}),
        );
        let text = render_notification(&tagged).unwrap();
        assert!(text.contains("a cat on a sofa"));
        assert!(text.contains("cat, sofa"));

        let followup = Notification::new(
            NOTIFY_FOLLOWUP_RESULT,
            Some(1),
            serde_json::json!({"question": "Did you mean the Lisbon trip?"}),
        );
        assert_eq!(
            render_notification(&followup).unwrap(),
            "Did you mean the Lisbon trip?"
        );

        // Event confirmation with no description renders nothing.
        let empty = Notification::new(NOTIFY_EVENT_CONFIRMATION, Some(1), serde_json::json!({}));
        assert!(render_notification(&empty).is_none());
    }

    #[tokio::test]
    async fn test_handle_delivers_and_acks() {
        let interface = RecordingInterface::default();
        let ok = handle_notification(
            &entry(serde_json::json!({
                "type": "reminder",
                "user_id": 9,
                "memory_content": "stretch",
            })),
            &interface,
        )
        .await
        .unwrap();

        assert!(ok);
        let sent = interface.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, 9);
        assert!(sent[0].1.contains("stretch"));
    }

    #[tokio::test]
    async fn test_malformed_entries_are_acked_without_delivery() {
        let interface = RecordingInterface::default();

        // No data at all.
        assert!(handle_notification(
            &StreamEntry {
                id: "2-0".into(),
                data: None
            },
            &interface
        )
        .await
        .unwrap());

        // Missing type field.
        assert!(
            handle_notification(&entry(serde_json::json!({"user_id": 1})), &interface)
                .await
                .unwrap()
        );

        // Missing user_id.
        assert!(handle_notification(
            &entry(serde_json::json!({"type": "reminder"})),
            &interface
        )
        .await
        .unwrap());

        assert!(interface.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delivery_failure_propagates_for_redelivery() {
        let interface = RecordingInterface {
            fail: true,
            ..Default::default()
        };

        let result = handle_notification(
            &entry(serde_json::json!({
                "type": "reminder",
                "user_id": 3,
                "memory_content": "x",
            })),
            &interface,
        )
        .await;

        assert!(result.is_err(), "failed delivery must not ack");
    }
}
