//! Realtime change feeds over the hosted service's Phoenix websocket.
//!
//! One socket per subscription: join a `postgres_changes` channel for the
//! table, then forward every matching change into the [`Subscription`]'s
//! channel until the socket closes or the subscription is dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

use noteify_shared::constants::{REALTIME_HEARTBEAT_SECS, SUBSCRIPTION_BUFFER};
use noteify_shared::{BackendError, ChangeEvent, ChangeKind, Filter, Subscription, Table};

const JOIN_TIMEOUT: Duration = Duration::from_secs(10);
const JOIN_REF: &str = "1";

static CHANNEL_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Deserialize)]
struct PhoenixMessage {
    topic: String,
    event: String,
    #[serde(default)]
    payload: Value,
    #[serde(rename = "ref", default)]
    reference: Option<String>,
}

fn phoenix(topic: &str, event: &str, payload: Value, reference: &str) -> String {
    json!({
        "topic": topic,
        "event": event,
        "payload": payload,
        "ref": reference,
        "join_ref": JOIN_REF,
    })
    .to_string()
}

pub(crate) fn websocket_url(api_url: &str, anon_key: &str) -> String {
    let base = if let Some(rest) = api_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = api_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        api_url.to_string()
    };
    format!("{base}/realtime/v1/websocket?apikey={anon_key}&vsn=1.0.0")
}

/// Server-side filter string. Only equality and membership are supported
/// by the service; anything else is filtered locally.
pub(crate) fn server_filter(filter: &Filter) -> Option<String> {
    let text = |v: &Value| match v {
        Value::String(s) => Some(s.clone()),
        Value::Bool(_) | Value::Number(_) => Some(v.to_string()),
        _ => None,
    };
    match filter {
        Filter::Eq(column, value) => Some(format!("{column}=eq.{}", text(value)?)),
        Filter::In(column, values) => {
            let items = values.iter().map(text).collect::<Option<Vec<_>>>()?;
            Some(format!("{column}=in.({})", items.join(",")))
        }
        Filter::Contains(..) | Filter::ILike(..) => None,
    }
}

fn join_payload(table: Table, filter: Option<&Filter>, access_token: Option<&str>) -> Value {
    let mut change = json!({
        "event": "*",
        "schema": "public",
        "table": table.as_str(),
    });
    if let Some(server) = filter.and_then(server_filter) {
        change["filter"] = Value::String(server);
    }
    let mut payload = json!({
        "config": {
            "broadcast": { "self": false },
            "presence": { "key": "" },
            "postgres_changes": [change],
        },
    });
    if let Some(token) = access_token {
        payload["access_token"] = Value::String(token.to_string());
    }
    payload
}

/// Decode a `postgres_changes` payload into a [`ChangeEvent`].
pub(crate) fn parse_change(table: Table, payload: &Value) -> Option<ChangeEvent> {
    let data = payload.get("data")?;
    let kind: ChangeKind = serde_json::from_value(data.get("type")?.clone()).ok()?;
    let image = |key: &str| {
        data.get(key)
            .filter(|v| v.as_object().is_some_and(|o| !o.is_empty()))
            .cloned()
    };
    let (new, old) = match kind {
        ChangeKind::Insert => (image("record"), None),
        ChangeKind::Update => (image("record"), image("old_record")),
        ChangeKind::Delete => (None, image("old_record")),
    };
    Some(ChangeEvent {
        table,
        kind,
        new,
        old,
    })
}

/// Whether `event` passes the local filter. Delete images may carry only
/// the primary key; those are let through when the column is absent.
fn wanted(filter: Option<&Filter>, event: &ChangeEvent) -> bool {
    let (Some(filter), Some(row)) = (filter, event.row()) else {
        return true;
    };
    row.get(filter.column()).is_none() || filter.matches(row)
}

pub(crate) async fn subscribe(
    api_url: &str,
    anon_key: &str,
    access_token: Option<String>,
    table: Table,
    filter: Option<Filter>,
) -> Result<Subscription, BackendError> {
    let url = websocket_url(api_url, anon_key);
    let (ws_stream, _) = connect_async(url.as_str())
        .await
        .map_err(|e| BackendError::Subscription(e.to_string()))?;
    let (mut write, mut read) = ws_stream.split();

    let seq = CHANNEL_SEQ.fetch_add(1, Ordering::Relaxed);
    let topic = format!("realtime:noteify-{table}-{seq}");
    let join = phoenix(
        &topic,
        "phx_join",
        join_payload(table, filter.as_ref(), access_token.as_deref()),
        JOIN_REF,
    );
    write
        .send(Message::Text(join.into()))
        .await
        .map_err(|e| BackendError::Subscription(e.to_string()))?;

    // wait for the join acknowledgement
    let joined = timeout(JOIN_TIMEOUT, async {
        while let Some(frame) = read.next().await {
            let frame = frame.map_err(|e| BackendError::Subscription(e.to_string()))?;
            let Message::Text(text) = frame else {
                continue;
            };
            let Ok(msg) = serde_json::from_str::<PhoenixMessage>(&text) else {
                continue;
            };
            if msg.topic != topic || msg.event != "phx_reply" || msg.reference.as_deref() != Some(JOIN_REF) {
                continue;
            }
            return match msg.payload.get("status").and_then(Value::as_str) {
                Some("ok") => Ok(()),
                _ => Err(BackendError::Subscription(format!(
                    "join rejected: {}",
                    msg.payload.get("response").unwrap_or(&Value::Null)
                ))),
            };
        }
        Err(BackendError::Subscription("socket closed during join".into()))
    })
    .await
    .map_err(|_| BackendError::Subscription("join timed out".into()))?;
    joined?;
    debug!(%topic, "realtime channel joined");

    let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
    let task_topic = topic.clone();
    let task = tokio::spawn(async move {
        let mut heartbeat = interval(Duration::from_secs(REALTIME_HEARTBEAT_SECS));
        heartbeat.tick().await;
        let mut next_ref: u64 = 2;

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    let frame = phoenix("phoenix", "heartbeat", json!({}), &next_ref.to_string());
                    next_ref += 1;
                    if let Err(e) = write.send(Message::Text(frame.into())).await {
                        warn!(topic = %task_topic, "heartbeat failed: {}", e);
                        break;
                    }
                }
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        let Ok(msg) = serde_json::from_str::<PhoenixMessage>(&text) else {
                            continue;
                        };
                        if msg.topic != task_topic {
                            continue;
                        }
                        match msg.event.as_str() {
                            "postgres_changes" => {
                                let Some(event) = parse_change(table, &msg.payload) else {
                                    continue;
                                };
                                if !wanted(filter.as_ref(), &event) {
                                    continue;
                                }
                                if tx.send(event).await.is_err() {
                                    break;
                                }
                            }
                            "phx_close" | "phx_error" => {
                                warn!(topic = %task_topic, event = %msg.event, "realtime channel ended");
                                break;
                            }
                            _ => {}
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(topic = %task_topic, "realtime socket closed");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(topic = %task_topic, "realtime socket error: {}", e);
                        break;
                    }
                },
            }
        }
    });

    Ok(Subscription::new(topic, rx, task))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn websocket_url_swaps_scheme() {
        assert_eq!(
            websocket_url("https://abc.supabase.co", "k"),
            "wss://abc.supabase.co/realtime/v1/websocket?apikey=k&vsn=1.0.0"
        );
        assert_eq!(
            websocket_url("http://localhost:54321", "k"),
            "ws://localhost:54321/realtime/v1/websocket?apikey=k&vsn=1.0.0"
        );
    }

    #[test]
    fn only_eq_and_in_go_to_the_server() {
        assert_eq!(
            server_filter(&Filter::eq("conversation_id", "c1")).as_deref(),
            Some("conversation_id=eq.c1")
        );
        assert_eq!(
            server_filter(&Filter::is_in("id", ["a", "b"])).as_deref(),
            Some("id=in.(a,b)")
        );
        assert_eq!(server_filter(&Filter::contains("participant_ids", ["u"])), None);

        let payload = join_payload(Table::Messages, Some(&Filter::eq("conversation_id", "c1")), Some("jwt"));
        assert_eq!(payload["config"]["postgres_changes"][0]["filter"], "conversation_id=eq.c1");
        assert_eq!(payload["access_token"], "jwt");
    }

    #[test]
    fn parses_postgres_changes() {
        let payload = json!({
            "ids": [1],
            "data": {
                "type": "UPDATE",
                "schema": "public",
                "table": "notes",
                "commit_timestamp": "2024-05-01T10:00:00Z",
                "record": { "id": "n1", "title": "new" },
                "old_record": { "id": "n1" },
            }
        });
        let event = parse_change(Table::Notes, &payload).unwrap();
        assert_eq!(event.kind, ChangeKind::Update);
        assert_eq!(event.new, Some(json!({ "id": "n1", "title": "new" })));
        assert_eq!(event.old, Some(json!({ "id": "n1" })));

        let delete = json!({ "data": { "type": "DELETE", "record": {}, "old_record": { "id": "m1" } } });
        let event = parse_change(Table::Messages, &delete).unwrap();
        assert_eq!(event.new, None);
        assert_eq!(event.row(), Some(&json!({ "id": "m1" })));

        assert!(parse_change(Table::Notes, &json!({ "data": { "type": "TRUNCATE" } })).is_none());
    }

    #[test]
    fn contains_filter_applies_locally() {
        let filter = Filter::contains("participant_ids", ["u1"]);
        let event = |row: Value| ChangeEvent {
            table: Table::Conversations,
            kind: ChangeKind::Insert,
            new: Some(row),
            old: None,
        };
        assert!(wanted(Some(&filter), &event(json!({ "participant_ids": ["u1", "u2"] }))));
        assert!(!wanted(Some(&filter), &event(json!({ "participant_ids": ["u3", "u2"] }))));
        assert!(wanted(Some(&filter), &event(json!({ "id": "only-key" }))));
        assert!(wanted(None, &event(json!({}))));
    }
}
