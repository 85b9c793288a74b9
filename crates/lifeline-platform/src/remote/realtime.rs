//! Change-feed subscriptions over the hosted realtime websocket (Phoenix
//! channel protocol).

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use lifeline_types::events::{ChangeEvent, ChangeFilter, ChangeKind};

use crate::error::{PlatformError, PlatformResult};
use crate::subscription::{SUBSCRIPTION_BUFFER, Subscription};

/// The service drops channels that stay silent for longer than this.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

#[derive(Debug, Serialize, Deserialize)]
struct PhoenixMessage {
    topic: String,
    event: String,
    #[serde(default)]
    payload: Value,
    #[serde(rename = "ref", default)]
    reference: Option<String>,
}

impl PhoenixMessage {
    fn to_text(&self) -> PlatformResult<Message> {
        serde_json::to_string(self)
            .map(|s| Message::Text(s.into()))
            .map_err(|e| PlatformError::Transport(e.to_string()))
    }
}

/// `ws(s)://…/realtime/v1/websocket?apikey=…&vsn=1.0.0`
pub(crate) fn socket_url(base: &Url, anon_key: &str) -> PlatformResult<Url> {
    let mut url = base
        .join("realtime/v1/websocket")
        .map_err(|e| PlatformError::Transport(e.to_string()))?;
    let scheme = match base.scheme() {
        "https" => "wss",
        _ => "ws",
    };
    url.set_scheme(scheme)
        .map_err(|_| PlatformError::Transport(format!("cannot use {} for realtime", base)))?;
    url.query_pairs_mut()
        .append_pair("apikey", anon_key)
        .append_pair("vsn", "1.0.0");
    Ok(url)
}

fn join_message(name: &str, filter: &ChangeFilter, access_token: &str) -> PhoenixMessage {
    let mut change = json!({
        "event": "*",
        "schema": "public",
        "table": filter.table.as_str(),
    });
    if let Some(expression) = filter.expression() {
        change["filter"] = Value::String(expression);
    }

    PhoenixMessage {
        topic: format!("realtime:{}", name),
        event: "phx_join".into(),
        payload: json!({
            "config": {
                "broadcast": { "self": false },
                "presence": { "key": "" },
                "postgres_changes": [change],
            },
            "access_token": access_token,
        }),
        reference: Some("1".into()),
    }
}

/// Pull a change out of a `postgres_changes` frame.
fn parse_change(filter: &ChangeFilter, payload: &Value) -> Option<ChangeEvent> {
    let data = payload.get("data")?;
    let kind = match data.get("type")?.as_str()? {
        "INSERT" => ChangeKind::Insert,
        "UPDATE" => ChangeKind::Update,
        "DELETE" => ChangeKind::Delete,
        other => {
            debug!("Ignoring realtime change type {}", other);
            return None;
        }
    };
    let old_record = data.get("old_record").filter(|v| !v.is_null()).cloned();
    Some(ChangeEvent {
        table: filter.table,
        kind,
        record: data.get("record").cloned().unwrap_or(Value::Null),
        old_record,
    })
}

/// Wait for the server to answer the join (ref "1"). Changes are only
/// delivered once it has said "ok".
async fn await_join<S>(receiver: &mut S, topic: &str) -> PlatformResult<()>
where
    S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(frame) = receiver.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => return Err(PlatformError::Transport(format!("realtime join failed: {}", e))),
        };
        let Ok(msg) = serde_json::from_str::<PhoenixMessage>(text.as_str()) else {
            continue;
        };
        if msg.event != "phx_reply" || msg.topic != topic || msg.reference.as_deref() != Some("1") {
            continue;
        }
        return match msg.payload["status"].as_str() {
            Some("ok") => Ok(()),
            _ => {
                error!("Realtime channel {} rejected: {}", topic, msg.payload["response"]);
                Err(PlatformError::Rejected(format!(
                    "Realtime subscription rejected: {}",
                    msg.payload["response"]
                )))
            }
        };
    }
    Err(PlatformError::Transport(format!("realtime channel {} closed before joining", topic)))
}

/// Open a websocket, join a channel for `filter`, and forward its changes.
pub(crate) async fn subscribe(
    base: &Url,
    anon_key: &str,
    access_token: &str,
    name: &str,
    filter: ChangeFilter,
) -> PlatformResult<Subscription> {
    let url = socket_url(base, anon_key)?;
    let (socket, _) = connect_async(url.as_str())
        .await
        .map_err(|e| PlatformError::Transport(format!("realtime connect failed: {}", e)))?;
    let (mut sender, mut receiver) = socket.split();

    let join = join_message(name, &filter, access_token);
    let topic = join.topic.clone();
    sender
        .send(join.to_text()?)
        .await
        .map_err(|e| PlatformError::Transport(e.to_string()))?;
    await_join(&mut receiver, &topic).await?;
    info!("Joined realtime channel {} for {}", topic, filter.table);

    let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
    let label = name.to_string();

    let task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut next_ref: u64 = 2;

        loop {
            tokio::select! {
                frame = receiver.next() => {
                    let text = match frame {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(_))) | None => {
                            info!("Realtime channel {} closed by server", label);
                            break;
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            warn!("Realtime channel {} failed: {}", label, e);
                            break;
                        }
                    };

                    let msg: PhoenixMessage = match serde_json::from_str(text.as_str()) {
                        Ok(msg) => msg,
                        Err(e) => {
                            trace!("Unparseable realtime frame: {}", e);
                            continue;
                        }
                    };

                    match msg.event.as_str() {
                        "postgres_changes" => {
                            let Some(event) = parse_change(&filter, &msg.payload) else {
                                continue;
                            };
                            if tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        "phx_reply" if msg.payload["status"] == "error" => {
                            error!("Realtime channel {} reported: {}", label, msg.payload["response"]);
                        }
                        "phx_error" | "phx_close" => {
                            warn!("Realtime channel {} ended: {}", label, msg.event);
                            break;
                        }
                        _ => {}
                    }
                }
                _ = heartbeat.tick() => {
                    let beat = PhoenixMessage {
                        topic: "phoenix".into(),
                        event: "heartbeat".into(),
                        payload: json!({}),
                        reference: Some(next_ref.to_string()),
                    };
                    next_ref += 1;
                    let Ok(frame) = beat.to_text() else { break };
                    if sender.send(frame).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    Ok(Subscription::new(name, rx, task))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifeline_types::events::Table;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    /// One-connection realtime server: reads the join, answers with `reply`,
    /// then sends `then` frames.
    async fn realtime_server(reply: Value, then: Vec<Value>) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let join = match ws.next().await {
                Some(Ok(Message::Text(text))) => serde_json::from_str::<PhoenixMessage>(text.as_str()).unwrap(),
                other => panic!("expected join, got {:?}", other),
            };
            assert_eq!(join.event, "phx_join");
            let answer = PhoenixMessage {
                topic: join.topic.clone(),
                event: "phx_reply".into(),
                payload: reply,
                reference: join.reference.clone(),
            };
            ws.send(answer.to_text().unwrap()).await.unwrap();
            for payload in then {
                let frame = PhoenixMessage {
                    topic: join.topic.clone(),
                    event: "postgres_changes".into(),
                    payload,
                    reference: None,
                };
                ws.send(frame.to_text().unwrap()).await.unwrap();
            }
            // Hold the socket open until the client goes away.
            while let Some(Ok(_)) = ws.next().await {}
        });
        Url::parse(&format!("http://{}/", addr)).unwrap()
    }

    #[tokio::test]
    async fn rejected_join_is_an_error() {
        let base = realtime_server(
            json!({ "status": "error", "response": { "reason": "Invalid JWT" } }),
            vec![],
        )
        .await;
        let result =
            subscribe(&base, "anon", "bad-token", "pending", ChangeFilter::table(Table::HelpRequests)).await;
        match result {
            Err(PlatformError::Rejected(msg)) => assert!(msg.contains("Invalid JWT"), "{}", msg),
            Err(other) => panic!("unexpected error {:?}", other),
            Ok(_) => panic!("subscription opened despite rejected join"),
        }
    }

    #[tokio::test]
    async fn accepted_join_forwards_changes() {
        let change = json!({
            "data": { "type": "INSERT", "table": "help_requests", "record": { "id": "7" } }
        });
        let base = realtime_server(json!({ "status": "ok", "response": {} }), vec![change]).await;
        let mut sub = subscribe(&base, "anon", "tok", "pending", ChangeFilter::table(Table::HelpRequests))
            .await
            .unwrap();
        let event = sub.next().await.unwrap();
        assert_eq!(event.kind, ChangeKind::Insert);
        assert_eq!(event.record["id"], "7");
    }

    #[test]
    fn socket_url_switches_scheme() {
        let base = Url::parse("https://abc.supabase.co/").unwrap();
        let url = socket_url(&base, "anon").unwrap();
        assert_eq!(url.as_str(), "wss://abc.supabase.co/realtime/v1/websocket?apikey=anon&vsn=1.0.0");

        let local = Url::parse("http://localhost:54321/").unwrap();
        assert_eq!(socket_url(&local, "k").unwrap().scheme(), "ws");
    }

    #[test]
    fn join_carries_filter_and_token() {
        let filter = ChangeFilter::eq(Table::HelpRequests, "victim_id", "abc");
        let join = join_message("my-requests", &filter, "tok");
        assert_eq!(join.topic, "realtime:my-requests");
        let change = &join.payload["config"]["postgres_changes"][0];
        assert_eq!(change["table"], "help_requests");
        assert_eq!(change["filter"], "victim_id=eq.abc");
        assert_eq!(join.payload["access_token"], "tok");

        let unfiltered = join_message("pending", &ChangeFilter::table(Table::HelpRequests), "tok");
        assert!(unfiltered.payload["config"]["postgres_changes"][0].get("filter").is_none());
    }

    #[test]
    fn change_frames_become_events() {
        let filter = ChangeFilter::table(Table::HelpRequests);
        let payload = json!({
            "data": {
                "type": "UPDATE",
                "table": "help_requests",
                "record": { "id": "1", "status": "in_progress" },
                "old_record": { "id": "1" }
            },
            "ids": [1]
        });
        let event = parse_change(&filter, &payload).unwrap();
        assert_eq!(event.kind, ChangeKind::Update);
        assert_eq!(event.record["status"], "in_progress");
        assert!(event.old_record.is_some());

        assert!(parse_change(&filter, &json!({ "data": { "type": "TRUNCATE" } })).is_none());
    }
}
