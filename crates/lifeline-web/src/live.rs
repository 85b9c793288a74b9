//! Live lists pushed over a websocket.
//!
//! The socket sends one JSON snapshot when it opens and another after every
//! refresh. Closing the socket disposes the live list, which closes the
//! platform subscription.

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use lifeline_app::victim;
use lifeline_app::volunteer;
use lifeline_app::{LiveList, Principal};
use lifeline_platform::Platform;
use lifeline_types::models::HelpRequest;

use crate::error::ApiError;
use crate::pages::{self, RequestCard};
use crate::session::Caller;

#[derive(Debug, Serialize)]
struct SnapshotFrame {
    list: String,
    generation: u64,
    requests: Vec<RequestCard>,
}

pub async fn my_requests<P: Platform>(
    State(platform): State<P>,
    Caller(principal): Caller,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let list = victim::watch_my_requests(&platform, &principal).await?;
    Ok(ws.on_upgrade(move |socket| stream_list(socket, principal, list, pages::cards)))
}

pub async fn pending<P: Platform>(
    State(platform): State<P>,
    Caller(principal): Caller,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let list = volunteer::watch_pending(&platform, &principal).await?;
    Ok(ws.on_upgrade(move |socket| {
        stream_list(socket, principal, list, pages::cards_with_directions)
    }))
}

fn frame(list: &LiveList<HelpRequest>, render: fn(Vec<HelpRequest>) -> Vec<RequestCard>) -> Option<Message> {
    let snapshot = SnapshotFrame {
        list: list.name().to_string(),
        generation: list.generation(),
        requests: render(list.snapshot()),
    };
    match serde_json::to_string(&snapshot) {
        Ok(text) => Some(Message::Text(text.into())),
        Err(e) => {
            warn!("Could not encode {} snapshot: {}", list.name(), e);
            None
        }
    }
}

async fn stream_list(
    socket: WebSocket,
    principal: Principal,
    mut list: LiveList<HelpRequest>,
    render: fn(Vec<HelpRequest>) -> Vec<RequestCard>,
) {
    let (mut sender, mut receiver) = socket.split();
    info!("{} watching {}", principal.profile.email, list.name());

    if let Some(msg) = frame(&list, render) {
        if sender.send(msg).await.is_err() {
            list.dispose();
            return;
        }
    }

    loop {
        tokio::select! {
            refreshed = list.refreshed() => {
                if refreshed.is_none() {
                    debug!("{} stopped refreshing", list.name());
                    break;
                }
                let Some(msg) = frame(&list, render) else { continue };
                if sender.send(msg).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                // Clients have nothing to say on this socket.
                Some(Ok(_)) => {}
            },
        }
    }

    info!("{} stopped watching {}", principal.profile.email, list.name());
    list.dispose();
}
