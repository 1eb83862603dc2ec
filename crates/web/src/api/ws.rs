use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
};
use chrono::Utc;
use model::{location::LocationSample, stop::Location, user::User};
use serde::Deserialize;
use serde_json::json;
use utility::id::Id;

use crate::WebState;

#[derive(Debug, Deserialize)]
struct LocationUpdate {
    latitude: f64,
    longitude: f64,
    speed: Option<f64>,
    heading: Option<f64>,
}

/// Persistent per-rider location stream. The rider must hold an active
/// on-bus session; otherwise the stream is closed with a policy violation.
pub(crate) async fn location_stream(
    ws: WebSocketUpgrade,
    State(state): State<WebState>,
    Path(user_id): Path<i32>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_stream(socket, state, Id::new(user_id)))
}

async fn handle_stream(mut socket: WebSocket, state: WebState, user_id: Id<User>) {
    let on_bus = matches!(
        state.transit_client.active_session(user_id).await,
        Ok(Some(session)) if session.content.is_on_bus
    );
    if !on_bus {
        log::info!("rider {user_id} connected without an active on-bus session");
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: close_code::POLICY,
                reason: "no active on-bus tracking session".into(),
            })))
            .await;
        return;
    }

    log::info!("rider {user_id} connected to the location stream");

    while let Some(frame) = socket.recv().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(why) => {
                log::debug!("location stream of rider {user_id} errored: {why}");
                break;
            }
        };

        match frame {
            Message::Text(text) => {
                // Malformed frames are answered, never fatal.
                let Ok(update) = serde_json::from_str::<LocationUpdate>(&text) else {
                    send_error(&mut socket, "invalid location data").await;
                    continue;
                };
                let location = Location::new(update.latitude, update.longitude);
                if !location.is_valid() {
                    send_error(&mut socket, "invalid latitude/longitude").await;
                    continue;
                }

                let sample = LocationSample {
                    user_id,
                    location,
                    speed: update.speed,
                    heading: update.heading,
                    timestamp: Utc::now(),
                };
                if let Err(why) = state.transit_client.record_location(&sample).await {
                    log::error!("failed to store location of rider {user_id}: {why:?}");
                    send_error(&mut socket, "could not store location").await;
                    continue;
                }
                state.engine.enqueue(sample);
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    log::info!("rider {user_id} disconnected from the location stream");
}

async fn send_error(socket: &mut WebSocket, message: &str) {
    let _ = socket
        .send(Message::Text(json!({ "error": message }).to_string()))
        .await;
}
