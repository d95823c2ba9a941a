//! WebSocket session lifecycle: glue between an upgraded axum socket and the
//! transport-neutral reader, writer and dispatcher.

use axum::extract::ws::{Message, WebSocket};
use futures_util::{future, SinkExt, StreamExt};
use std::net::SocketAddr;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::connection::handle::Connection;
use crate::connection::reader::{ConnectionReader, Frame};
use crate::connection::writer::run_writer;
use crate::server::AppState;

impl From<Message> for Frame {
    fn from(message: Message) -> Self {
        match message {
            Message::Text(text) => Frame::Text(text),
            Message::Binary(data) => Frame::Binary(data),
            Message::Ping(_) | Message::Pong(_) => Frame::Control,
            Message::Close(_) => Frame::Close,
        }
    }
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => Message::Text(text),
            Frame::Binary(data) => Message::Binary(data),
            Frame::Control => Message::Ping(Vec::new()),
            Frame::Close => Message::Close(None),
        }
    }
}

/// Run one client session from upgrade until disconnect.
pub async fn run_session(socket: WebSocket, peer: Option<SocketAddr>, state: AppState) {
    let (connection, queue) = Connection::new(state.limits.outbound_queue_capacity);
    let span = info_span!("session", conn_id = %connection.id());

    async move {
        info!(peer = ?peer, "Client connected");

        let (ws_tx, ws_rx) = socket.split();
        let sink = ws_tx.with(|frame: Frame| future::ready(Ok::<_, axum::Error>(Message::from(frame))));
        let writer = tokio::spawn(
            run_writer(
                connection.clone(),
                queue,
                sink,
                state.limits.write_timeout(),
            )
            .in_current_span(),
        );

        let inbound = ws_rx.map(|message| message.map(Frame::from));
        let summary = state
            .dispatcher
            .run(ConnectionReader::new(connection, inbound))
            .await;

        match writer.await {
            Ok(exit) => debug!(?exit, "Writer finished"),
            Err(e) => warn!(error = %e, "Writer task failed"),
        }

        info!(commands = summary.commands, reason = %summary.reason, "Client disconnected");
    }
    .instrument(span)
    .await
}
