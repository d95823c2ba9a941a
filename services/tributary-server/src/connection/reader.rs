//! Receive side of a connection
//!
//! `ConnectionReader` owns the inbound half of the transport and turns frames
//! into decoded commands. It is driven by exactly one dispatcher loop.

use futures_util::{Stream, StreamExt};
use std::fmt::Display;
use std::sync::Arc;

use crate::connection::handle::Connection;
use crate::connection::protocol::Command;
use crate::error::{ProtocolViolation, ReceiveError};

/// Transport-neutral WebSocket frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    /// Ping/pong traffic; answered by the transport, skipped here
    Control,
    Close,
}

pub struct ConnectionReader<S> {
    connection: Arc<Connection>,
    stream: S,
}

impl<S, E> ConnectionReader<S>
where
    S: Stream<Item = Result<Frame, E>> + Unpin,
    E: Display,
{
    pub fn new(connection: Arc<Connection>, stream: S) -> Self {
        Self { connection, stream }
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Wait for the next command.
    ///
    /// Returns [`ReceiveError::Closed`] as soon as the connection is closed
    /// locally, even while blocked on the network.
    pub async fn receive(&mut self) -> Result<Command, ReceiveError> {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.connection.closed() => return Err(ReceiveError::Closed),
                next = self.stream.next() => next,
            };

            match next {
                Some(Ok(Frame::Text(text))) => return Ok(Command::decode(&text)?),
                Some(Ok(Frame::Binary(data))) => {
                    let text =
                        String::from_utf8(data).map_err(|_| ProtocolViolation::InvalidJson)?;
                    return Ok(Command::decode(&text)?);
                }
                Some(Ok(Frame::Control)) => continue,
                Some(Ok(Frame::Close)) | None => return Err(ReceiveError::Closed),
                Some(Err(e)) => return Err(ReceiveError::Transport(e.to_string())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use std::time::Duration;

    type Item = Result<Frame, String>;

    fn text(raw: &str) -> Item {
        Ok(Frame::Text(raw.to_string()))
    }

    #[tokio::test]
    async fn test_receive_decodes_text_frames() {
        let (conn, _rx) = Connection::new(4);
        let frames = stream::iter(vec![text(r#"{"command":"BROADCAST","message":"hi"}"#)]);
        let mut reader = ConnectionReader::new(conn, frames);

        let cmd = reader.receive().await.unwrap();
        assert_eq!(cmd.name, "BROADCAST");
        assert!(matches!(reader.receive().await, Err(ReceiveError::Closed)));
    }

    #[tokio::test]
    async fn test_receive_accepts_utf8_binary_and_skips_control() {
        let (conn, _rx) = Connection::new(4);
        let frames = stream::iter(vec![
            Ok::<_, String>(Frame::Control),
            Ok(Frame::Binary(br#"{"command":"DANCE"}"#.to_vec())),
            Ok(Frame::Binary(vec![0xff, 0xfe])),
        ]);
        let mut reader = ConnectionReader::new(conn, frames);

        assert_eq!(reader.receive().await.unwrap().name, "DANCE");
        assert!(matches!(
            reader.receive().await,
            Err(ReceiveError::Protocol(ProtocolViolation::InvalidJson))
        ));
    }

    #[tokio::test]
    async fn test_receive_reports_protocol_violations() {
        let (conn, _rx) = Connection::new(4);
        let frames = stream::iter(vec![text(r#""not an object""#), text(r#"{"nope":1}"#)]);
        let mut reader = ConnectionReader::new(conn, frames);

        assert!(matches!(
            reader.receive().await,
            Err(ReceiveError::Protocol(ProtocolViolation::NotAnObject))
        ));
        assert!(matches!(
            reader.receive().await,
            Err(ReceiveError::Protocol(ProtocolViolation::MissingCommand))
        ));
    }

    #[tokio::test]
    async fn test_receive_close_frame_and_transport_error() {
        let (conn, _rx) = Connection::new(4);
        let frames = stream::iter(vec![Err("connection reset".to_string()), Ok(Frame::Close)]);
        let mut reader = ConnectionReader::new(conn, frames);

        match reader.receive().await {
            Err(ReceiveError::Transport(e)) => assert_eq!(e, "connection reset"),
            other => panic!("expected transport error, got {other:?}"),
        }
        assert!(matches!(reader.receive().await, Err(ReceiveError::Closed)));
    }

    #[tokio::test]
    async fn test_close_unblocks_pending_receive() {
        let (conn, _rx) = Connection::new(4);
        let mut reader = ConnectionReader::new(conn.clone(), stream::pending::<Item>());

        let pending = tokio::spawn(async move { reader.receive().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        conn.close();

        let result = tokio::time::timeout(Duration::from_secs(1), pending)
            .await
            .expect("receive did not wake after close")
            .unwrap();
        assert!(matches!(result, Err(ReceiveError::Closed)));
    }

    #[tokio::test]
    async fn test_receive_after_close_fails_immediately() {
        let (conn, _rx) = Connection::new(4);
        conn.close();
        let frames = stream::iter(vec![text(r#"{"command":"BROADCAST"}"#)]);
        let mut reader = ConnectionReader::new(conn, frames);
        assert!(matches!(reader.receive().await, Err(ReceiveError::Closed)));
    }
}
