//! Send side of a connection
//!
//! A single writer task per connection drains the outbound queue into the
//! transport, so frames from concurrent senders never interleave. Every write
//! is bounded by a deadline; a peer that stops reading gets closed instead of
//! stalling anyone else.

use futures_util::{Sink, SinkExt};
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::connection::handle::{Connection, OutboundQueue};
use crate::connection::reader::Frame;

/// Why the writer stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterExit {
    /// The connection was closed and every queued frame was written.
    Drained,
    /// The transport rejected a write.
    Failed,
    /// A write did not complete before the deadline.
    TimedOut,
}

/// Drain `queue` into `sink` until the connection closes or the transport
/// fails. On failure the connection is closed so its dispatcher loop ends.
pub async fn run_writer<K>(
    connection: Arc<Connection>,
    mut queue: OutboundQueue,
    mut sink: K,
    write_timeout: Duration,
) -> WriterExit
where
    K: Sink<Frame> + Unpin,
    K::Error: Display,
{
    while let Some(frame) = queue.recv().await {
        match timeout(write_timeout, sink.send(Frame::Text(frame.to_string()))).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(conn_id = %connection.id(), error = %e, "Write failed, closing connection");
                connection.close();
                return WriterExit::Failed;
            }
            Err(_) => {
                warn!(
                    conn_id = %connection.id(),
                    timeout_ms = write_timeout.as_millis() as u64,
                    "Write deadline exceeded, closing connection"
                );
                connection.close();
                return WriterExit::TimedOut;
            }
        }
    }

    // Queue closed: the connection was closed and everything queued is out.
    let goodbye = async {
        sink.send(Frame::Close).await?;
        sink.close().await
    };
    if let Ok(Err(e)) = timeout(write_timeout, goodbye).await {
        debug!(conn_id = %connection.id(), error = %e, "Close frame not delivered");
    }

    WriterExit::Drained
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::sink;
    use parking_lot::Mutex;

    type Written = Arc<Mutex<Vec<Frame>>>;

    fn recording_sink(written: Written) -> impl Sink<Frame, Error = String> + Unpin {
        Box::pin(sink::unfold(written, |written, frame: Frame| async move {
            written.lock().push(frame);
            Ok::<_, String>(written)
        }))
    }

    #[tokio::test]
    async fn test_writes_queued_frames_in_order_then_close() {
        let (conn, queue) = Connection::new(8);
        let written: Written = Arc::default();

        conn.send(Arc::from("one")).unwrap();
        conn.send(Arc::from("two")).unwrap();
        conn.close();

        let exit = run_writer(
            conn,
            queue,
            recording_sink(written.clone()),
            Duration::from_secs(1),
        )
        .await;

        assert_eq!(exit, WriterExit::Drained);
        assert_eq!(
            *written.lock(),
            vec![
                Frame::Text("one".to_string()),
                Frame::Text("two".to_string()),
                Frame::Close,
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_write_closes_connection() {
        let (conn, queue) = Connection::new(8);
        let broken = Box::pin(sink::unfold((), |_, _frame: Frame| async move {
            Err::<(), _>("broken pipe".to_string())
        }));

        conn.send(Arc::from("doomed")).unwrap();
        let exit = run_writer(conn.clone(), queue, broken, Duration::from_secs(1)).await;

        assert_eq!(exit, WriterExit::Failed);
        assert!(!conn.is_open());
    }

    #[tokio::test]
    async fn test_stalled_peer_hits_write_deadline() {
        let (conn, queue) = Connection::new(8);
        let stalled = Box::pin(sink::unfold((), |_, _frame: Frame| async move {
            futures_util::future::pending::<Result<(), String>>().await
        }));

        conn.send(Arc::from("never lands")).unwrap();
        let exit = tokio::time::timeout(
            Duration::from_secs(2),
            run_writer(conn.clone(), queue, stalled, Duration::from_millis(50)),
        )
        .await
        .expect("writer ignored its deadline");

        assert_eq!(exit, WriterExit::TimedOut);
        assert!(!conn.is_open());
        assert!(conn.send(Arc::from("after")).is_err());
    }
}
