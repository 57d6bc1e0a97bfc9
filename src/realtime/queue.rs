//! Outbound and inbound frame queues.
//!
//! Both queues are unbounded FIFO channels with one consumer. Producers never
//! wait; the consumer is woken on push instead of polling.

use tokio::sync::mpsc;
pub use tokio::sync::mpsc::error::TryRecvError;

use crate::realtime::client::RealtimeError;
use crate::realtime::proto::{ClientMessage, InboundFrame};

/// Creates the outbound queue pair.
pub(crate) fn outbound_queue() -> (OutboundQueue, OutboundDrain) {
    let (tx, rx) = mpsc::unbounded_channel();
    (OutboundQueue { tx }, OutboundDrain { rx })
}

/// Creates the inbound queue pair.
pub(crate) fn inbound_queue() -> (InboundFeed, InboundQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (InboundFeed { tx }, InboundQueue { rx })
}

/// Producer side of the outbound queue.
///
/// Messages are serialized on push; the queue only ever holds wire text.
#[derive(Clone, Debug)]
pub struct OutboundQueue {
    tx: mpsc::UnboundedSender<String>,
}

impl OutboundQueue {
    pub fn push(&self, message: &ClientMessage) -> Result<(), RealtimeError> {
        let text = message.to_text()?;
        self.tx
            .send(text)
            .map_err(|_| RealtimeError::SendQueueClosed)
    }

    /// True once the sender loop has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side of the outbound queue, owned by the sender loop.
#[derive(Debug)]
pub(crate) struct OutboundDrain {
    rx: mpsc::UnboundedReceiver<String>,
}

impl OutboundDrain {
    /// Waits for the oldest queued frame. `None` once every producer is gone
    /// and the queue is empty.
    pub(crate) async fn next(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    pub(crate) fn len(&self) -> usize {
        self.rx.len()
    }
}

/// Producer side of the inbound queue, owned by the receiver loop.
#[derive(Clone, Debug)]
pub(crate) struct InboundFeed {
    tx: mpsc::UnboundedSender<InboundFrame>,
}

impl InboundFeed {
    /// Appends a frame. Returns `false` when the consumer has been dropped.
    pub(crate) fn push(&self, frame: InboundFrame) -> bool {
        self.tx.send(frame).is_ok()
    }
}

/// Consumer side of the inbound queue.
#[derive(Debug)]
pub struct InboundQueue {
    rx: mpsc::UnboundedReceiver<InboundFrame>,
}

impl InboundQueue {
    /// Waits for the next frame in arrival order.
    ///
    /// Returns `None` after the connection has closed and every received
    /// frame has been drained.
    pub async fn recv(&mut self) -> Option<InboundFrame> {
        self.rx.recv().await
    }

    /// Takes the next frame if one is already queued.
    ///
    /// `Empty` means nothing has arrived yet; `Disconnected` means the
    /// connection is gone and every received frame has been drained.
    pub fn try_recv(&mut self) -> Result<InboundFrame, TryRecvError> {
        self.rx.try_recv()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{inbound_queue, outbound_queue, TryRecvError};
    use crate::realtime::client::RealtimeError;
    use crate::realtime::ids::CorrelationId;
    use crate::realtime::proto::{ClientMessage, InboundFrame};

    fn unsub(id: &str) -> ClientMessage {
        ClientMessage::Unsub {
            id: CorrelationId::new(id),
        }
    }

    #[tokio::test]
    async fn outbound_drains_in_push_order() {
        let (queue, mut drain) = outbound_queue();
        for n in 1..=5 {
            queue.push(&unsub(&n.to_string())).expect("push");
        }
        assert_eq!(drain.len(), 5);

        for n in 1..=5 {
            let text = drain.next().await.expect("queued frame");
            assert_eq!(text, format!(r#"{{"msg":"unsub","id":"{n}"}}"#));
        }
    }

    #[tokio::test]
    async fn outbound_keeps_order_with_interleaved_consumer() {
        let (queue, mut drain) = outbound_queue();
        let producer = tokio::spawn(async move {
            for n in 0..200 {
                queue.push(&unsub(&n.to_string())).expect("push");
                if n % 7 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        });

        let mut received = Vec::new();
        while let Some(text) = drain.next().await {
            let message = ClientMessage::from_text(&text).expect("decode");
            received.push(message.id().expect("id").as_str().parse::<u32>().expect("n"));
        }
        producer.await.expect("producer task");

        assert_eq!(received, (0..200).collect::<Vec<_>>());
    }

    #[test]
    fn push_after_drain_dropped_reports_closed_queue() {
        let (queue, drain) = outbound_queue();
        drop(drain);
        assert!(queue.is_closed());
        assert!(matches!(
            queue.push(&unsub("1")),
            Err(RealtimeError::SendQueueClosed)
        ));
    }

    #[tokio::test]
    async fn inbound_delivers_in_arrival_order() {
        let (feed, mut queue) = inbound_queue();
        assert!(queue.is_empty());
        assert!(feed.push(InboundFrame::Text("a".to_string())));
        assert!(feed.push(InboundFrame::Binary(vec![1, 2])));
        assert!(feed.push(InboundFrame::Text("c".to_string())));
        drop(feed);

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.recv().await, Some(InboundFrame::Text("a".to_string())));
        assert_eq!(queue.try_recv(), Ok(InboundFrame::Binary(vec![1, 2])));
        assert_eq!(queue.recv().await, Some(InboundFrame::Text("c".to_string())));
        assert_eq!(queue.recv().await, None);
    }

    #[test]
    fn try_recv_tells_empty_from_disconnected() {
        let (feed, mut queue) = inbound_queue();
        assert_eq!(queue.try_recv(), Err(TryRecvError::Empty));

        assert!(feed.push(InboundFrame::Text("last".to_string())));
        drop(feed);

        assert_eq!(queue.try_recv(), Ok(InboundFrame::Text("last".to_string())));
        assert_eq!(queue.try_recv(), Err(TryRecvError::Disconnected));
    }

    #[test]
    fn inbound_push_fails_without_consumer() {
        let (feed, queue) = inbound_queue();
        drop(queue);
        assert!(!feed.push(InboundFrame::Text("lost".to_string())));
    }
}
