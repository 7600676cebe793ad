use merx_core::telemetry::TelemetrySink;
use merx_shared::events::TelemetryEvent;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

enum Message {
    Event(TelemetryEvent),
    Flush(oneshot::Sender<()>),
}

/// Bounded, best-effort telemetry queue.
///
/// Producers hand events over with a non-blocking `try_send`; when the
/// queue is full the event is dropped and counted, never letting
/// observability back-pressure an orchestration call. A background task
/// drains the queue and flushes batches when either the batch size or the
/// flush interval is reached, and `shutdown` forces a final flush before
/// the process exits.
pub struct Telemetry {
    tx: mpsc::Sender<Message>,
    dropped: AtomicU64,
    flushed: Arc<AtomicU64>,
}

impl Telemetry {
    pub fn new(queue_capacity: usize, batch_size: usize, flush_interval: Duration) -> Self {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let flushed = Arc::new(AtomicU64::new(0));

        tokio::spawn(drain_loop(rx, batch_size.max(1), flush_interval, flushed.clone()));

        Self {
            tx,
            dropped: AtomicU64::new(0),
            flushed,
        }
    }

    /// Flush-on-shutdown hook: drains whatever is buffered and waits for
    /// the worker to acknowledge.
    pub async fn shutdown(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(Message::Flush(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
        let dropped = self.dropped.load(Ordering::Relaxed);
        if dropped > 0 {
            warn!(dropped, "telemetry events were dropped during this run");
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn flushed(&self) -> u64 {
        self.flushed.load(Ordering::Relaxed)
    }
}

impl TelemetrySink for Telemetry {
    fn emit(&self, event: TelemetryEvent) {
        if self.tx.try_send(Message::Event(event)).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            debug!("telemetry queue full, event dropped");
        }
    }
}

async fn drain_loop(
    mut rx: mpsc::Receiver<Message>,
    batch_size: usize,
    flush_interval: Duration,
    flushed: Arc<AtomicU64>,
) {
    let mut interval = tokio::time::interval(flush_interval);
    let mut buffer: Vec<TelemetryEvent> = Vec::with_capacity(batch_size);

    loop {
        tokio::select! {
            message = rx.recv() => match message {
                Some(Message::Event(event)) => {
                    buffer.push(event);
                    if buffer.len() >= batch_size {
                        flush(&mut buffer, &flushed);
                    }
                }
                Some(Message::Flush(ack)) => {
                    flush(&mut buffer, &flushed);
                    let _ = ack.send(());
                }
                None => {
                    flush(&mut buffer, &flushed);
                    break;
                }
            },
            _ = interval.tick() => flush(&mut buffer, &flushed),
        }
    }
}

fn flush(buffer: &mut Vec<TelemetryEvent>, flushed: &AtomicU64) {
    if buffer.is_empty() {
        return;
    }
    match serde_json::to_string(&buffer) {
        Ok(payload) => {
            info!(
                target: "merx::telemetry",
                count = buffer.len(),
                events = %payload,
                "telemetry batch flushed"
            );
        }
        Err(e) => warn!("failed to serialize telemetry batch: {}", e),
    }
    flushed.fetch_add(buffer.len() as u64, Ordering::Relaxed);
    buffer.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use merx_shared::events::ClientLogEvent;

    fn event(n: u64) -> TelemetryEvent {
        TelemetryEvent::ClientLog(ClientLogEvent {
            level: "info".to_string(),
            message: format!("event {n}"),
            source: None,
            url: None,
            user_agent: None,
            timestamp: n as i64,
        })
    }

    #[tokio::test]
    async fn test_shutdown_flushes_buffered_events() {
        let telemetry = Telemetry::new(16, 100, Duration::from_secs(3600));
        for n in 0..3 {
            telemetry.emit(event(n));
        }

        telemetry.shutdown().await;
        assert_eq!(telemetry.flushed(), 3);
        assert_eq!(telemetry.dropped(), 0);
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        // Single-threaded test runtime: the drain task cannot run between
        // these synchronous emits, so the bounded queue must overflow.
        let telemetry = Telemetry::new(2, 100, Duration::from_secs(3600));
        for n in 0..10 {
            telemetry.emit(event(n));
        }
        assert_eq!(telemetry.dropped(), 8);

        telemetry.shutdown().await;
        assert_eq!(telemetry.flushed(), 2);
    }
}
