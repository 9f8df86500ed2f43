use std::future::Future;
use std::time::Duration;

use log::{error, info};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

enum Msg<T> {
    Item(T),
    Drain(oneshot::Sender<anyhow::Result<()>>),
}

/// Producer handle for a batch queue.
#[derive(Clone)]
pub struct BatchSender<T> {
    tx: mpsc::Sender<Msg<T>>,
    label: &'static str,
}

impl<T> BatchSender<T> {
    pub async fn enqueue(&self, item: T) -> anyhow::Result<()> {
        self.tx
            .send(Msg::Item(item))
            .await
            .map_err(|_| anyhow::anyhow!("{} writer closed", self.label))
    }

    /// Flush everything queued so far and wait for the write to land.
    pub async fn drain(&self) -> anyhow::Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(Msg::Drain(ack_tx))
            .await
            .map_err(|_| anyhow::anyhow!("{} writer closed", self.label))?;
        ack_rx
            .await
            .map_err(|_| anyhow::anyhow!("{} writer dropped drain ack", self.label))?
    }
}

/// Spawn a queue task around a flush function.
///
/// The task is the only caller of `flush` for its queue, so flushes are
/// single-flight by construction: a new flush cannot start until the
/// previous statement returned. A failed flush is reported and the batch is
/// dropped; recovery is the producer's call.
pub fn spawn<T, F, Fut>(
    label: &'static str,
    max_items: usize,
    max_wait_ms: u64,
    flush: F,
) -> (BatchSender<T>, JoinHandle<()>)
where
    T: Send + 'static,
    F: Fn(Vec<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<Msg<T>>(max_items.max(64) * 2);
    let max_wait = Duration::from_millis(max_wait_ms);

    let handle = tokio::spawn(async move {
        let mut buffer: Vec<T> = Vec::with_capacity(max_items);
        let mut first_at: Option<Instant> = None;

        loop {
            let deadline = first_at.map(|t| t + max_wait);

            tokio::select! {
                msg = rx.recv() => {
                    match msg {
                        Some(Msg::Item(item)) => {
                            if buffer.is_empty() {
                                first_at = Some(Instant::now());
                            }
                            buffer.push(item);
                            if buffer.len() >= max_items {
                                run_flush(label, &flush, &mut buffer, &mut first_at).await;
                            }
                        },
                        Some(Msg::Drain(ack)) => {
                            let result = if buffer.is_empty() {
                                Ok(())
                            } else {
                                let items = std::mem::take(&mut buffer);
                                first_at = None;
                                flush(items).await
                            };
                            let _ = ack.send(result);
                        },
                        None => {
                            // Producers dropped; final flush and exit.
                            run_flush(label, &flush, &mut buffer, &mut first_at).await;
                            info!("[{}] writer stopped", label);
                            break;
                        },
                    }
                },
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600))), if deadline.is_some() => {
                    run_flush(label, &flush, &mut buffer, &mut first_at).await;
                },
            }
        }
    });

    (BatchSender { tx, label }, handle)
}

async fn run_flush<T, F, Fut>(
    label: &str,
    flush: &F,
    buffer: &mut Vec<T>,
    first_at: &mut Option<Instant>,
) where
    F: Fn(Vec<T>) -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    if buffer.is_empty() {
        *first_at = None;
        return;
    }

    let items = std::mem::take(buffer);
    *first_at = None;
    let count = items.len();

    if let Err(e) = flush(items).await {
        error!("[{}] failed to flush batch of {}: {:#}", label, count, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn flushes_on_size_threshold() {
        let batches: Arc<Mutex<Vec<Vec<u32>>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = batches.clone();

        let (sender, _handle) = spawn("test", 3, 60_000, move |items: Vec<u32>| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push(items);
                Ok(())
            }
        });

        for i in 0..3 {
            sender.enqueue(i).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        let seen = batches.lock().unwrap().clone();
        assert_eq!(seen, vec![vec![0, 1, 2]]);
    }

    #[tokio::test]
    async fn drain_flushes_partial_batch() {
        let count = Arc::new(AtomicUsize::new(0));
        let sink = count.clone();

        let (sender, _handle) = spawn("test", 100, 60_000, move |items: Vec<u32>| {
            let sink = sink.clone();
            async move {
                sink.fetch_add(items.len(), Ordering::SeqCst);
                Ok(())
            }
        });

        sender.enqueue(1).await.unwrap();
        sender.enqueue(2).await.unwrap();
        sender.drain().await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);

        // Draining an empty queue is a no-op.
        sender.drain().await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn flushes_after_wait_window() {
        let count = Arc::new(AtomicUsize::new(0));
        let sink = count.clone();

        let (sender, _handle) = spawn("test", 100, 20, move |items: Vec<u32>| {
            let sink = sink.clone();
            async move {
                sink.fetch_add(items.len(), Ordering::SeqCst);
                Ok(())
            }
        });

        sender.enqueue(7).await.unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
