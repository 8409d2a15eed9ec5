//! Debounced, paced command queue of a bridge.
//!
//! Bridges drop frames that arrive too close together and acknowledge
//! nothing. Zones therefore never write to the socket directly: they append
//! frames to their bridge's queue, which waits for a quiet period, then
//! writes the whole pending batch one frame at a time with a minimum gap
//! between writes.

use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use futures::channel::oneshot;
use log::{debug, warn};

use crate::config::PacingConfig;
use crate::errors::Error;
use crate::history::{BatchOutcome, FrameHistory, HistoryEntry, HistorySummary};
use crate::protocol::Frame;
use crate::runtime::{self, Instant};
use crate::transport::Transport;
use crate::types::MacAddress;

type Result<T> = std::result::Result<T, Error>;

/// Called with the error of every failed batch.
pub(crate) type FailureHook = Box<dyn Fn(&Error) + Send + Sync>;

/// Completion of the batch a command was flushed in.
///
/// Zone operations return once their frames are queued; awaiting the
/// delivery additionally waits for the batch to be written. Every command of
/// a batch sees the same outcome.
#[derive(Debug)]
pub struct Delivery {
    mac: MacAddress,
    rx: oneshot::Receiver<Result<()>>,
}

impl Future for Delivery {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mac = self.mac;
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|outcome| outcome.unwrap_or(Err(Error::BridgeDestroyed(mac))))
    }
}

#[derive(Default)]
struct Pending {
    frames: Vec<Frame>,
    waiters: Vec<oneshot::Sender<Result<()>>>,
    /// Bumped on every enqueue; only the timer of the latest enqueue flushes.
    epoch: u64,
    closed: bool,
}

struct QueueInner {
    mac: MacAddress,
    pacing: PacingConfig,
    pending: Mutex<Pending>,
    transport: Mutex<Arc<dyn Transport>>,
    /// Held for the duration of a flush; stores the time of the last write.
    writer: runtime::Mutex<Option<Instant>>,
    history: Mutex<FrameHistory>,
    on_failure: FailureHook,
}

/// Shared handle to a bridge's send queue.
#[derive(Clone)]
pub(crate) struct CommandQueue {
    inner: Arc<QueueInner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl CommandQueue {
    pub(crate) fn new(
        mac: MacAddress,
        pacing: PacingConfig,
        transport: Arc<dyn Transport>,
        on_failure: FailureHook,
    ) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                mac,
                pacing,
                pending: Mutex::new(Pending::default()),
                transport: Mutex::new(transport),
                writer: runtime::Mutex::new(None),
                history: Mutex::new(FrameHistory::new()),
                on_failure,
            }),
        }
    }

    /// Append frames to the pending batch and restart the debounce window.
    pub(crate) fn enqueue(&self, frames: Vec<Frame>) -> Result<Delivery> {
        let (tx, rx) = oneshot::channel();
        let epoch = {
            let mut pending = lock(&self.inner.pending);
            if pending.closed {
                return Err(Error::BridgeDestroyed(self.inner.mac));
            }
            pending.frames.extend(frames);
            pending.waiters.push(tx);
            pending.epoch += 1;
            pending.epoch
        };

        let inner = Arc::clone(&self.inner);
        runtime::spawn(async move {
            runtime::sleep(inner.pacing.debounce).await;
            inner.fire(epoch).await;
        });

        Ok(Delivery {
            mac: self.inner.mac,
            rx,
        })
    }

    /// Reject everything pending and refuse further frames.
    pub(crate) fn close(&self) {
        let waiters = {
            let mut pending = lock(&self.inner.pending);
            pending.closed = true;
            pending.epoch += 1;
            pending.frames.clear();
            mem::take(&mut pending.waiters)
        };
        for waiter in waiters {
            let _ = waiter.send(Err(Error::BridgeDestroyed(self.inner.mac)));
        }
    }

    /// Route subsequent flushes through a new transport.
    pub(crate) fn swap_transport(&self, transport: Arc<dyn Transport>) {
        *lock(&self.inner.transport) = transport;
    }

    pub(crate) fn refresh_transport(&self) {
        self.inner.current_transport().refresh();
    }

    pub(crate) fn pending_frames(&self) -> usize {
        lock(&self.inner.pending).frames.len()
    }

    pub(crate) fn history_summary(&self) -> HistorySummary {
        lock(&self.inner.history).summary()
    }

    pub(crate) fn history_entries(&self) -> Vec<HistoryEntry> {
        lock(&self.inner.history).entries().to_vec()
    }
}

impl QueueInner {
    fn current_transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&lock(&self.transport))
    }

    async fn fire(&self, epoch: u64) {
        let (frames, waiters) = {
            let mut pending = lock(&self.pending);
            if pending.epoch != epoch || pending.waiters.is_empty() {
                return;
            }
            (
                mem::take(&mut pending.frames),
                mem::take(&mut pending.waiters),
            )
        };

        match self.flush(&frames).await {
            Ok(()) => {
                for waiter in waiters {
                    let _ = waiter.send(Ok(()));
                }
            }
            Err(e) => {
                let reason = e.to_string();
                for waiter in waiters {
                    let _ = waiter.send(Err(Error::transmission(&self.mac, reason.clone())));
                }
            }
        }
    }

    async fn flush(&self, frames: &[Frame]) -> Result<()> {
        let mut last_write = self.writer.lock().await;
        let transport = self.current_transport();
        let gap = self.pacing.frame_gap;
        let mut writes = 0;
        let mut outcome = Ok(());

        debug!("Flushing {} frame(s) to bridge {}", frames.len(), self.mac);
        'frames: for frame in frames {
            let copies = if frame.repeatable {
                self.pacing.command_repeat.max(1)
            } else {
                1
            };
            for _ in 0..copies {
                if let Some(at) = *last_write {
                    let elapsed = at.elapsed();
                    if elapsed < gap {
                        runtime::sleep(gap - elapsed).await;
                    }
                }
                let sent = transport.send(frame).await;
                *last_write = Some(Instant::now());
                if let Err(e) = sent {
                    outcome = Err(e);
                    break 'frames;
                }
                writes += 1;
            }
        }

        let mut history = lock(&self.history);
        match &outcome {
            Ok(()) => history.record(BatchOutcome::Sent, frames, writes),
            Err(e) => {
                warn!("Batch to bridge {} failed: {e}", self.mac);
                history.record(BatchOutcome::Failed, frames, writes);
                history.record_error(&e.to_string());
                drop(history);
                (self.on_failure)(e);
            }
        }
        outcome
    }
}
