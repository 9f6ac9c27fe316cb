//! Shared, demand-driven access to one capture session.
//!
//! The first subscriber loads and starts the engine, later ones join the
//! running session, and dropping the last subscription stops and unloads it.
//! Once fully drained the source can be subscribed again, which opens a fresh
//! session; this is how consumers recover after the device dropped out.

use crate::engine::CaptureEngine;
use crate::errors::CameraError;
use crate::types::Frame;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Shared {
    engine: CaptureEngine,
    subscribers: Mutex<usize>,
}

#[derive(Clone)]
pub struct FrameSource {
    shared: Arc<Shared>,
}

impl FrameSource {
    pub fn new(engine: CaptureEngine) -> Self {
        Self {
            shared: Arc::new(Shared {
                engine,
                subscribers: Mutex::new(0),
            }),
        }
    }

    pub fn engine(&self) -> &CaptureEngine {
        &self.shared.engine
    }

    pub fn subscriber_count(&self) -> usize {
        *lock(&self.shared.subscribers)
    }

    /// Attach to the capture session, opening it if nobody else is attached.
    ///
    /// Load and start errors surface here; a refused start leaves the device
    /// closed again.
    pub fn subscribe(&self) -> Result<FrameSubscription, CameraError> {
        let engine = &self.shared.engine;
        let mut subscribers = lock(&self.shared.subscribers);

        let receiver = if *subscribers == 0 {
            engine.load()?;
            // Attached before the capture thread runs, so the first frame is not lost.
            match engine.start_subscribed() {
                Ok(receiver) => {
                    log::info!("Capture session opened for first subscriber");
                    receiver
                }
                Err(e) => {
                    if let Err(unload_err) = engine.unload() {
                        log::warn!("Failed to unload after refused start: {}", unload_err);
                    }
                    return Err(e);
                }
            }
        } else {
            // Still attached to a session whose loop died: no reconnect until
            // every stale subscriber has left.
            engine.subscribe().ok_or(CameraError::SessionFaulted)?
        };

        *subscribers += 1;
        log::debug!("Subscriber attached ({} active)", *subscribers);
        Ok(FrameSubscription {
            receiver,
            shared: self.shared.clone(),
            missed: 0,
        })
    }
}

/// One consumer's view of the shared session. Dropping it unsubscribes.
///
/// Dropping the last subscription stops and closes the device on the
/// dropping thread, which waits for the capture thread to finish its current
/// pull (up to one pull timeout). Inside a multi-threaded tokio runtime the
/// wait runs through `block_in_place` so other tasks move off the worker; on
/// a current-thread runtime it blocks the runtime for that long.
pub struct FrameSubscription {
    receiver: broadcast::Receiver<Frame>,
    shared: Arc<Shared>,
    missed: u64,
}

impl FrameSubscription {
    /// Next frame, or `None` once the session has ended.
    pub async fn recv(&mut self) -> Option<Frame> {
        loop {
            match self.receiver.recv().await {
                Ok(frame) => return Some(frame),
                Err(RecvError::Lagged(skipped)) => self.record_lag(skipped),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Blocking variant of [`recv`](Self::recv) for non-async consumers.
    ///
    /// Must not be called from within an async runtime.
    pub fn blocking_recv(&mut self) -> Option<Frame> {
        loop {
            match self.receiver.blocking_recv() {
                Ok(frame) => return Some(frame),
                Err(RecvError::Lagged(skipped)) => self.record_lag(skipped),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// A frame if one is already waiting.
    pub fn try_recv(&mut self) -> Option<Frame> {
        loop {
            match self.receiver.try_recv() {
                Ok(frame) => return Some(frame),
                Err(TryRecvError::Lagged(skipped)) => self.record_lag(skipped),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Frames this subscriber fell too far behind to receive.
    pub fn missed_frames(&self) -> u64 {
        self.missed
    }

    fn record_lag(&mut self, skipped: u64) {
        self.missed += skipped;
        log::warn!("Subscriber lagging, skipped {} frames", skipped);
    }
}

impl Drop for FrameSubscription {
    fn drop(&mut self) {
        let mut subscribers = lock(&self.shared.subscribers);
        *subscribers = subscribers.saturating_sub(1);
        log::debug!("Subscriber detached ({} active)", *subscribers);

        if *subscribers == 0 {
            // Holding the count keeps a concurrent subscribe waiting until
            // the device is fully closed.
            let engine = &self.shared.engine;
            let result = match Handle::try_current() {
                Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                    tokio::task::block_in_place(|| engine.shutdown())
                }
                _ => engine.shutdown(),
            };
            if let Err(e) = result {
                log::warn!("Error closing capture session: {}", e);
            } else {
                log::info!("Capture session closed after last subscriber left");
            }
        }
    }
}
