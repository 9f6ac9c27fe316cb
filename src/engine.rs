//! The frame acquisition engine.
//!
//! Owns the device handle and drives `Unloaded → Loaded → Started → Stopped →
//! Unloaded`. While started, a dedicated thread blocks in the backend's frame
//! pull and publishes every normalized frame on a broadcast channel.
//!
//! Locking:
//! - `lifecycle` serializes load/start/stop/unload. It is never held while
//!   waiting for the capture thread.
//! - `session` is the handle-validity domain. Pulls and parameter writes take
//!   it shared; only unload takes it exclusively, so a setter never sees a
//!   half-closed handle.
//! - `parameters` guards the store and each individual forwarded write.
//!   Lock order is `parameters` then `session`.

use crate::backend::{CameraParameter, DeviceBackend, DeviceHandle};
use crate::buffers::FrameBuffers;
use crate::config::{validate_capture, CleyeConfig};
use crate::errors::CameraError;
use crate::parameters::{apply_writes, ParameterStore, ParameterValue, RuntimeParameters};
use crate::types::{CaptureConfig, DeviceIdentity, Frame, PixelFormat};
use bytes::Bytes;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_PULL_TIMEOUT: Duration = Duration::from_millis(500);
pub const DEFAULT_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Unloaded,
    Loaded,
    Started,
    Stopped,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unloaded => "unloaded",
            Self::Loaded => "loaded",
            Self::Started => "started",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Called on the capture thread for every frame, before it is broadcast.
pub type FrameObserver = Arc<dyn Fn(&Frame) + Send + Sync>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub sessions_opened: u64,
    /// Frames pulled from the device, whether or not anyone was listening.
    pub frames_pulled: u64,
    /// Frames handed to at least one receiver.
    pub frames_emitted: u64,
    pub pull_timeouts: u64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

struct Session {
    handle: DeviceHandle,
    buffers: Mutex<FrameBuffers>,
}

struct CaptureThread {
    token: CancellationToken,
    thread: JoinHandle<()>,
}

struct Lifecycle {
    state: EngineState,
    capture: Option<CaptureThread>,
    stopping: bool,
}

#[derive(Default)]
struct Counters {
    sessions_opened: AtomicU64,
    frames_pulled: AtomicU64,
    frames_emitted: AtomicU64,
    pull_timeouts: AtomicU64,
}

struct Inner {
    backend: Arc<dyn DeviceBackend>,
    lifecycle: Mutex<Lifecycle>,
    session: RwLock<Option<Session>>,
    parameters: Mutex<ParameterStore>,
    capture_config: Mutex<CaptureConfig>,
    identity: Mutex<DeviceIdentity>,
    frames: Mutex<Option<broadcast::Sender<Frame>>>,
    observer: RwLock<Option<FrameObserver>>,
    faulted: AtomicBool,
    counters: Counters,
    pull_timeout: Duration,
    channel_capacity: usize,
}

pub struct CaptureEngine {
    inner: Arc<Inner>,
}

impl CaptureEngine {
    pub fn new(backend: Arc<dyn DeviceBackend>) -> Self {
        Self::build(
            backend,
            DeviceIdentity::default(),
            CaptureConfig::default(),
            RuntimeParameters::default(),
            DEFAULT_PULL_TIMEOUT,
            DEFAULT_CHANNEL_CAPACITY,
        )
    }

    pub fn from_config(
        backend: Arc<dyn DeviceBackend>,
        config: &CleyeConfig,
    ) -> Result<Self, CameraError> {
        config.validate().map_err(CameraError::Config)?;
        Ok(Self::build(
            backend,
            config.camera.identity.clone(),
            config.camera.capture.clone(),
            config.parameters.clone(),
            config.stream.pull_timeout(),
            config.stream.channel_capacity,
        ))
    }

    fn build(
        backend: Arc<dyn DeviceBackend>,
        identity: DeviceIdentity,
        capture_config: CaptureConfig,
        parameters: RuntimeParameters,
        pull_timeout: Duration,
        channel_capacity: usize,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                lifecycle: Mutex::new(Lifecycle {
                    state: EngineState::Unloaded,
                    capture: None,
                    stopping: false,
                }),
                session: RwLock::new(None),
                parameters: Mutex::new(ParameterStore::new(parameters)),
                capture_config: Mutex::new(capture_config),
                identity: Mutex::new(identity),
                frames: Mutex::new(None),
                observer: RwLock::new(None),
                faulted: AtomicBool::new(false),
                counters: Counters::default(),
                pull_timeout,
                channel_capacity: channel_capacity.max(1),
            }),
        }
    }

    pub fn state(&self) -> EngineState {
        lock(&self.inner.lifecycle).state
    }

    /// True once the capture loop has ended on a device error. Cleared by the next start.
    pub fn is_faulted(&self) -> bool {
        self.inner.faulted.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> CaptureStats {
        let c = &self.inner.counters;
        CaptureStats {
            sessions_opened: c.sessions_opened.load(Ordering::Relaxed),
            frames_pulled: c.frames_pulled.load(Ordering::Relaxed),
            frames_emitted: c.frames_emitted.load(Ordering::Relaxed),
            pull_timeouts: c.pull_timeouts.load(Ordering::Relaxed),
        }
    }

    /// Resolve the identity, open the device, size buffers and replay parameters.
    pub fn load(&self) -> Result<(), CameraError> {
        let mut lifecycle = lock(&self.inner.lifecycle);
        if lifecycle.state != EngineState::Unloaded {
            return Err(CameraError::invalid_state("load", lifecycle.state));
        }

        let backend = &*self.inner.backend;
        let identity = lock(&self.inner.identity).clone();
        let config = lock(&self.inner.capture_config).clone();

        let guid = identity
            .camera_guid
            .unwrap_or_else(|| backend.camera_uuid(identity.camera_index));
        if guid.is_nil() {
            log::warn!("No camera found for {}", identity);
            return Err(CameraError::DeviceNotFound(identity.to_string()));
        }

        let handle = backend
            .open(guid, config.color_mode, config.resolution, config.frame_rate)
            .ok_or(CameraError::DeviceOpen(guid))?;

        let (width, height) = backend.frame_dimensions(&handle).unwrap_or_else(|| {
            let nominal = config.resolution.nominal_size();
            log::warn!(
                "Camera {} did not report frame dimensions, assuming {}x{}",
                guid,
                nominal.0,
                nominal.1
            );
            nominal
        });
        let buffers = FrameBuffers::allocate(config.color_mode, width, height);

        {
            // Hold the store while installing the session so no setter slips
            // between the replay and the handle becoming visible.
            let parameters = lock(&self.inner.parameters);
            parameters.apply_all(backend, &handle);
            *write(&self.inner.session) = Some(Session {
                handle,
                buffers: Mutex::new(buffers),
            });
        }

        self.inner
            .counters
            .sessions_opened
            .fetch_add(1, Ordering::Relaxed);
        lifecycle.state = EngineState::Loaded;
        log::info!(
            "Loaded camera {} ({:?}, {}x{} @ {} fps)",
            guid,
            config.color_mode,
            width,
            height,
            config.frame_rate
        );
        Ok(())
    }

    /// Begin streaming and spawn the capture thread.
    ///
    /// Receivers taken afterwards with [`subscribe`](Self::subscribe) only see
    /// frames emitted from that point on; use
    /// [`start_subscribed`](Self::start_subscribed) to receive the first frame.
    pub fn start(&self) -> Result<(), CameraError> {
        self.start_subscribed().map(|_| ())
    }

    /// Like [`start`](Self::start), returning a receiver attached before the
    /// capture thread runs, so it sees every frame of the session.
    pub fn start_subscribed(&self) -> Result<broadcast::Receiver<Frame>, CameraError> {
        let mut lifecycle = lock(&self.inner.lifecycle);
        match lifecycle.state {
            EngineState::Loaded | EngineState::Stopped => {}
            state => return Err(CameraError::invalid_state("start", state)),
        }

        {
            let session = read(&self.inner.session);
            let session = session
                .as_ref()
                .ok_or_else(|| CameraError::invalid_state("start", lifecycle.state))?;
            if !self.inner.backend.start(&session.handle) {
                return Err(CameraError::DeviceStart(
                    "device refused to start streaming; it may be in use".to_string(),
                ));
            }
        }

        let (sender, receiver) = broadcast::channel(self.inner.channel_capacity);
        *lock(&self.inner.frames) = Some(sender.clone());
        self.inner.faulted.store(false, Ordering::Release);

        let token = CancellationToken::new();
        let loop_token = token.clone();
        let inner = self.inner.clone();
        let spawned = std::thread::Builder::new()
            .name("cleye-capture".to_string())
            .spawn(move || capture_loop(inner, loop_token, sender));

        let thread = match spawned {
            Ok(thread) => thread,
            Err(e) => {
                lock(&self.inner.frames).take();
                if let Some(session) = read(&self.inner.session).as_ref() {
                    self.inner.backend.stop(&session.handle);
                }
                return Err(CameraError::Spawn(e.to_string()));
            }
        };

        lifecycle.capture = Some(CaptureThread { token, thread });
        lifecycle.state = EngineState::Started;
        log::info!("Capture started");
        Ok(receiver)
    }

    /// Cancel the capture loop, wait for it to exit and stop the device.
    ///
    /// Waits at most one pull timeout. Called from the capture thread itself
    /// (through a frame observer) it does not wait; the loop exits as soon as
    /// the observer returns.
    pub fn stop(&self) -> Result<(), CameraError> {
        let capture = {
            let mut lifecycle = lock(&self.inner.lifecycle);
            if lifecycle.stopping {
                return Ok(());
            }
            if lifecycle.state != EngineState::Started {
                return Err(CameraError::invalid_state("stop", lifecycle.state));
            }
            lifecycle.stopping = true;
            lifecycle.capture.take()
        };

        if let Some(capture) = capture {
            capture.token.cancel();
            if capture.thread.thread().id() == std::thread::current().id() {
                log::debug!("Stop requested from the capture thread, not joining");
            } else if capture.thread.join().is_err() {
                log::error!("Capture thread panicked");
            }
        }

        // Ends the stream for every receiver once the loop's sender is gone.
        lock(&self.inner.frames).take();

        if let Some(session) = read(&self.inner.session).as_ref() {
            if !self.inner.backend.stop(&session.handle) {
                log::warn!("Device reported failure while stopping");
            }
        }

        let mut lifecycle = lock(&self.inner.lifecycle);
        lifecycle.stopping = false;
        lifecycle.state = EngineState::Stopped;
        log::info!("Capture stopped");
        Ok(())
    }

    /// Close the device and release the session's buffers.
    pub fn unload(&self) -> Result<(), CameraError> {
        let mut lifecycle = lock(&self.inner.lifecycle);
        match lifecycle.state {
            EngineState::Loaded | EngineState::Stopped => {}
            state => return Err(CameraError::invalid_state("unload", state)),
        }

        let session = write(&self.inner.session).take();
        if let Some(session) = session {
            drop(session.buffers);
            if !self.inner.backend.close(session.handle) {
                log::warn!("Device reported failure while closing");
            }
        }

        lifecycle.state = EngineState::Unloaded;
        log::info!("Camera unloaded");
        Ok(())
    }

    /// Stop and unload from whatever state the engine is in.
    pub fn shutdown(&self) -> Result<(), CameraError> {
        match self.state() {
            EngineState::Started => {
                self.stop()?;
                self.unload()
            }
            EngineState::Loaded | EngineState::Stopped => self.unload(),
            EngineState::Unloaded => Ok(()),
        }
    }

    /// Receiver for the running session's frames, if capture is live.
    pub fn subscribe(&self) -> Option<broadcast::Receiver<Frame>> {
        lock(&self.inner.frames).as_ref().map(|sender| sender.subscribe())
    }

    pub fn set_frame_observer(&self, observer: Option<FrameObserver>) {
        *write(&self.inner.observer) = observer;
    }

    /// Dimensions and layout of emitted frames for the open session.
    pub fn frame_format(&self) -> Option<(u32, u32, PixelFormat)> {
        let session = read(&self.inner.session);
        session.as_ref().map(|session| {
            let buffers = lock(&session.buffers);
            let output = buffers.output();
            (output.width(), output.height(), output.format())
        })
    }

    pub fn capture_config(&self) -> CaptureConfig {
        lock(&self.inner.capture_config).clone()
    }

    /// Takes effect on the next load.
    pub fn set_capture_config(&self, config: CaptureConfig) -> Result<(), CameraError> {
        validate_capture(&config).map_err(CameraError::Config)?;
        *lock(&self.inner.capture_config) = config;
        if read(&self.inner.session).is_some() {
            log::info!("Capture configuration changed; applies after the device is reopened");
        }
        Ok(())
    }

    pub fn identity(&self) -> DeviceIdentity {
        lock(&self.inner.identity).clone()
    }

    /// Takes effect on the next load.
    pub fn set_identity(&self, identity: DeviceIdentity) {
        *lock(&self.inner.identity) = identity;
    }

    pub fn parameters(&self) -> RuntimeParameters {
        lock(&self.inner.parameters).values().clone()
    }

    /// Record a parameter and forward it to the device if one is open.
    pub fn set_parameter(&self, value: ParameterValue) {
        let mut parameters = lock(&self.inner.parameters);
        let writes = parameters.set(value);
        if let Some(session) = read(&self.inner.session).as_ref() {
            apply_writes(&*self.inner.backend, &session.handle, &writes);
        }
    }

    /// Replace every stored parameter and replay them onto an open device.
    pub fn set_parameters(&self, values: RuntimeParameters) {
        let mut parameters = lock(&self.inner.parameters);
        parameters.replace(values);
        if let Some(session) = read(&self.inner.session).as_ref() {
            parameters.apply_all(&*self.inner.backend, &session.handle);
        }
    }

    /// Write a driver parameter directly. Sensor parameters go through the
    /// store so they survive reopening; the rest are pass-through and need an
    /// open device.
    pub fn set_raw_parameter(&self, param: CameraParameter, value: i32) -> bool {
        let stored = match param {
            CameraParameter::AutoGain => Some(ParameterValue::AutoGain(value != 0)),
            CameraParameter::Gain => Some(ParameterValue::Gain(value)),
            CameraParameter::AutoExposure => Some(ParameterValue::AutoExposure(value != 0)),
            CameraParameter::Exposure => Some(ParameterValue::Exposure(value)),
            CameraParameter::AutoWhiteBalance => {
                Some(ParameterValue::AutoWhiteBalance(value != 0))
            }
            CameraParameter::WhiteBalanceRed => Some(ParameterValue::WhiteBalanceRed(value)),
            CameraParameter::WhiteBalanceGreen => Some(ParameterValue::WhiteBalanceGreen(value)),
            CameraParameter::WhiteBalanceBlue => Some(ParameterValue::WhiteBalanceBlue(value)),
            _ => None,
        };
        if let Some(value) = stored {
            self.set_parameter(value);
            return true;
        }

        let (min, max) = param.range();
        let _guard = lock(&self.inner.parameters);
        match read(&self.inner.session).as_ref() {
            Some(session) => self
                .inner
                .backend
                .set_parameter(&session.handle, param, value.clamp(min, max)),
            None => false,
        }
    }

    /// Read a parameter back from the device. `None` when nothing is open.
    pub fn get_parameter(&self, param: CameraParameter) -> Option<i32> {
        read(&self.inner.session)
            .as_ref()
            .map(|session| self.inner.backend.get_parameter(&session.handle, param))
    }

    pub fn set_led(&self, on: bool) -> bool {
        match read(&self.inner.session).as_ref() {
            Some(session) => self.inner.backend.set_led(&session.handle, on),
            None => false,
        }
    }
}

impl Drop for CaptureEngine {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::warn!("Error shutting down capture engine in drop: {}", e);
        }
    }
}

fn capture_loop(inner: Arc<Inner>, token: CancellationToken, sender: broadcast::Sender<Frame>) {
    let started_at = Instant::now();
    let mut sequence = 0u64;

    while !token.is_cancelled() {
        let frame = {
            let session = read(&inner.session);
            let Some(session) = session.as_ref() else {
                log::warn!("Capture loop found no open device");
                break;
            };
            let mut buffers = lock(&session.buffers);

            match inner.backend.pull_frame(
                &session.handle,
                buffers.raw_mut().data_mut(),
                inner.pull_timeout,
            ) {
                Ok(true) => {
                    buffers.normalize();
                    let output = buffers.output();
                    sequence += 1;
                    Frame {
                        sequence,
                        timestamp_us: started_at.elapsed().as_micros() as u64,
                        width: output.width(),
                        height: output.height(),
                        format: output.format(),
                        data: Bytes::copy_from_slice(output.data()),
                    }
                }
                Ok(false) => {
                    inner.counters.pull_timeouts.fetch_add(1, Ordering::Relaxed);
                    log::trace!("No frame within {:?}", inner.pull_timeout);
                    continue;
                }
                Err(e) => {
                    log::error!("Capture loop terminated: {}", e);
                    inner.faulted.store(true, Ordering::Release);
                    break;
                }
            }
        };

        let observer = read(&inner.observer).clone();
        if let Some(observer) = observer {
            observer(&frame);
        }

        inner.counters.frames_pulled.fetch_add(1, Ordering::Relaxed);
        // No receivers is not an error; the frame is simply dropped.
        if sender.send(frame).is_ok() {
            inner.counters.frames_emitted.fetch_add(1, Ordering::Relaxed);
        }
    }

    if inner.faulted.load(Ordering::Acquire) {
        lock(&inner.frames).take();
    }
    log::debug!("Capture loop exited after {} frames", sequence);
}
