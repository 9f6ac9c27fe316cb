//! In-process stand-in for the multicam driver.
//!
//! Behaves like the real driver where the engine can observe it: pulls block
//! up to their timeout when no frame is ready, the device reports an
//! auto-chosen gain/exposure/white balance while the matching auto flag is on,
//! and open/start can be told to refuse. Every lifecycle call is counted.

use crate::backend::{BackendError, CameraParameter, DeviceBackend, DeviceHandle};
use crate::testing::synthetic_data::fill_test_pattern;
use crate::types::{ColorMode, Resolution};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use uuid::Uuid;

/// Value the synthetic sensor "chooses" for a parameter under auto control.
pub const AUTO_GAIN_VALUE: i32 = 61;
pub const AUTO_EXPOSURE_VALUE: i32 = 400;
pub const AUTO_WHITE_BALANCE_VALUE: i32 = 128;

const NEVER: u64 = u64::MAX;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct SyntheticBackend {
    cameras: Vec<Uuid>,
    dimensions: Option<(u32, u32)>,
    frame_interval: Duration,
    frame_limit: Option<u64>,
    fail_after: AtomicU64,
    refuse_open: AtomicBool,
    refuse_start: AtomicBool,
    gate: Mutex<bool>,
    gate_changed: Condvar,
    streaming: AtomicBool,
    led: AtomicBool,
    next_handle: AtomicU64,
    open_handles: Mutex<HashSet<u64>>,
    stale_handle_calls: AtomicUsize,
    frames_delivered: AtomicU64,
    open_count: AtomicUsize,
    close_count: AtomicUsize,
    start_count: AtomicUsize,
    stop_count: AtomicUsize,
    last_open: Mutex<Option<(Uuid, ColorMode, Resolution, f32)>>,
    parameters: Mutex<HashMap<CameraParameter, i32>>,
    writes: Mutex<Vec<(CameraParameter, i32)>>,
}

impl Default for SyntheticBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntheticBackend {
    /// One attached camera, 640x480, producing a frame every 2 ms.
    pub fn new() -> Self {
        Self {
            cameras: vec![Uuid::from_u128(0x5053_3345_7965)],
            dimensions: Some((640, 480)),
            frame_interval: Duration::from_millis(2),
            frame_limit: None,
            fail_after: AtomicU64::new(NEVER),
            refuse_open: AtomicBool::new(false),
            refuse_start: AtomicBool::new(false),
            gate: Mutex::new(true),
            gate_changed: Condvar::new(),
            streaming: AtomicBool::new(false),
            led: AtomicBool::new(false),
            next_handle: AtomicU64::new(1),
            open_handles: Mutex::new(HashSet::new()),
            stale_handle_calls: AtomicUsize::new(0),
            frames_delivered: AtomicU64::new(0),
            open_count: AtomicUsize::new(0),
            close_count: AtomicUsize::new(0),
            start_count: AtomicUsize::new(0),
            stop_count: AtomicUsize::new(0),
            last_open: Mutex::new(None),
            parameters: Mutex::new(HashMap::new()),
            writes: Mutex::new(Vec::new()),
        }
    }

    pub fn with_cameras(mut self, cameras: Vec<Uuid>) -> Self {
        self.cameras = cameras;
        self
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.dimensions = Some((width, height));
        self
    }

    /// Frame dimension queries fail.
    pub fn without_dimensions(mut self) -> Self {
        self.dimensions = None;
        self
    }

    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    /// Deliver `limit` frames in total, then time out forever.
    pub fn with_frame_limit(mut self, limit: u64) -> Self {
        self.frame_limit = Some(limit);
        self
    }

    /// Deliver `frames` frames, then report the device as lost.
    pub fn with_failure_after(self, frames: u64) -> Self {
        self.fail_after.store(frames, Ordering::SeqCst);
        self
    }

    /// The device comes back: pulls stop failing.
    pub fn clear_failure(&self) {
        self.fail_after.store(NEVER, Ordering::SeqCst);
    }

    /// Never deliver a frame; every pull times out.
    pub fn always_timeout(self) -> Self {
        self.with_frame_limit(0)
    }

    /// Hold frames back until [`open_gate`](Self::open_gate) is called.
    pub fn with_closed_gate(self) -> Self {
        *lock(&self.gate) = false;
        self
    }

    pub fn open_gate(&self) {
        *lock(&self.gate) = true;
        self.gate_changed.notify_all();
    }

    pub fn set_refuse_open(&self, refuse: bool) {
        self.refuse_open.store(refuse, Ordering::SeqCst);
    }

    pub fn set_refuse_start(&self, refuse: bool) {
        self.refuse_start.store(refuse, Ordering::SeqCst);
    }

    pub fn open_count(&self) -> usize {
        self.open_count.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }

    pub fn start_count(&self) -> usize {
        self.start_count.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> usize {
        self.stop_count.load(Ordering::SeqCst)
    }

    pub fn frames_delivered(&self) -> u64 {
        self.frames_delivered.load(Ordering::SeqCst)
    }

    /// Calls made with a handle that was never opened or already closed.
    pub fn stale_handle_calls(&self) -> usize {
        self.stale_handle_calls.load(Ordering::SeqCst)
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::SeqCst)
    }

    pub fn led(&self) -> bool {
        self.led.load(Ordering::SeqCst)
    }

    /// Arguments of the most recent `open` call.
    pub fn last_open(&self) -> Option<(Uuid, ColorMode, Resolution, f32)> {
        *lock(&self.last_open)
    }

    /// Every parameter write received, in order.
    pub fn parameter_writes(&self) -> Vec<(CameraParameter, i32)> {
        lock(&self.writes).clone()
    }

    pub fn clear_parameter_writes(&self) {
        lock(&self.writes).clear();
    }

    fn check_handle(&self, handle: &DeviceHandle) {
        if !lock(&self.open_handles).contains(&handle.as_raw()) {
            self.stale_handle_calls.fetch_add(1, Ordering::SeqCst);
            log::warn!("Synthetic camera used with stale handle {}", handle.as_raw());
        }
    }

    fn auto_override(
        &self,
        parameters: &HashMap<CameraParameter, i32>,
        param: CameraParameter,
    ) -> Option<i32> {
        let is_on = |flag: CameraParameter| parameters.get(&flag).copied().unwrap_or(1) != 0;
        match param {
            CameraParameter::Gain if is_on(CameraParameter::AutoGain) => Some(AUTO_GAIN_VALUE),
            CameraParameter::Exposure if is_on(CameraParameter::AutoExposure) => {
                Some(AUTO_EXPOSURE_VALUE)
            }
            CameraParameter::WhiteBalanceRed
            | CameraParameter::WhiteBalanceGreen
            | CameraParameter::WhiteBalanceBlue
                if is_on(CameraParameter::AutoWhiteBalance) =>
            {
                Some(AUTO_WHITE_BALANCE_VALUE)
            }
            _ => None,
        }
    }
}

impl DeviceBackend for SyntheticBackend {
    fn camera_count(&self) -> usize {
        self.cameras.len()
    }

    fn camera_uuid(&self, index: usize) -> Uuid {
        self.cameras.get(index).copied().unwrap_or(Uuid::nil())
    }

    fn open(
        &self,
        guid: Uuid,
        color_mode: ColorMode,
        resolution: Resolution,
        frame_rate: f32,
    ) -> Option<DeviceHandle> {
        *lock(&self.last_open) = Some((guid, color_mode, resolution, frame_rate));
        if self.refuse_open.load(Ordering::SeqCst) || !self.cameras.contains(&guid) {
            return None;
        }
        self.open_count.fetch_add(1, Ordering::SeqCst);
        let raw = self.next_handle.fetch_add(1, Ordering::SeqCst);
        lock(&self.open_handles).insert(raw);
        Some(DeviceHandle::from_raw(raw))
    }

    fn close(&self, handle: DeviceHandle) -> bool {
        self.check_handle(&handle);
        lock(&self.open_handles).remove(&handle.as_raw());
        self.streaming.store(false, Ordering::SeqCst);
        self.close_count.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn start(&self, handle: &DeviceHandle) -> bool {
        self.check_handle(handle);
        if self.refuse_start.load(Ordering::SeqCst) {
            return false;
        }
        self.start_count.fetch_add(1, Ordering::SeqCst);
        self.streaming.store(true, Ordering::SeqCst);
        true
    }

    fn stop(&self, handle: &DeviceHandle) -> bool {
        self.check_handle(handle);
        self.stop_count.fetch_add(1, Ordering::SeqCst);
        self.streaming.store(false, Ordering::SeqCst);
        true
    }

    fn set_led(&self, handle: &DeviceHandle, on: bool) -> bool {
        self.check_handle(handle);
        self.led.store(on, Ordering::SeqCst);
        true
    }

    fn set_parameter(&self, handle: &DeviceHandle, param: CameraParameter, value: i32) -> bool {
        self.check_handle(handle);
        let (min, max) = param.range();
        if value < min || value > max {
            return false;
        }
        lock(&self.writes).push((param, value));
        lock(&self.parameters).insert(param, value);
        true
    }

    fn get_parameter(&self, handle: &DeviceHandle, param: CameraParameter) -> i32 {
        self.check_handle(handle);
        let parameters = lock(&self.parameters);
        self.auto_override(&parameters, param)
            .unwrap_or_else(|| parameters.get(&param).copied().unwrap_or(0))
    }

    fn frame_dimensions(&self, _handle: &DeviceHandle) -> Option<(u32, u32)> {
        self.dimensions
    }

    fn pull_frame(
        &self,
        handle: &DeviceHandle,
        buffer: &mut [u8],
        timeout: Duration,
    ) -> Result<bool, BackendError> {
        self.check_handle(handle);
        let delivered = self.frames_delivered.load(Ordering::SeqCst);
        if delivered >= self.fail_after.load(Ordering::SeqCst) {
            return Err(BackendError("camera disconnected".to_string()));
        }

        if !self.streaming.load(Ordering::SeqCst)
            || self.frame_limit.is_some_and(|limit| delivered >= limit)
        {
            std::thread::sleep(timeout);
            return Ok(false);
        }

        {
            let gate = lock(&self.gate);
            let (gate, _) = self
                .gate_changed
                .wait_timeout_while(gate, timeout, |open| !*open)
                .unwrap_or_else(PoisonError::into_inner);
            if !*gate {
                return Ok(false);
            }
        }

        std::thread::sleep(self.frame_interval);
        let (width, height) = self.dimensions.unwrap_or((640, 480));
        fill_test_pattern(buffer, width, height, delivered);
        self.frames_delivered.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }
}
