//! Desired sensor parameters, kept independently of any open device.
//!
//! The store records every setter call. When a device becomes available the
//! engine replays [`ParameterStore::replay_writes`] onto it; while a device is
//! open each `set` also yields the writes to forward immediately.
//!
//! Auto flags are a shadow state: switching one off re-asserts the last manual
//! value(s) it was hiding, never whatever the device picked while in auto mode.

use crate::backend::{CameraParameter, DeviceBackend, DeviceHandle};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeParameters {
    pub auto_gain: bool,
    pub gain: i32,
    pub auto_exposure: bool,
    pub exposure: i32,
    pub auto_white_balance: bool,
    pub white_balance_red: i32,
    pub white_balance_green: i32,
    pub white_balance_blue: i32,
}

impl Default for RuntimeParameters {
    fn default() -> Self {
        Self {
            auto_gain: true,
            gain: 0,
            auto_exposure: true,
            exposure: 0,
            auto_white_balance: true,
            white_balance_red: 0,
            white_balance_green: 0,
            white_balance_blue: 0,
        }
    }
}

/// A single typed setter call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterValue {
    AutoGain(bool),
    Gain(i32),
    AutoExposure(bool),
    Exposure(i32),
    AutoWhiteBalance(bool),
    WhiteBalanceRed(i32),
    WhiteBalanceGreen(i32),
    WhiteBalanceBlue(i32),
}

impl ParameterValue {
    pub fn parameter(self) -> CameraParameter {
        match self {
            Self::AutoGain(_) => CameraParameter::AutoGain,
            Self::Gain(_) => CameraParameter::Gain,
            Self::AutoExposure(_) => CameraParameter::AutoExposure,
            Self::Exposure(_) => CameraParameter::Exposure,
            Self::AutoWhiteBalance(_) => CameraParameter::AutoWhiteBalance,
            Self::WhiteBalanceRed(_) => CameraParameter::WhiteBalanceRed,
            Self::WhiteBalanceGreen(_) => CameraParameter::WhiteBalanceGreen,
            Self::WhiteBalanceBlue(_) => CameraParameter::WhiteBalanceBlue,
        }
    }

    /// Parse `name` / `value` pairs such as `("gain", "40")` or `("auto_gain", "false")`.
    pub fn parse(name: &str, value: &str) -> Option<Self> {
        let flag = || match value.to_ascii_lowercase().as_str() {
            "true" | "on" | "1" => Some(true),
            "false" | "off" | "0" => Some(false),
            _ => None,
        };
        let number = || value.parse::<i32>().ok();

        match name.to_ascii_lowercase().replace('-', "_").as_str() {
            "auto_gain" => flag().map(Self::AutoGain),
            "gain" => number().map(Self::Gain),
            "auto_exposure" => flag().map(Self::AutoExposure),
            "exposure" => number().map(Self::Exposure),
            "auto_white_balance" => flag().map(Self::AutoWhiteBalance),
            "white_balance_red" => number().map(Self::WhiteBalanceRed),
            "white_balance_green" => number().map(Self::WhiteBalanceGreen),
            "white_balance_blue" => number().map(Self::WhiteBalanceBlue),
            _ => None,
        }
    }
}

fn clamp(param: CameraParameter, value: i32) -> i32 {
    let (min, max) = param.range();
    let clamped = value.clamp(min, max);
    if clamped != value {
        log::warn!(
            "{:?} value {} outside [{}, {}], using {}",
            param,
            value,
            min,
            max,
            clamped
        );
    }
    clamped
}

#[derive(Debug, Clone, Default)]
pub struct ParameterStore {
    values: RuntimeParameters,
}

impl ParameterStore {
    pub fn new(values: RuntimeParameters) -> Self {
        let mut store = Self::default();
        store.replace(values);
        store
    }

    pub fn values(&self) -> &RuntimeParameters {
        &self.values
    }

    /// Replace every stored value (numeric values are clamped).
    pub fn replace(&mut self, values: RuntimeParameters) {
        self.values = RuntimeParameters {
            gain: clamp(CameraParameter::Gain, values.gain),
            exposure: clamp(CameraParameter::Exposure, values.exposure),
            white_balance_red: clamp(CameraParameter::WhiteBalanceRed, values.white_balance_red),
            white_balance_green: clamp(
                CameraParameter::WhiteBalanceGreen,
                values.white_balance_green,
            ),
            white_balance_blue: clamp(CameraParameter::WhiteBalanceBlue, values.white_balance_blue),
            ..values
        };
    }

    /// Record a value. Always succeeds.
    ///
    /// Returns the backend writes this call implies, in order. Disabling an
    /// auto flag is followed by the manual value(s) it shadows.
    pub fn set(&mut self, value: ParameterValue) -> Vec<(CameraParameter, i32)> {
        let v = &mut self.values;
        match value {
            ParameterValue::AutoGain(on) => {
                v.auto_gain = on;
                let mut writes = vec![(CameraParameter::AutoGain, on as i32)];
                if !on {
                    writes.push((CameraParameter::Gain, v.gain));
                }
                writes
            }
            ParameterValue::Gain(gain) => {
                v.gain = clamp(CameraParameter::Gain, gain);
                vec![(CameraParameter::Gain, v.gain)]
            }
            ParameterValue::AutoExposure(on) => {
                v.auto_exposure = on;
                let mut writes = vec![(CameraParameter::AutoExposure, on as i32)];
                if !on {
                    writes.push((CameraParameter::Exposure, v.exposure));
                }
                writes
            }
            ParameterValue::Exposure(exposure) => {
                v.exposure = clamp(CameraParameter::Exposure, exposure);
                vec![(CameraParameter::Exposure, v.exposure)]
            }
            ParameterValue::AutoWhiteBalance(on) => {
                v.auto_white_balance = on;
                let mut writes = vec![(CameraParameter::AutoWhiteBalance, on as i32)];
                if !on {
                    writes.extend(self.white_balance_writes());
                }
                writes
            }
            ParameterValue::WhiteBalanceRed(red) => {
                v.white_balance_red = clamp(CameraParameter::WhiteBalanceRed, red);
                vec![(CameraParameter::WhiteBalanceRed, v.white_balance_red)]
            }
            ParameterValue::WhiteBalanceGreen(green) => {
                v.white_balance_green = clamp(CameraParameter::WhiteBalanceGreen, green);
                vec![(CameraParameter::WhiteBalanceGreen, v.white_balance_green)]
            }
            ParameterValue::WhiteBalanceBlue(blue) => {
                v.white_balance_blue = clamp(CameraParameter::WhiteBalanceBlue, blue);
                vec![(CameraParameter::WhiteBalanceBlue, v.white_balance_blue)]
            }
        }
    }

    // R, G, B order is what the driver has always been given.
    fn white_balance_writes(&self) -> [(CameraParameter, i32); 3] {
        [
            (CameraParameter::WhiteBalanceRed, self.values.white_balance_red),
            (CameraParameter::WhiteBalanceGreen, self.values.white_balance_green),
            (CameraParameter::WhiteBalanceBlue, self.values.white_balance_blue),
        ]
    }

    /// Every stored value in replay order: each auto flag before its dependents.
    pub fn replay_writes(&self) -> Vec<(CameraParameter, i32)> {
        let v = &self.values;
        let mut writes = vec![
            (CameraParameter::AutoGain, v.auto_gain as i32),
            (CameraParameter::Gain, v.gain),
            (CameraParameter::AutoExposure, v.auto_exposure as i32),
            (CameraParameter::Exposure, v.exposure),
            (CameraParameter::AutoWhiteBalance, v.auto_white_balance as i32),
        ];
        writes.extend(self.white_balance_writes());
        writes
    }

    /// Push every stored value onto an open device. Idempotent.
    pub fn apply_all(&self, backend: &dyn DeviceBackend, handle: &DeviceHandle) {
        apply_writes(backend, handle, &self.replay_writes());
    }
}

/// Forward writes to the device. Rejections are logged, not surfaced.
pub(crate) fn apply_writes(
    backend: &dyn DeviceBackend,
    handle: &DeviceHandle,
    writes: &[(CameraParameter, i32)],
) {
    for &(param, value) in writes {
        if backend.set_parameter(handle, param, value) {
            log::trace!("Set {:?} = {}", param, value);
        } else {
            log::debug!("Device rejected {:?} = {}", param, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_auto() {
        let store = ParameterStore::default();
        assert!(store.values().auto_gain);
        assert!(store.values().auto_exposure);
        assert!(store.values().auto_white_balance);
    }

    #[test]
    fn test_disable_auto_gain_reasserts_gain() {
        let mut store = ParameterStore::default();
        store.set(ParameterValue::Gain(33));
        let writes = store.set(ParameterValue::AutoGain(false));
        assert_eq!(
            writes,
            vec![(CameraParameter::AutoGain, 0), (CameraParameter::Gain, 33)]
        );
    }

    #[test]
    fn test_enable_auto_does_not_push_manual_value() {
        let mut store = ParameterStore::default();
        let writes = store.set(ParameterValue::AutoExposure(true));
        assert_eq!(writes, vec![(CameraParameter::AutoExposure, 1)]);
    }

    #[test]
    fn test_disable_auto_white_balance_pushes_all_channels_in_order() {
        let mut store = ParameterStore::default();
        store.set(ParameterValue::WhiteBalanceRed(10));
        store.set(ParameterValue::WhiteBalanceGreen(20));
        store.set(ParameterValue::WhiteBalanceBlue(30));
        let writes = store.set(ParameterValue::AutoWhiteBalance(false));
        assert_eq!(
            writes,
            vec![
                (CameraParameter::AutoWhiteBalance, 0),
                (CameraParameter::WhiteBalanceRed, 10),
                (CameraParameter::WhiteBalanceGreen, 20),
                (CameraParameter::WhiteBalanceBlue, 30),
            ]
        );
    }

    #[test]
    fn test_out_of_range_is_clamped() {
        let mut store = ParameterStore::default();
        store.set(ParameterValue::Gain(200));
        assert_eq!(store.values().gain, 79);
        store.set(ParameterValue::Exposure(-4));
        assert_eq!(store.values().exposure, 0);
    }

    #[test]
    fn test_replay_order_flags_before_values() {
        let store = ParameterStore::default();
        let order: Vec<CameraParameter> = store.replay_writes().into_iter().map(|(p, _)| p).collect();
        assert_eq!(
            order,
            vec![
                CameraParameter::AutoGain,
                CameraParameter::Gain,
                CameraParameter::AutoExposure,
                CameraParameter::Exposure,
                CameraParameter::AutoWhiteBalance,
                CameraParameter::WhiteBalanceRed,
                CameraParameter::WhiteBalanceGreen,
                CameraParameter::WhiteBalanceBlue,
            ]
        );
    }

    #[test]
    fn test_parse_values() {
        assert_eq!(ParameterValue::parse("gain", "12"), Some(ParameterValue::Gain(12)));
        assert_eq!(
            ParameterValue::parse("auto-gain", "off"),
            Some(ParameterValue::AutoGain(false))
        );
        assert_eq!(ParameterValue::parse("gain", "lots"), None);
        assert_eq!(ParameterValue::parse("zoom", "1"), None);
    }
}
