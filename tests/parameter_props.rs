//! Property-based tests for sensor parameter bookkeeping
//!
//! Run with: cargo test --test parameter_props

use cleye_stream::backend::{CameraParameter, DeviceBackend};
use cleye_stream::testing::SyntheticBackend;
use cleye_stream::{ParameterStore, ParameterValue, RuntimeParameters};
use proptest::prelude::*;

fn parameter_value() -> impl Strategy<Value = ParameterValue> {
    prop_oneof![
        any::<bool>().prop_map(ParameterValue::AutoGain),
        (-200i32..200).prop_map(ParameterValue::Gain),
        any::<bool>().prop_map(ParameterValue::AutoExposure),
        (-200i32..1000).prop_map(ParameterValue::Exposure),
        any::<bool>().prop_map(ParameterValue::AutoWhiteBalance),
        (-50i32..400).prop_map(ParameterValue::WhiteBalanceRed),
        (-50i32..400).prop_map(ParameterValue::WhiteBalanceGreen),
        (-50i32..400).prop_map(ParameterValue::WhiteBalanceBlue),
    ]
}

fn in_range(param: CameraParameter, value: i32) -> bool {
    let (min, max) = param.range();
    value >= min && value <= max
}

proptest! {
    /// Stored values never leave the driver's accepted range.
    #[test]
    fn stored_values_stay_in_range(calls in prop::collection::vec(parameter_value(), 0..40)) {
        let mut store = ParameterStore::default();
        for call in calls {
            for (param, value) in store.set(call) {
                prop_assert!(in_range(param, value), "{:?}={}", param, value);
            }
        }
        for (param, value) in store.replay_writes() {
            prop_assert!(in_range(param, value), "{:?}={}", param, value);
        }
    }

    /// Turning an auto flag off always restores the last manual value,
    /// however often it was toggled in between.
    #[test]
    fn auto_toggle_restores_manual_gain(
        gain in 0i32..80,
        toggles in prop::collection::vec(any::<bool>(), 0..10),
    ) {
        let mut store = ParameterStore::default();
        store.set(ParameterValue::Gain(gain));
        for on in toggles {
            store.set(ParameterValue::AutoGain(on));
        }
        let writes = store.set(ParameterValue::AutoGain(false));
        prop_assert_eq!(
            writes,
            vec![(CameraParameter::AutoGain, 0), (CameraParameter::Gain, gain)]
        );
    }

    /// Replay always covers all eight sensor parameters in a fixed order.
    #[test]
    fn replay_order_is_fixed(calls in prop::collection::vec(parameter_value(), 0..20)) {
        let mut store = ParameterStore::default();
        for call in calls {
            store.set(call);
        }
        let order: Vec<_> = store.replay_writes().into_iter().map(|(p, _)| p).collect();
        prop_assert_eq!(order, vec![
            CameraParameter::AutoGain,
            CameraParameter::Gain,
            CameraParameter::AutoExposure,
            CameraParameter::Exposure,
            CameraParameter::AutoWhiteBalance,
            CameraParameter::WhiteBalanceRed,
            CameraParameter::WhiteBalanceGreen,
            CameraParameter::WhiteBalanceBlue,
        ]);
    }

    /// Applying the same parameter set twice leaves the device unchanged.
    #[test]
    fn apply_all_is_idempotent(calls in prop::collection::vec(parameter_value(), 0..20)) {
        let backend = SyntheticBackend::new();
        let handle = backend
            .open(
                backend.camera_uuid(0),
                cleye_stream::ColorMode::MonoRaw,
                cleye_stream::Resolution::Qvga,
                30.0,
            )
            .expect("synthetic camera opens");

        let mut store = ParameterStore::default();
        for call in calls {
            store.set(call);
        }

        store.apply_all(&backend, &handle);
        let read_back = |backend: &SyntheticBackend| -> Vec<i32> {
            store
                .replay_writes()
                .into_iter()
                .map(|(p, _)| backend.get_parameter(&handle, p))
                .collect()
        };
        let once = read_back(&backend);
        store.apply_all(&backend, &handle);
        prop_assert_eq!(once, read_back(&backend));
    }

    /// A store built from arbitrary values is equivalent to replacing into one.
    #[test]
    fn new_matches_replace(gain in -100i32..200, exposure in -100i32..900, auto in any::<bool>()) {
        let values = RuntimeParameters {
            auto_gain: auto,
            gain,
            exposure,
            ..RuntimeParameters::default()
        };
        let built = ParameterStore::new(values.clone());
        let mut replaced = ParameterStore::default();
        replaced.replace(values);
        prop_assert_eq!(built.values(), replaced.values());
    }
}
