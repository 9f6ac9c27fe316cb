//! Testing utilities for cleye-stream
//!
//! A scriptable in-process device backend and synthetic frame content, so
//! the engine and publisher can be exercised without a camera attached.

pub mod synthetic_backend;
pub mod synthetic_data;

pub use synthetic_backend::SyntheticBackend;
pub use synthetic_data::fill_test_pattern;
