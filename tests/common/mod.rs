// Shared helpers for the integration tests; the implementations live in
// the `taskgauge-test-utils` crate so every test target reuses them.

pub use taskgauge_test_utils::builders;
pub use taskgauge_test_utils::recorders;
pub use taskgauge_test_utils::{init_tracing, with_timeout};
