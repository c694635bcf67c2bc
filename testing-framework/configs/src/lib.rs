use std::{sync::LazyLock, time::Duration};

use testing_framework_env as tf_env;

pub mod collection;
pub mod constants;
pub mod timeouts;

pub use collection::{CollectionConfig, ConfigError, RawSettings};

static IS_SLOW_TEST_ENV: LazyLock<bool> = LazyLock::new(tf_env::slow_test_env);

const SLOW_ENV_TIMEOUT_MULTIPLIER: u32 = 2;

/// In slow test environments like Codecov, use 2x timeout.
#[must_use]
pub fn adjust_timeout(d: Duration) -> Duration {
    if *IS_SLOW_TEST_ENV {
        d.saturating_mul(SLOW_ENV_TIMEOUT_MULTIPLIER)
    } else {
        d
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjusted_timeout_saturates() {
        assert_eq!(adjust_timeout(Duration::MAX), Duration::MAX);
    }
}
