//! # Bus configuration.
//!
//! Provides [`Config`], the settings consumed by
//! [`MessageBus::with_config`](crate::MessageBus::with_config).
//!
//! ## Sentinel values
//! - `dispatch_threads = 0` → half the machine's available parallelism
//! - `queue_capacity` is clamped to a minimum of 1
//!
//! ## Notes
//! All fields are public for flexibility. The bus reads them through the
//! clamping accessors, so out-of-range values never reach the dispatcher.

use crate::publish::PublishMode;

/// Configuration for a [`MessageBus`](crate::MessageBus).
#[derive(Clone, Debug)]
pub struct Config {
    /// Handler matching policy, fixed at construction.
    pub publish_mode: PublishMode,

    /// Worker threads for asynchronous publishes.
    ///
    /// - `0` = half the available parallelism
    /// - Rounded up to a power of two, floor 2 (see
    ///   [`dispatch_threads_clamped`](Config::dispatch_threads_clamped))
    pub dispatch_threads: usize,

    /// Capacity of the bounded async dispatch queue.
    ///
    /// Async publishes block while the queue holds this many undrained
    /// jobs. Minimum value is 1.
    pub queue_capacity: usize,
}

impl Config {
    /// Returns the worker-thread count actually used: the configured value
    /// (or half the available parallelism for `0`), raised to at least 2,
    /// rounded up to a power of two.
    pub fn dispatch_threads_clamped(&self) -> usize {
        let requested = if self.dispatch_threads == 0 {
            std::thread::available_parallelism()
                .map(usize::from)
                .unwrap_or(2)
                / 2
        } else {
            self.dispatch_threads
        };
        requested.max(2).next_power_of_two()
    }

    /// Returns the queue capacity clamped to a minimum of 1.
    #[inline]
    pub fn queue_capacity_clamped(&self) -> usize {
        self.queue_capacity.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `publish_mode = ExactWithSuperTypes`
    /// - `dispatch_threads = 0` (half the available parallelism)
    /// - `queue_capacity = 1024`
    fn default() -> Self {
        Self {
            publish_mode: PublishMode::ExactWithSuperTypes,
            dispatch_threads: 0,
            queue_capacity: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_count_is_a_power_of_two_with_floor_two() {
        let mut config = Config::default();

        config.dispatch_threads = 1;
        assert_eq!(config.dispatch_threads_clamped(), 2);

        config.dispatch_threads = 3;
        assert_eq!(config.dispatch_threads_clamped(), 4);

        config.dispatch_threads = 8;
        assert_eq!(config.dispatch_threads_clamped(), 8);

        config.dispatch_threads = 0;
        let derived = config.dispatch_threads_clamped();
        assert!(derived >= 2);
        assert!(derived.is_power_of_two());
    }

    #[test]
    fn queue_capacity_never_reaches_zero() {
        let config = Config {
            queue_capacity: 0,
            ..Config::default()
        };
        assert_eq!(config.queue_capacity_clamped(), 1);
    }
}
