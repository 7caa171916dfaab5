//! Runtime construction.

use super::{NullStore, Runtime, SagaMonitor, Store, Task};
use crate::channel::BufferPolicy;
use crate::config::{ConfigError, RuntimeConfig};
use crate::error::SagaError;

/// Builder for a [`Runtime`].
///
/// ```ignore
/// let runtime = Runtime::builder()
///     .store(my_store)
///     .step_budget(10_000)
///     .on_error(|task, err| eprintln!("{task} failed: {err}"))
///     .build()?;
/// ```
pub struct RuntimeBuilder {
    store: Box<dyn Store>,
    config: RuntimeConfig,
    monitor: Option<Box<dyn SagaMonitor>>,
    on_error: Option<Box<dyn FnMut(&Task, &SagaError)>>,
}

impl RuntimeBuilder {
    /// Starts from a [`NullStore`] and the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: Box::new(NullStore),
            config: RuntimeConfig::default(),
            monitor: None,
            on_error: None,
        }
    }

    /// Sets the store sagas dispatch to and select from.
    #[must_use]
    pub fn store(mut self, store: impl Store + 'static) -> Self {
        self.store = Box::new(store);
        self
    }

    /// Replaces the whole configuration.
    #[must_use]
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Caps the steps taken per `run_until_idle`.
    #[must_use]
    pub fn step_budget(mut self, steps: u64) -> Self {
        self.config.step_budget = Some(steps);
        self
    }

    /// Sets the buffer for action channels created without one.
    #[must_use]
    pub fn action_buffer(mut self, policy: BufferPolicy) -> Self {
        self.config.action_buffer = policy;
        self
    }

    /// Logs every effect at debug level.
    #[must_use]
    pub fn trace_effects(mut self, enabled: bool) -> Self {
        self.config.trace_effects = enabled;
        self
    }

    /// Installs an effect monitor.
    #[must_use]
    pub fn monitor(mut self, monitor: impl SagaMonitor + 'static) -> Self {
        self.monitor = Some(Box::new(monitor));
        self
    }

    /// Called with every root task that settles with an error.
    #[must_use]
    pub fn on_error(mut self, hook: impl FnMut(&Task, &SagaError) + 'static) -> Self {
        self.on_error = Some(Box::new(hook));
        self
    }

    /// Validates the configuration and builds the runtime.
    pub fn build(self) -> Result<Runtime, ConfigError> {
        self.config.validate()?;
        Ok(Runtime::from_parts(
            self.store,
            self.config,
            self.monitor,
            self.on_error,
        ))
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RuntimeBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeBuilder")
            .field("config", &self.config)
            .field("monitor", &self.monitor.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish_non_exhaustive()
    }
}
