//! Transport registry.
//!
//! Maps transport names (the `[transport] driver` config key or `--driver`)
//! to factories. Constructed at startup and populated by
//! [`register_all_transports`](crate::transports::register_all_transports);
//! no global state.

use evo_common::fieldbus::config::MasterConfig;
use evo_common::fieldbus::transport::{Fieldbus, FieldbusError, TransportFactory};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of available transports.
pub struct TransportRegistry {
    factories: HashMap<&'static str, TransportFactory>,
}

impl TransportRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a transport factory.
    ///
    /// # Panics
    /// Panics if a transport with the same name is already registered.
    pub fn register(&mut self, name: &'static str, factory: TransportFactory) {
        if self.factories.contains_key(name) {
            panic!("Transport '{name}' is already registered");
        }
        self.factories.insert(name, factory);
    }

    /// Create a shareable transport instance by name.
    ///
    /// # Errors
    /// `FieldbusError::TransportNotFound` if nothing is registered under `name`.
    pub fn create(&self, name: &str, config: &MasterConfig) -> Result<Arc<dyn Fieldbus>, FieldbusError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| FieldbusError::TransportNotFound(name.to_string()))?;
        Ok(Arc::from(factory(config)))
    }

    /// Registered transport names, sorted.
    pub fn list(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for TransportRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evo_common::fieldbus::state::{AlState, DeviceState};
    use evo_common::fieldbus::transport::{DeviceStatus, Exchange, ProcessImageLayout, Target};
    use std::time::Duration;

    struct TestBus;

    impl Fieldbus for TestBus {
        fn name(&self) -> &'static str {
            "test"
        }
        fn version(&self) -> &'static str {
            "0.1.0"
        }
        fn init(&self, _ifname: &str) -> Result<(), FieldbusError> {
            Ok(())
        }
        fn discover_and_configure(&self) -> Result<u16, FieldbusError> {
            Ok(0)
        }
        fn map_process_data(&self) -> Result<ProcessImageLayout, FieldbusError> {
            Ok(ProcessImageLayout::default())
        }
        fn configure_distributed_clock(&self) -> Result<bool, FieldbusError> {
            Ok(false)
        }
        fn wait_for_state(&self, _: Target, _: AlState, _: Duration) -> DeviceState {
            DeviceState::NONE
        }
        fn request_state(&self, _: Target, _: DeviceState) -> Result<(), FieldbusError> {
            Ok(())
        }
        fn exchange(&self, _: u8, _: &[u8], _: &mut [u8], _: Duration) -> Exchange {
            Exchange::default()
        }
        fn read_states(&self) -> Vec<DeviceStatus> {
            Vec::new()
        }
        fn reconfigure_device(&self, _: u16, _: Duration) -> bool {
            false
        }
        fn recover_device(&self, _: u16, _: Duration) -> bool {
            false
        }
        fn close(&self) {}
    }

    fn create_test_bus(_config: &MasterConfig) -> Box<dyn Fieldbus> {
        Box::new(TestBus)
    }

    #[test]
    fn registry_register_and_create() {
        let mut reg = TransportRegistry::new();
        reg.register("test_bus", create_test_bus);

        let bus = reg
            .create("test_bus", &MasterConfig::default())
            .expect("should create");
        assert_eq!(bus.name(), "test");
    }

    #[test]
    fn registry_transport_not_found() {
        let reg = TransportRegistry::new();
        let result = reg.create("nonexistent", &MasterConfig::default());
        assert!(matches!(result, Err(FieldbusError::TransportNotFound(_))));
    }

    #[test]
    fn registry_list_is_sorted() {
        let mut reg = TransportRegistry::new();
        reg.register("beta", create_test_bus);
        reg.register("alpha", create_test_bus);
        assert_eq!(reg.list(), vec!["alpha", "beta"]);
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn registry_duplicate_panics() {
        let mut reg = TransportRegistry::new();
        reg.register("dup", create_test_bus);
        reg.register("dup", create_test_bus);
    }
}
