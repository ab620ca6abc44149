//! Transport implementations.
//!
//! - [`simulation`] - Software EtherCAT segment for development and testing
//!
//! # Adding New Transports
//!
//! 1. Create a new submodule under `transports/`
//! 2. Implement the `Fieldbus` trait from `evo_common::fieldbus::transport`
//! 3. Register its factory in [`register_all_transports`]

pub mod simulation;

use crate::transport_registry::TransportRegistry;
use evo_common::consts::DEFAULT_TRANSPORT;

/// Register all built-in transports.
pub fn register_all_transports(registry: &mut TransportRegistry) {
    registry.register(DEFAULT_TRANSPORT, simulation::create_transport);
}
