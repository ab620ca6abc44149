//! Process-data channel: one send + receive per cycle.
//!
//! Owns the output and input images. Only the orchestrator's thread touches
//! them, so they need no synchronization; the transport receives borrowed
//! slices for the duration of one exchange.

use evo_common::fieldbus::transport::{
    DeviceSlice, Exchange, Fieldbus, ProcessImageLayout, WorkCounter,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// Cyclic process-data exchange over a shared transport.
pub struct ProcessDataChannel {
    bus: Arc<dyn Fieldbus>,
    layout: ProcessImageLayout,
    group: u8,
    outputs: Vec<u8>,
    inputs: Vec<u8>,
    timeout: Duration,
    last: Exchange,
    exchanges: u64,
}

impl ProcessDataChannel {
    /// Allocate zeroed images sized by `layout`. Sizes stay fixed afterwards.
    pub fn new(
        bus: Arc<dyn Fieldbus>,
        layout: ProcessImageLayout,
        group: u8,
        timeout: Duration,
    ) -> Self {
        let outputs = vec![0u8; layout.output_bytes];
        let inputs = vec![0u8; layout.input_bytes];
        Self {
            bus,
            layout,
            group,
            outputs,
            inputs,
            timeout,
            last: Exchange::default(),
            exchanges: 0,
        }
    }

    /// Send the output image, receive the input image in place.
    ///
    /// A receive timeout is not an error: it shows up as a work counter of zero.
    pub fn exchange(&mut self) -> Exchange {
        let exchange = self
            .bus
            .exchange(self.group, &self.outputs, &mut self.inputs, self.timeout);
        self.exchanges += 1;
        self.last = exchange;
        trace!(
            "exchange #{}: wkc={} dc_time={}",
            self.exchanges, exchange.wkc, exchange.dc_time
        );
        exchange
    }

    /// Work counter of the last exchange.
    pub fn last_wkc(&self) -> WorkCounter {
        self.last.wkc
    }

    /// Distributed-clock time of the last exchange [ns].
    pub fn dc_time(&self) -> i64 {
        self.last.dc_time
    }

    /// Number of exchanges performed.
    pub fn exchanges(&self) -> u64 {
        self.exchanges
    }

    /// Image layout.
    pub fn layout(&self) -> &ProcessImageLayout {
        &self.layout
    }

    /// Whole output image.
    pub fn outputs(&self) -> &[u8] {
        &self.outputs
    }

    /// Whole input image.
    pub fn inputs(&self) -> &[u8] {
        &self.inputs
    }

    /// Input record of one device.
    pub fn device_inputs(&self, index: u16) -> Option<&[u8]> {
        let slice = self.slice(index)?;
        self.inputs.get(slice.inputs.clone())
    }

    /// Input record (read) and output record (write) of one device.
    pub fn device_io(&mut self, index: u16) -> Option<(&[u8], &mut [u8])> {
        let slice = self.layout.device(index)?.clone();
        let inputs = self.inputs.get(slice.inputs)?;
        let outputs = self.outputs.get_mut(slice.outputs)?;
        Some((inputs, outputs))
    }

    fn slice(&self, index: u16) -> Option<&DeviceSlice> {
        self.layout.device(index)
    }
}
