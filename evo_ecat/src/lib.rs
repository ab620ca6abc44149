//! # EVO EtherCAT Master Library
//!
//! Single-axis servo master: cyclic process-data exchange with a CiA-402
//! drive, plus a network supervisor that brings dropped devices back to
//! OPERATIONAL. The wire is reached through the `Fieldbus` trait defined in
//! `evo_common::fieldbus::transport`.
//!
//! # Module Structure
//!
//! - [`orchestrator`] - Network lifecycle and the bounded cyclic loop
//! - [`channel`] - Process-data images and one exchange per cycle
//! - [`handshake`] - CiA-402 enable sequence driven by the status word
//! - [`supervisor`] - Background device state recovery
//! - [`network`] - State shared between orchestrator and supervisor
//! - [`transport_registry`] - Transport factory registration
//! - [`transports`] - Transport implementations
//! - [`rt`] - Memory locking, CPU pinning, SCHED_FIFO
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        evo_ecat (single crate)                    │
//! │  ┌──────────────────┐   NetworkState   ┌───────────────────────┐  │
//! │  │  Orchestrator    │◄────(Mutex)─────►│  Supervisor           │  │
//! │  │  (cyclic thread) │                  │  (ecat-supervisor)    │  │
//! │  │  Channel+Handshake                  │                       │  │
//! │  └────────┬─────────┘                  └──────────┬────────────┘  │
//! │           │ exchange()                 read/request/recover      │
//! │           ▼                                       ▼               │
//! │                ┌───────────────────────────────┐                  │
//! │                │  Fieldbus (Arc<dyn Fieldbus>) │◄── Registry      │
//! │                └───────────────────────────────┘                  │
//! └───────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]

pub mod channel;
pub mod handshake;
pub mod network;
pub mod orchestrator;
pub mod rt;
pub mod supervisor;
pub mod transport_registry;
pub mod transports;

// Re-export key types for convenience
pub use crate::channel::ProcessDataChannel;
pub use crate::handshake::{DriveHandshake, HandshakeStep};
pub use crate::network::{NetworkSnapshot, NetworkState};
pub use crate::orchestrator::{
    CycleDiagnostics, CycleOutcome, CycleStats, CyclicTask, Orchestrator, OrchestratorError,
    Phase, RunReport,
};
pub use crate::supervisor::{ScanReport, Supervisor, SupervisorHandle};
pub use crate::transport_registry::TransportRegistry;
