//! EVO Common Library
//!
//! Shared, transport-independent types for the EVO EtherCAT master.
//!
//! # Module Structure
//!
//! - [`config`] - TOML configuration loading and shared service config
//! - [`consts`] - Fieldbus timeouts and cyclic defaults
//! - [`fieldbus`] - AL device states, transport trait, master configuration
//! - [`drive`] - CiA-402 state decoding and drive process-data layout
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use evo_common::prelude::*;
//!
//! let state = classify(0x0040);
//! assert_eq!(state, DriveState::SwitchOnDisabled);
//! ```

pub mod config;
pub mod consts;
pub mod drive;
pub mod fieldbus;
pub mod prelude;
