//! Fieldbus network types.
//!
//! AL device states and supervision records, the transport contract the
//! master core is written against, and the master configuration.

pub mod al_status;
pub mod config;
pub mod state;
pub mod transport;
