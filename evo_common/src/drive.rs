//! Servo drive types.
//!
//! CiA-402 power state decoding and the process-data layout of the drive.

pub mod cia402;
pub mod pdo;
