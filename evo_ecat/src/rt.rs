//! Real-time setup of the cyclic thread.
//!
//! With the `rt` feature: lock memory, prefault the stack, pin the calling
//! thread to a core and switch it to SCHED_FIFO. Without it every step is a
//! no-op so the master runs unprivileged on a development machine.
//!
//! Call from the orchestrator's thread after the supervisor thread has been
//! spawned; affinity and scheduler apply to the calling thread only.

use thiserror::Error;

/// Real-time setup failure.
#[derive(Debug, Error)]
pub enum RtError {
    /// mlockall failed.
    #[error("mlockall failed: {0}")]
    MemoryLock(String),
    /// CPU affinity could not be set.
    #[error("CPU affinity for core {core} failed: {reason}")]
    Affinity {
        /// Requested core.
        core: usize,
        /// OS error.
        reason: String,
    },
    /// SCHED_FIFO could not be set.
    #[error("sched_setscheduler(SCHED_FIFO, {priority}) failed: {reason}")]
    Scheduler {
        /// Requested priority.
        priority: i32,
        /// OS error.
        reason: String,
    },
}

#[cfg(feature = "rt")]
fn lock_memory() -> Result<(), RtError> {
    use nix::sys::mman::{MlockallFlags, mlockall};
    mlockall(MlockallFlags::MCL_CURRENT | MlockallFlags::MCL_FUTURE)
        .map_err(|e| RtError::MemoryLock(e.to_string()))
}

#[cfg(not(feature = "rt"))]
fn lock_memory() -> Result<(), RtError> {
    Ok(())
}

/// Touch 512 KiB of stack so the cyclic loop does not fault pages in.
#[cfg(feature = "rt")]
fn prefault_stack() {
    let mut buf = [0u8; 512 * 1024];
    for byte in buf.iter_mut() {
        // SAFETY: `byte` is a valid, exclusive reference into `buf`.
        unsafe { core::ptr::write_volatile(byte, 0xFF) };
    }
    core::hint::black_box(&buf);
}

#[cfg(not(feature = "rt"))]
fn prefault_stack() {}

#[cfg(feature = "rt")]
fn set_affinity(core: usize) -> Result<(), RtError> {
    use nix::sched::{CpuSet, sched_setaffinity};
    use nix::unistd::Pid;

    let mut cpuset = CpuSet::new();
    cpuset.set(core).map_err(|e| RtError::Affinity {
        core,
        reason: e.to_string(),
    })?;
    sched_setaffinity(Pid::from_raw(0), &cpuset).map_err(|e| RtError::Affinity {
        core,
        reason: e.to_string(),
    })
}

#[cfg(not(feature = "rt"))]
fn set_affinity(_core: usize) -> Result<(), RtError> {
    Ok(())
}

#[cfg(feature = "rt")]
fn set_scheduler(priority: i32) -> Result<(), RtError> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    // SAFETY: `param` outlives the call; pid 0 is the calling thread.
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        return Err(RtError::Scheduler {
            priority,
            reason: std::io::Error::last_os_error().to_string(),
        });
    }
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn set_scheduler(_priority: i32) -> Result<(), RtError> {
    Ok(())
}

/// Full setup sequence for the calling thread.
pub fn rt_setup(cpu_core: usize, rt_priority: i32) -> Result<(), RtError> {
    lock_memory()?;
    prefault_stack();
    set_affinity(cpu_core)?;
    set_scheduler(rt_priority)?;
    Ok(())
}

/// The calling thread runs under a real-time scheduling policy.
pub fn is_realtime() -> bool {
    #[cfg(target_os = "linux")]
    {
        // SAFETY: sched_getscheduler only reads the policy of the calling thread.
        let policy = unsafe { libc::sched_getscheduler(0) };
        policy == libc::SCHED_FIFO || policy == libc::SCHED_RR
    }
    #[cfg(not(target_os = "linux"))]
    {
        false
    }
}
