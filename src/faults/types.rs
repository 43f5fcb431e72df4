/*!
 * Fault Types
 * Fault classes, handler entries, dispositions and error types
 */

use miette::Diagnostic;
use nix::errno::Errno;
use nix::sys::signal::Signal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::routine::Routine;

/// Fault operation result
pub type FaultResult<T> = Result<T, FaultError>;

/// Fault subsystem errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Diagnostic)]
pub enum FaultError {
    #[error("Failed to install handler for {class}: {source}")]
    #[diagnostic(
        code(fault::installation),
        help("Handler installation is a startup configuration error. The process cannot continue without its fault handlers.")
    )]
    Installation {
        class: FaultClass,
        #[source]
        source: Errno,
    },

    #[error("Failed to update delivery mask for {class}: {source}")]
    #[diagnostic(
        code(fault::mask_update),
        help("The process signal mask could not be changed. Check that the signal is catchable on this host.")
    )]
    MaskUpdate {
        class: FaultClass,
        #[source]
        source: Errno,
    },

    #[error("No handler registered for {0}")]
    #[diagnostic(
        code(fault::not_registered),
        help("Register a handler for the class before resetting it.")
    )]
    NotRegistered(FaultClass),

    #[error("Unsupported signal: {0}")]
    #[diagnostic(
        code(fault::unsupported_signal),
        help("Only SIGSEGV and SIGINT are recognized fault classes.")
    )]
    UnsupportedSignal(i32),

    #[error("Failed to deliver {class}: {source}")]
    #[diagnostic(
        code(fault::delivery),
        help("The signal could not be raised in this process. Check that it is not ignored or invalid on this host.")
    )]
    Delivery {
        class: FaultClass,
        #[source]
        source: Errno,
    },
}

/// Recognized asynchronous fault conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultClass {
    /// Invalid memory reference (SIGSEGV)
    MemoryProtectionViolation,
    /// User cancellation request from the terminal (SIGINT)
    InteractiveInterrupt,
}

impl FaultClass {
    /// All recognized classes, in slot order
    pub const ALL: [FaultClass; 2] = [
        FaultClass::MemoryProtectionViolation,
        FaultClass::InteractiveInterrupt,
    ];

    /// Slot index in the registry tables
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            FaultClass::MemoryProtectionViolation => 0,
            FaultClass::InteractiveInterrupt => 1,
        }
    }

    /// OS signal that delivers this class
    #[inline]
    pub const fn signal(self) -> Signal {
        match self {
            FaultClass::MemoryProtectionViolation => Signal::SIGSEGV,
            FaultClass::InteractiveInterrupt => Signal::SIGINT,
        }
    }

    /// Map a raw signal number back to its class.
    ///
    /// Safe to call from a handler: pure comparison, no allocation.
    #[inline]
    pub fn from_signum(signum: i32) -> Option<Self> {
        FaultClass::ALL
            .into_iter()
            .find(|class| class.signal() as i32 == signum)
    }

    /// Effective outcome once the handler for this class has returned
    pub const fn disposition(self) -> Disposition {
        match self {
            // The faulting access is never repaired, so re-execution faults
            // again with the class masked and the OS default kills the process.
            FaultClass::MemoryProtectionViolation => Disposition::Terminate,
            FaultClass::InteractiveInterrupt => Disposition::Resume,
        }
    }

    /// Human-readable description
    pub const fn description(self) -> &'static str {
        match self {
            FaultClass::MemoryProtectionViolation => "Segmentation fault",
            FaultClass::InteractiveInterrupt => "Interrupt",
        }
    }
}

impl fmt::Display for FaultClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.signal())
    }
}

impl TryFrom<Signal> for FaultClass {
    type Error = FaultError;

    fn try_from(signal: Signal) -> FaultResult<Self> {
        FaultClass::from_signum(signal as i32).ok_or(FaultError::UnsupportedSignal(signal as i32))
    }
}

/// Whether blocking calls interrupted by a class are retried after the handler returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartPolicy {
    /// Kernel transparently restarts the interrupted call (SA_RESTART)
    RestartInterruptedCalls,
    /// Interrupted call fails with EINTR
    SurfaceInterruption,
}

impl RestartPolicy {
    #[inline]
    pub const fn restarts(self) -> bool {
        matches!(self, RestartPolicy::RestartInterruptedCalls)
    }
}

impl From<bool> for RestartPolicy {
    fn from(restart: bool) -> Self {
        if restart {
            RestartPolicy::RestartInterruptedCalls
        } else {
            RestartPolicy::SurfaceInterruption
        }
    }
}

/// Binding of a fault class to its routine and restart policy
#[derive(Clone, Copy)]
pub struct HandlerEntry {
    pub class: FaultClass,
    pub routine: Routine,
    pub restart: RestartPolicy,
}

impl fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("class", &self.class)
            .field("routine", &(self.routine as usize as *const ()))
            .field("restart", &self.restart)
            .finish()
    }
}

/// Outcome after a handler runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Control returns to the interrupted instruction or call
    Resume,
    /// Process ends
    Terminate,
}

/// Per-class handler state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum FaultState {
    /// No handler installed by this registry
    Unregistered = 0,
    /// Handler installed, delivery allowed
    Armed = 1,
    /// Handler installed, delivery suppressed
    Masked = 2,
}

impl FaultState {
    #[inline]
    pub(crate) const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => FaultState::Armed,
            2 => FaultState::Masked,
            _ => FaultState::Unregistered,
        }
    }
}

/// Point-in-time view of one registry slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassSnapshot {
    pub class: FaultClass,
    pub state: FaultState,
    pub restart: Option<RestartPolicy>,
    pub disposition: Disposition,
    pub invocations: u64,
    pub masked: bool,
}

/// Point-in-time view of the whole registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub classes: Vec<ClassSnapshot>,
}
