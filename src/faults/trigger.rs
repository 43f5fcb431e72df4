/*!
 * Fault Trigger
 * Deliberate faults used to exercise the handlers end-to-end
 */

use nix::sys::signal::raise;
use tracing::debug;

use super::types::{FaultClass, FaultError, FaultResult};
use crate::limits::NULL_PAGE_PROBE_ADDR;

/// How to provoke a fault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultTrigger {
    /// Read from the never-mapped zero page; a real memory-protection violation
    NullPage,
    /// Synthetic delivery of the class to the calling thread
    Raise(FaultClass),
}

impl FaultTrigger {
    /// Fire the trigger.
    ///
    /// `NullPage` returns only if the access is somehow survivable, which it
    /// is not with the production handler installed.
    pub fn fire(self) -> FaultResult<()> {
        debug!(trigger = ?self, "Firing fault trigger");
        match self {
            FaultTrigger::NullPage => {
                // SAFETY: intentionally invalid; this is the whole point.
                let _ = unsafe { dereference_null_page() };
                Ok(())
            }
            FaultTrigger::Raise(class) => {
                raise(class.signal()).map_err(|source| FaultError::Delivery { class, source })
            }
        }
    }
}

/// Volatile read through an address in the zero page.
///
/// # Safety
/// Always faults. Only call with a memory-protection handler that accepts
/// the consequences, or in a process that is meant to die.
#[inline(never)]
pub unsafe fn dereference_null_page() -> u32 {
    // Non-null so the read is not rejected before reaching the MMU.
    let probe = NULL_PAGE_PROBE_ADDR as *const u32;
    std::ptr::read_volatile(probe)
}
