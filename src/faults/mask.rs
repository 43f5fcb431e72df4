/*!
 * Delivery Mask
 * Process-wide set of fault classes currently blocked from delivery
 *
 * Normal-context counterpart of `SafeContext::mask`. The OS signal mask is
 * the source of truth; registry slot states follow it.
 */

use nix::sys::signal::{sigprocmask, SigSet, SigmaskHow};
use std::sync::atomic::Ordering;
use tracing::debug;

use super::registry::SLOTS;
use super::types::{FaultClass, FaultError, FaultResult, FaultState};

/// Handle to the process delivery mask
///
/// Assumes a single-threaded process: on Linux the mask is per-thread and
/// only the calling thread is affected.
#[derive(Debug, Default)]
pub struct DeliveryMask {
    _private: (),
}

impl DeliveryMask {
    pub(crate) const fn new() -> Self {
        Self { _private: () }
    }

    /// Block delivery of `class`
    pub fn mask(&self, class: FaultClass) -> FaultResult<()> {
        update(SigmaskHow::SIG_BLOCK, class)?;
        transition(class, FaultState::Armed, FaultState::Masked);
        debug!(class = %class, "Fault class masked");
        Ok(())
    }

    /// Allow delivery of `class` again, rearming its handler
    pub fn unmask(&self, class: FaultClass) -> FaultResult<()> {
        update(SigmaskHow::SIG_UNBLOCK, class)?;
        transition(class, FaultState::Masked, FaultState::Armed);
        debug!(class = %class, "Fault class unmasked");
        Ok(())
    }

    /// Whether `class` is currently blocked
    pub fn is_masked(&self, class: FaultClass) -> FaultResult<bool> {
        Ok(current(class)?.contains(class.signal()))
    }

    /// All recognized classes currently blocked
    pub fn blocked(&self) -> FaultResult<Vec<FaultClass>> {
        let mut blocked = Vec::with_capacity(FaultClass::ALL.len());
        for class in FaultClass::ALL {
            if self.is_masked(class)? {
                blocked.push(class);
            }
        }
        Ok(blocked)
    }
}

fn update(how: SigmaskHow, class: FaultClass) -> FaultResult<()> {
    let mut set = SigSet::empty();
    set.add(class.signal());
    sigprocmask(how, Some(&set), None).map_err(|source| FaultError::MaskUpdate { class, source })
}

fn current(class: FaultClass) -> FaultResult<SigSet> {
    let mut old = SigSet::empty();
    sigprocmask(SigmaskHow::SIG_BLOCK, None, Some(&mut old))
        .map_err(|source| FaultError::MaskUpdate { class, source })?;
    Ok(old)
}

// Unregistered slots stay unregistered whatever the OS mask says.
fn transition(class: FaultClass, from: FaultState, to: FaultState) {
    let _ = SLOTS[class.index()].state.compare_exchange(
        from as u8,
        to as u8,
        Ordering::AcqRel,
        Ordering::Acquire,
    );
}
