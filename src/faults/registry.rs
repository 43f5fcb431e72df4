/*!
 * Fault Registry
 * Installs one handler per fault class and owns the per-class slot table
 *
 * The slot table is the only state the OS-facing trampoline reads, and it
 * is made entirely of atomics. Everything else (previous dispositions,
 * registration serialisation, logging) lives on the normal-context side.
 */

use nix::errno::Errno;
use nix::libc;
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use tracing::{info, instrument, warn};

use super::handlers::{on_interactive_interrupt, on_memory_violation};
use super::mask::DeliveryMask;
use super::routine::{Routine, SafeContext};
use super::types::{
    ClassSnapshot, FaultClass, FaultError, FaultResult, FaultState, HandlerEntry,
    RegistrySnapshot, RestartPolicy,
};

/// Lock-free per-class slot read from signal context
pub(crate) struct HandlerSlot {
    /// `Routine` stored as an address; 0 when no routine is installed
    routine: AtomicUsize,
    restart: AtomicBool,
    pub(crate) state: AtomicU8,
    invocations: AtomicU64,
}

impl HandlerSlot {
    const fn new() -> Self {
        Self {
            routine: AtomicUsize::new(0),
            restart: AtomicBool::new(false),
            state: AtomicU8::new(FaultState::Unregistered as u8),
            invocations: AtomicU64::new(0),
        }
    }

    fn routine(&self) -> Option<Routine> {
        match self.routine.load(Ordering::Acquire) {
            0 => None,
            // SAFETY: non-zero values are only ever stored from a `Routine`.
            raw => Some(unsafe { std::mem::transmute::<usize, Routine>(raw) }),
        }
    }
}

pub(crate) static SLOTS: [HandlerSlot; 2] = [HandlerSlot::new(), HandlerSlot::new()];

/// Dispositions in effect before this registry first took over each class
static PREVIOUS: Mutex<[Option<SigAction>; 2]> = Mutex::new([None, None]);

static REGISTRY: FaultRegistry = FaultRegistry {
    mask: DeliveryMask::new(),
};

/// OS-facing entry point for every registered class
extern "C" fn trampoline(signum: libc::c_int, _info: *mut libc::siginfo_t, ucontext: *mut libc::c_void) {
    let Some(class) = FaultClass::from_signum(signum) else {
        return;
    };
    let slot = &SLOTS[class.index()];
    let Some(routine) = slot.routine() else {
        return;
    };
    // The interrupted code must see the errno it had before delivery.
    let saved_errno = Errno::last_raw();
    let invocation = slot.invocations.fetch_add(1, Ordering::AcqRel) + 1;
    // SAFETY: ucontext is the third argument of this SA_SIGINFO handler.
    let mut ctx = unsafe { SafeContext::new(class, invocation, ucontext.cast()) };
    routine(&mut ctx);
    Errno::set_raw(saved_errno);
}

/// Process-wide fault registry
#[derive(Debug)]
pub struct FaultRegistry {
    mask: DeliveryMask,
}

impl FaultRegistry {
    /// The registry for this process
    pub fn global() -> &'static FaultRegistry {
        &REGISTRY
    }

    /// Delivery mask owned by this registry
    pub fn delivery_mask(&self) -> &DeliveryMask {
        &self.mask
    }

    /// Bind `routine` to `class`, replacing any previous binding.
    ///
    /// Call during single-threaded startup, before code that can raise the
    /// class is reachable. Failure is a configuration error.
    #[instrument(level = "debug", skip(self, routine))]
    pub fn register(
        &self,
        class: FaultClass,
        routine: Routine,
        restart: RestartPolicy,
    ) -> FaultResult<()> {
        let mut previous = PREVIOUS.lock();
        let slot = &SLOTS[class.index()];

        // Publish the routine before the OS can route the signal to us.
        let old_routine = slot.routine.swap(routine as usize, Ordering::AcqRel);
        let old_restart = slot.restart.swap(restart.restarts(), Ordering::AcqRel);

        let flags = if restart.restarts() {
            SaFlags::SA_RESTART
        } else {
            SaFlags::empty()
        };
        let action = SigAction::new(SigHandler::SigAction(trampoline), flags, SigSet::empty());

        // SAFETY: the trampoline only touches atomics and calls a Routine,
        // whose context exposes async-signal-safe primitives only.
        match unsafe { sigaction(class.signal(), &action) } {
            Ok(old_action) => {
                if previous[class.index()].is_none() {
                    previous[class.index()] = Some(old_action);
                }
            }
            Err(source) => {
                slot.routine.store(old_routine, Ordering::Release);
                slot.restart.store(old_restart, Ordering::Release);
                warn!(class = %class, error = %source, "Fault handler installation failed");
                return Err(FaultError::Installation { class, source });
            }
        }

        let state = if self.masked_or_warn(class) {
            FaultState::Masked
        } else {
            FaultState::Armed
        };
        slot.state.store(state as u8, Ordering::Release);

        info!(
            class = %class,
            restart = restart.restarts(),
            replaced = old_routine != 0,
            "Fault handler registered"
        );
        Ok(())
    }

    /// Restore the disposition that preceded the first registration of `class`
    #[instrument(level = "debug", skip(self))]
    pub fn reset(&self, class: FaultClass) -> FaultResult<()> {
        let mut previous = PREVIOUS.lock();
        let slot = &SLOTS[class.index()];
        let Some(old_action) = previous[class.index()].as_ref() else {
            return Err(FaultError::NotRegistered(class));
        };

        // SAFETY: restoring a disposition previously returned by sigaction.
        unsafe { sigaction(class.signal(), old_action) }
            .map_err(|source| FaultError::Installation { class, source })?;

        previous[class.index()] = None;
        slot.routine.store(0, Ordering::Release);
        slot.restart.store(false, Ordering::Release);
        slot.state
            .store(FaultState::Unregistered as u8, Ordering::Release);

        info!(class = %class, "Fault handler reset to previous disposition");
        Ok(())
    }

    /// Current binding for `class`
    pub fn entry(&self, class: FaultClass) -> Option<HandlerEntry> {
        let slot = &SLOTS[class.index()];
        slot.routine().map(|routine| HandlerEntry {
            class,
            routine,
            restart: RestartPolicy::from(slot.restart.load(Ordering::Acquire)),
        })
    }

    pub fn state(&self, class: FaultClass) -> FaultState {
        FaultState::from_u8(SLOTS[class.index()].state.load(Ordering::Acquire))
    }

    /// Number of deliveries routed to a routine for `class`
    pub fn invocations(&self, class: FaultClass) -> u64 {
        SLOTS[class.index()].invocations.load(Ordering::Acquire)
    }

    // Mask queries only fail on an invalid signal set; report unmasked then.
    fn masked_or_warn(&self, class: FaultClass) -> bool {
        match self.mask.is_masked(class) {
            Ok(masked) => masked,
            Err(e) => {
                warn!(class = %class, error = %e, "Delivery mask query failed");
                false
            }
        }
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        let classes = FaultClass::ALL
            .into_iter()
            .map(|class| ClassSnapshot {
                class,
                state: self.state(class),
                restart: self.entry(class).map(|entry| entry.restart),
                disposition: class.disposition(),
                invocations: self.invocations(class),
                masked: self.masked_or_warn(class),
            })
            .collect();
        RegistrySnapshot { classes }
    }
}

/// Install the production handlers for every recognized class
pub fn install_default_handlers() -> FaultResult<&'static FaultRegistry> {
    install_handlers(RestartPolicy::RestartInterruptedCalls)
}

/// Install the production handlers with an explicit interrupt restart policy
pub fn install_handlers(interrupt_restart: RestartPolicy) -> FaultResult<&'static FaultRegistry> {
    let registry = FaultRegistry::global();
    registry.register(
        FaultClass::MemoryProtectionViolation,
        on_memory_violation,
        RestartPolicy::RestartInterruptedCalls,
    )?;
    registry.register(
        FaultClass::InteractiveInterrupt,
        on_interactive_interrupt,
        interrupt_restart,
    )?;
    Ok(registry)
}
