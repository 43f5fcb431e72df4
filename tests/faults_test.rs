/*!
 * Fault Registry Tests
 * In-process tests for registration, masking and handler dispatch
 *
 * Signal dispositions are process-wide, so every test here is serialised
 * and resets what it registers.
 */

use fault_intercept::faults::*;
use nix::errno::Errno;
use nix::libc;
use nix::sys::signal::Signal;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serial_test::serial;
use std::sync::atomic::{AtomicU64, Ordering};

static LAST_INVOCATION: AtomicU64 = AtomicU64::new(0);

fn record_invocation(ctx: &mut SafeContext<'_>) {
    LAST_INVOCATION.store(ctx.invocation(), Ordering::SeqCst);
}

fn registry() -> &'static FaultRegistry {
    FaultRegistry::global()
}

#[test]
#[serial]
fn test_register_arms_class() {
    let class = FaultClass::InteractiveInterrupt;
    registry()
        .register(class, on_interactive_interrupt, RestartPolicy::RestartInterruptedCalls)
        .unwrap();

    assert_eq!(registry().state(class), FaultState::Armed);
    let entry = registry().entry(class).unwrap();
    assert_eq!(entry.class, class);
    assert_eq!(entry.restart, RestartPolicy::RestartInterruptedCalls);

    registry().reset(class).unwrap();
    assert_eq!(registry().state(class), FaultState::Unregistered);
    assert!(registry().entry(class).is_none());
}

#[test]
#[serial]
fn test_reregister_replaces_entry() {
    let class = FaultClass::InteractiveInterrupt;
    registry()
        .register(class, on_interactive_interrupt, RestartPolicy::RestartInterruptedCalls)
        .unwrap();
    registry()
        .register(class, record_invocation, RestartPolicy::SurfaceInterruption)
        .unwrap();

    let entry = registry().entry(class).unwrap();
    assert_eq!(entry.restart, RestartPolicy::SurfaceInterruption);
    assert_eq!(entry.routine as usize, record_invocation as usize);

    registry().reset(class).unwrap();
}

#[test]
#[serial]
fn test_reset_unregistered_class_fails() {
    let class = FaultClass::InteractiveInterrupt;
    let err = registry().reset(class).unwrap_err();
    assert_eq!(err, FaultError::NotRegistered(class));
}

#[test]
#[serial]
fn test_interrupt_handler_resumes_every_time() {
    let class = FaultClass::InteractiveInterrupt;
    registry()
        .register(class, on_interactive_interrupt, RestartPolicy::RestartInterruptedCalls)
        .unwrap();
    let before = registry().invocations(class);

    for _ in 0..10 {
        FaultTrigger::Raise(class).fire().unwrap();
        assert_eq!(registry().state(class), FaultState::Armed);
    }

    assert_eq!(registry().invocations(class) - before, 10);
    assert!(!registry().delivery_mask().is_masked(class).unwrap());
    registry().reset(class).unwrap();
}

#[test]
#[serial]
fn test_routine_sees_invocation_count() {
    let class = FaultClass::InteractiveInterrupt;
    registry()
        .register(class, record_invocation, RestartPolicy::RestartInterruptedCalls)
        .unwrap();

    FaultTrigger::Raise(class).fire().unwrap();
    let first = LAST_INVOCATION.load(Ordering::SeqCst);
    FaultTrigger::Raise(class).fire().unwrap();
    let second = LAST_INVOCATION.load(Ordering::SeqCst);

    assert_eq!(second, first + 1);
    assert_eq!(second, registry().invocations(class));
    registry().reset(class).unwrap();
}

fn clobber_errno(_ctx: &mut SafeContext<'_>) {
    Errno::set_raw(libc::EPIPE);
}

#[test]
#[serial]
fn test_interrupted_code_keeps_its_errno() {
    let class = FaultClass::InteractiveInterrupt;
    registry()
        .register(class, clobber_errno, RestartPolicy::RestartInterruptedCalls)
        .unwrap();

    Errno::set_raw(libc::ENOENT);
    // SAFETY: raise(3) with a registered, non-fatal handler.
    let rc = unsafe { libc::raise(libc::SIGINT) };
    let after = Errno::last_raw();

    assert_eq!(rc, 0);
    assert_eq!(after, libc::ENOENT);
    registry().reset(class).unwrap();
}

#[cfg(target_os = "linux")]
#[test]
#[serial]
fn test_memory_violation_handler_masks_class() {
    let class = FaultClass::MemoryProtectionViolation;
    let mask = registry().delivery_mask();
    registry()
        .register(class, on_memory_violation, RestartPolicy::RestartInterruptedCalls)
        .unwrap();
    let before = registry().invocations(class);

    // Synthetic delivery: no faulting instruction is re-executed on return.
    FaultTrigger::Raise(class).fire().unwrap();

    assert_eq!(registry().invocations(class) - before, 1);
    assert!(mask.is_masked(class).unwrap());
    assert_eq!(registry().state(class), FaultState::Masked);
    assert_eq!(mask.blocked().unwrap(), vec![class]);

    mask.unmask(class).unwrap();
    assert!(!mask.is_masked(class).unwrap());
    assert_eq!(registry().state(class), FaultState::Armed);

    registry().reset(class).unwrap();
}

#[test]
#[serial]
fn test_mask_and_unmask_follow_state_machine() {
    let class = FaultClass::InteractiveInterrupt;
    let mask = registry().delivery_mask();

    // Unregistered classes stay unregistered regardless of the OS mask.
    mask.mask(class).unwrap();
    assert!(mask.is_masked(class).unwrap());
    assert_eq!(registry().state(class), FaultState::Unregistered);
    mask.unmask(class).unwrap();

    registry()
        .register(class, on_interactive_interrupt, RestartPolicy::RestartInterruptedCalls)
        .unwrap();
    mask.mask(class).unwrap();
    assert_eq!(registry().state(class), FaultState::Masked);

    // Registration does not touch the OS mask.
    registry()
        .register(class, on_interactive_interrupt, RestartPolicy::RestartInterruptedCalls)
        .unwrap();
    assert_eq!(registry().state(class), FaultState::Masked);

    mask.unmask(class).unwrap();
    assert_eq!(registry().state(class), FaultState::Armed);
    registry().reset(class).unwrap();
}

#[test]
#[serial]
fn test_snapshot_serializes() {
    let class = FaultClass::InteractiveInterrupt;
    registry()
        .register(class, on_interactive_interrupt, RestartPolicy::SurfaceInterruption)
        .unwrap();

    let snapshot = registry().snapshot();
    assert_eq!(snapshot.classes.len(), FaultClass::ALL.len());
    let interrupt = &snapshot.classes[class.index()];
    assert_eq!(interrupt.state, FaultState::Armed);
    assert_eq!(interrupt.restart, Some(RestartPolicy::SurfaceInterruption));
    assert_eq!(interrupt.disposition, Disposition::Resume);

    let json = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(json["classes"][1]["class"], "interactive_interrupt");
    assert_eq!(json["classes"][1]["restart"], "surface_interruption");

    registry().reset(class).unwrap();
}

#[test]
#[serial]
fn test_snapshot_reports_mask_of_registered_class() {
    let class = FaultClass::InteractiveInterrupt;
    let mask = registry().delivery_mask();
    mask.mask(class).unwrap();
    registry()
        .register(class, on_interactive_interrupt, RestartPolicy::RestartInterruptedCalls)
        .unwrap();

    let snapshot = registry().snapshot();
    let interrupt = &snapshot.classes[class.index()];
    assert!(interrupt.masked);
    assert_eq!(interrupt.state, FaultState::Masked);

    mask.unmask(class).unwrap();
    assert!(!registry().snapshot().classes[class.index()].masked);
    registry().reset(class).unwrap();
}

#[test]
fn test_fault_error_diagnostics() {
    use miette::Diagnostic;

    let err = FaultError::NotRegistered(FaultClass::MemoryProtectionViolation);
    assert_eq!(err.code().unwrap().to_string(), "fault::not_registered");
    assert!(err.to_string().contains("MemoryProtectionViolation"));
}

proptest! {
    #[test]
    fn prop_from_signum_only_recognizes_fault_classes(signum in -64i32..128) {
        match FaultClass::from_signum(signum) {
            Some(class) => prop_assert_eq!(class.signal() as i32, signum),
            None => prop_assert!(
                signum != Signal::SIGSEGV as i32 && signum != Signal::SIGINT as i32
            ),
        }
    }
}
