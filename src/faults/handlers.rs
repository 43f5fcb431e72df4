/*!
 * Fault Handlers
 * Production routines for each recognized fault class
 */

use super::routine::{DiagnosticLine, SafeContext};
use super::types::FaultClass;

/// Line written on every memory-protection violation
pub const MEMORY_VIOLATION_LINE: DiagnosticLine = DiagnosticLine::new("Caught SIGSEGV!\n");

/// Line written on every interactive interrupt
pub const INTERRUPT_LINE: DiagnosticLine = DiagnosticLine::new("caught sigint\n");

/// Handle once, then fail hard.
///
/// Masks the class so a recurrence is not routed back here, then reports.
/// The faulting access is not repaired or skipped: when the instruction
/// re-executes it faults with the class blocked, and the kernel applies the
/// default (fatal) disposition.
pub fn on_memory_violation(ctx: &mut SafeContext<'_>) {
    ctx.mask(FaultClass::MemoryProtectionViolation);
    ctx.emit(MEMORY_VIOLATION_LINE);
}

/// Report and resume. Holds no state, so repeated delivery behaves identically.
pub fn on_interactive_interrupt(ctx: &mut SafeContext<'_>) {
    ctx.emit(INTERRUPT_LINE);
}
