/*!
 * Limits and Constants
 *
 * Centralized location for fixed addresses, markers and environment keys.
 */

// =============================================================================
// FAULT TRIGGER
// =============================================================================

/// Aligned, non-null address inside the zero page.
/// Linux never maps below vm.mmap_min_addr (4KB at minimum), so any read
/// here raises SIGSEGV.
pub const NULL_PAGE_PROBE_ADDR: usize = 0x10;

// =============================================================================
// DEMO HARNESS
// =============================================================================

/// Printed by the `wait` scenario once handlers are installed and it is
/// about to block
pub const READY_MARKER: &str = "ready";

/// Printed by the `null-deref` scenario if execution ever continues past the fault
pub const AFTER_FAULT_MARKER: &str = "After fault!";

/// Maximum bytes read by the `wait` scenario
pub const WAIT_READ_BUFFER: usize = 256;

// =============================================================================
// ENVIRONMENT
// =============================================================================

/// Enables JSON log output when set to `1` or `true`
pub const TRACE_JSON_ENV: &str = "FAULT_TRACE_JSON";

/// Default log filter when RUST_LOG is unset
pub const DEFAULT_LOG_FILTER: &str = "info";
