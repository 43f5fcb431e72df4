/*!
 * Fault Intercept Library
 * Process-local interception of memory-protection violations and
 * interactive interrupts with bounded, signal-safe handlers
 */

#[cfg(not(unix))]
compile_error!("fault-intercept requires a Unix host");

pub mod demo;
pub mod faults;
pub mod limits;
pub mod monitoring;

// Re-exports
pub use faults::{
    install_default_handlers, install_handlers, DeliveryMask, DiagnosticLine, Disposition,
    FaultClass, FaultError, FaultRegistry, FaultResult, FaultState, FaultTrigger, HandlerEntry,
    RegistrySnapshot, RestartPolicy, Routine, SafeContext,
};
pub use monitoring::init_tracing;
