/*!
 * Faults Module
 * Interception of asynchronous OS faults with bounded, signal-safe handlers
 */

pub mod handlers;
pub mod mask;
pub mod registry;
pub mod routine;
pub mod trigger;
pub mod types;

// Re-export public API
pub use handlers::{
    on_interactive_interrupt, on_memory_violation, INTERRUPT_LINE, MEMORY_VIOLATION_LINE,
};
pub use mask::DeliveryMask;
pub use registry::{install_default_handlers, install_handlers, FaultRegistry};
pub use routine::{DiagnosticLine, Routine, SafeContext};
pub use trigger::{dereference_null_page, FaultTrigger};
pub use types::{
    ClassSnapshot, Disposition, FaultClass, FaultError, FaultResult, FaultState, HandlerEntry,
    RegistrySnapshot, RestartPolicy,
};
