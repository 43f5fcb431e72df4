/*!
 * Demo Scenarios
 * Drives the fault subsystem end-to-end for the `fault-demo` binary
 *
 * Harness lines are printed through buffered stdout and flushed before any
 * fault fires, so they never interleave with handler output.
 */

use clap::{Parser, ValueEnum};
use miette::IntoDiagnostic;
use nix::errno::Errno;
use nix::libc;
use std::io::Write;
use tracing::{info, instrument};

use crate::faults::{install_handlers, FaultClass, FaultRegistry, FaultTrigger, RestartPolicy};
use crate::limits::{AFTER_FAULT_MARKER, READY_MARKER, WAIT_READ_BUFFER};

/// Command-line arguments for `fault-demo`
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "fault-demo", about = "Exercise the fault interception handlers")]
pub struct DemoArgs {
    /// Scenario to run
    #[arg(value_enum)]
    pub scenario: Scenario,

    /// Number of interrupts raised by the `interrupt` scenario
    #[arg(long, default_value_t = 1)]
    pub count: u32,

    /// Surface EINTR to interrupted calls instead of restarting them
    #[arg(long)]
    pub no_restart: bool,
}

impl DemoArgs {
    pub fn interrupt_restart(&self) -> RestartPolicy {
        RestartPolicy::from(!self.no_restart)
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Dereference the null page once
    NullDeref,
    /// Raise SIGSEGV, report the mask, then dereference the null page
    RaiseThenDeref,
    /// Raise SIGINT `--count` times
    Interrupt,
    /// Block in one read(2) on stdin, reporting whether it was restarted
    Wait,
    /// Print the registry snapshot as JSON
    Status,
}

/// Install handlers and run the selected scenario
#[instrument(skip(args), fields(scenario = ?args.scenario))]
pub fn run(args: &DemoArgs) -> miette::Result<()> {
    let registry = install_handlers(args.interrupt_restart())?;
    info!(scenario = ?args.scenario, "Running scenario");

    match args.scenario {
        Scenario::NullDeref => {
            FaultTrigger::NullPage.fire()?;
            report(AFTER_FAULT_MARKER)
        }
        Scenario::RaiseThenDeref => {
            FaultTrigger::Raise(FaultClass::MemoryProtectionViolation).fire()?;
            let masked = registry
                .delivery_mask()
                .is_masked(FaultClass::MemoryProtectionViolation)?;
            report(&format!("masked: {masked}"))?;
            FaultTrigger::NullPage.fire()?;
            report(AFTER_FAULT_MARKER)
        }
        Scenario::Interrupt => {
            for _ in 0..args.count {
                FaultTrigger::Raise(FaultClass::InteractiveInterrupt).fire()?;
            }
            report(&format!("survived {} interrupts", args.count))
        }
        Scenario::Wait => wait_for_input(),
        Scenario::Status => print_status(registry),
    }
}

fn report(line: &str) -> miette::Result<()> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{line}").into_diagnostic()?;
    stdout.flush().into_diagnostic()
}

/// One raw read so the restart policy, not std's EINTR retry loop, decides
/// what the caller sees.
fn wait_for_input() -> miette::Result<()> {
    report(READY_MARKER)?;
    let mut buf = [0u8; WAIT_READ_BUFFER];
    // SAFETY: buf is valid for buf.len() bytes.
    let result = Errno::result(unsafe {
        libc::read(libc::STDIN_FILENO, buf.as_mut_ptr().cast(), buf.len())
    });
    match result {
        Ok(n) => {
            let text = String::from_utf8_lossy(&buf[..n as usize]);
            report(&format!("resumed: {}", text.trim_end()))
        }
        Err(Errno::EINTR) => report("interrupted"),
        Err(e) => Err(e).into_diagnostic(),
    }
}

fn print_status(registry: &FaultRegistry) -> miette::Result<()> {
    let json = serde_json::to_string_pretty(&registry.snapshot()).into_diagnostic()?;
    report(&json)
}
