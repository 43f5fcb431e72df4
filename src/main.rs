/*!
 * Fault Demo - Main Entry Point
 *
 * Installs the fault handlers and runs one scenario:
 * - Null-page dereference (handled once, then fatal)
 * - Synthetic SIGSEGV followed by a real fault
 * - Repeated interactive interrupts
 * - Blocking read interrupted by SIGINT
 */

use clap::Parser;
use tracing::info;

use fault_intercept::demo::{self, DemoArgs};
use fault_intercept::init_tracing;

fn main() -> miette::Result<()> {
    init_tracing();
    let args = DemoArgs::parse();

    info!(
        scenario = ?args.scenario,
        count = args.count,
        restart = !args.no_restart,
        "fault-demo starting"
    );

    demo::run(&args)
}
