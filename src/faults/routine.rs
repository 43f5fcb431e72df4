/*!
 * Restricted Handler Context
 * The only surface a fault routine can touch while running inside a signal handler
 *
 * A routine is a plain function pointer over `&mut SafeContext`. It cannot
 * capture state, and the context exposes nothing but async-signal-safe
 * primitives: a single `write(2)`, signal-set updates and atomic reads.
 */

use nix::libc;
use std::marker::PhantomData;
use std::sync::atomic::Ordering;

use super::registry::SLOTS;
use super::types::{FaultClass, FaultState};

/// Handler routine signature
///
/// Routines run in async-signal context: no allocation, no locks, no logging.
pub type Routine = for<'a> fn(&mut SafeContext<'a>);

/// Fixed, newline-terminated diagnostic message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagnosticLine(&'static str);

impl DiagnosticLine {
    /// Build a diagnostic line.
    ///
    /// Panics (at compile time when used in a `const`) unless `text` is a
    /// single non-empty line ending in `\n`.
    pub const fn new(text: &'static str) -> Self {
        let bytes = text.as_bytes();
        if bytes.len() < 2 {
            panic!("diagnostic line must contain text followed by a newline");
        }
        if bytes[bytes.len() - 1] != b'\n' {
            panic!("diagnostic line must end with a newline");
        }
        let mut i = 0;
        while i < bytes.len() - 1 {
            if bytes[i] == b'\n' {
                panic!("diagnostic line must not contain interior newlines");
            }
            i += 1;
        }
        Self(text)
    }

    #[inline]
    pub const fn as_str(&self) -> &'static str {
        self.0
    }

    #[inline]
    pub const fn as_bytes(&self) -> &'static [u8] {
        self.0.as_bytes()
    }
}

/// Execution context handed to a routine for one fault delivery
///
/// Only constructed by the registry trampoline. Not `Send`: it is bound to
/// the interrupted thread and the kernel-provided `ucontext`.
pub struct SafeContext<'a> {
    class: FaultClass,
    invocation: u64,
    ucontext: *mut libc::ucontext_t,
    _frame: PhantomData<&'a mut libc::ucontext_t>,
}

impl<'a> SafeContext<'a> {
    /// # Safety
    /// `ucontext` must be the third argument of an `SA_SIGINFO` handler
    /// currently executing on this thread, or null.
    pub(crate) unsafe fn new(
        class: FaultClass,
        invocation: u64,
        ucontext: *mut libc::ucontext_t,
    ) -> Self {
        Self {
            class,
            invocation,
            ucontext,
            _frame: PhantomData,
        }
    }

    /// Class being delivered
    #[inline]
    pub fn class(&self) -> FaultClass {
        self.class
    }

    /// 1-based count of deliveries of this class, including the current one
    #[inline]
    pub fn invocation(&self) -> u64 {
        self.invocation
    }

    /// Write one diagnostic line to standard output, unbuffered.
    ///
    /// Retries on `EINTR` and short writes; any other failure, including a
    /// zero-length write, is dropped since there is nowhere safe to report it.
    pub fn emit(&self, line: DiagnosticLine) {
        write_fully(line.as_bytes(), |chunk| {
            // SAFETY: write(2) is async-signal-safe; the buffer is 'static.
            unsafe { libc::write(libc::STDOUT_FILENO, chunk.as_ptr().cast(), chunk.len()) }
        });
    }

    /// Add `class` to the delivery mask.
    ///
    /// The class is blocked immediately and also in the mask the kernel
    /// restores when this handler returns, so the block outlives the handler.
    pub fn mask(&mut self, class: FaultClass) {
        let signum = class.signal() as libc::c_int;
        // SAFETY: sigemptyset/sigaddset/sigprocmask are async-signal-safe and
        // operate on a stack-local set.
        unsafe {
            let mut set = std::mem::MaybeUninit::<libc::sigset_t>::uninit();
            libc::sigemptyset(set.as_mut_ptr());
            libc::sigaddset(set.as_mut_ptr(), signum);
            libc::sigprocmask(libc::SIG_BLOCK, set.as_ptr(), std::ptr::null_mut());
        }
        self.persist_block(signum);
        let _ = SLOTS[class.index()].state.compare_exchange(
            FaultState::Armed as u8,
            FaultState::Masked as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    fn persist_block(&mut self, signum: libc::c_int) {
        if self.ucontext.is_null() {
            return;
        }
        // SAFETY: ucontext is the live frame the kernel restores on sigreturn.
        unsafe {
            libc::sigaddset(&mut (*self.ucontext).uc_sigmask, signum);
        }
    }

    // Other hosts restore the pre-handler mask on return; the block lasts
    // only for the remainder of the handler there.
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    fn persist_block(&mut self, _signum: libc::c_int) {}
}

/// Drive `write` until `bytes` is consumed. Stops on any error other than
/// `EINTR` and on a zero-length write. Returns the number of bytes written.
fn write_fully(bytes: &[u8], mut write: impl FnMut(&[u8]) -> isize) -> usize {
    let mut remaining = bytes;
    while !remaining.is_empty() {
        let written = write(remaining);
        if written < 0 {
            if nix::errno::Errno::last() == nix::errno::Errno::EINTR {
                continue;
            }
            break;
        }
        if written == 0 {
            break;
        }
        remaining = &remaining[written as usize..];
    }
    bytes.len() - remaining.len()
}
