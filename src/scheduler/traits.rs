/*
 * Kernel Collaborator Contract
 *
 * The scheduler runs inside a kernel that owns the clock, the interrupt
 * discipline and the machine-dependent stack switch. This trait is the only
 * way the scheduler reaches that machinery, which keeps the subsystem free
 * of architecture code and lets the unit tests drive it with a simulated
 * kernel.
 */

use super::thread::ThreadId;
use super::types::InterruptLevel;

/// Services the embedding kernel provides to the scheduler.
pub trait KernelCtx {
    /// Monotonic, non-decreasing tick counter.
    fn total_ticks(&self) -> u64;

    /// Current interrupt enable state. The caller must have interrupts
    /// disabled across every scheduler entry point; the scheduler asserts it.
    fn interrupt_level(&self) -> InterruptLevel;

    /// The machine-dependent stack switch. Code before the call runs on
    /// `old`'s stack; the call returns only once some later dispatch
    /// switches back to `old`.
    fn context_switch(&mut self, old: ThreadId, next: ThreadId);
}
