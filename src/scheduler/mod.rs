/*
 * Three-Level Feedback Queue Scheduler
 *
 * This module implements the CPU scheduler: three ready queues with distinct
 * disciplines, priority-driven preemption, periodic aging, and an
 * exponentially-smoothed estimate of each thread's next CPU burst.
 *
 * QUEUE STRUCTURE:
 * ===============
 *
 * Every ready thread sits in exactly one of three queues, selected by its
 * priority band:
 *
 * - L1, priorities [100, 149]: shortest-job-first on the predicted burst
 * - L2, priorities [50, 99]:   fixed priority, highest first
 * - L3, priorities [0, 49]:    round-robin (plain FIFO)
 *
 * Dispatch precedence is strict: L1 before L2 before L3. Within L1 and L2
 * ties are broken toward the larger thread id.
 *
 * PREEMPTION:
 * ==========
 *
 * Only an admission into L1 can preempt the running thread, and only when
 * the arrival's predicted burst is shorter than the runner's. The admission
 * path charges the runner's consumed ticks to its burst accumulator and
 * raises a should-preempt flag; the kernel answers the flag at its next
 * safe point by calling yield_current(). L2 and L3 arrivals never preempt -
 * they gain the CPU through the normal dispatch loop.
 *
 * AGING:
 * =====
 *
 * A thread that has waited 1500 ticks in a ready queue gets a priority
 * boost of 10 (clamped to 149). A boost that crosses a band boundary
 * migrates the thread into the next queue up, through the normal admission
 * path - which can itself trigger a preemption.
 *
 * BURST ESTIMATION:
 * ================
 *
 * On every transition off the CPU the consumed ticks are folded into the
 * thread's burst prediction:
 *
 *     burst <- 0.5 * (burst + consumed)
 *
 * The new prediction decides the thread's position in L1 on its next
 * admission.
 *
 * INTERRUPT DISCIPLINE:
 * ====================
 *
 * All entry points assume interrupts are disabled; on a uniprocessor that
 * is the mutual exclusion. No locks are taken on scheduling paths: a
 * contended lock could re-enter dispatch and loop. The only lock in this
 * module guards the global singleton slot below, for kernel code outside
 * the scheduling paths.
 *
 * DEFERRED DELETE:
 * ===============
 *
 * A finishing thread cannot free itself - its stack is live until the
 * successor has switched away from it. The dispatcher parks it in a
 * one-slot holding area and reclaims it right after the next switch.
 */

use spin::Mutex;

pub mod queue;
pub mod scheduler;
pub mod thread;
pub mod traits;
pub mod types;

pub use queue::{Discipline, ReadyQueue};
pub use scheduler::Scheduler;
pub use thread::{Placement, STACK_FENCEPOST, Thread, ThreadId, ThreadState, UserSpace};
pub use traits::KernelCtx;
pub use types::{InterruptLevel, Priority, QueueLevel};

/// Thread stack size (64 KiB per thread)
pub const THREAD_STACK_SIZE: usize = 64 * 1024;

/// Ticks a thread may wait in a ready queue before one aging boost.
pub const AGING_WAIT_TICKS: u64 = 1500;

/// Priority gained per aging boost, clamped to `Priority::MAX`.
pub const AGING_PRIORITY_BOOST: i32 = 10;

/// Weight folding an observed burst into the running prediction.
pub const BURST_SMOOTHING: f64 = 0.5;

/// Global scheduler instance
static SCHEDULER: Mutex<Option<Scheduler>> = Mutex::new(None);

/// Initialize the global scheduler.
pub fn init() {
    log::info!("Initializing three-level feedback queue scheduler...");
    *SCHEDULER.lock() = Some(Scheduler::new());
    log::info!("Scheduler initialized");
}

/// Run a closure against the global scheduler (read-only).
///
/// # Panics
/// Panics if `init()` has not run.
pub fn with_scheduler<F, R>(f: F) -> R
where
    F: FnOnce(&Scheduler) -> R,
{
    let guard = SCHEDULER.lock();
    f(guard.as_ref().expect("scheduler not initialized"))
}

/// Run a closure against the global scheduler (mutable).
///
/// # Panics
/// Panics if `init()` has not run.
pub fn with_scheduler_mut<F, R>(f: F) -> R
where
    F: FnOnce(&mut Scheduler) -> R,
{
    let mut guard = SCHEDULER.lock();
    f(guard.as_mut().expect("scheduler not initialized"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_singleton_round_trip() {
        init();
        let tid = with_scheduler_mut(|sched| sched.create_thread("kernel", Priority(120), 4.0));
        with_scheduler(|sched| {
            let thread = sched.thread(tid).expect("thread registered");
            assert_eq!(thread.state, ThreadState::New);
            assert_eq!(thread.priority, Priority(120));
        });
    }
}
