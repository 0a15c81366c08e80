/*
 * Thread Management
 *
 * This module defines the Thread structure and related types for the
 * three-level feedback-queue scheduler: the lifecycle state machine, the
 * placement tag used to audit queue membership, the per-thread timing
 * accounts feeding the burst estimator, and the hooks invoked around a
 * context switch for user-backed threads.
 */

use alloc::boxed::Box;
use alloc::string::String;
use core::fmt;

use super::AGING_PRIORITY_BOOST;
use super::types::{Priority, QueueLevel};

/// Magic word planted at the low end of every thread stack.
///
/// Kernel stacks grow downward, so a runaway thread tramples this word
/// first. `check_overflow` verifies it on every switch-out.
pub const STACK_FENCEPOST: u32 = 0xDEAD_BEEF;

/// Thread identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub usize);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Thread({})", self.0)
    }
}

/// Thread lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Registered but never admitted to a ready queue.
    New,
    /// Waiting in a ready queue.
    Ready,
    /// On the CPU.
    Running,
    /// Waiting for an external event; not in any queue.
    Blocked,
    /// Finished; awaiting deferred destruction.
    Zombie,
}

/// Where a thread currently sits, from the scheduler's point of view.
///
/// The tag makes the membership invariant (a READY thread is in exactly one
/// queue, a RUNNING thread in none) cheap to audit, and lets the aging
/// engine remove an arbitrary member without scanning all three queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// In no queue and not on the CPU (new, blocked, zombie, or mid hand-off).
    Detached,
    /// Member of the given ready queue.
    Queued(QueueLevel),
    /// On the CPU.
    Running,
}

/// Hooks invoked around a context switch for threads backed by a user
/// address space. The scheduler only sequences the calls; what gets saved
/// and restored is the embedding kernel's business.
pub trait UserSpace: Send {
    /// Save the user-mode CPU registers of the outgoing thread.
    fn save_user_state(&mut self);

    /// Restore the user-mode CPU registers of the resumed thread.
    fn restore_user_state(&mut self);

    /// Save address-space state (page tables and the like).
    fn save_state(&mut self);

    /// Restore address-space state.
    fn restore_state(&mut self);
}

/// Thread structure
///
/// Each thread carries its own kernel stack plus the scheduling accounts the
/// dispatcher and the burst estimator read and write:
///
/// - `burst_time` orders the thread inside the top (shortest-job-first) queue
/// - `tmp_burst_time` accumulates CPU ticks not yet folded into the estimate
/// - `arrival_time` is what the aging engine measures waiting against
/// - `start_exe_time` / `last_burst_time` account the dispatch intervals
pub struct Thread {
    pub id: ThreadId,
    pub name: String,
    pub state: ThreadState,
    pub placement: Placement,

    pub priority: Priority,
    /// Predicted length of the next CPU burst, in ticks.
    pub burst_time: f64,
    /// Ticks consumed since the last dispatch, not yet folded into the estimate.
    pub tmp_burst_time: f64,
    /// Tick at which the thread last entered a ready queue.
    pub arrival_time: u64,
    /// Tick at which the thread last started executing.
    pub start_exe_time: u64,
    /// Tick up to which consumed CPU has been charged to `tmp_burst_time`.
    /// Re-stamped by `charge_usage`; `start_exe_time` stays put so the
    /// dispatch-interval accounting in the dispatcher is unaffected.
    pub last_charge_time: u64,
    /// Ticks consumed during the last completed dispatch interval.
    pub last_burst_time: u64,

    pub stack: Box<[u8]>,
    pub space: Option<Box<dyn UserSpace>>,
}

impl Thread {
    pub fn new(id: ThreadId, name: String, priority: Priority, stack: Box<[u8]>) -> Self {
        assert!(
            priority.is_valid(),
            "priority {priority} outside the scheduling domain"
        );
        assert!(stack.len() >= 4, "thread stack too small for a fencepost");

        let mut thread = Self {
            id,
            name,
            state: ThreadState::New,
            placement: Placement::Detached,
            priority,
            burst_time: 0.0,
            tmp_burst_time: 0.0,
            arrival_time: 0,
            start_exe_time: 0,
            last_charge_time: 0,
            last_burst_time: 0,
            stack,
            space: None,
        };
        thread.stack[..4].copy_from_slice(&STACK_FENCEPOST.to_ne_bytes());
        thread
    }

    /// Panic if the fencepost at the low end of the stack was clobbered.
    /// Detected, not recovered: by the time the word is gone, so is whatever
    /// sat below the stack.
    pub fn check_overflow(&self) {
        let mut word = [0u8; 4];
        word.copy_from_slice(&self.stack[..4]);
        assert!(
            u32::from_ne_bytes(word) == STACK_FENCEPOST,
            "{} overflowed its kernel stack",
            self.id
        );
    }

    /// Fold the CPU ticks consumed since the last charge into
    /// `tmp_burst_time` and advance the charge mark. Charging twice over one
    /// interval counts each tick once.
    pub fn charge_usage(&mut self, now: u64) {
        self.tmp_burst_time += now.saturating_sub(self.last_charge_time) as f64;
        self.last_charge_time = now;
    }

    /// One aging step: boost the priority by the fixed amount, clamped to
    /// the top of the domain. Returns (old, new).
    pub fn age_priority(&mut self) -> (Priority, Priority) {
        let old = self.priority;
        self.priority = old.boosted(AGING_PRIORITY_BOOST);
        (old, self.priority)
    }
}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state)
            .field("placement", &self.placement)
            .field("priority", &self.priority)
            .field("burst_time", &self.burst_time)
            .field("stack_size", &self.stack.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    fn thread(id: usize, priority: i32) -> Thread {
        let stack = alloc::vec![0u8; 128].into_boxed_slice();
        Thread::new(ThreadId(id), "test".to_string(), Priority(priority), stack)
    }

    #[test]
    fn fencepost_survives_creation() {
        let t = thread(1, 100);
        t.check_overflow();
    }

    #[test]
    #[should_panic(expected = "overflowed")]
    fn clobbered_fencepost_is_fatal() {
        let mut t = thread(1, 100);
        t.stack[0] = 0;
        t.check_overflow();
    }

    #[test]
    fn charging_twice_counts_each_tick_once() {
        let mut t = thread(1, 100);
        t.start_exe_time = 0;
        t.last_charge_time = 0;

        t.charge_usage(100);
        assert_eq!(t.tmp_burst_time, 100.0);

        // Same tick again: nothing new to charge.
        t.charge_usage(100);
        assert_eq!(t.tmp_burst_time, 100.0);

        t.charge_usage(150);
        assert_eq!(t.tmp_burst_time, 150.0);
        // The dispatch stamp is untouched by charging.
        assert_eq!(t.start_exe_time, 0);
    }

    #[test]
    fn aging_boosts_and_clamps() {
        let mut t = thread(1, 49);
        assert_eq!(t.age_priority(), (Priority(49), Priority(59)));

        let mut top = thread(2, 145);
        assert_eq!(top.age_priority(), (Priority(145), Priority(149)));
        assert_eq!(top.age_priority(), (Priority(149), Priority(149)));
    }

    #[test]
    #[should_panic(expected = "outside the scheduling domain")]
    fn priority_outside_domain_is_rejected() {
        thread(1, 150);
    }
}
