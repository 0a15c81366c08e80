/*
 * Scheduler Implementation
 *
 * This file contains the core Scheduler struct and its implementation:
 * the thread table, the three ready queues, the dispatcher, the preemption
 * gate, the aging engine and the burst estimator. mod.rs is the public API
 * layer; this file is the implementation.
 *
 * Everything here runs with interrupts disabled (asserted at each entry
 * point). There is deliberately no locking on these paths - a contended
 * lock could re-enter dispatch and loop forever.
 */

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use crate::trace::TraceLog;

use super::queue::ReadyQueue;
use super::thread::{Placement, Thread, ThreadId, ThreadState};
use super::traits::KernelCtx;
use super::types::{InterruptLevel, Priority, QueueLevel};
use super::{AGING_WAIT_TICKS, BURST_SMOOTHING, THREAD_STACK_SIZE};

/// Main scheduler structure
///
/// Owns every thread record in the system and the three ready queues that
/// hold the ready-but-not-running ones. Thread records are found by linear
/// search through the Vec, which is fine for the thread counts a teaching
/// kernel sees.
pub struct Scheduler {
    /// All threads known to the scheduler, looked up by id.
    threads: Vec<Thread>,
    /// The three ready queues, indexed by `QueueLevel::index()`.
    ready: [ReadyQueue; 3],
    /// The thread on the CPU. None only before `bootstrap`.
    current: Option<ThreadId>,
    /// Deferred-delete slot: a finished thread whose stack is still live.
    to_be_destroyed: Option<ThreadId>,
    /// Raised by the preemption gate, answered by the kernel calling
    /// `yield_current` at its next safe point.
    preempt_requested: bool,
    next_thread_id: ThreadId,
    trace: TraceLog,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            threads: Vec::new(),
            ready: [
                ReadyQueue::new(QueueLevel::L1),
                ReadyQueue::new(QueueLevel::L2),
                ReadyQueue::new(QueueLevel::L3),
            ],
            current: None,
            to_be_destroyed: None,
            preempt_requested: false,
            next_thread_id: ThreadId(0),
            trace: TraceLog::new(),
        }
    }

    // ========================================================================
    // THREAD REGISTRY
    // ========================================================================

    /// Register a new thread: allocate its kernel stack, assign an id,
    /// status NEW. The thread joins no queue until `ready_to_run`.
    pub fn create_thread(&mut self, name: &str, priority: Priority, initial_burst: f64) -> ThreadId {
        let id = self.next_thread_id;
        self.next_thread_id.0 += 1;

        let stack = alloc::vec![0u8; THREAD_STACK_SIZE].into_boxed_slice();
        let mut thread = Thread::new(id, name.into(), priority, stack);
        thread.burst_time = initial_burst;
        self.threads.push(thread);

        log::info!("Created thread '{}' ({}) with priority {}", name, id, priority);
        id
    }

    /// Install the first thread as the running thread without a context
    /// switch - the kernel main thread adopting itself. After this there is
    /// always a current thread.
    pub fn bootstrap(&mut self, kernel: &dyn KernelCtx, tid: ThreadId) {
        assert!(
            self.current.is_none(),
            "bootstrap with a thread already running"
        );
        let now = kernel.total_ticks();
        let thread = self
            .thread_mut(tid)
            .expect("bootstrap of unregistered thread");
        thread.state = ThreadState::Running;
        thread.placement = Placement::Running;
        thread.start_exe_time = now;
        thread.last_charge_time = now;
        self.current = Some(tid);
        log::info!("Bootstrapped on {}", tid);
        self.audit();
    }

    pub fn thread(&self, tid: ThreadId) -> Option<&Thread> {
        self.threads.iter().find(|t| t.id == tid)
    }

    pub fn thread_mut(&mut self, tid: ThreadId) -> Option<&mut Thread> {
        self.threads.iter_mut().find(|t| t.id == tid)
    }

    pub fn current_thread(&self) -> Option<ThreadId> {
        self.current
    }

    pub fn to_be_destroyed(&self) -> Option<ThreadId> {
        self.to_be_destroyed
    }

    /// Whether the preemption gate has requested a yield since the flag was
    /// last taken.
    pub fn should_preempt(&self) -> bool {
        self.preempt_requested
    }

    /// Consume the preemption request. The kernel polls this at safe points
    /// and answers true with `yield_current`.
    pub fn take_preempt_request(&mut self) -> bool {
        core::mem::replace(&mut self.preempt_requested, false)
    }

    /// Members of one ready queue, in dispatch order.
    pub fn queue_contents(&self, level: QueueLevel) -> Vec<ThreadId> {
        self.ready[level.index()].iter().collect()
    }

    pub fn trace(&self) -> &TraceLog {
        &self.trace
    }

    pub fn trace_mut(&mut self) -> &mut TraceLog {
        &mut self.trace
    }

    /// Dump queue contents at debug level, for the embedding kernel's
    /// diagnostics shell.
    pub fn log_state(&self) {
        for level in QueueLevel::ALL {
            log::debug!(
                "L[{}] ({} ready): {:?}",
                level.number(),
                self.ready[level.index()].len(),
                self.queue_contents(level)
            );
        }
        log::debug!(
            "current: {:?}, awaiting destroy: {:?}",
            self.current,
            self.to_be_destroyed
        );
    }

    // ========================================================================
    // PREEMPTION GATE
    // ========================================================================

    /// Admit a thread to the ready queue matching its priority band.
    ///
    /// Stamps the arrival tick (the aging engine measures waiting against
    /// it) and inserts under the band's discipline. An admission into L1
    /// whose predicted burst undercuts the running thread's charges the
    /// runner's consumed ticks and raises the should-preempt flag; the
    /// charge must land before the runner can re-enter a ready queue, so it
    /// happens here rather than in the answering yield.
    pub fn ready_to_run(&mut self, kernel: &dyn KernelCtx, tid: ThreadId) {
        assert!(
            kernel.interrupt_level() == InterruptLevel::Off,
            "ready_to_run entered with interrupts enabled"
        );
        let now = kernel.total_ticks();

        let thread = self
            .thread_mut(tid)
            .expect("ready_to_run of unregistered thread");
        assert!(
            thread.placement == Placement::Detached,
            "{} admitted while still placed",
            thread.id
        );
        thread.state = ThreadState::Ready;
        thread.arrival_time = now;
        let level = thread.priority.band();
        thread.placement = Placement::Queued(level);
        let burst = thread.burst_time;

        self.ready[level.index()].insert(&self.threads, tid);
        self.record(format!(
            "Tick [{}]: Thread [{}] is inserted into queue L[{}]",
            now, tid.0, level.number()
        ));

        if level == QueueLevel::L1 {
            if let Some(cur) = self.current {
                // No preemption check when re-admitting the runner itself
                // (mid-yield), or before bootstrap when nothing runs.
                if cur != tid {
                    let current = self.thread(cur).expect("current thread missing from table");
                    if current.state == ThreadState::Running && burst < current.burst_time {
                        let current = self.thread_mut(cur).expect("current thread missing from table");
                        current.charge_usage(now);
                        self.preempt_requested = true;
                        log::debug!("{} requests preemption of {}", tid, cur);
                    }
                }
            }
        }
        self.audit();
    }

    /// Re-admit a blocked thread after its event arrived. Goes back through
    /// the gate, so a favorable wakeup into L1 can request preemption.
    pub fn wake(&mut self, kernel: &dyn KernelCtx, tid: ThreadId) {
        let thread = self.thread(tid).expect("wake of unregistered thread");
        assert!(
            thread.state == ThreadState::Blocked,
            "wake of {} which is not blocked",
            thread.id
        );
        self.ready_to_run(kernel, tid);
    }

    // ========================================================================
    // DISPATCHER
    // ========================================================================

    /// Remove and return the next thread to put on the CPU: the front of
    /// the highest-precedence non-empty queue, or None if all three are
    /// empty.
    pub fn find_next_to_run(&mut self, kernel: &dyn KernelCtx) -> Option<ThreadId> {
        assert!(
            kernel.interrupt_level() == InterruptLevel::Off,
            "find_next_to_run entered with interrupts enabled"
        );
        let now = kernel.total_ticks();

        for level in QueueLevel::ALL {
            if let Some(tid) = self.ready[level.index()].remove_front() {
                let thread = self
                    .thread_mut(tid)
                    .expect("queue entry missing from thread table");
                thread.placement = Placement::Detached;
                self.record(format!(
                    "Tick [{}]: Thread [{}] is removed from queue L[{}]",
                    now, tid.0, level.number()
                ));
                self.audit();
                return Some(tid);
            }
        }
        None
    }

    /// Dispatch the CPU to `next`.
    ///
    /// The caller has already taken the outgoing thread off RUNNING (to
    /// READY, BLOCKED or ZOMBIE) and re-queued it if appropriate; `next`
    /// came out of `find_next_to_run`. With `finishing` set the outgoing
    /// thread is parked for deferred destruction - its stack stays live
    /// until the successor has switched away from it.
    ///
    /// Code after the context switch runs on the outgoing thread's stack at
    /// whatever later dispatch resumes it: that is where the previously
    /// parked thread gets reclaimed and the resumed thread's user state
    /// comes back.
    pub fn run(&mut self, kernel: &mut dyn KernelCtx, next: ThreadId, finishing: bool) {
        assert!(
            kernel.interrupt_level() == InterruptLevel::Off,
            "run entered with interrupts enabled"
        );
        let now = kernel.total_ticks();
        let old = self.current.expect("dispatch before bootstrap");
        assert!(next != old, "dispatch to the thread already running");

        {
            let old_thread = self.thread(old).expect("current thread missing from table");
            assert!(
                old_thread.state != ThreadState::Running,
                "{} still marked running at dispatch",
                old_thread.id
            );
        }

        if finishing {
            assert!(
                self.to_be_destroyed.is_none(),
                "a finished thread is already awaiting destruction"
            );
            self.to_be_destroyed = Some(old);
        }

        // Save the outgoing user context, then make sure its kernel stack
        // survived the burst.
        let old_thread = self.thread_mut(old).expect("current thread missing from table");
        if let Some(space) = old_thread.space.as_mut() {
            space.save_user_state();
            space.save_state();
        }
        old_thread.check_overflow();
        let old_start = old_thread.start_exe_time;

        let executed = now.saturating_sub(old_start);
        let next_thread = self
            .thread_mut(next)
            .expect("dispatch of unregistered thread");
        assert!(
            next_thread.placement == Placement::Detached,
            "{} dispatched while still placed",
            next_thread.id
        );
        next_thread.start_exe_time = now;
        next_thread.last_charge_time = now;
        next_thread.last_burst_time = executed;
        next_thread.state = ThreadState::Running;
        next_thread.placement = Placement::Running;
        self.current = Some(next);
        // A pending preemption request targeted the outgoing thread; it
        // must not follow the incoming one.
        self.preempt_requested = false;

        self.record(format!(
            "Tick [{}]: Thread [{}] is now selected for execution",
            now, next.0
        ));
        self.record(format!(
            "Tick [{}]: Thread [{}] is replaced, and it has executed [{}] ticks",
            now, old.0, executed
        ));
        self.audit();

        kernel.context_switch(old, next);

        // Back on the outgoing thread's stack, at some later dispatch to
        // it. Whoever finished in the meantime can be reclaimed now that
        // nothing runs on its stack.
        self.check_to_be_destroyed();
        if let Some(old_thread) = self.thread_mut(old) {
            if let Some(space) = old_thread.space.as_mut() {
                space.restore_user_state();
                space.restore_state();
            }
        }
    }

    /// Reclaim the thread parked by a finishing dispatch, if any. Safe to
    /// call when the slot is empty.
    pub fn check_to_be_destroyed(&mut self) {
        if let Some(tid) = self.to_be_destroyed.take() {
            let name = self
                .thread(tid)
                .map(|t| t.name.clone())
                .unwrap_or_default();
            self.threads.retain(|t| t.id != tid);
            log::info!("Reclaimed finished thread '{}' ({})", name, tid);
        }
    }

    // ========================================================================
    // VOLUNTARY TRANSITIONS OFF THE CPU
    // ========================================================================

    /// Give up the CPU, voluntarily or in answer to a preemption request.
    ///
    /// A successor is picked before the yielder re-enters admission, so the
    /// yielder cannot immediately reselect itself; if nothing else is ready
    /// the yielder keeps the CPU and nothing changes. Otherwise its usage
    /// is folded into the burst estimate (deciding its position in L1), it
    /// goes back through the gate, and the successor is dispatched.
    pub fn yield_current(&mut self, kernel: &mut dyn KernelCtx) {
        assert!(
            kernel.interrupt_level() == InterruptLevel::Off,
            "yield entered with interrupts enabled"
        );
        let now = kernel.total_ticks();
        let cur = self.current.expect("yield before bootstrap");

        let Some(next) = self.find_next_to_run(kernel) else {
            self.preempt_requested = false;
            return;
        };

        self.thread_mut(cur)
            .expect("current thread missing from table")
            .charge_usage(now);
        self.update_burst_time(kernel, cur);

        let thread = self.thread_mut(cur).expect("current thread missing from table");
        thread.state = ThreadState::Ready;
        thread.placement = Placement::Detached;

        self.ready_to_run(kernel, cur);
        self.run(kernel, next, false);
    }

    /// Take the running thread off the CPU to wait for an external event.
    /// A successor must be ready - the embedding kernel keeps an idle
    /// thread around for exactly that.
    pub fn block_current(&mut self, kernel: &mut dyn KernelCtx) {
        assert!(
            kernel.interrupt_level() == InterruptLevel::Off,
            "block entered with interrupts enabled"
        );
        let now = kernel.total_ticks();
        let cur = self.current.expect("block before bootstrap");

        self.thread_mut(cur)
            .expect("current thread missing from table")
            .charge_usage(now);
        self.update_burst_time(kernel, cur);

        let thread = self.thread_mut(cur).expect("current thread missing from table");
        thread.state = ThreadState::Blocked;
        thread.placement = Placement::Detached;

        let next = self
            .find_next_to_run(kernel)
            .expect("no ready thread to take the CPU");
        self.run(kernel, next, false);
    }

    /// Terminate the running thread. Its record is parked for deferred
    /// destruction and reclaimed once the successor has switched away from
    /// its stack.
    pub fn finish_current(&mut self, kernel: &mut dyn KernelCtx) {
        assert!(
            kernel.interrupt_level() == InterruptLevel::Off,
            "finish entered with interrupts enabled"
        );
        let now = kernel.total_ticks();
        let cur = self.current.expect("finish before bootstrap");

        self.thread_mut(cur)
            .expect("current thread missing from table")
            .charge_usage(now);
        self.update_burst_time(kernel, cur);

        let thread = self.thread_mut(cur).expect("current thread missing from table");
        thread.state = ThreadState::Zombie;
        thread.placement = Placement::Detached;

        let next = self
            .find_next_to_run(kernel)
            .expect("no ready thread to take the CPU");
        self.run(kernel, next, true);
    }

    // ========================================================================
    // AGING ENGINE
    // ========================================================================

    /// Age the threads waiting in one queue.
    ///
    /// Iterates a snapshot of the membership so removals cannot disturb the
    /// walk. A thread that has waited long enough gets its boost and a
    /// fresh wait window; a boost that crosses a band boundary migrates the
    /// thread one queue up through the normal admission path, which can
    /// itself request a preemption.
    pub fn aging(&mut self, kernel: &dyn KernelCtx, level: QueueLevel) {
        assert!(
            kernel.interrupt_level() == InterruptLevel::Off,
            "aging entered with interrupts enabled"
        );
        let now = kernel.total_ticks();

        let waiting: Vec<ThreadId> = self.ready[level.index()].iter().collect();
        for tid in waiting {
            let thread = self
                .thread_mut(tid)
                .expect("queue entry missing from thread table");
            if now.saturating_sub(thread.arrival_time) < AGING_WAIT_TICKS {
                continue;
            }

            let (old_priority, new_priority) = thread.age_priority();
            thread.arrival_time = now;
            self.record(format!(
                "Tick [{}]: Thread [{}] changes its priority from [{}] to [{}]",
                now, tid.0, old_priority, new_priority
            ));

            if new_priority.band() != level {
                let removed = self.ready[level.index()].remove(tid);
                debug_assert!(removed, "aged thread vanished from its queue");
                self.thread_mut(tid)
                    .expect("queue entry missing from thread table")
                    .placement = Placement::Detached;
                self.record(format!(
                    "Tick [{}]: Thread [{}] is removed from queue L[{}]",
                    now, tid.0, level.number()
                ));
                self.ready_to_run(kernel, tid);
            }
        }
        self.audit();
    }

    /// Run the aging scan over all three queues, top down.
    pub fn age_all(&mut self, kernel: &dyn KernelCtx) {
        for level in QueueLevel::ALL {
            self.aging(kernel, level);
        }
    }

    // ========================================================================
    // BURST ESTIMATOR
    // ========================================================================

    /// Fold the accumulated usage into the burst prediction:
    ///
    ///     burst <- 0.5 * (burst + accumulated)
    ///
    /// and reset the accumulator for the next slice. Called on every
    /// transition off the CPU; the new prediction decides the thread's L1
    /// position at its next admission.
    pub fn update_burst_time(&mut self, kernel: &dyn KernelCtx, tid: ThreadId) {
        let now = kernel.total_ticks();
        let thread = self
            .thread_mut(tid)
            .expect("burst update of unregistered thread");
        thread.burst_time = BURST_SMOOTHING * (thread.burst_time + thread.tmp_burst_time);
        thread.tmp_burst_time = 0.0;
        let burst = thread.burst_time;
        self.record(format!(
            "Tick [{}]: Thread [{}] UpdateBurstTime to [{}]",
            now, tid.0, burst
        ));
    }

    // ========================================================================
    // INTERNALS
    // ========================================================================

    fn record(&mut self, line: String) {
        self.trace.record(line);
    }

    /// Debug-build structural audit: queue members READY, placed where they
    /// claim, inside their priority band and in discipline order; placement
    /// tags backed by actual membership; the running thread in no queue.
    fn audit(&self) {
        #[cfg(debug_assertions)]
        {
            for level in QueueLevel::ALL {
                let queue = &self.ready[level.index()];
                let mut prev: Option<&Thread> = None;
                for tid in queue.iter() {
                    let thread = self.thread(tid).expect("queue entry missing from thread table");
                    debug_assert!(
                        thread.state == ThreadState::Ready,
                        "{} queued while not ready",
                        thread.id
                    );
                    debug_assert!(
                        thread.placement == Placement::Queued(level),
                        "{} placement tag disagrees with queue membership",
                        thread.id
                    );
                    debug_assert!(
                        thread.priority.band() == level,
                        "{} sits in L[{}] outside its priority band",
                        thread.id,
                        level.number()
                    );
                    if let Some(prev) = prev {
                        debug_assert!(
                            !level.discipline().precedes(thread, prev),
                            "L[{}] out of discipline order",
                            level.number()
                        );
                    }
                    prev = Some(thread);
                }
            }

            for thread in &self.threads {
                match thread.placement {
                    Placement::Queued(level) => debug_assert!(
                        self.ready[level.index()].contains(thread.id),
                        "{} tagged queued but absent from L[{}]",
                        thread.id,
                        level.number()
                    ),
                    Placement::Running => debug_assert!(
                        self.current == Some(thread.id),
                        "{} tagged running but is not current",
                        thread.id
                    ),
                    Placement::Detached => {}
                }
            }

            if let Some(cur) = self.current {
                debug_assert!(
                    QueueLevel::ALL
                        .iter()
                        .all(|level| !self.ready[level.index()].contains(cur)),
                    "running thread is a queue member"
                );
            }
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Scheduler")
            .field("threads", &self.threads.len())
            .field("current", &self.current)
            .field("to_be_destroyed", &self.to_be_destroyed)
            .field("preempt_requested", &self.preempt_requested)
            .finish()
    }
}
