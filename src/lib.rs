/*
 * mlfq-sched - Three-Level Feedback Queue Scheduler
 *
 * This crate is the CPU scheduling subsystem of a teaching kernel. It decides
 * which runnable thread executes next on a single logical processor and
 * coordinates the hand-over between the outgoing and incoming threads.
 *
 * The crate is freestanding (no_std + alloc). Everything machine-dependent
 * lives on the other side of the `KernelCtx` trait: the tick counter, the
 * interrupt-disable discipline and the stack-switch primitive are supplied
 * by the embedding kernel.
 *
 * See the scheduler module documentation for the algorithm.
 */

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod scheduler;
pub mod trace;

pub use scheduler::{
    InterruptLevel, KernelCtx, Placement, Priority, QueueLevel, ReadyQueue, Scheduler, Thread,
    ThreadId, ThreadState, UserSpace,
};
pub use trace::TraceLog;
