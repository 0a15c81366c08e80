/*
 * Ready Queue Abstraction
 *
 * One container type serves all three scheduling levels; only the insertion
 * discipline differs. The queues hold thread ids, not thread objects - the
 * records live in the scheduler's thread table, and the sorted disciplines
 * consult the table at insertion time.
 *
 * Contract: `remove_front` returns the discipline's minimum (for the sorted
 * queues) or the oldest member (FIFO). A queue never holds duplicates, and
 * any member can be removed in place, which is what aging-driven migration
 * relies on.
 */

use alloc::collections::VecDeque;

use super::thread::{Thread, ThreadId};
use super::types::QueueLevel;

/// Ordering discipline applied by a ready queue on insertion.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Discipline {
    /// Smallest predicted burst first; the larger id wins a tie.
    ShortestJobFirst,
    /// Highest priority first; the larger id wins a tie.
    FixedPriority,
    /// Plain arrival order.
    Fifo,
}

impl QueueLevel {
    /// The discipline each level runs.
    pub fn discipline(self) -> Discipline {
        match self {
            QueueLevel::L1 => Discipline::ShortestJobFirst,
            QueueLevel::L2 => Discipline::FixedPriority,
            QueueLevel::L3 => Discipline::Fifo,
        }
    }
}

impl Discipline {
    /// Whether `a` dispatches ahead of `b` under this discipline.
    ///
    /// FIFO answers false for every pair: nothing jumps the line, so order
    /// is decided by insertion alone.
    pub fn precedes(self, a: &Thread, b: &Thread) -> bool {
        match self {
            Discipline::ShortestJobFirst => {
                if a.burst_time == b.burst_time {
                    a.id > b.id
                } else {
                    a.burst_time < b.burst_time
                }
            }
            Discipline::FixedPriority => {
                if a.priority == b.priority {
                    a.id > b.id
                } else {
                    a.priority > b.priority
                }
            }
            Discipline::Fifo => false,
        }
    }
}

/// A single ready queue.
pub struct ReadyQueue {
    level: QueueLevel,
    entries: VecDeque<ThreadId>,
}

impl ReadyQueue {
    pub fn new(level: QueueLevel) -> Self {
        Self {
            level,
            entries: VecDeque::new(),
        }
    }

    pub fn level(&self) -> QueueLevel {
        self.level
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, tid: ThreadId) -> bool {
        self.entries.contains(&tid)
    }

    pub fn iter(&self) -> impl Iterator<Item = ThreadId> + '_ {
        self.entries.iter().copied()
    }

    /// Insert `tid`, keeping the queue consistent with its discipline.
    /// `threads` is the thread table the comparator consults.
    pub fn insert(&mut self, threads: &[Thread], tid: ThreadId) {
        debug_assert!(
            !self.contains(tid),
            "thread {:?} double-inserted into L[{}]",
            tid,
            self.level.number()
        );

        let discipline = self.level.discipline();
        if discipline == Discipline::Fifo {
            self.entries.push_back(tid);
            return;
        }

        let incoming = lookup(threads, tid).expect("insert of unregistered thread");
        let position = self.entries.iter().position(|&resident| {
            let resident = lookup(threads, resident).expect("queue entry missing from thread table");
            discipline.precedes(incoming, resident)
        });
        match position {
            Some(index) => self.entries.insert(index, tid),
            None => self.entries.push_back(tid),
        }
    }

    /// Remove and return the discipline's minimum (or the oldest member,
    /// for FIFO).
    pub fn remove_front(&mut self) -> Option<ThreadId> {
        self.entries.pop_front()
    }

    /// Remove an arbitrary member. Returns whether it was present.
    pub fn remove(&mut self, tid: ThreadId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|&other| other != tid);
        self.entries.len() != before
    }
}

fn lookup(threads: &[Thread], tid: ThreadId) -> Option<&Thread> {
    threads.iter().find(|t| t.id == tid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::types::Priority;
    use alloc::string::ToString;
    use alloc::vec::Vec;

    fn thread(id: usize, priority: i32, burst: f64) -> Thread {
        let stack = alloc::vec![0u8; 64].into_boxed_slice();
        let mut t = Thread::new(ThreadId(id), "t".to_string(), Priority(priority), stack);
        t.burst_time = burst;
        t
    }

    fn drain(queue: &mut ReadyQueue) -> Vec<usize> {
        let mut order = Vec::new();
        while let Some(tid) = queue.remove_front() {
            order.push(tid.0);
        }
        order
    }

    #[test]
    fn shortest_burst_first() {
        let table = [
            thread(1, 120, 10.0),
            thread(2, 120, 5.0),
            thread(3, 120, 7.5),
        ];
        let mut queue = ReadyQueue::new(QueueLevel::L1);
        for t in &table {
            queue.insert(&table, t.id);
        }
        assert_eq!(drain(&mut queue), [2, 3, 1]);
    }

    #[test]
    fn burst_tie_goes_to_larger_id() {
        let table = [thread(2, 120, 5.0), thread(3, 120, 5.0)];
        let mut queue = ReadyQueue::new(QueueLevel::L1);
        queue.insert(&table, ThreadId(2));
        queue.insert(&table, ThreadId(3));
        assert_eq!(drain(&mut queue), [3, 2]);
    }

    #[test]
    fn highest_priority_first() {
        let table = [thread(1, 60, 0.0), thread(2, 90, 0.0), thread(3, 75, 0.0)];
        let mut queue = ReadyQueue::new(QueueLevel::L2);
        for t in &table {
            queue.insert(&table, t.id);
        }
        assert_eq!(drain(&mut queue), [2, 3, 1]);
    }

    #[test]
    fn priority_tie_goes_to_larger_id() {
        let table = [thread(4, 80, 0.0), thread(9, 80, 0.0), thread(7, 80, 0.0)];
        let mut queue = ReadyQueue::new(QueueLevel::L2);
        queue.insert(&table, ThreadId(4));
        queue.insert(&table, ThreadId(9));
        queue.insert(&table, ThreadId(7));
        assert_eq!(drain(&mut queue), [9, 7, 4]);
    }

    #[test]
    fn fifo_preserves_insertion_order() {
        let table = [thread(5, 10, 0.0), thread(1, 40, 0.0), thread(3, 0, 0.0)];
        let mut queue = ReadyQueue::new(QueueLevel::L3);
        queue.insert(&table, ThreadId(5));
        queue.insert(&table, ThreadId(1));
        queue.insert(&table, ThreadId(3));
        assert_eq!(drain(&mut queue), [5, 1, 3]);
    }

    #[test]
    fn arbitrary_member_can_be_removed() {
        let table = [thread(1, 10, 0.0), thread(2, 10, 0.0), thread(3, 10, 0.0)];
        let mut queue = ReadyQueue::new(QueueLevel::L3);
        for t in &table {
            queue.insert(&table, t.id);
        }

        assert!(queue.remove(ThreadId(2)));
        assert!(!queue.remove(ThreadId(2)));
        assert!(!queue.contains(ThreadId(2)));
        assert_eq!(drain(&mut queue), [1, 3]);
    }

    #[test]
    fn sorted_insert_is_stable_under_mixed_order() {
        let table = [
            thread(1, 120, 3.0),
            thread(2, 120, 1.0),
            thread(3, 120, 2.0),
            thread(4, 120, 1.0),
        ];
        let mut queue = ReadyQueue::new(QueueLevel::L1);
        // Insertion order deliberately scrambled.
        for id in [3, 1, 4, 2] {
            queue.insert(&table, ThreadId(id));
        }
        assert_eq!(drain(&mut queue), [4, 2, 3, 1]);
    }
}
