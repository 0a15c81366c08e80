/*
 * Scheduling Trace
 *
 * Bounded in-memory capture of scheduling events, one human-readable line
 * per event. The line phrasing is stable: the test oracles (and grading
 * scripts in the embedding kernel's world) match on it literally.
 *
 * Lines go two places: into a fixed-capacity ring that callers can drain or
 * inspect, and to the log facade so the embedding kernel's logger shows the
 * same stream live. When the ring is full the oldest line is dropped.
 */

use alloc::string::String;
use heapless::Deque;

/// Capacity of the trace ring, in lines.
pub const TRACE_CAPACITY: usize = 512;

/// Bounded capture of scheduling events.
pub struct TraceLog {
    lines: Deque<String, TRACE_CAPACITY>,
}

impl TraceLog {
    pub const fn new() -> Self {
        Self {
            lines: Deque::new(),
        }
    }

    /// Record one event line.
    pub fn record(&mut self, line: String) {
        log::info!("{}", line);
        if self.lines.is_full() {
            self.lines.pop_front();
        }
        // A slot is free at this point, so the push cannot fail.
        let _ = self.lines.push_back(line);
    }

    /// Recorded lines, oldest first.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(|line| line.as_str())
    }

    /// Whether an exact line was recorded.
    pub fn contains(&self, line: &str) -> bool {
        self.lines.iter().any(|recorded| recorded.as_str() == line)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

impl Default for TraceLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::format;
    use alloc::string::ToString;
    use alloc::vec::Vec;

    #[test]
    fn records_in_order() {
        let mut trace = TraceLog::new();
        trace.record("first".to_string());
        trace.record("second".to_string());

        let lines: Vec<&str> = trace.lines().collect();
        assert_eq!(lines, ["first", "second"]);
        assert!(trace.contains("first"));
        assert!(!trace.contains("third"));
    }

    #[test]
    fn overflow_drops_the_oldest() {
        let mut trace = TraceLog::new();
        for i in 0..TRACE_CAPACITY + 10 {
            trace.record(format!("line {}", i));
        }

        assert_eq!(trace.len(), TRACE_CAPACITY);
        assert!(!trace.contains("line 0"));
        assert!(trace.contains(&format!("line {}", TRACE_CAPACITY + 9)));
        assert_eq!(trace.lines().next(), Some("line 10"));
    }

    #[test]
    fn clear_empties_the_ring() {
        let mut trace = TraceLog::new();
        trace.record("line".to_string());
        trace.clear();
        assert!(trace.is_empty());
    }
}
