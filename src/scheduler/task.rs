use std::cmp::Ordering;

/// A pending detection request.
///
/// Lives only in the scheduler's queue: created on `request`, consumed
/// (dispatched or dropped) within one scheduling step. Ordering is by
/// priority descending, then insertion sequence ascending, so equal
/// priorities dispatch first-come first-served.
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    pub task_type: String,
    pub priority: i32,
    pub seq: u64,
}

impl PartialEq for ScheduledTask {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for ScheduledTask {}

impl PartialOrd for ScheduledTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledTask {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: greater means popped first. Lower seq wins ties.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BinaryHeap;

    fn task(task_type: &str, priority: i32, seq: u64) -> ScheduledTask {
        ScheduledTask {
            task_type: task_type.to_string(),
            priority,
            seq,
        }
    }

    #[test]
    fn heap_pops_priority_then_insertion_order() {
        let mut heap = BinaryHeap::new();
        heap.push(task("a", 0, 0));
        heap.push(task("b", 5, 1));
        heap.push(task("c", 0, 2));
        heap.push(task("d", 5, 3));

        let order: Vec<String> = std::iter::from_fn(|| heap.pop())
            .map(|t| t.task_type)
            .collect();
        assert_eq!(order, vec!["b", "d", "a", "c"]);
    }
}
