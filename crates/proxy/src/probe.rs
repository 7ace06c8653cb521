//! Long-running call detection.

use std::collections::HashSet;

use heapscope_ipc::CallId;

/// Remembers which calls were pending at the previous probe.
#[derive(Debug, Default)]
pub struct LongRunningProbe {
    previous: HashSet<CallId>,
}

impl LongRunningProbe {
    /// Record the currently pending calls; true when any of them was
    /// already pending last time.
    pub fn tick(&mut self, pending: &HashSet<CallId>) -> bool {
        let surviving = self.previous.iter().any(|id| pending.contains(id));
        self.previous.clone_from(pending);
        surviving
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[CallId]) -> HashSet<CallId> {
        list.iter().copied().collect()
    }

    #[test]
    fn test_only_survivors_count() {
        let mut probe = LongRunningProbe::default();
        assert!(!probe.tick(&ids(&[1, 2])));
        // 1 and 2 finished, 3 is new
        assert!(!probe.tick(&ids(&[3])));
        assert!(probe.tick(&ids(&[3, 4])));
        assert!(!probe.tick(&ids(&[])));
    }
}
