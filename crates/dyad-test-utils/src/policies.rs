//! Reusable policy fixtures.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use dyad_core::{ActionSet, Decision, State};
use dyad_plugin::Policy;

/// Plays a fixed script of decisions, then idles for `fallback` units
/// forever. Records every state it was shown.
pub struct ScriptedPolicy {
    script: VecDeque<Decision>,
    pub fallback: f64,
    seen: Arc<Mutex<Vec<State>>>,
}

impl ScriptedPolicy {
    pub fn new(script: impl IntoIterator<Item = Decision>) -> Self {
        Self {
            script: script.into_iter().collect(),
            fallback: 1.0,
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Shared handle to the states passed to `decide`, in order.
    pub fn seen(&self) -> Arc<Mutex<Vec<State>>> {
        Arc::clone(&self.seen)
    }
}

impl Policy for ScriptedPolicy {
    fn name(&self) -> &str {
        "scripted"
    }

    fn decide(&mut self, state: &State, _actions: &ActionSet) -> Decision {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(state.clone());
        self.script
            .pop_front()
            .unwrap_or(Decision::Idle {
                duration: self.fallback,
            })
    }
}

/// Returns the same decision every time.
pub struct FixedPolicy {
    pub decision: Decision,
    call_count: Arc<AtomicUsize>,
}

impl FixedPolicy {
    pub fn new(decision: Decision) -> Self {
        Self {
            decision,
            call_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared handle to the number of `decide` calls.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.call_count)
    }
}

impl Policy for FixedPolicy {
    fn name(&self) -> &str {
        "fixed"
    }

    fn decide(&mut self, _state: &State, _actions: &ActionSet) -> Decision {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.decision.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::increment;

    #[test]
    fn script_then_fallback() {
        let mut p = ScriptedPolicy::new([increment("c", 1), Decision::idle(3.0)]);
        let seen = p.seen();
        let actions = ActionSet::new();
        assert_eq!(p.decide(&State::new(), &actions), increment("c", 1));
        assert_eq!(p.decide(&State::new(), &actions), Decision::idle(3.0));
        assert_eq!(p.decide(&State::new(), &actions), Decision::idle(1.0));
        assert_eq!(seen.lock().unwrap().len(), 3);
    }

    #[test]
    fn fixed_counts_calls() {
        let mut p = FixedPolicy::new(Decision::idle(2.0));
        let calls = p.calls();
        for _ in 0..4 {
            assert_eq!(p.decide(&State::new(), &ActionSet::new()), Decision::idle(2.0));
        }
        assert_eq!(calls.load(Ordering::Relaxed), 4);
    }
}
