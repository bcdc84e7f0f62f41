//! The [`Policy`] decision trait.

use dyad_core::{ActionSet, Decision, State};

/// Chooses what an agent does next.
///
/// A policy sees the agent's full state (its own keys plus the last
/// environment observation under `environment/`) and the actions available
/// at decision time, and returns exactly one [`Decision`]. It does not
/// invoke actions itself; the agent does that in its ACTING phase.
///
/// Policies may be stateful, but must not block indefinitely.
///
/// # Examples
///
/// ```
/// use dyad_core::{ActionSet, Decision, State};
/// use dyad_plugin::Policy;
///
/// struct Nap;
///
/// impl Policy for Nap {
///     fn decide(&mut self, _state: &State, _actions: &ActionSet) -> Decision {
///         Decision::idle(1.0)
///     }
/// }
///
/// let decision = Nap.decide(&State::new(), &ActionSet::new());
/// assert_eq!(decision, Decision::idle(1.0));
/// ```
pub trait Policy: Send + 'static {
    /// Short label used in logs.
    fn name(&self) -> &str {
        "policy"
    }

    /// Pick the next directive.
    fn decide(&mut self, state: &State, actions: &ActionSet) -> Decision;
}

/// A [`Policy`] backed by a closure.
pub struct FnPolicy<F> {
    name: String,
    f: F,
}

impl<F> FnPolicy<F>
where
    F: FnMut(&State, &ActionSet) -> Decision + Send + 'static,
{
    /// Wrap `f` under the given log label.
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Policy for FnPolicy<F>
where
    F: FnMut(&State, &ActionSet) -> Decision + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn decide(&mut self, state: &State, actions: &ActionSet) -> Decision {
        (self.f)(state, actions)
    }
}

impl<F> std::fmt::Debug for FnPolicy<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnPolicy").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dyad_core::{ActionId, ActionRequest};

    #[test]
    fn fn_policy_sees_state() {
        let mut policy = FnPolicy::new("threshold", |state: &State, _: &ActionSet| {
            match state.get("environment/count").and_then(|v| v.as_i64()) {
                Some(n) if n >= 3 => Decision::idle(1.0),
                _ => ActionRequest::new(ActionId::environment("counter", "increment"))
                    .arg("by", 1)
                    .into(),
            }
        });
        assert_eq!(policy.name(), "threshold");

        let mut state = State::new();
        state.set("environment/count", 0);
        assert!(matches!(
            policy.decide(&state, &ActionSet::new()),
            Decision::Act(_)
        ));
        state.set("environment/count", 3);
        assert_eq!(
            policy.decide(&state, &ActionSet::new()),
            Decision::idle(1.0)
        );
    }

    #[test]
    fn policies_are_object_safe() {
        let mut boxed: Box<dyn Policy> =
            Box::new(FnPolicy::new("nap", |_: &State, _: &ActionSet| Decision::idle(2.0)));
        assert_eq!(
            boxed.decide(&State::new(), &ActionSet::new()),
            Decision::idle(2.0)
        );
    }
}
