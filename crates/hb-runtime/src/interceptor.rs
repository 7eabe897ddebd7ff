//! Per-instruction redirection of VM calls into script functions.

use std::cell::Cell;

use hb_core::{ExecutionState, SharedGraph};

use crate::hooks::{HookLookup, VmHook};

/// Two-byte VM function body that returns immediately. The host runs it in
/// place of an intercepted function.
pub const EMPTY_FUNCTION: [u8; 2] = [0x32, 0x34];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookState {
    Armed,
    Disarmed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interception {
    /// Execute the instruction normally.
    Passthrough,
    /// The hook ran; execute [`EMPTY_FUNCTION`] instead.
    SkipStep,
}

impl Interception {
    pub fn substitute(self) -> Option<&'static [u8]> {
        match self {
            Self::Passthrough => None,
            Self::SkipStep => Some(&EMPTY_FUNCTION),
        }
    }
}

#[derive(Debug)]
pub struct VmInterceptor {
    state: Cell<HookState>,
}

impl Default for VmInterceptor {
    fn default() -> Self {
        Self {
            state: Cell::new(HookState::Armed),
        }
    }
}

impl VmInterceptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable(&self) {
        self.state.set(HookState::Armed);
    }

    /// Lets the next hooked call run natively. The step that does so, or any
    /// step that misses the hook table, re-arms the interceptor.
    pub fn disable(&self) {
        self.state.set(HookState::Disarmed);
    }

    pub fn state(&self) -> HookState {
        self.state.get()
    }

    pub fn step<L: HookLookup>(
        &self,
        state: &ExecutionState,
        lookup: &L,
        graph: &SharedGraph,
    ) -> Interception {
        let pos = state.instruction;
        let Some(hook) = lookup.lookup(pos) else {
            self.enable();
            return Interception::Passthrough;
        };

        if self.state.get() == HookState::Disarmed {
            self.enable();
            log::debug!("vm hook at {} bypassed once", pos);
            return Interception::Passthrough;
        }

        let entity = graph.borrow().owner_of(state.local_id);
        let args = state.arguments().cloned().collect();
        if let Err(error) = hook.invoke(entity, args) {
            log::error!("vm hook at {} failed: {}", pos, error);
        }
        Interception::SkipStep
    }
}

#[cfg(test)]
mod interceptor_tests {
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::rc::Rc;

    use hb_core::{BridgeError, CodePos, EntityRef, StackEntry, VariableGraph, VmValue};

    use super::*;

    type Calls = Rc<RefCell<Vec<(EntityRef, Vec<VmValue>)>>>;

    #[derive(Clone)]
    struct RecordingHook {
        calls: Calls,
        fail: bool,
    }

    impl VmHook for RecordingHook {
        fn invoke(&self, entity: EntityRef, args: Vec<VmValue>) -> Result<(), BridgeError> {
            self.calls.borrow_mut().push((entity, args));
            if self.fail {
                return Err(BridgeError::callback_fault("hook blew up"));
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct MapLookup {
        hooks: BTreeMap<CodePos, RecordingHook>,
    }

    impl HookLookup for MapLookup {
        type Hook = RecordingHook;

        fn lookup(&self, pos: CodePos) -> Option<RecordingHook> {
            self.hooks.get(&pos).cloned()
        }
    }

    fn fixture(fail: bool) -> (MapLookup, Calls, SharedGraph, ExecutionState, EntityRef) {
        let calls = Calls::default();
        let mut lookup = MapLookup::default();
        lookup.hooks.insert(
            CodePos(100),
            RecordingHook {
                calls: Rc::clone(&calls),
                fail,
            },
        );

        let graph = VariableGraph::new().shared();
        let (owner, frame) = {
            let mut graph = graph.borrow_mut();
            let owner = graph.alloc_entity();
            (owner, graph.alloc_frame(owner))
        };
        let state = ExecutionState {
            instruction: CodePos(100),
            local_id: frame,
            stack: vec![
                StackEntry::EndOfArguments,
                StackEntry::Value(VmValue::Int(1)),
                StackEntry::Value(VmValue::from("two")),
            ],
        };
        (lookup, calls, graph, state, owner)
    }

    #[test]
    fn hit_invokes_hook_with_owner_and_stack_arguments() {
        let (lookup, calls, graph, state, owner) = fixture(false);
        let interceptor = VmInterceptor::new();

        let outcome = interceptor.step(&state, &lookup, &graph);
        assert_eq!(outcome, Interception::SkipStep);
        assert_eq!(outcome.substitute(), Some(&EMPTY_FUNCTION[..]));
        assert_eq!(
            *calls.borrow(),
            vec![(owner, vec![VmValue::from("two"), VmValue::Int(1)])]
        );
    }

    #[test]
    fn miss_passes_through_and_rearms() {
        let (lookup, calls, graph, mut state, _) = fixture(false);
        let interceptor = VmInterceptor::new();
        interceptor.disable();
        state.instruction = CodePos(5);

        assert_eq!(
            interceptor.step(&state, &lookup, &graph),
            Interception::Passthrough
        );
        assert_eq!(interceptor.state(), HookState::Armed);
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn disarmed_hit_is_bypassed_exactly_once() {
        let (lookup, calls, graph, state, _) = fixture(false);
        let interceptor = VmInterceptor::new();
        interceptor.disable();

        assert_eq!(
            interceptor.step(&state, &lookup, &graph),
            Interception::Passthrough
        );
        assert!(calls.borrow().is_empty());
        assert_eq!(interceptor.state(), HookState::Armed);
        assert_eq!(
            interceptor.step(&state, &lookup, &graph),
            Interception::SkipStep
        );
        assert_eq!(calls.borrow().len(), 1);
    }

    #[test]
    fn failing_hook_still_skips_the_step() {
        let (lookup, calls, graph, state, _) = fixture(true);
        let interceptor = VmInterceptor::new();
        assert_eq!(
            interceptor.step(&state, &lookup, &graph),
            Interception::SkipStep
        );
        assert_eq!(calls.borrow().len(), 1);
    }
}
