use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Weak;

use hb_core::{BridgeError, CodePos, EntityRef, VmValue};
use rhai::{Dynamic, FnPtr};

use crate::codec::Codec;
use crate::runtime::ScriptRuntime;

/// First code position handed out for script functions. Positions at and
/// above it live outside any real script image, so the host VM only reaches
/// them through the interceptor.
pub const HOOK_RANGE_START: u64 = 0x7000_0000;

/// A script function together with the runtime that compiled it.
#[derive(Clone)]
pub struct ScriptCallback {
    pub callback: FnPtr,
    pub runtime: Weak<ScriptRuntime>,
}

impl ScriptCallback {
    pub fn new(callback: FnPtr, runtime: Weak<ScriptRuntime>) -> Self {
        Self { callback, runtime }
    }

    pub fn call(&self, args: Vec<Dynamic>) -> Result<Dynamic, BridgeError> {
        let runtime = self.runtime.upgrade().ok_or(BridgeError::RuntimeGone)?;
        runtime.call(&self.callback, args)
    }

    pub fn codec(&self) -> Option<Codec> {
        self.runtime.upgrade().map(|runtime| runtime.codec())
    }
}

/// Something the interceptor can run in place of a VM function.
pub trait VmHook {
    fn invoke(&self, entity: EntityRef, args: Vec<VmValue>) -> Result<(), BridgeError>;
}

impl VmHook for ScriptCallback {
    fn invoke(&self, entity: EntityRef, args: Vec<VmValue>) -> Result<(), BridgeError> {
        let codec = self.codec().ok_or(BridgeError::RuntimeGone)?;
        let mut script_args = Vec::with_capacity(args.len() + 1);
        script_args.push(Dynamic::from(entity));
        script_args.extend(args.iter().map(|value| codec.to_script(value)));
        self.call(script_args).map(|_| ())
    }
}

pub trait HookLookup {
    type Hook: VmHook;

    fn lookup(&self, pos: CodePos) -> Option<Self::Hook>;
}

/// Script functions exposed to the VM, keyed by their synthetic position.
pub struct HookRegistry {
    entries: RefCell<BTreeMap<CodePos, ScriptCallback>>,
    next_token: Cell<u64>,
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self {
            entries: RefCell::new(BTreeMap::new()),
            next_token: Cell::new(HOOK_RANGE_START),
        }
    }
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, callback: ScriptCallback) -> CodePos {
        let pos = CodePos(self.next_token.get());
        self.next_token.set(pos.0 + 1);
        self.entries.borrow_mut().insert(pos, callback);
        pos
    }

    pub fn get(&self, pos: CodePos) -> Result<ScriptCallback, BridgeError> {
        self.entries
            .borrow()
            .get(&pos)
            .cloned()
            .ok_or(BridgeError::RegistryMiss(pos))
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }

    /// One past the highest position ever handed out.
    pub fn range_end(&self) -> CodePos {
        CodePos(self.next_token.get())
    }
}

impl HookLookup for HookRegistry {
    type Hook = ScriptCallback;

    fn lookup(&self, pos: CodePos) -> Option<ScriptCallback> {
        match self.get(pos) {
            Ok(callback) => Some(callback),
            Err(error) => {
                if pos.0 >= HOOK_RANGE_START {
                    log::debug!("{}", error);
                }
                None
            }
        }
    }
}
