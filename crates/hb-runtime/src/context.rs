use std::cell::RefCell;
use std::rc::Rc;

use hb_core::{BridgeOptions, HostVm, SharedGraph};

use crate::hooks::{HookRegistry, ScriptCallback};
use crate::interceptor::VmInterceptor;

/// Process-wide state shared by the bridge and every script runtime.
pub(crate) struct HostContext {
    pub(crate) options: BridgeOptions,
    pub(crate) host: Rc<dyn HostVm>,
    pub(crate) graph: SharedGraph,
    pub(crate) hooks: HookRegistry,
    pub(crate) interceptor: VmInterceptor,
    pub(crate) damage_callbacks: RefCell<Vec<ScriptCallback>>,
    pub(crate) killed_callbacks: RefCell<Vec<ScriptCallback>>,
}

impl HostContext {
    pub(crate) fn new(host: Rc<dyn HostVm>, graph: SharedGraph, options: BridgeOptions) -> Self {
        Self {
            options,
            host,
            graph,
            hooks: HookRegistry::new(),
            interceptor: VmInterceptor::new(),
            damage_callbacks: RefCell::new(Vec::new()),
            killed_callbacks: RefCell::new(Vec::new()),
        }
    }

    /// Drops every script-owned registration. The hook counter keeps running
    /// so positions handed out earlier never come back.
    pub(crate) fn clear(&self) {
        self.hooks.clear();
        self.interceptor.enable();
        self.damage_callbacks.borrow_mut().clear();
        self.killed_callbacks.borrow_mut().clear();
    }
}

#[cfg(test)]
impl HostContext {
    /// Context over a fresh graph and a [`crate::TableHost`] with two clients.
    pub(crate) fn for_tests() -> (Rc<Self>, Rc<crate::TableHost>) {
        let graph = hb_core::VariableGraph::new().shared();
        let tables = crate::HostTables {
            clients: 2,
            ..crate::HostTables::default()
        };
        let host = Rc::new(crate::TableHost::new(&graph, tables));
        let host_vm: Rc<dyn HostVm> = host.clone();
        let context = Self::new(host_vm, graph, BridgeOptions::default());
        (Rc::new(context), host)
    }
}
