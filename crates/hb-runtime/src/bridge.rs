use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use hb_core::{BridgeError, BridgeOptions, Event, ExecutionState, HostVm, SharedGraph};
use walkdir::WalkDir;

use crate::context::HostContext;
use crate::interceptor::{HookState, Interception};
use crate::runtime::ScriptRuntime;
use crate::scheduler::FrameScheduler;

/// Process-scoped entry point the host calls into.
pub struct Bridge {
    pub(crate) context: Rc<HostContext>,
    runtimes: RefCell<Vec<Rc<ScriptRuntime>>>,
    load_failures: RefCell<Vec<BridgeError>>,
    /// Notifications raised inside native callbacks, delivered next frame.
    pub(crate) deferred: FrameScheduler<Vec<Event>>,
}

impl Bridge {
    pub fn new(
        host: Rc<dyn HostVm>,
        graph: SharedGraph,
        options: BridgeOptions,
    ) -> Result<Self, BridgeError> {
        options.validate()?;
        Ok(Self {
            context: Rc::new(HostContext::new(host, graph, options)),
            runtimes: RefCell::new(Vec::new()),
            load_failures: RefCell::new(Vec::new()),
            deferred: FrameScheduler::new(),
        })
    }

    pub fn options(&self) -> &BridgeOptions {
        &self.context.options
    }

    pub fn graph(&self) -> &SharedGraph {
        &self.context.graph
    }

    pub fn host(&self) -> &Rc<dyn HostVm> {
        &self.context.host
    }

    /// Reloads every script folder under the configured roots and returns
    /// how many runtimes were created.
    pub fn start(&self) -> Result<usize, BridgeError> {
        self.clear();

        let entry_file = self.context.options.entry_file.clone();
        for root in &self.context.options.script_roots {
            if !root.is_dir() {
                log::warn!("script root {} does not exist", root.display());
                continue;
            }
            let walker = WalkDir::new(root)
                .min_depth(1)
                .max_depth(1)
                .sort_by_file_name();
            for entry in walker {
                let entry = entry.map_err(|error| BridgeError::Io {
                    path: root.clone(),
                    message: error.to_string(),
                })?;
                if entry.file_type().is_dir() && entry.path().join(&entry_file).is_file() {
                    self.load_folder(entry.path());
                }
            }
        }

        Ok(self.runtime_count())
    }

    /// Creates a runtime for `folder` and runs its entry script. The runtime
    /// stays registered when the script fails part way.
    pub fn load_folder(&self, folder: &Path) -> Rc<ScriptRuntime> {
        let name = folder
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| folder.display().to_string());
        let runtime = ScriptRuntime::new(
            name,
            Some(folder.to_path_buf()),
            Rc::clone(&self.context),
        );
        self.runtimes.borrow_mut().push(Rc::clone(&runtime));

        if let Err(error) = runtime.load_entry() {
            log::error!("{}", error);
            self.load_failures.borrow_mut().push(error);
        }
        runtime
    }

    /// Loads a runtime from inline source.
    pub fn load_source(&self, name: &str, source: &str) -> Result<Rc<ScriptRuntime>, BridgeError> {
        let runtime = ScriptRuntime::new(name, None, Rc::clone(&self.context));
        self.runtimes.borrow_mut().push(Rc::clone(&runtime));
        if let Err(error) = runtime.run_source(Path::new(name), source) {
            log::error!("{}", error);
            self.load_failures.borrow_mut().push(error.clone());
            return Err(error);
        }
        Ok(runtime)
    }

    pub fn runtime_count(&self) -> usize {
        self.runtimes.borrow().len()
    }

    pub fn runtimes(&self) -> Vec<Rc<ScriptRuntime>> {
        self.runtimes.borrow().clone()
    }

    /// Entry script failures since the last [`Bridge::start`].
    pub fn load_failures(&self) -> Vec<BridgeError> {
        self.load_failures.borrow().clone()
    }

    /// Delivers `event` to every runtime. Events without an entity belong to
    /// the level.
    pub fn notify(&self, event: &Event) {
        let mut event = event.clone();
        if event.entity.is_none() {
            event.entity = Some(self.context.host.level_entity());
        }
        for runtime in self.runtimes() {
            runtime.notify(&event);
        }
    }

    pub(crate) fn defer(&self, events: Vec<Event>) {
        self.deferred.add(events, Duration::ZERO, true);
    }

    /// Runs deferred notifications, then every runtime's timers.
    pub fn run_frame(&self, elapsed: Duration) {
        let mut due = Vec::new();
        self.deferred.run_frame(elapsed, |events| {
            due.extend(events.iter().cloned());
            Ok(())
        });
        for event in &due {
            self.notify(event);
        }

        for runtime in self.runtimes() {
            runtime.run_frame(elapsed);
        }
    }

    pub fn on_vm_instruction(&self, state: &ExecutionState) -> Interception {
        self.context
            .interceptor
            .step(state, &self.context.hooks, &self.context.graph)
    }

    pub fn enable_vm_hook(&self) {
        self.context.interceptor.enable();
    }

    pub fn disable_vm_hook(&self) {
        self.context.interceptor.disable();
    }

    pub fn hook_state(&self) -> HookState {
        self.context.interceptor.state()
    }

    pub fn hook_count(&self) -> usize {
        self.context.hooks.len()
    }

    pub fn damage_callback_count(&self) -> usize {
        self.context.damage_callbacks.borrow().len()
    }

    pub fn killed_callback_count(&self) -> usize {
        self.context.killed_callbacks.borrow().len()
    }

    /// Tears down every runtime and script-owned registration.
    pub fn clear(&self) {
        self.context.clear();
        self.deferred.clear();
        self.load_failures.borrow_mut().clear();
        let runtimes = std::mem::take(&mut *self.runtimes.borrow_mut());
        for runtime in &runtimes {
            runtime.clear();
        }
    }

    pub fn stop(&self) {
        log::info!("stopping {} script runtime(s)", self.runtime_count());
        self.clear();
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.clear();
    }
}
