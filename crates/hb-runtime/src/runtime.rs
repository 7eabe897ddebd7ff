use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};
use std::time::Duration;

use hb_core::{BridgeError, Event};
use rhai::module_resolvers::FileModuleResolver;
use rhai::{Dynamic, Engine, FnPtr, AST};

use crate::api;
use crate::codec::Codec;
use crate::context::HostContext;
use crate::events::EventHandler;
use crate::scheduler::FrameScheduler;

/// One loaded script folder: its engine, compiled entry script, listeners
/// and timers.
pub struct ScriptRuntime {
    name: String,
    folder: Option<PathBuf>,
    engine: Engine,
    ast: RefCell<AST>,
    events: EventHandler<FnPtr>,
    scheduler: FrameScheduler<FnPtr>,
    context: Rc<HostContext>,
    this: Weak<ScriptRuntime>,
}

impl ScriptRuntime {
    pub(crate) fn new(
        name: impl Into<String>,
        folder: Option<PathBuf>,
        context: Rc<HostContext>,
    ) -> Rc<Self> {
        let name = name.into();
        Rc::new_cyclic(|this: &Weak<ScriptRuntime>| {
            let mut engine = Engine::new();
            engine.set_max_call_levels(context.options.max_call_depth);
            if context.options.max_operations > 0 {
                engine.set_max_operations(context.options.max_operations);
            }

            let print_name = name.clone();
            engine.on_print(move |text| log::info!("[{}] {}", print_name, text));
            let debug_name = name.clone();
            engine.on_debug(move |text, _source, pos| {
                log::debug!("[{}] {} @ {}", debug_name, text, pos)
            });

            if let Some(folder) = &folder {
                engine.set_module_resolver(FileModuleResolver::new_with_path(folder.clone()));
            }
            api::register(&mut engine, this.clone(), Rc::clone(&context));

            Self {
                name,
                folder,
                engine,
                ast: RefCell::new(AST::empty()),
                events: EventHandler::new(),
                scheduler: FrameScheduler::new(),
                context,
                this: this.clone(),
            }
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn folder(&self) -> Option<&Path> {
        self.folder.as_deref()
    }

    pub fn codec(&self) -> Codec {
        Codec::new(Rc::clone(&self.context), self.this.clone())
    }

    pub fn events(&self) -> &EventHandler<FnPtr> {
        &self.events
    }

    pub fn scheduler(&self) -> &FrameScheduler<FnPtr> {
        &self.scheduler
    }

    /// Compiles and runs the folder's entry script.
    pub(crate) fn load_entry(&self) -> Result<(), BridgeError> {
        let Some(folder) = &self.folder else {
            return Ok(());
        };
        let path = folder.join(&self.context.options.entry_file);
        let source = fs::read_to_string(&path).map_err(|error| BridgeError::io(&path, error))?;
        self.run_source(&path, &source)
    }

    pub(crate) fn run_source(&self, origin: &Path, source: &str) -> Result<(), BridgeError> {
        log::info!("loading script {}", origin.display());
        let ast = self
            .engine
            .compile(source)
            .map_err(|error| BridgeError::script_load(origin, error.to_string()))?;
        *self.ast.borrow_mut() = ast;

        let ast = self.ast.borrow();
        self.engine
            .run_ast(&ast)
            .map_err(|error| BridgeError::script_load(origin, error.to_string()))
    }

    pub fn call(&self, callback: &FnPtr, args: Vec<Dynamic>) -> Result<Dynamic, BridgeError> {
        let ast = self.ast.borrow();
        callback
            .call::<Dynamic>(&self.engine, &ast, args)
            .map_err(|error| {
                BridgeError::callback_fault(format!(
                    "{} in {}: {}",
                    callback.fn_name(),
                    self.name,
                    error
                ))
            })
    }

    /// Cancels timers ending on `event`, then runs matching listeners.
    pub fn notify(&self, event: &Event) {
        self.scheduler.dispatch(event);

        let codec = self.codec();
        self.events.dispatch(
            event,
            |event| {
                event
                    .arguments
                    .iter()
                    .map(|arg| codec.to_script(arg))
                    .collect::<Vec<_>>()
            },
            |callback, args| self.call(callback, args.clone()).map(|_| ()),
        );
    }

    pub fn run_frame(&self, elapsed: Duration) {
        self.scheduler
            .run_frame(elapsed, |callback| self.call(callback, Vec::new()).map(|_| ()));
    }

    pub fn clear(&self) {
        self.events.clear();
        self.scheduler.clear();
    }
}
