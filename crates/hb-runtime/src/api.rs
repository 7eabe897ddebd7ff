//! Functions and types exposed to scripts.

use std::rc::{Rc, Weak};
use std::time::Duration;

use hb_core::{BridgeError, EntityRef, VmValue};
use rhai::{Array, Dynamic, Engine, EvalAltResult, FnPtr, ImmutableString, Position, FLOAT, INT};

use crate::codec::{Call, Codec, ScriptVector, VmFunction};
use crate::context::HostContext;
use crate::events::{EventListener, EventListenerHandle};
use crate::hooks::ScriptCallback;
use crate::proxy::{ArrayProxy, FieldKey, StructProxy};
use crate::runtime::ScriptRuntime;
use crate::scheduler::TaskId;

type ScriptResult<T> = Result<T, Box<EvalAltResult>>;

fn script_error(error: BridgeError) -> Box<EvalAltResult> {
    Box::new(EvalAltResult::ErrorRuntime(
        Dynamic::from(format!("{}: {}", error.code(), error)),
        Position::NONE,
    ))
}

fn upgrade(runtime: &Weak<ScriptRuntime>) -> ScriptResult<Rc<ScriptRuntime>> {
    runtime
        .upgrade()
        .ok_or_else(|| script_error(BridgeError::RuntimeGone))
}

/// Script handle of an event listener.
#[derive(Clone)]
pub struct ListenerHandle {
    pub handle: EventListenerHandle,
    runtime: Weak<ScriptRuntime>,
}

impl ListenerHandle {
    pub fn clear(&self) -> bool {
        self.runtime
            .upgrade()
            .map(|runtime| runtime.events().remove(self.handle))
            .unwrap_or(false)
    }

    /// Cancels the listener once `event` fires. A handle whose listener is
    /// already gone is left alone.
    pub fn endon(&self, event: &str) {
        let Some(runtime) = self.runtime.upgrade() else {
            return;
        };
        if let Err(error) = runtime.events().add_endon_condition(self.handle, event) {
            log::debug!("endon {} ignored: {}", event, error);
        }
    }
}

/// Script handle of a timeout or interval.
#[derive(Clone)]
pub struct TaskHandle {
    pub handle: TaskId,
    runtime: Weak<ScriptRuntime>,
}

impl TaskHandle {
    pub fn clear(&self) -> bool {
        self.runtime
            .upgrade()
            .map(|runtime| runtime.scheduler().remove(self.handle))
            .unwrap_or(false)
    }

    pub fn endon(&self, event: &str) {
        let Some(runtime) = self.runtime.upgrade() else {
            return;
        };
        if let Err(error) = runtime.scheduler().add_endon_condition(self.handle, event) {
            log::debug!("endon {} ignored: {}", event, error);
        }
    }
}

pub(crate) fn register(
    engine: &mut Engine,
    runtime: Weak<ScriptRuntime>,
    context: Rc<HostContext>,
) {
    let codec = Codec::new(Rc::clone(&context), runtime.clone());
    register_values(engine, &codec);
    register_proxies(engine);
    register_events(engine, &runtime, &context);
    register_timers(engine, &runtime);
    register_host(engine, &runtime, &context);
}

fn register_values(engine: &mut Engine, codec: &Codec) {
    engine
        .register_type_with_name::<EntityRef>("entity")
        .register_get("id", |entity: &mut EntityRef| INT::from(entity.0))
        .register_fn("==", |left: EntityRef, right: EntityRef| left == right)
        .register_fn("!=", |left: EntityRef, right: EntityRef| left != right)
        .register_fn("to_string", |entity: &mut EntityRef| format!("entity:{}", entity.0))
        .register_fn("to_debug", |entity: &mut EntityRef| format!("entity:{}", entity.0));

    let vars_codec = codec.clone();
    engine.register_fn("vars", move |entity: &mut EntityRef| {
        vars_codec.to_script(&VmValue::Struct(entity.object()))
    });

    engine
        .register_type_with_name::<ScriptVector>("vector")
        .register_fn("vector", |x: FLOAT, y: FLOAT, z: FLOAT| ScriptVector::new(x, y, z))
        .register_fn("vector", |x: INT, y: INT, z: INT| {
            ScriptVector::new(x as f32, y as f32, z as f32)
        })
        .register_get_set(
            "x",
            |v: &mut ScriptVector| v.x,
            |v: &mut ScriptVector, value: FLOAT| v.x = value,
        )
        .register_get_set(
            "y",
            |v: &mut ScriptVector| v.y,
            |v: &mut ScriptVector, value: FLOAT| v.y = value,
        )
        .register_get_set(
            "z",
            |v: &mut ScriptVector| v.z,
            |v: &mut ScriptVector, value: FLOAT| v.z = value,
        )
        .register_fn("==", |left: ScriptVector, right: ScriptVector| left == right)
        .register_fn("to_string", |v: &mut ScriptVector| v.to_string())
        .register_fn("to_debug", |v: &mut ScriptVector| v.to_string());

    engine
        .register_type_with_name::<VmFunction>("vm_function")
        .register_get("position", |function: &mut VmFunction| function.pos.0 as INT)
        .register_fn("invoke", |function: &mut VmFunction, args: Array| {
            function.invoke(Call::Implicit(args))
        })
        .register_fn(
            "invoke",
            |function: &mut VmFunction, entity: EntityRef, args: Array| {
                function.invoke(Call::WithEntity(entity, args))
            },
        );
}

fn register_proxies(engine: &mut Engine) {
    engine
        .register_type_with_name::<StructProxy>("vm_struct")
        .register_indexer_get(|proxy: &mut StructProxy, key: ImmutableString| {
            proxy.get(FieldKey::Name(&key))
        })
        .register_indexer_get(|proxy: &mut StructProxy, key: INT| proxy.get(FieldKey::Id(key)))
        .register_indexer_set(
            |proxy: &mut StructProxy, key: ImmutableString, value: Dynamic| {
                proxy.set(FieldKey::Name(&key), &value);
            },
        )
        .register_indexer_set(|proxy: &mut StructProxy, key: INT, value: Dynamic| {
            proxy.set(FieldKey::Id(key), &value);
        })
        .register_fn("is_live", |proxy: &mut StructProxy| proxy.is_live());

    engine
        .register_type_with_name::<ArrayProxy>("vm_array")
        .register_indexer_get(|proxy: &mut ArrayProxy, key: ImmutableString| {
            proxy.get(FieldKey::Name(&key))
        })
        .register_indexer_get(|proxy: &mut ArrayProxy, key: INT| proxy.get(FieldKey::Id(key)))
        .register_indexer_set(
            |proxy: &mut ArrayProxy, key: ImmutableString, value: Dynamic| {
                proxy.set(FieldKey::Name(&key), &value);
            },
        )
        .register_indexer_set(|proxy: &mut ArrayProxy, key: INT, value: Dynamic| {
            proxy.set(FieldKey::Id(key), &value);
        })
        .register_fn("keys", |proxy: &mut ArrayProxy| -> Array { proxy.keys() })
        .register_fn("len", |proxy: &mut ArrayProxy| proxy.len() as INT)
        .register_fn("is_live", |proxy: &mut ArrayProxy| proxy.is_live());
}

fn listen(
    runtime: &Weak<ScriptRuntime>,
    listener: EventListener<FnPtr>,
) -> ScriptResult<ListenerHandle> {
    let handle = upgrade(runtime)?.events().add_event_listener(listener);
    Ok(ListenerHandle {
        handle,
        runtime: runtime.clone(),
    })
}

fn register_events(engine: &mut Engine, runtime: &Weak<ScriptRuntime>, context: &Rc<HostContext>) {
    let (weak, level_context) = (runtime.clone(), Rc::clone(context));
    engine.register_fn("on_event", move |event: &str, callback: FnPtr| {
        let level = level_context.host.level_entity();
        listen(&weak, EventListener::new(event, callback).on_entity(level))
    });

    let (weak, level_context) = (runtime.clone(), Rc::clone(context));
    engine.register_fn("on_event_once", move |event: &str, callback: FnPtr| {
        let level = level_context.host.level_entity();
        listen(&weak, EventListener::once(event, callback).on_entity(level))
    });

    let weak = runtime.clone();
    engine.register_fn(
        "on_event",
        move |entity: &mut EntityRef, event: &str, callback: FnPtr| {
            listen(&weak, EventListener::new(event, callback).on_entity(*entity))
        },
    );

    let weak = runtime.clone();
    engine.register_fn(
        "on_event_once",
        move |entity: &mut EntityRef, event: &str, callback: FnPtr| {
            listen(&weak, EventListener::once(event, callback).on_entity(*entity))
        },
    );

    engine
        .register_type_with_name::<ListenerHandle>("event_listener")
        .register_fn("clear", |handle: &mut ListenerHandle| handle.clear())
        .register_fn("endon", |handle: &mut ListenerHandle, event: &str| handle.endon(event));
}

fn schedule(
    runtime: &Weak<ScriptRuntime>,
    callback: FnPtr,
    milliseconds: INT,
    is_volatile: bool,
) -> ScriptResult<TaskHandle> {
    let delay = Duration::from_millis(u64::try_from(milliseconds).unwrap_or(0));
    let handle = upgrade(runtime)?
        .scheduler()
        .add(callback, delay, is_volatile);
    Ok(TaskHandle {
        handle,
        runtime: runtime.clone(),
    })
}

fn register_timers(engine: &mut Engine, runtime: &Weak<ScriptRuntime>) {
    let weak = runtime.clone();
    engine.register_fn("on_timeout", move |callback: FnPtr, milliseconds: INT| {
        schedule(&weak, callback, milliseconds, true)
    });

    let weak = runtime.clone();
    engine.register_fn("on_interval", move |callback: FnPtr, milliseconds: INT| {
        schedule(&weak, callback, milliseconds, false)
    });

    engine
        .register_type_with_name::<TaskHandle>("task")
        .register_fn("clear", |handle: &mut TaskHandle| handle.clear())
        .register_fn("endon", |handle: &mut TaskHandle, event: &str| handle.endon(event));
}

fn register_host(engine: &mut Engine, runtime: &Weak<ScriptRuntime>, context: &Rc<HostContext>) {
    let host_context = Rc::clone(context);
    engine.register_fn("level", move || host_context.host.level_entity());

    let host_context = Rc::clone(context);
    engine.register_fn("execute_command", move |text: &str| {
        host_context.host.execute_command(text, false)
    });
    let host_context = Rc::clone(context);
    engine.register_fn("execute_command", move |text: &str, immediate: bool| {
        host_context.host.execute_command(text, immediate)
    });

    let (weak, host_context) = (runtime.clone(), Rc::clone(context));
    engine.register_fn("on_player_damage", move |callback: FnPtr| {
        let callback = ScriptCallback::new(callback, weak.clone());
        host_context.damage_callbacks.borrow_mut().push(callback);
    });
    let (weak, host_context) = (runtime.clone(), Rc::clone(context));
    engine.register_fn("on_player_killed", move |callback: FnPtr| {
        let callback = ScriptCallback::new(callback, weak.clone());
        host_context.killed_callbacks.borrow_mut().push(callback);
    });

    let host_context = Rc::clone(context);
    engine.register_fn("enable_vm_hook", move || host_context.interceptor.enable());
    let host_context = Rc::clone(context);
    engine.register_fn("disable_vm_hook", move || host_context.interceptor.disable());
}
