//! Scripting bridge between the host VM and embedded Rhai runtimes.

mod api;
mod bridge;
mod codec;
mod context;
mod events;
mod hooks;
mod interceptor;
mod proxy;
mod runtime;
mod scheduler;
mod stubs;
mod table_host;

pub use api::{ListenerHandle, TaskHandle};
pub use bridge::Bridge;
pub use codec::{Call, Codec, ScriptVector, VmFunction};
pub use events::{EventHandler, EventListener, EventListenerHandle};
pub use hooks::{HookLookup, HookRegistry, ScriptCallback, VmHook, HOOK_RANGE_START};
pub use interceptor::{HookState, Interception, VmInterceptor, EMPTY_FUNCTION};
pub use proxy::{ArrayProxy, FieldKey, ObjectHandle, StructProxy};
pub use runtime::ScriptRuntime;
pub use scheduler::{FrameScheduler, ScheduledTask, TaskId};
pub use stubs::parse_chat_message;
pub use table_host::{HostTables, TableHost, ThreadCall};
