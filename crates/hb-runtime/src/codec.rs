//! Conversion between host VM values and Rhai values.
//!
//! Both directions are total. Values without a counterpart degrade to `()` or
//! [`VmValue::None`] and are reported at debug level.

use std::fmt;
use std::rc::{Rc, Weak};

use hb_core::{BridgeError, CodePos, EntityRef, ObjectId, VmValue};
use rhai::{Dynamic, FnPtr, ImmutableString, FLOAT, INT};

use crate::context::HostContext;
use crate::hooks::ScriptCallback;
use crate::proxy::{ArrayProxy, ObjectHandle, StructProxy};
use crate::runtime::ScriptRuntime;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScriptVector {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl ScriptVector {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl From<[f32; 3]> for ScriptVector {
    fn from([x, y, z]: [f32; 3]) -> Self {
        Self { x, y, z }
    }
}

impl From<ScriptVector> for [f32; 3] {
    fn from(vector: ScriptVector) -> Self {
        [vector.x, vector.y, vector.z]
    }
}

impl fmt::Display for ScriptVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Converter bound to one script runtime. Function values it creates are
/// registered on behalf of that runtime.
#[derive(Clone)]
pub struct Codec {
    pub(crate) context: Rc<HostContext>,
    pub(crate) runtime: Weak<ScriptRuntime>,
}

impl Codec {
    pub(crate) fn new(context: Rc<HostContext>, runtime: Weak<ScriptRuntime>) -> Self {
        Self { context, runtime }
    }

    pub fn to_script(&self, value: &VmValue) -> Dynamic {
        match value {
            VmValue::None => Dynamic::UNIT,
            VmValue::Int(value) => Dynamic::from_int(INT::from(*value)),
            VmValue::Float(value) => Dynamic::from_float(*value),
            VmValue::String(value) => Dynamic::from(value.clone()),
            VmValue::Vector(value) => Dynamic::from(ScriptVector::from(*value)),
            VmValue::Entity(entity) => Dynamic::from(*entity),
            VmValue::CodePos(pos) => Dynamic::from(VmFunction {
                pos: *pos,
                codec: self.clone(),
            }),
            VmValue::Array(id) => match self.handle(*id) {
                Some(handle) => Dynamic::from(ArrayProxy::new(handle, self.clone())),
                None => self.degrade_to_unit(value),
            },
            VmValue::Struct(id) => match self.handle(*id) {
                Some(handle) => Dynamic::from(StructProxy::new(handle, self.clone())),
                None => self.degrade_to_unit(value),
            },
        }
    }

    pub fn to_native(&self, value: &Dynamic) -> VmValue {
        if value.is_unit() {
            return VmValue::None;
        }
        if value.is::<bool>() {
            return VmValue::Int(i32::from(value.clone_cast::<bool>()));
        }
        if value.is::<INT>() {
            let value = value.clone_cast::<INT>();
            return match i32::try_from(value) {
                Ok(value) => VmValue::Int(value),
                Err(_) => VmValue::Float(value as f32),
            };
        }
        if value.is::<FLOAT>() {
            return VmValue::Float(value.clone_cast::<FLOAT>());
        }
        if value.is::<ImmutableString>() {
            return VmValue::String(value.clone_cast::<ImmutableString>().to_string());
        }
        if value.is::<char>() {
            return VmValue::String(value.clone_cast::<char>().to_string());
        }
        if value.is::<ScriptVector>() {
            return VmValue::Vector(value.clone_cast::<ScriptVector>().into());
        }
        if value.is::<EntityRef>() {
            return VmValue::Entity(value.clone_cast::<EntityRef>());
        }
        if value.is::<FnPtr>() {
            let callback = ScriptCallback::new(value.clone_cast::<FnPtr>(), self.runtime.clone());
            return VmValue::CodePos(self.context.hooks.register(callback));
        }
        if value.is::<VmFunction>() {
            return VmValue::CodePos(value.clone_cast::<VmFunction>().pos);
        }
        if value.is::<ArrayProxy>() {
            let proxy = value.clone_cast::<ArrayProxy>();
            if proxy.is_live() {
                return VmValue::Array(proxy.handle.id);
            }
            return VmValue::None;
        }
        if value.is::<StructProxy>() {
            let proxy = value.clone_cast::<StructProxy>();
            if proxy.is_live() {
                return VmValue::Struct(proxy.handle.id);
            }
            return VmValue::None;
        }

        log::debug!(
            "{}",
            BridgeError::ConversionUnsupported {
                type_name: value.type_name().to_string(),
                target: "vm",
            }
        );
        VmValue::None
    }

    pub fn level_entity(&self) -> EntityRef {
        self.context.host.level_entity()
    }

    fn handle(&self, id: ObjectId) -> Option<ObjectHandle> {
        let generation = self.context.graph.borrow().generation(id)?;
        Some(ObjectHandle { id, generation })
    }

    fn degrade_to_unit(&self, value: &VmValue) -> Dynamic {
        log::debug!(
            "{}",
            BridgeError::ConversionUnsupported {
                type_name: format!("freed {}", value.type_name()),
                target: "script",
            }
        );
        Dynamic::UNIT
    }
}

/// The two ways a script may call a VM function.
#[derive(Debug, Clone)]
pub enum Call {
    WithEntity(EntityRef, Vec<Dynamic>),
    /// Runs on the level entity.
    Implicit(Vec<Dynamic>),
}

/// Script-side stub for a VM function.
#[derive(Clone)]
pub struct VmFunction {
    pub pos: CodePos,
    codec: Codec,
}

impl VmFunction {
    pub fn invoke(&self, call: Call) -> Dynamic {
        let (entity, args) = match call {
            Call::WithEntity(entity, args) => (entity, args),
            Call::Implicit(args) => (self.codec.level_entity(), args),
        };
        let args: Vec<VmValue> = args.iter().map(|arg| self.codec.to_native(arg)).collect();
        let result = self.codec.context.host.exec_thread(entity, self.pos, &args);
        self.codec.to_script(&result)
    }
}

impl fmt::Debug for VmFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VmFunction").field("pos", &self.pos).finish()
    }
}

#[cfg(test)]
mod codec_tests {
    use hb_core::{HostVm, ObjectKind};
    use rhai::Map;

    use super::*;

    fn codec() -> (Codec, Rc<crate::TableHost>) {
        let (context, host) = HostContext::for_tests();
        (Codec::new(context, Weak::new()), host)
    }

    fn round_trip(codec: &Codec, value: VmValue) -> VmValue {
        codec.to_native(&codec.to_script(&value))
    }

    #[test]
    fn scalars_survive_a_round_trip() {
        let (codec, host) = codec();
        for value in [
            VmValue::None,
            VmValue::Int(-42),
            VmValue::Float(1.5),
            VmValue::from("hello"),
            VmValue::Vector([1.0, -2.5, 3.25]),
            VmValue::Entity(host.level_entity()),
        ] {
            assert_eq!(round_trip(&codec, value.clone()), value);
        }
    }

    #[test]
    fn script_scalars_come_back_unchanged() {
        let (codec, host) = codec();
        let back = |value: Dynamic| codec.to_script(&codec.to_native(&value));

        assert_eq!(back(Dynamic::from_float(0.1)).as_float(), Ok(0.1));
        assert_eq!(back(Dynamic::from_float(-1.0e-7)).as_float(), Ok(-1.0e-7));
        assert_eq!(back(Dynamic::from_int(-7)).as_int(), Ok(-7));
        assert_eq!(
            back(Dynamic::from_int(INT::from(i32::MAX))).as_int(),
            Ok(INT::from(i32::MAX))
        );
        assert_eq!(
            back(Dynamic::from("tag")).clone_cast::<ImmutableString>(),
            "tag"
        );
        assert!(back(Dynamic::UNIT).is_unit());

        let vector = ScriptVector::new(0.1, -2.5, 1.0e-3);
        assert_eq!(back(Dynamic::from(vector)).clone_cast::<ScriptVector>(), vector);
        let level = host.level_entity();
        assert_eq!(back(Dynamic::from(level)).clone_cast::<EntityRef>(), level);
    }

    #[test]
    fn script_only_scalars_map_to_vm_kinds() {
        let (codec, _) = codec();
        assert_eq!(codec.to_native(&Dynamic::TRUE), VmValue::Int(1));
        assert_eq!(codec.to_native(&Dynamic::FALSE), VmValue::Int(0));
        assert_eq!(codec.to_native(&Dynamic::from('x')), VmValue::from("x"));
        assert_eq!(
            codec.to_native(&Dynamic::from_int(1 << 40)),
            VmValue::Float((1_i64 << 40) as f32)
        );
    }

    #[test]
    fn unsupported_values_degrade_to_none() {
        let (codec, _) = codec();
        assert_eq!(codec.to_native(&Dynamic::from_map(Map::new())), VmValue::None);
        assert_eq!(codec.to_native(&Dynamic::from_array(Vec::new())), VmValue::None);
    }

    #[test]
    fn script_functions_become_registered_positions() {
        let (codec, _) = codec();
        let function = FnPtr::new("handler").expect("valid name");

        let pos = match codec.to_native(&Dynamic::from(function)) {
            VmValue::CodePos(pos) => pos,
            other => panic!("expected a code position, got {:?}", other),
        };
        assert_eq!(codec.context.hooks.len(), 1);
        assert!(codec.context.hooks.get(pos).is_ok());

        let stub = codec.to_script(&VmValue::CodePos(pos));
        assert!(stub.is::<VmFunction>());
        assert_eq!(codec.to_native(&stub), VmValue::CodePos(pos));
        assert_eq!(codec.context.hooks.len(), 1);
    }

    #[test]
    fn vm_function_calls_run_host_threads() {
        let (codec, host) = codec();
        host.set_thread_result(VmValue::from("done"));
        let function = VmFunction {
            pos: CodePos(77),
            codec: codec.clone(),
        };
        let player = host.entity(1).expect("client 1");

        let result = function.invoke(Call::Implicit(vec![Dynamic::from_int(3)]));
        assert_eq!(result.clone_cast::<ImmutableString>().as_str(), "done");
        function.invoke(Call::WithEntity(player, Vec::new()));

        let threads = host.threads();
        assert_eq!(threads[0].entity, host.level_entity());
        assert_eq!(threads[0].pos, CodePos(77));
        assert_eq!(threads[0].args, vec![VmValue::Int(3)]);
        assert_eq!(threads[1].entity, player);
    }

    #[test]
    fn composites_convert_to_live_proxies_of_the_same_object() {
        let (codec, _) = codec();
        let (array, object) = {
            let mut graph = codec.context.graph.borrow_mut();
            (
                graph.alloc_object(ObjectKind::Array),
                graph.alloc_object(ObjectKind::Struct),
            )
        };

        let proxy = codec.to_script(&VmValue::Array(array));
        assert!(proxy.is::<ArrayProxy>());
        assert_eq!(codec.to_native(&proxy), VmValue::Array(array));
        assert_eq!(round_trip(&codec, VmValue::Struct(object)), VmValue::Struct(object));

        codec.context.graph.borrow_mut().remove_ref(&VmValue::Array(array));
        assert_eq!(codec.to_native(&proxy), VmValue::None);
        assert!(codec.to_script(&VmValue::Array(array)).is_unit());
    }
}
