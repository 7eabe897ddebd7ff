use std::fmt;

use serde::{Deserialize, Serialize};

/// Position in the host VM instruction stream. Doubles as a function identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CodePos(pub u64);

impl fmt::Display for CodePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifying number of a host entity. Entities are object variables, so the
/// number is also the `ObjectId` of the entity's field table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityRef(pub u32);

impl EntityRef {
    pub fn object(self) -> ObjectId {
        ObjectId(self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub u32);

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VmValue {
    #[default]
    None,
    Int(i32),
    Float(f32),
    String(String),
    Vector([f32; 3]),
    Entity(EntityRef),
    CodePos(CodePos),
    Array(ObjectId),
    Struct(ObjectId),
}

impl VmValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Vector(_) => "vector",
            Self::Entity(_) => "entity",
            Self::CodePos(_) => "function",
            Self::Array(_) => "array",
            Self::Struct(_) => "struct",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Object id for reference-counted composites.
    pub fn object_ref(&self) -> Option<ObjectId> {
        match self {
            Self::Array(id) | Self::Struct(id) => Some(*id),
            _ => None,
        }
    }
}

impl From<i32> for VmValue {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl From<f32> for VmValue {
    fn from(value: f32) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for VmValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for VmValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<EntityRef> for VmValue {
    fn from(value: EntityRef) -> Self {
        Self::Entity(value)
    }
}

#[cfg(test)]
mod value_tests {
    use super::*;

    #[test]
    fn object_ref_only_for_composites() {
        assert_eq!(VmValue::Array(ObjectId(3)).object_ref(), Some(ObjectId(3)));
        assert_eq!(VmValue::Struct(ObjectId(4)).object_ref(), Some(ObjectId(4)));
        assert_eq!(VmValue::Entity(EntityRef(4)).object_ref(), None);
        assert_eq!(VmValue::Int(1).object_ref(), None);
    }

    #[test]
    fn session_json_shape_is_externally_tagged() {
        let values: Vec<VmValue> =
            serde_json::from_str(r#"[{"int": 5}, {"string": "hi"}, {"vector": [1.0, 2.0, 3.0]}, "none"]"#)
                .expect("values should parse");
        assert_eq!(
            values,
            vec![
                VmValue::Int(5),
                VmValue::from("hi"),
                VmValue::Vector([1.0, 2.0, 3.0]),
                VmValue::None,
            ]
        );
    }
}
