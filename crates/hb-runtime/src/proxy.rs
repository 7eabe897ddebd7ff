//! Script views over host arrays and structs.
//!
//! A proxy never borrows the arena; it keeps the object id and the slot
//! generation seen at conversion time and re-checks both on every access.
//! Once the object is freed the proxy reads as `()` and drops writes.

use hb_core::{ObjectId, SYMBOL_LIMIT};
use rhai::{Dynamic, ImmutableString, INT};

use crate::codec::Codec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectHandle {
    pub id: ObjectId,
    pub generation: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKey<'a> {
    Name(&'a str),
    Id(INT),
}

impl<'a> From<&'a str> for FieldKey<'a> {
    fn from(name: &'a str) -> Self {
        Self::Name(name)
    }
}

impl From<INT> for FieldKey<'_> {
    fn from(id: INT) -> Self {
        Self::Id(id)
    }
}

fn is_live(codec: &Codec, handle: ObjectHandle) -> bool {
    codec
        .context
        .graph
        .borrow()
        .is_live(handle.id, handle.generation)
}

#[derive(Clone)]
pub struct StructProxy {
    pub handle: ObjectHandle,
    codec: Codec,
}

impl StructProxy {
    pub(crate) fn new(handle: ObjectHandle, codec: Codec) -> Self {
        Self { handle, codec }
    }

    pub fn is_live(&self) -> bool {
        is_live(&self.codec, self.handle)
    }

    pub fn get(&self, key: FieldKey<'_>) -> Dynamic {
        let value = {
            let graph = self.codec.context.graph.borrow();
            if !graph.is_live(self.handle.id, self.handle.generation) {
                return Dynamic::UNIT;
            }
            let id = match key {
                FieldKey::Name(name) => graph
                    .symbols()
                    .find_token_id(name)
                    .or_else(|| name.parse().ok()),
                FieldKey::Id(id) => u32::try_from(id).ok(),
            };
            match id.filter(|id| *id != 0) {
                Some(id) => graph.find_child(self.handle.id, id).cloned(),
                None => None,
            }
        };
        value
            .map(|value| self.codec.to_script(&value))
            .unwrap_or(Dynamic::UNIT)
    }

    /// Stores `value`, creating the field if it does not exist yet.
    pub fn set(&self, key: FieldKey<'_>, value: &Dynamic) -> bool {
        let native = self.codec.to_native(value);
        let mut graph = self.codec.context.graph.borrow_mut();
        if !graph.is_live(self.handle.id, self.handle.generation) {
            return false;
        }
        let id = match key {
            FieldKey::Name(name) => match graph.symbols().find_token_id(name) {
                Some(id) => id,
                None => match name.parse() {
                    Ok(id) => id,
                    Err(_) => graph.symbols_mut().intern(name),
                },
            },
            FieldKey::Id(id) => match u32::try_from(id) {
                Ok(id) => id,
                Err(_) => return false,
            },
        };
        if id == 0 {
            return false;
        }
        graph.set_child(self.handle.id, id, native)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ArrayKey {
    Name(String),
    Index(INT),
}

impl ArrayKey {
    fn matches(&self, key: FieldKey<'_>) -> bool {
        match (self, key) {
            (Self::Name(name), FieldKey::Name(other)) => name == other,
            (Self::Index(index), FieldKey::Id(other)) => *index == other,
            _ => false,
        }
    }

    fn to_dynamic(&self) -> Dynamic {
        match self {
            Self::Name(name) => Dynamic::from(ImmutableString::from(name.as_str())),
            Self::Index(index) => Dynamic::from_int(*index),
        }
    }
}

#[derive(Clone)]
pub struct ArrayProxy {
    pub handle: ObjectHandle,
    codec: Codec,
}

impl ArrayProxy {
    pub(crate) fn new(handle: ObjectHandle, codec: Codec) -> Self {
        Self { handle, codec }
    }

    pub fn is_live(&self) -> bool {
        is_live(&self.codec, self.handle)
    }

    /// Walks the child list and pairs each defined element with its script
    /// key: the symbol name for named children, else the next index.
    fn scan(&self) -> Vec<(usize, ArrayKey)> {
        let graph = self.codec.context.graph.borrow();
        if !graph.is_live(self.handle.id, self.handle.generation) {
            return Vec::new();
        }
        let mut next_index: INT = 0;
        graph
            .children(self.handle.id)
            .iter()
            .enumerate()
            .filter(|(_, child)| !child.value.is_none())
            .map(|(position, child)| {
                let name = (child.key < SYMBOL_LIMIT)
                    .then(|| graph.symbols().token_name(child.key))
                    .flatten();
                let key = match name {
                    Some(name) => ArrayKey::Name(name.to_string()),
                    None => {
                        next_index += 1;
                        ArrayKey::Index(next_index - 1)
                    }
                };
                (position, key)
            })
            .collect()
    }

    fn position_of(&self, key: FieldKey<'_>) -> Option<usize> {
        self.scan()
            .into_iter()
            .find(|(_, candidate)| candidate.matches(key))
            .map(|(position, _)| position)
    }

    pub fn keys(&self) -> Vec<Dynamic> {
        self.scan().iter().map(|(_, key)| key.to_dynamic()).collect()
    }

    pub fn len(&self) -> usize {
        self.scan().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: FieldKey<'_>) -> Dynamic {
        let Some(position) = self.position_of(key) else {
            return Dynamic::UNIT;
        };
        let value = self
            .codec
            .context
            .graph
            .borrow()
            .children(self.handle.id)
            .get(position)
            .map(|child| child.value.clone());
        value
            .map(|value| self.codec.to_script(&value))
            .unwrap_or(Dynamic::UNIT)
    }

    /// Overwrites an existing element. Unknown keys are ignored.
    pub fn set(&self, key: FieldKey<'_>, value: &Dynamic) -> bool {
        let Some(position) = self.position_of(key) else {
            return false;
        };
        let native = self.codec.to_native(value);
        self.codec
            .context
            .graph
            .borrow_mut()
            .set_child_at(self.handle.id, position, native)
    }
}
