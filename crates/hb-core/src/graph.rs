//! Arena model of the host VM's reference-counted variable graph.
//!
//! Objects are addressed by [`ObjectId`]; every slot carries a generation that
//! is bumped when the slot is freed, so holders of `(id, generation)` can
//! detect reclamation instead of aliasing a reused slot. Id 0 is never handed
//! out and stands for "no object".

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use crate::value::{EntityRef, ObjectId, VmValue};

/// Child keys below this value may name a symbol; the rest are raw indices.
pub const SYMBOL_LIMIT: u32 = 0x40000;
/// First key used by [`VariableGraph::push`] for array elements.
pub const ARRAY_KEY_BASE: u32 = 0x80_0000;

pub type SharedGraph = Rc<RefCell<VariableGraph>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Array,
    Struct,
    Entity,
    Frame,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChildVariable {
    pub key: u32,
    pub value: VmValue,
}

#[derive(Debug, Clone)]
pub struct ObjectVariable {
    pub kind: ObjectKind,
    pub owner: EntityRef,
    pub ref_count: u32,
    pub children: Vec<ChildVariable>,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    object: Option<ObjectVariable>,
}

#[derive(Debug, Default)]
pub struct SymbolTable {
    by_name: HashMap<String, u32>,
    by_id: BTreeMap<u32, String>,
    next_id: u32,
}

impl SymbolTable {
    pub fn insert(&mut self, name: impl Into<String>, id: u32) {
        let name = name.into();
        self.by_id.insert(id, name.clone());
        self.by_name.insert(name, id);
        // ids at or past SYMBOL_LIMIT are never handed out by `intern`
        if id < SYMBOL_LIMIT {
            self.next_id = self.next_id.max(id + 1);
        }
    }

    /// Returns the existing id for `name` or assigns the next free one.
    pub fn intern(&mut self, name: &str) -> u32 {
        if let Some(id) = self.by_name.get(name) {
            return *id;
        }
        let id = self.next_id.max(1);
        self.insert(name, id);
        id
    }

    pub fn find_token_id(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }

    pub fn token_name(&self, id: u32) -> Option<&str> {
        self.by_id.get(&id).map(String::as_str)
    }
}

#[derive(Debug)]
pub struct VariableGraph {
    slots: Vec<Slot>,
    free: Vec<u32>,
    symbols: SymbolTable,
}

impl Default for VariableGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl VariableGraph {
    pub fn new() -> Self {
        Self {
            slots: vec![Slot::default()],
            free: Vec::new(),
            symbols: SymbolTable::default(),
        }
    }

    pub fn shared(self) -> SharedGraph {
        Rc::new(RefCell::new(self))
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn symbols_mut(&mut self) -> &mut SymbolTable {
        &mut self.symbols
    }

    /// Allocates an object holding a single reference owned by the caller.
    pub fn alloc_object(&mut self, kind: ObjectKind) -> ObjectId {
        let object = ObjectVariable {
            kind,
            owner: EntityRef(0),
            ref_count: 1,
            children: Vec::new(),
        };
        if let Some(index) = self.free.pop() {
            self.slots[index as usize].object = Some(object);
            return ObjectId(index);
        }
        self.slots.push(Slot {
            generation: 0,
            object: Some(object),
        });
        ObjectId((self.slots.len() - 1) as u32)
    }

    pub fn alloc_entity(&mut self) -> EntityRef {
        let id = self.alloc_object(ObjectKind::Entity);
        EntityRef(id.0)
    }

    /// Allocates an execution frame whose local id resolves to `owner`.
    pub fn alloc_frame(&mut self, owner: EntityRef) -> ObjectId {
        let id = self.alloc_object(ObjectKind::Frame);
        if let Some(object) = self.object_mut(id) {
            object.owner = owner;
        }
        id
    }

    pub fn object(&self, id: ObjectId) -> Option<&ObjectVariable> {
        self.slots.get(id.0 as usize)?.object.as_ref()
    }

    fn object_mut(&mut self, id: ObjectId) -> Option<&mut ObjectVariable> {
        self.slots.get_mut(id.0 as usize)?.object.as_mut()
    }

    pub fn generation(&self, id: ObjectId) -> Option<u32> {
        let slot = self.slots.get(id.0 as usize)?;
        slot.object.as_ref().map(|_| slot.generation)
    }

    pub fn is_live(&self, id: ObjectId, generation: u32) -> bool {
        self.generation(id) == Some(generation)
    }

    pub fn ref_count(&self, id: ObjectId) -> Option<u32> {
        self.object(id).map(|object| object.ref_count)
    }

    /// Entity that owns the frame with the given local id.
    pub fn owner_of(&self, local_id: ObjectId) -> EntityRef {
        self.object(local_id)
            .map(|object| object.owner)
            .unwrap_or(EntityRef(0))
    }

    pub fn add_ref(&mut self, value: &VmValue) {
        if let Some(object) = value.object_ref().and_then(|id| self.object_mut(id)) {
            object.ref_count += 1;
        }
    }

    /// Drops one reference; objects reaching zero are freed and release their
    /// children in turn.
    pub fn remove_ref(&mut self, value: &VmValue) {
        let Some(first) = value.object_ref() else {
            return;
        };
        let mut pending = vec![first];
        while let Some(id) = pending.pop() {
            let Some(object) = self.object_mut(id) else {
                continue;
            };
            object.ref_count = object.ref_count.saturating_sub(1);
            if object.ref_count > 0 {
                continue;
            }
            let Some(freed) = self.free_slot(id) else {
                continue;
            };
            pending.extend(
                freed
                    .children
                    .iter()
                    .filter_map(|child| child.value.object_ref()),
            );
        }
    }

    fn free_slot(&mut self, id: ObjectId) -> Option<ObjectVariable> {
        let slot = self.slots.get_mut(id.0 as usize)?;
        let object = slot.object.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.0);
        Some(object)
    }

    pub fn children(&self, id: ObjectId) -> &[ChildVariable] {
        self.object(id)
            .map(|object| object.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn find_child(&self, id: ObjectId, key: u32) -> Option<&VmValue> {
        self.children(id)
            .iter()
            .find(|child| child.key == key)
            .map(|child| &child.value)
    }

    /// Stores `value` under `key`, creating the child if needed. The new value
    /// gains a reference before the overwritten one loses its own, so storing
    /// a value over itself never drops the count to zero in between.
    pub fn set_child(&mut self, id: ObjectId, key: u32, value: VmValue) -> bool {
        let Some(object) = self.object(id) else {
            return false;
        };
        let position = object.children.iter().position(|child| child.key == key);

        self.add_ref(&value);
        let previous = match (self.object_mut(id), position) {
            (Some(object), Some(index)) => {
                std::mem::replace(&mut object.children[index].value, value)
            }
            (Some(object), None) => {
                object.children.push(ChildVariable { key, value });
                VmValue::None
            }
            (None, _) => return false,
        };
        self.remove_ref(&previous);
        true
    }

    /// Overwrites the child at `index` in sibling order, keeping its key.
    pub fn set_child_at(&mut self, id: ObjectId, index: usize, value: VmValue) -> bool {
        let Some(key) = self.children(id).get(index).map(|child| child.key) else {
            return false;
        };
        self.set_child(id, key, value)
    }

    /// Appends an array element and returns its key.
    pub fn push(&mut self, id: ObjectId, value: VmValue) -> Option<u32> {
        let key = ARRAY_KEY_BASE + self.children(id).len() as u32;
        self.set_child(id, key, value).then_some(key)
    }
}
