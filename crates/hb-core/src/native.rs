//! Argument records of the host engine hook sites.
//!
//! Field order and types follow the native call signatures; stubs forward the
//! record they were given with at most `damage` changed.

use serde::{Deserialize, Serialize};

use crate::value::{EntityRef, VmValue};

/// Host entity slot number as passed to hook sites.
pub type EntityNum = u16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamageArgs {
    pub target: Option<EntityNum>,
    pub inflictor: Option<EntityNum>,
    pub attacker: Option<EntityNum>,
    pub damage: i32,
    #[serde(default)]
    pub dflags: i32,
    pub means_of_death: i32,
    pub weapon: u32,
    #[serde(default)]
    pub is_alternate: bool,
    #[serde(default)]
    pub point: Option<[f32; 3]>,
    #[serde(default)]
    pub dir: Option<[f32; 3]>,
    pub hit_loc: u32,
    #[serde(default)]
    pub time_offset: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KilledArgs {
    pub target: Option<EntityNum>,
    pub inflictor: Option<EntityNum>,
    pub attacker: Option<EntityNum>,
    pub damage: i32,
    pub means_of_death: i32,
    pub weapon: u32,
    #[serde(default)]
    pub is_alternate: bool,
    #[serde(default)]
    pub dir: Option<[f32; 3]>,
    pub hit_loc: u32,
    #[serde(default)]
    pub ps_time_offset: i32,
    #[serde(default)]
    pub death_anim_duration: i32,
}

/// A client command as seen by the server: `argv(0)` plus the remaining
/// arguments joined the way the engine concatenates them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientCommand {
    pub client_num: EntityNum,
    pub name: String,
    #[serde(default)]
    pub args: String,
}

/// Whether a stub let the native continuation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookResult {
    Forwarded,
    Absorbed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    #[serde(default)]
    pub entity: Option<EntityRef>,
    #[serde(default)]
    pub arguments: Vec<VmValue>,
}

impl Event {
    pub fn new(name: impl Into<String>, arguments: Vec<VmValue>) -> Self {
        Self {
            name: name.into(),
            entity: None,
            arguments,
        }
    }

    pub fn on_entity(entity: EntityRef, name: impl Into<String>, arguments: Vec<VmValue>) -> Self {
        Self {
            name: name.into(),
            entity: Some(entity),
            arguments,
        }
    }
}
