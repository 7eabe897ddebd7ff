//! Table-driven [`HostVm`] used by the replay CLI and the tests.
//!
//! Name lookups come from static tables; commands and VM thread launches are
//! recorded instead of executed.

use std::cell::RefCell;
use std::collections::BTreeMap;

use hb_core::{CodePos, EntityNum, EntityRef, HostVm, SharedGraph, VmValue};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HostTables {
    pub means_of_death: Vec<String>,
    pub hit_locations: Vec<String>,
    pub weapons: BTreeMap<u32, String>,
    /// Symbol names preloaded into the graph's symbol table.
    pub symbols: BTreeMap<String, u32>,
    /// Number of client entities to allocate.
    pub clients: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThreadCall {
    pub entity: EntityRef,
    pub pos: CodePos,
    pub args: Vec<VmValue>,
}

pub struct TableHost {
    tables: HostTables,
    level: EntityRef,
    clients: Vec<EntityRef>,
    commands: RefCell<Vec<(String, bool)>>,
    threads: RefCell<Vec<ThreadCall>>,
    thread_result: RefCell<VmValue>,
}

impl TableHost {
    pub fn new(graph: &SharedGraph, tables: HostTables) -> Self {
        let mut graph = graph.borrow_mut();
        for (name, id) in &tables.symbols {
            graph.symbols_mut().insert(name.clone(), *id);
        }
        let level = graph.alloc_entity();
        let clients = (0..tables.clients).map(|_| graph.alloc_entity()).collect();
        Self {
            tables,
            level,
            clients,
            commands: RefCell::new(Vec::new()),
            threads: RefCell::new(Vec::new()),
            thread_result: RefCell::new(VmValue::None),
        }
    }

    pub fn entity(&self, entity_num: EntityNum) -> Option<EntityRef> {
        self.clients.get(usize::from(entity_num)).copied()
    }

    pub fn set_thread_result(&self, value: VmValue) {
        *self.thread_result.borrow_mut() = value;
    }

    pub fn commands(&self) -> Vec<(String, bool)> {
        self.commands.borrow().clone()
    }

    pub fn take_commands(&self) -> Vec<(String, bool)> {
        std::mem::take(&mut *self.commands.borrow_mut())
    }

    pub fn threads(&self) -> Vec<ThreadCall> {
        self.threads.borrow().clone()
    }
}

impl HostVm for TableHost {
    fn level_entity(&self) -> EntityRef {
        self.level
    }

    fn entity_by_num(&self, entity_num: EntityNum) -> Option<EntityRef> {
        self.entity(entity_num)
    }

    fn means_of_death_name(&self, means_of_death: i32) -> Option<String> {
        usize::try_from(means_of_death)
            .ok()
            .and_then(|index| self.tables.means_of_death.get(index))
            .cloned()
    }

    fn hit_location_name(&self, hit_loc: u32) -> Option<String> {
        self.tables.hit_locations.get(hit_loc as usize).cloned()
    }

    fn weapon_name(&self, weapon: u32, is_alternate: bool) -> String {
        let name = self
            .tables
            .weapons
            .get(&weapon)
            .cloned()
            .unwrap_or_else(|| format!("weapon_{}", weapon));
        if is_alternate {
            format!("alt_{}", name)
        } else {
            name
        }
    }

    fn exec_thread(&self, entity: EntityRef, pos: CodePos, args: &[VmValue]) -> VmValue {
        self.threads.borrow_mut().push(ThreadCall {
            entity,
            pos,
            args: args.to_vec(),
        });
        self.thread_result.borrow().clone()
    }

    fn execute_command(&self, text: &str, immediate: bool) {
        self.commands.borrow_mut().push((text.to_string(), immediate));
    }
}
