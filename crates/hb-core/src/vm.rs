use serde::{Deserialize, Serialize};

use crate::value::{CodePos, ObjectId, VmValue};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackEntry {
    EndOfArguments,
    Value(VmValue),
}

/// Snapshot of the host VM at the instruction being dispatched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionState {
    pub instruction: CodePos,
    pub local_id: ObjectId,
    /// Native argument stack, bottom first.
    pub stack: Vec<StackEntry>,
}

impl ExecutionState {
    /// Values from the stack top down to the nearest end-of-arguments marker.
    pub fn arguments(&self) -> impl Iterator<Item = &VmValue> {
        self.stack
            .iter()
            .rev()
            .map_while(|entry| match entry {
                StackEntry::Value(value) => Some(value),
                StackEntry::EndOfArguments => None,
            })
    }
}
