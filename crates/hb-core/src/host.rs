use crate::native::EntityNum;
use crate::value::{CodePos, EntityRef, VmValue};

/// Services of the host process the bridge calls into.
///
/// All methods run on the host's execution thread. Implementations may call
/// back into the bridge (for example `exec_thread` running VM code that hits
/// an intercepted position), so they must not hold borrows of shared state
/// across those calls.
pub trait HostVm {
    fn level_entity(&self) -> EntityRef;

    fn entity_by_num(&self, entity_num: EntityNum) -> Option<EntityRef>;

    fn means_of_death_name(&self, means_of_death: i32) -> Option<String>;

    fn hit_location_name(&self, hit_loc: u32) -> Option<String>;

    fn weapon_name(&self, weapon: u32, is_alternate: bool) -> String;

    /// Runs a VM thread at `pos` on `entity` and returns its result.
    fn exec_thread(&self, entity: EntityRef, pos: CodePos, args: &[VmValue]) -> VmValue;

    fn execute_command(&self, text: &str, immediate: bool);
}
