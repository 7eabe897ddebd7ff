pub mod error;
pub mod graph;
pub mod host;
pub mod native;
pub mod options;
pub mod value;
pub mod vm;

pub use error::BridgeError;
pub use graph::*;
pub use host::HostVm;
pub use native::*;
pub use options::BridgeOptions;
pub use value::*;
pub use vm::*;
