//! Process memory access: player position, heading and camera transform

pub mod process;
pub mod reader;
pub mod snapshot;

pub use process::TargetProcessProvider;
pub use reader::{MemoryReadError, MemoryReader, ModuleInfo, ProcessMemory, ProcessProvider, Signature};
pub use snapshot::{CameraTransform, GameSnapshot};
