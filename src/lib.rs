pub mod address;
pub mod config;
pub mod constants;
pub mod error;
pub mod frames;
pub mod io;
pub mod memory;
pub mod trace;
pub mod translation;
pub mod vm_manager;

// Re-export commonly used items for convenience
pub use config::MemoryConfig;
pub use constants::Word;
pub use error::{Result, VmError};
pub use memory::{FrameIndex, PhysicalStore, SimulatedMemory};
pub use trace::{PmEvent, Trace};
pub use translation::Translation;
pub use vm_manager::VmManager;
