//! fleetsim Registry - the device registry boundary
//!
//! The simulator only ever talks to a registry through [`DeviceRegistry`]:
//! fetch an entry, create one, update its tags, and read its credential.
//! [`MemoryRegistry`] is a concurrent in-process implementation.

pub mod error;
pub mod memory;
pub mod registry;

pub use error::{RegistryError, Result};
pub use memory::MemoryRegistry;
pub use registry::{DeviceRegistry, RegistryEntry, SymmetricKey, Tags, ANY_ETAG};
