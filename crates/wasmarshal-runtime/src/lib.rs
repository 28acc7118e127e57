//! Host-side bridge to a WebAssembly module's linear memory
//!
//! Everything a host needs to call into a sandboxed module with typed
//! arguments and get typed results back: typed views over the module's
//! linear memory, a facade over its exported allocator, the value
//! marshaller that moves numbers, text and arrays across the boundary, a
//! call facade pairing every reservation with a release, and a linker
//! covering both the module-owns-memory and host-supplies-memory layouts.

// Core modules
pub mod alloc;
pub mod call;
pub mod error;
pub mod link;
pub mod marshal;
pub mod runtime;
pub mod value;
pub mod view;

#[cfg(test)]
pub mod tests;

// Re-export core types
pub use alloc::{ModuleAllocator, Reservation};
pub use call::{BoundFunction, DeferredBinding};
pub use error::{BridgeError, BridgeResult};
pub use link::{MemoryConfig, ModuleLinker, TableConfig};
pub use marshal::{marshal_in, marshal_out, read_array, RawArg};
pub use runtime::{LinkedModule, State, MAIN_SYMBOL, PAGE_SIZE};
pub use value::{ElemType, NumKind, TypeTag, Value};
pub use view::{HeapView, HeapViewMut};
