//! Facade over the module's own allocation exports
//!
//! The module owns the heap; this side only forwards. A reservation is a
//! plain (offset, length) handle with manual lifetime: exactly one `release`
//! per `reserve`, no reference counting. Releasing an offset that is not
//! currently held, or touching a released reservation, is a caller error
//! with undefined downstream effects — bytes may be handed out again by a
//! later reservation.

use wasmtime::{Instance, Store, TypedFunc};

use crate::error::{BridgeError, BridgeResult};
use crate::runtime::State;

/// A buffer reserved inside the module's heap for the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    pub offset: u32,
    pub len: u32,
}

/// Handles to the module's exported `allocate`/`release` pair.
///
/// Emscripten-style modules export the same surface as `malloc`/`free`;
/// both spellings are accepted at lookup time.
pub struct ModuleAllocator {
    reserve_fn: TypedFunc<i32, i32>,
    release_fn: TypedFunc<i32, ()>,
}

impl ModuleAllocator {
    /// Locate the allocation exports. `None` means the module supports
    /// number-only calls: nothing that needs guest memory can be marshalled.
    pub fn from_instance(store: &mut Store<State>, instance: &Instance) -> Option<Self> {
        let reserve_fn = instance
            .get_typed_func::<i32, i32>(&mut *store, "allocate")
            .or_else(|_| instance.get_typed_func::<i32, i32>(&mut *store, "malloc"))
            .ok()?;
        let release_fn = instance
            .get_typed_func::<i32, ()>(&mut *store, "release")
            .or_else(|_| instance.get_typed_func::<i32, ()>(&mut *store, "free"))
            .ok()?;
        Some(Self {
            reserve_fn,
            release_fn,
        })
    }

    /// Reserve `len` bytes in the module heap. The module signals exhaustion
    /// by returning offset 0, which is never a valid allocation.
    pub fn reserve(&self, store: &mut Store<State>, len: usize) -> BridgeResult<Reservation> {
        if len == 0 || len > i32::MAX as usize {
            return Err(BridgeError::OutOfMemory { requested: len });
        }
        let offset = self.reserve_fn.call(&mut *store, len as i32)?;
        if offset == 0 {
            return Err(BridgeError::OutOfMemory { requested: len });
        }
        log::trace!("reserved {} bytes at offset {}", len, offset);
        Ok(Reservation {
            offset: offset as u32,
            len: len as u32,
        })
    }

    /// Hand `offset` back to the module allocator. Fire-and-forget: a trap
    /// in the release routine is logged and swallowed, matching the
    /// minimal-cost allocator contract.
    pub fn release(&self, store: &mut Store<State>, offset: u32) {
        if let Err(trap) = self.release_fn.call(&mut *store, offset as i32) {
            log::warn!("release of offset {} trapped: {}", offset, trap);
        } else {
            log::trace!("released offset {}", offset);
        }
    }
}
