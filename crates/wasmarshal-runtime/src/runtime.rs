//! A linked module instance and its call surface

use anyhow::anyhow;
use wasmtime::{Instance, Memory, Module, Store, StoreLimits, StoreLimitsBuilder};

use crate::alloc::{ModuleAllocator, Reservation};
use crate::call::BoundFunction;
use crate::error::{BridgeError, BridgeResult};
use crate::value::{ElemType, TypeTag, Value};
use crate::view::{HeapView, HeapViewMut};

/// Size of one linear-memory page.
pub const PAGE_SIZE: usize = 0x10000;

/// Export invoked by [`LinkedModule::run_main`].
pub const MAIN_SYMBOL: &str = "main";

/// Conventional argv[0] handed to a module entrypoint.
const ARGV0: &str = "wasmarshal";

/// Host-side store state: resource limits plus a failure flag the default
/// `abort` import raises.
pub struct State {
    pub(crate) limits: StoreLimits,
    pub(crate) had_failure: bool,
}

impl State {
    pub fn new() -> Self {
        State {
            limits: StoreLimitsBuilder::new()
                .memories(usize::MAX)
                .tables(usize::MAX)
                .instances(usize::MAX)
                .build(),
            had_failure: false,
        }
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

/// A live module instance: the store, the instance, its linear memory and
/// (when exported) its allocator. Produced once by the linker and never
/// rebound; all calls go through `&mut self`, which is what makes every
/// invocation run-to-completion with exclusive ownership of the heap.
pub struct LinkedModule {
    pub(crate) module: Module,
    pub(crate) store: Store<State>,
    pub(crate) instance: Instance,
    pub(crate) memory: Memory,
    pub(crate) allocator: Option<ModuleAllocator>,
}

impl LinkedModule {
    /// One-shot call: bind `symbol` and invoke it immediately.
    pub fn call(
        &mut self,
        symbol: &str,
        ret: Option<TypeTag>,
        params: &[TypeTag],
        args: &[Value],
    ) -> BridgeResult<Value> {
        let bound = BoundFunction::bind(self, symbol, ret, params)?;
        bound.invoke(self, args)
    }

    /// Bind `symbol` once for repeated invocation.
    pub fn bind(
        &mut self,
        symbol: &str,
        ret: Option<TypeTag>,
        params: &[TypeTag],
    ) -> BridgeResult<BoundFunction> {
        BoundFunction::bind(self, symbol, ret, params)
    }

    /// Reserve `len` bytes in the module heap.
    pub fn reserve(&mut self, len: usize) -> BridgeResult<Reservation> {
        match &self.allocator {
            Some(allocator) => allocator.reserve(&mut self.store, len),
            None => Err(BridgeError::UnknownSymbol("allocate".to_string())),
        }
    }

    /// Release a previously reserved offset.
    pub fn release(&mut self, offset: u32) -> BridgeResult<()> {
        match &self.allocator {
            Some(allocator) => {
                allocator.release(&mut self.store, offset);
                Ok(())
            }
            None => Err(BridgeError::UnknownSymbol("release".to_string())),
        }
    }

    /// Read-only view of linear memory, valid for this borrow only.
    pub fn view(&self) -> HeapView<'_> {
        HeapView::new(self.memory.data(&self.store))
    }

    /// Mutable view of linear memory, valid for this borrow only.
    pub fn view_mut(&mut self) -> HeapViewMut<'_> {
        HeapViewMut::new(self.memory.data_mut(&mut self.store))
    }

    /// Decode NUL-terminated UTF-8 at `offset`.
    pub fn read_text(&self, offset: u32) -> BridgeResult<String> {
        self.view().read_cstr(offset)
    }

    /// Write `text` at `offset`, capped at `max_len` bytes with terminator.
    pub fn write_text(&mut self, offset: u32, text: &str, max_len: usize) -> BridgeResult<usize> {
        self.view_mut().write_cstr(offset, text, max_len)
    }

    /// Snapshot-copy `count` cells from `offset`.
    pub fn slice_copy(&self, offset: u32, elem: ElemType, count: usize) -> BridgeResult<Vec<f64>> {
        self.view().slice_copy(offset, elem, count)
    }

    /// Write a run of cells starting at `offset`.
    pub fn write_slice(&mut self, offset: u32, elem: ElemType, values: &[f64]) -> BridgeResult<()> {
        self.view_mut().write_slice(offset, elem, values)
    }

    /// Current byte length of linear memory.
    pub fn memory_size(&self) -> usize {
        self.memory.data_size(&self.store)
    }

    /// Grow linear memory by `pages`, returning the previous page count.
    /// Any view derived before this call is gone; re-derive to observe the
    /// same bytes at the same offsets in the new backing store.
    pub fn grow(&mut self, pages: u64) -> BridgeResult<u64> {
        Ok(self.memory.grow(&mut self.store, pages)?)
    }

    /// Names of the module's callable exports.
    pub fn exports(&self) -> Vec<String> {
        self.module
            .exports()
            .filter(|export| matches!(export.ty(), wasmtime::ExternType::Func(_)))
            .map(|export| export.name().to_string())
            .collect()
    }

    /// Whether the module signalled failure through the `abort` import.
    pub fn had_failure(&self) -> bool {
        self.store.data().had_failure
    }

    /// Invoke the module's `main(argc, argv)` entrypoint. Each argument is
    /// marshalled as a NUL-terminated string, the pointer table as an array
    /// of 32-bit offsets; a fixed program name is prepended as argv[0], so
    /// `args` arrives as argv[1..]. Every reservation is released before
    /// returning, on the trap path included.
    pub fn run_main(&mut self, args: &[&str]) -> BridgeResult<i32> {
        let func = self
            .instance
            .get_func(&mut self.store, MAIN_SYMBOL)
            .ok_or_else(|| BridgeError::UnknownSymbol(MAIN_SYMBOL.to_string()))?;
        let main = func
            .typed::<(i32, i32), i32>(&self.store)
            .map_err(|err| BridgeError::TypeMismatch(format!("'main': {}", err)))?;

        let mut reserved: Vec<Reservation> = Vec::new();
        let outcome = self
            .marshal_argv(args, &mut reserved)
            .and_then(|(argc, argv)| {
                log::debug!("running main with argc {}", argc);
                main.call(&mut self.store, (argc, argv))
                    .map_err(BridgeError::Wasm)
            });
        if let Some(allocator) = &self.allocator {
            for reservation in &reserved {
                allocator.release(&mut self.store, reservation.offset);
            }
        }
        outcome
    }

    fn marshal_argv(
        &mut self,
        args: &[&str],
        reserved: &mut Vec<Reservation>,
    ) -> BridgeResult<(i32, i32)> {
        let mut argv: Vec<&str> = Vec::with_capacity(args.len() + 1);
        argv.push(ARGV0);
        argv.extend_from_slice(args);

        let mut pointers: Vec<f64> = Vec::with_capacity(argv.len());
        for arg in &argv {
            let reservation = self.reserve(arg.len() + 1)?;
            reserved.push(reservation);
            self.write_text(reservation.offset, arg, arg.len() + 1)?;
            pointers.push(reservation.offset as f64);
        }
        let table = self.reserve(pointers.len() * 4)?;
        reserved.push(table);
        self.write_slice(table.offset, ElemType::U32, &pointers)?;
        Ok((argv.len() as i32, table.offset as i32))
    }

    /// The raw instance, for embedders that need exports this surface does
    /// not model.
    pub fn instance(&self) -> Instance {
        self.instance
    }

    /// Read a global exported by the module as a host numeric.
    pub fn read_global(&mut self, name: &str) -> BridgeResult<f64> {
        let global = self
            .instance
            .get_global(&mut self.store, name)
            .ok_or_else(|| BridgeError::UnknownSymbol(name.to_string()))?;
        match global.get(&mut self.store) {
            wasmtime::Val::I32(v) => Ok(v as f64),
            wasmtime::Val::I64(v) => Ok(v as f64),
            wasmtime::Val::F32(bits) => Ok(f32::from_bits(bits) as f64),
            wasmtime::Val::F64(bits) => Ok(f64::from_bits(bits)),
            _ => Err(BridgeError::Wasm(anyhow!(
                "global '{}' is not numeric",
                name
            ))),
        }
    }
}
