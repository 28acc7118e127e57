//! Import resolution and module instantiation
//!
//! The linker collects the import table — host functions plus, in the
//! host-supplied topology, a pre-created memory and indirect-call table —
//! and consumes itself to produce a [`LinkedModule`]. Imports are consulted
//! exactly once, at instantiation. A missing import or a malformed binary is
//! a `Link` failure: fatal for the attempt, never retried here.

use std::path::Path;

use serde::{Deserialize, Serialize};
use wasmtime::{
    Caller, Config, Engine, Linker, Memory, MemoryType, Module, Store, Table, TableType, Val,
    ValType,
};

use crate::alloc::ModuleAllocator;
use crate::error::{BridgeError, BridgeResult};
use crate::runtime::{LinkedModule, State};
use crate::view::HeapView;

/// Host-supplied linear memory, sized in 64 KiB pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryConfig {
    pub initial_pages: u32,
    pub maximum_pages: Option<u32>,
}

/// Host-supplied indirect-call table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    pub initial_entries: u32,
    pub maximum_entries: Option<u32>,
}

/// Builder for one instantiation attempt.
pub struct ModuleLinker {
    engine: Engine,
    store: Store<State>,
    linker: Linker<State>,
    host_memory: Option<Memory>,
}

impl ModuleLinker {
    pub fn new() -> BridgeResult<Self> {
        let engine = Engine::new(&Config::default())?;
        let mut store = Store::<State>::new(&engine, State::new());
        store.limiter(|state| &mut state.limits);
        let linker = Linker::<State>::new(&engine);
        Ok(Self {
            engine,
            store,
            linker,
            host_memory: None,
        })
    }

    /// Register one host function under `(namespace, name)`.
    pub fn func_wrap<Params, Results>(
        &mut self,
        namespace: &str,
        name: &str,
        func: impl wasmtime::IntoFunc<State, Params, Results>,
    ) -> BridgeResult<&mut Self> {
        self.linker
            .func_wrap(namespace, name, func)
            .map_err(|err| BridgeError::Link(format!("failed to define {}.{}: {}", namespace, name, err)))?;
        Ok(self)
    }

    /// Register the stock host imports: `env.host_log`, which reads a
    /// NUL-terminated string out of the caller's memory and forwards it to
    /// the host log, and `env.abort`, which raises the failure flag.
    pub fn define_host_defaults(&mut self) -> BridgeResult<&mut Self> {
        self.func_wrap("env", "host_log", |mut caller: Caller<'_, State>, ptr: i32| {
            let memory = match caller.get_export("memory") {
                Some(export) => match export.into_memory() {
                    Some(memory) => memory,
                    None => return,
                },
                None => return,
            };
            if let Ok(text) = HeapView::new(memory.data(&caller)).read_cstr(ptr as u32) {
                log::info!(target: "guest", "{}", text);
            }
        })?;
        self.func_wrap("env", "abort", |mut caller: Caller<'_, State>| {
            caller.data_mut().had_failure = true;
        })?;
        Ok(self)
    }

    /// Create host-owned linear memory and offer it to the module as
    /// `env.memory`. Offset 0 of this memory is a perfectly usable address.
    pub fn provide_memory(&mut self, config: MemoryConfig) -> BridgeResult<Memory> {
        let ty = MemoryType::new(config.initial_pages, config.maximum_pages);
        let memory = Memory::new(&mut self.store, ty)
            .map_err(|err| BridgeError::Link(format!("failed to create host memory: {}", err)))?;
        self.linker
            .define(&self.store, "env", "memory", memory)
            .map_err(|err| BridgeError::Link(format!("failed to define env.memory: {}", err)))?;
        self.host_memory = Some(memory);
        Ok(memory)
    }

    /// Create a host-owned indirect-call table and offer it as `env.table`.
    pub fn provide_table(&mut self, config: TableConfig) -> BridgeResult<Table> {
        let ty = TableType::new(ValType::FuncRef, config.initial_entries, config.maximum_entries);
        let table = Table::new(&mut self.store, ty, Val::FuncRef(None))
            .map_err(|err| BridgeError::Link(format!("failed to create host table: {}", err)))?;
        self.linker
            .define(&self.store, "env", "table", table)
            .map_err(|err| BridgeError::Link(format!("failed to define env.table: {}", err)))?;
        Ok(table)
    }

    /// Read a module binary from disk and link it. The read is the only
    /// suspension point; compilation and instantiation run synchronously.
    pub async fn link_file(self, path: impl AsRef<Path>) -> BridgeResult<LinkedModule> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|err| {
            BridgeError::Link(format!("failed to read module {}: {}", path.display(), err))
        })?;
        self.link_bytes(&bytes)
    }

    /// Link a module from bytes (binary or text form).
    pub fn link_bytes(mut self, bytes: impl AsRef<[u8]>) -> BridgeResult<LinkedModule> {
        let module = Module::new(&self.engine, bytes)
            .map_err(|err| BridgeError::Link(format!("malformed module: {}", err)))?;
        let instance = self
            .linker
            .instantiate(&mut self.store, &module)
            .map_err(|err| BridgeError::Link(format!("instantiation failed: {}", err)))?;

        // Self-contained topology exports its memory; host-supplied uses
        // the one defined above. A module with neither has no heap for the
        // marshalling layer to target.
        let memory = match instance.get_memory(&mut self.store, "memory") {
            Some(memory) => memory,
            None => match self.host_memory {
                Some(memory) => memory,
                None => return Err(BridgeError::Link("module has no linear memory".to_string())),
            },
        };
        let allocator = ModuleAllocator::from_instance(&mut self.store, &instance);
        log::info!(
            "linked module: {} exports, {} bytes of memory, allocator {}",
            module.exports().len(),
            memory.data_size(&self.store),
            if allocator.is_some() { "present" } else { "absent" }
        );
        Ok(LinkedModule {
            module,
            store: self.store,
            instance,
            memory,
            allocator,
        })
    }
}
