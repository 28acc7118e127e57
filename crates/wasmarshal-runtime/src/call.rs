//! Bound callables over module exports
//!
//! An invocation walks a fixed sequence: reserve-and-marshal each argument
//! in declared order, call the raw export, marshal the result, then release
//! every reservation recorded on the way in. The release step runs
//! unconditionally — a trap in the export or a failed reservation for a
//! later argument still releases whatever was already reserved.

use wasmtime::{Func, Val, ValType};

use crate::alloc::Reservation;
use crate::error::{BridgeError, BridgeResult};
use crate::marshal;
use crate::runtime::LinkedModule;
use crate::value::{TypeTag, Value};

/// An immutable binding of an exported symbol with its declared return and
/// argument tags. Created once, invoked any number of times; holds no state
/// between invocations.
pub struct BoundFunction {
    symbol: String,
    func: Func,
    ret: Option<TypeTag>,
    params: Vec<TypeTag>,
    param_types: Vec<ValType>,
    result_arity: usize,
}

impl BoundFunction {
    /// Resolve `symbol` and check the declared tags against the export's
    /// actual signature. Everything that can be rejected is rejected here,
    /// before any invocation touches memory.
    pub fn bind(
        module: &mut LinkedModule,
        symbol: &str,
        ret: Option<TypeTag>,
        params: &[TypeTag],
    ) -> BridgeResult<Self> {
        let func = module
            .instance
            .get_func(&mut module.store, symbol)
            .ok_or_else(|| BridgeError::UnknownSymbol(symbol.to_string()))?;
        let ty = func.ty(&module.store);
        let param_types: Vec<ValType> = ty.params().collect();
        if param_types.len() != params.len() {
            return Err(BridgeError::ArityMismatch {
                symbol: symbol.to_string(),
                expected: param_types.len(),
                actual: params.len(),
            });
        }
        for (index, (tag, param)) in params.iter().zip(&param_types).enumerate() {
            let compatible = match tag {
                TypeTag::Number => matches!(
                    param,
                    ValType::I32 | ValType::I64 | ValType::F32 | ValType::F64
                ),
                // Memory-backed arguments cross as wasm32 pointers.
                TypeTag::Text | TypeTag::Array(_) => matches!(param, ValType::I32),
            };
            if !compatible {
                return Err(BridgeError::TypeMismatch(format!(
                    "argument {} of '{}': {} cannot map to a {:?} parameter",
                    index, symbol, tag, param
                )));
            }
        }
        let result_types: Vec<ValType> = ty.results().collect();
        let declared_results = usize::from(ret.is_some());
        if result_types.len() != declared_results {
            return Err(BridgeError::TypeMismatch(format!(
                "'{}' produces {} results but the binding declares {}",
                symbol,
                result_types.len(),
                declared_results
            )));
        }
        if matches!(ret, Some(TypeTag::Text) | Some(TypeTag::Array(_)))
            && !matches!(result_types[0], ValType::I32)
        {
            return Err(BridgeError::TypeMismatch(format!(
                "'{}' result {:?} cannot carry an offset return",
                symbol, result_types[0]
            )));
        }
        Ok(Self {
            symbol: symbol.to_string(),
            func,
            ret,
            params: params.to_vec(),
            param_types,
            result_arity: result_types.len(),
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Run one invocation. Synchronous and run-to-completion: the mutable
    /// borrow of the module keeps the reservations made here exclusively
    /// owned until the final release.
    pub fn invoke(&self, module: &mut LinkedModule, args: &[Value]) -> BridgeResult<Value> {
        if args.len() != self.params.len() {
            return Err(BridgeError::ArityMismatch {
                symbol: self.symbol.clone(),
                expected: self.params.len(),
                actual: args.len(),
            });
        }
        log::debug!("invoking '{}' with {} arguments", self.symbol, args.len());

        let mut raw_args: Vec<Val> = Vec::with_capacity(args.len());
        let mut reserved: Vec<Reservation> = Vec::new();
        let mut failure: Option<BridgeError> = None;
        for (index, (tag, value)) in self.params.iter().zip(args).enumerate() {
            let marshalled = marshal::marshal_in(
                &mut module.store,
                &module.memory,
                module.allocator.as_ref(),
                tag,
                value,
            )
            .and_then(|(raw, reservation)| {
                if let Some(reservation) = reservation {
                    reserved.push(reservation);
                }
                raw.to_val(&self.param_types[index])
            });
            match marshalled {
                Ok(val) => raw_args.push(val),
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        let outcome = match failure {
            Some(err) => Err(err),
            None => {
                let mut results = vec![Val::I32(0); self.result_arity];
                match self.func.call(&mut module.store, &raw_args, &mut results) {
                    Ok(()) => marshal::marshal_out(
                        &module.store,
                        &module.memory,
                        self.ret.as_ref(),
                        results.first(),
                    ),
                    Err(trap) => Err(BridgeError::Wasm(trap)),
                }
            }
        };

        // Release everything reserved above, on success and failure alike.
        if let Some(allocator) = &module.allocator {
            for reservation in &reserved {
                allocator.release(&mut module.store, reservation.offset);
            }
        }
        outcome
    }
}

/// A symbol binding declared before its module instance exists.
///
/// Mirrors loading an export discovered only after an asynchronous link
/// step: the inner binding starts empty and is populated exactly once by
/// [`DeferredBinding::resolve`]. Invoking earlier fails with `NotReady`.
pub struct DeferredBinding {
    symbol: String,
    ret: Option<TypeTag>,
    params: Vec<TypeTag>,
    bound: Option<BoundFunction>,
}

impl DeferredBinding {
    pub fn new(symbol: impl Into<String>, ret: Option<TypeTag>, params: Vec<TypeTag>) -> Self {
        Self {
            symbol: symbol.into(),
            ret,
            params,
            bound: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.bound.is_some()
    }

    /// Bind against the now-ready instance. Idempotent: once populated the
    /// binding never changes.
    pub fn resolve(&mut self, module: &mut LinkedModule) -> BridgeResult<()> {
        if self.bound.is_none() {
            self.bound = Some(BoundFunction::bind(
                module,
                &self.symbol,
                self.ret,
                &self.params,
            )?);
        }
        Ok(())
    }

    pub fn invoke(&self, module: &mut LinkedModule, args: &[Value]) -> BridgeResult<Value> {
        match &self.bound {
            Some(bound) => bound.invoke(module, args),
            None => Err(BridgeError::NotReady(self.symbol.clone())),
        }
    }
}
