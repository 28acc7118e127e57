//! Value marshalling across the sandbox boundary
//!
//! Marshal-in turns a host value plus its declared tag into the raw wasm
//! argument: numbers pass through untouched, text and arrays are written
//! into a fresh reservation whose offset becomes the argument. Marshal-out
//! is the reverse for a raw result. Nothing here frees memory it did not
//! reserve: text returned by the module stays module-owned, and only the
//! reservations of the current call are eligible for release afterwards.

use wasmtime::{Memory, Store, Val, ValType};

use crate::alloc::{ModuleAllocator, Reservation};
use crate::error::{BridgeError, BridgeResult};
use crate::runtime::State;
use crate::value::{ElemType, TypeTag, Value};
use crate::view::{HeapView, HeapViewMut};

/// A marshalled argument before coercion to the callee's parameter type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawArg {
    Num(f64),
    Ptr(u32),
}

impl RawArg {
    /// Coerce to the exact parameter type of the callee. Numerics narrow
    /// with truncation; pointers only fit integer parameters.
    pub fn to_val(self, ty: &ValType) -> BridgeResult<Val> {
        match (self, ty) {
            (RawArg::Num(n), ValType::I32) => Ok(Val::I32(n as i64 as i32)),
            (RawArg::Num(n), ValType::I64) => Ok(Val::I64(n as i64)),
            (RawArg::Num(n), ValType::F32) => Ok(Val::F32((n as f32).to_bits())),
            (RawArg::Num(n), ValType::F64) => Ok(Val::F64(n.to_bits())),
            (RawArg::Ptr(p), ValType::I32) => Ok(Val::I32(p as i32)),
            (RawArg::Ptr(p), ValType::I64) => Ok(Val::I64(p as i64)),
            (raw, ty) => Err(BridgeError::TypeMismatch(format!(
                "{:?} argument cannot map to a {:?} parameter",
                raw, ty
            ))),
        }
    }
}

/// Convert one host value for the call. Returns the raw argument and, for
/// memory-backed tags, the reservation now holding the bytes. The caller
/// owns that reservation and must release it once the call completes.
pub fn marshal_in(
    store: &mut Store<State>,
    memory: &Memory,
    allocator: Option<&ModuleAllocator>,
    tag: &TypeTag,
    value: &Value,
) -> BridgeResult<(RawArg, Option<Reservation>)> {
    match (tag, value) {
        (TypeTag::Number, Value::Number(n)) => Ok((RawArg::Num(*n), None)),
        (TypeTag::Number, Value::Offset(offset)) => Ok((RawArg::Ptr(*offset), None)),
        (TypeTag::Text, Value::Text(text)) => {
            let allocator = require_allocator(allocator)?;
            let len = text.len() + 1;
            let reservation = allocator.reserve(&mut *store, len)?;
            let mut view = HeapViewMut::new(memory.data_mut(&mut *store));
            match view.write_cstr(reservation.offset, text, len) {
                Ok(_) => Ok((RawArg::Ptr(reservation.offset), Some(reservation))),
                Err(err) => {
                    allocator.release(store, reservation.offset);
                    Err(err)
                }
            }
        }
        (TypeTag::Array(elem), Value::Array(values)) => {
            let allocator = require_allocator(allocator)?;
            let len = values
                .len()
                .checked_mul(elem.width())
                .ok_or(BridgeError::OutOfMemory {
                    requested: usize::MAX,
                })?;
            // A zero-length array still needs a distinct, valid pointer.
            let reservation = allocator.reserve(&mut *store, len.max(1))?;
            let mut view = HeapViewMut::new(memory.data_mut(&mut *store));
            match view.write_slice(reservation.offset, *elem, values) {
                Ok(()) => Ok((RawArg::Ptr(reservation.offset), Some(reservation))),
                Err(err) => {
                    allocator.release(store, reservation.offset);
                    Err(err)
                }
            }
        }
        (tag, value) => Err(BridgeError::TypeMismatch(format!(
            "{} argument expected, got a {} value",
            tag,
            value.kind()
        ))),
    }
}

/// Convert the raw result back to a host value per the declared return tag.
pub fn marshal_out(
    store: &Store<State>,
    memory: &Memory,
    tag: Option<&TypeTag>,
    raw: Option<&Val>,
) -> BridgeResult<Value> {
    match (tag, raw) {
        (None, _) => Ok(Value::Unit),
        (Some(TypeTag::Number), Some(val)) => Ok(Value::Number(val_to_f64(val)?)),
        (Some(TypeTag::Text), Some(val)) => {
            let offset = val_to_offset(val)?;
            let view = HeapView::new(memory.data(store));
            Ok(Value::Text(view.read_cstr(offset)?))
        }
        // The element count of a returned array is call-site context, never
        // inferred from sandbox data; hand the pointer back for a
        // `read_array` over the known range.
        (Some(TypeTag::Array(_)), Some(val)) => Ok(Value::Offset(val_to_offset(val)?)),
        (Some(tag), None) => Err(BridgeError::TypeMismatch(format!(
            "export produced no result for a {} return",
            tag
        ))),
    }
}

/// Snapshot-copy a returned array once its element count is known.
pub fn read_array(
    view: &HeapView<'_>,
    offset: u32,
    elem: ElemType,
    count: usize,
) -> BridgeResult<Vec<f64>> {
    view.slice_copy(offset, elem, count)
}

fn require_allocator(allocator: Option<&ModuleAllocator>) -> BridgeResult<&ModuleAllocator> {
    allocator.ok_or_else(|| BridgeError::UnknownSymbol("allocate".to_string()))
}

fn val_to_f64(val: &Val) -> BridgeResult<f64> {
    match val {
        Val::I32(v) => Ok(*v as f64),
        Val::I64(v) => Ok(*v as f64),
        Val::F32(bits) => Ok(f32::from_bits(*bits) as f64),
        Val::F64(bits) => Ok(f64::from_bits(*bits)),
        _ => Err(BridgeError::TypeMismatch(
            "reference result cannot convert to a number".to_string(),
        )),
    }
}

fn val_to_offset(val: &Val) -> BridgeResult<u32> {
    match val {
        Val::I32(v) => Ok(*v as u32),
        _ => Err(BridgeError::TypeMismatch(
            "result is not an offset-sized integer".to_string(),
        )),
    }
}
