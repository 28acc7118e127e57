//! Marshalling both directions against the fixture guest

use wasmtime::Val;

use crate::error::BridgeError;
use crate::marshal::{marshal_in, marshal_out, read_array, RawArg};
use crate::tests::support::{link_fixture, live_allocations};
use crate::value::{ElemType, TypeTag, Value};
use crate::view::HeapView;

#[test]
fn number_passes_through_without_memory() {
    let mut module = link_fixture();
    let (raw, reservation) = marshal_in(
        &mut module.store,
        &module.memory,
        module.allocator.as_ref(),
        &TypeTag::Number,
        &Value::Number(99.5),
    )
    .unwrap();
    assert_eq!(raw, RawArg::Num(99.5));
    assert!(reservation.is_none());
    assert_eq!(live_allocations(&mut module), 0);
}

#[test]
fn text_lands_nul_terminated_in_a_fresh_reservation() {
    let mut module = link_fixture();
    let (raw, reservation) = marshal_in(
        &mut module.store,
        &module.memory,
        module.allocator.as_ref(),
        &TypeTag::Text,
        &Value::Text("marshal me".to_string()),
    )
    .unwrap();
    let reservation = reservation.expect("text reserves");
    assert_eq!(raw, RawArg::Ptr(reservation.offset));
    assert_eq!(module.read_text(reservation.offset).unwrap(), "marshal me");
    assert_eq!(live_allocations(&mut module), 1);
    module.release(reservation.offset).unwrap();
    assert_eq!(live_allocations(&mut module), 0);
}

#[test]
fn array_elements_store_with_wrap_semantics() {
    let mut module = link_fixture();
    let (raw, reservation) = marshal_in(
        &mut module.store,
        &module.memory,
        module.allocator.as_ref(),
        &TypeTag::Array(ElemType::I8),
        &Value::Array(vec![127.0, -128.0, 200.0, -129.0]),
    )
    .unwrap();
    let reservation = reservation.expect("array reserves");
    assert_eq!(raw, RawArg::Ptr(reservation.offset));
    let copied = module
        .slice_copy(reservation.offset, ElemType::I8, 4)
        .unwrap();
    assert_eq!(copied, vec![127.0, -128.0, -56.0, 127.0]);
    module.release(reservation.offset).unwrap();
}

#[test]
fn empty_array_still_gets_a_valid_pointer() {
    let mut module = link_fixture();
    let (raw, reservation) = marshal_in(
        &mut module.store,
        &module.memory,
        module.allocator.as_ref(),
        &TypeTag::Array(ElemType::I32),
        &Value::Array(vec![]),
    )
    .unwrap();
    let reservation = reservation.expect("zero-length array reserves");
    assert!(matches!(raw, RawArg::Ptr(offset) if offset != 0));
    assert_eq!(
        module
            .slice_copy(reservation.offset, ElemType::I32, 0)
            .unwrap(),
        Vec::<f64>::new()
    );
    module.release(reservation.offset).unwrap();
}

#[test]
fn tag_value_mismatch_is_rejected_before_reserving() {
    let mut module = link_fixture();
    let result = marshal_in(
        &mut module.store,
        &module.memory,
        module.allocator.as_ref(),
        &TypeTag::Text,
        &Value::Number(1.0),
    );
    assert!(matches!(result, Err(BridgeError::TypeMismatch(_))));
    assert_eq!(live_allocations(&mut module), 0);
}

#[test]
fn marshal_out_decodes_text_without_freeing_it() {
    let mut module = link_fixture();
    let reservation = module.reserve(16).unwrap();
    module
        .write_text(reservation.offset, "returned", 16)
        .unwrap();
    let value = marshal_out(
        &module.store,
        &module.memory,
        Some(&TypeTag::Text),
        Some(&Val::I32(reservation.offset as i32)),
    )
    .unwrap();
    assert_eq!(value, Value::Text("returned".to_string()));
    // Still alive: decoding a returned string must not release the buffer.
    assert_eq!(live_allocations(&mut module), 1);
    module.release(reservation.offset).unwrap();
}

#[test]
fn marshal_out_surfaces_array_returns_as_offsets() {
    let module = link_fixture();
    let value = marshal_out(
        &module.store,
        &module.memory,
        Some(&TypeTag::Array(ElemType::I32)),
        Some(&Val::I32(2048)),
    )
    .unwrap();
    assert_eq!(value, Value::Offset(2048));
}

#[test]
fn read_array_copies_the_known_range() {
    let mut module = link_fixture();
    let reservation = module.reserve(12).unwrap();
    module
        .write_slice(reservation.offset, ElemType::I32, &[5.0, 6.0, 7.0])
        .unwrap();
    let view = HeapView::new(module.memory.data(&module.store));
    let values = read_array(&view, reservation.offset, ElemType::I32, 3).unwrap();
    assert_eq!(values, vec![5.0, 6.0, 7.0]);
    drop(view);
    module.release(reservation.offset).unwrap();
}

#[test]
fn raw_args_coerce_to_the_callee_signature() {
    use wasmtime::ValType;
    assert!(matches!(
        RawArg::Num(3.9).to_val(&ValType::I32).unwrap(),
        Val::I32(3)
    ));
    assert!(matches!(
        RawArg::Num(-1.0).to_val(&ValType::I64).unwrap(),
        Val::I64(-1)
    ));
    assert!(matches!(
        RawArg::Ptr(4096).to_val(&ValType::I32).unwrap(),
        Val::I32(4096)
    ));
    assert!(RawArg::Ptr(0).to_val(&ValType::F64).is_err());
}
