//! Typed view layer: widths, wrapping, bounds, C strings

use crate::error::BridgeError;
use crate::value::{ElemType, NumKind};
use crate::view::{HeapView, HeapViewMut};

#[test]
fn element_type_width_matrix() {
    assert_eq!(
        ElemType::from_parts(1, NumKind::Signed).unwrap(),
        ElemType::I8
    );
    assert_eq!(
        ElemType::from_parts(4, NumKind::Float).unwrap(),
        ElemType::F32
    );
    assert_eq!(
        ElemType::from_parts(8, NumKind::Unsigned).unwrap(),
        ElemType::U64
    );
    assert!(matches!(
        ElemType::from_parts(2, NumKind::Signed),
        Err(BridgeError::InvalidWidth { width: 2, .. })
    ));
    assert!(matches!(
        ElemType::from_parts(1, NumKind::Float),
        Err(BridgeError::InvalidWidth { width: 1, .. })
    ));
}

#[test]
fn signed_byte_wraps_two_complement() {
    let mut data = vec![0u8; 8];
    let mut view = HeapViewMut::new(&mut data);
    view.write(0, ElemType::I8, 200.0).unwrap();
    view.write(1, ElemType::I8, -129.0).unwrap();
    let view = HeapView::new(&data);
    assert_eq!(view.read(0, ElemType::I8).unwrap(), -56.0);
    assert_eq!(view.read(1, ElemType::I8).unwrap(), 127.0);
    // Same bytes through the unsigned lane.
    assert_eq!(view.read(0, ElemType::U8).unwrap(), 200.0);
    assert_eq!(view.read(1, ElemType::U8).unwrap(), 127.0);
}

#[test]
fn wide_cells_round_trip() {
    let mut data = vec![0u8; 32];
    let mut view = HeapViewMut::new(&mut data);
    view.write(0, ElemType::I32, -7.0).unwrap();
    view.write(4, ElemType::U32, 4_000_000_000.0).unwrap();
    view.write(8, ElemType::F32, 1.5).unwrap();
    view.write(16, ElemType::F64, -2.5).unwrap();
    let view = HeapView::new(&data);
    assert_eq!(view.read(0, ElemType::I32).unwrap(), -7.0);
    assert_eq!(view.read(4, ElemType::U32).unwrap(), 4_000_000_000.0);
    assert_eq!(view.read(8, ElemType::F32).unwrap(), 1.5);
    assert_eq!(view.read(16, ElemType::F64).unwrap(), -2.5);
}

#[test]
fn slice_copy_is_a_snapshot() {
    let mut data = vec![0u8; 16];
    let mut view = HeapViewMut::new(&mut data);
    view.write_slice(0, ElemType::I32, &[1.0, 2.0, 3.0, 4.0])
        .unwrap();
    let copied = view.as_view().slice_copy(0, ElemType::I32, 4).unwrap();
    view.write(0, ElemType::I32, 99.0).unwrap();
    assert_eq!(copied, vec![1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn out_of_bounds_is_rejected() {
    let data = vec![0u8; 8];
    let view = HeapView::new(&data);
    assert!(matches!(
        view.read(5, ElemType::I32),
        Err(BridgeError::OutOfBounds { .. })
    ));
    assert!(matches!(
        view.slice_copy(0, ElemType::F64, 2),
        Err(BridgeError::OutOfBounds { .. })
    ));
    // Offset past the end entirely.
    assert!(matches!(
        view.read(1_000, ElemType::U8),
        Err(BridgeError::OutOfBounds { .. })
    ));
}

#[test]
fn failed_write_leaves_prior_elements_intact() {
    let mut data = vec![0u8; 8];
    let mut view = HeapViewMut::new(&mut data);
    view.write_slice(0, ElemType::I32, &[11.0, 22.0]).unwrap();
    // Three elements do not fit; the whole write is refused up front.
    assert!(view.write_slice(0, ElemType::I32, &[1.0, 2.0, 3.0]).is_err());
    assert_eq!(
        view.as_view().slice_copy(0, ElemType::I32, 2).unwrap(),
        vec![11.0, 22.0]
    );
}

#[test]
fn cstr_round_trip() {
    let mut data = vec![0u8; 32];
    let mut view = HeapViewMut::new(&mut data);
    let written = view.write_cstr(4, "hello", 32).unwrap();
    assert_eq!(written, 6);
    assert_eq!(view.as_view().read_cstr(4).unwrap(), "hello");
}

#[test]
fn cstr_truncates_at_cap_with_terminator() {
    let mut data = vec![0u8; 64];
    let mut view = HeapViewMut::new(&mut data);
    let text = "x".repeat(100);
    let written = view.write_cstr(0, &text, 10).unwrap();
    assert_eq!(written, 10);
    assert_eq!(view.as_view().read_cstr(0).unwrap(), "x".repeat(9));
    assert_eq!(data[9], 0);
}

#[test]
fn cstr_truncation_never_splits_a_code_point() {
    let mut data = vec![0u8; 16];
    let mut view = HeapViewMut::new(&mut data);
    // "ééééé" is 10 UTF-8 bytes; a 10-byte cap leaves room for 9, which
    // would land mid-character, so the cut falls back to 8.
    let written = view.write_cstr(0, "ééééé", 10).unwrap();
    assert_eq!(written, 9);
    assert_eq!(view.as_view().read_cstr(0).unwrap(), "éééé");
}

#[test]
fn cstr_zero_cap_writes_nothing() {
    let mut data = vec![7u8; 4];
    let mut view = HeapViewMut::new(&mut data);
    assert_eq!(view.write_cstr(0, "abc", 0).unwrap(), 0);
    assert_eq!(data, vec![7u8; 4]);
}

#[test]
fn cstr_without_terminator_is_out_of_bounds() {
    let data = vec![b'a'; 8];
    let view = HeapView::new(&data);
    assert!(matches!(
        view.read_cstr(0),
        Err(BridgeError::OutOfBounds { .. })
    ));
}
