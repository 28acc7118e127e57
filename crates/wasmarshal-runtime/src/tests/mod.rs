//! Test modules for wasmarshal-runtime

pub mod support;

pub mod marshal_test;
pub mod view_test;
