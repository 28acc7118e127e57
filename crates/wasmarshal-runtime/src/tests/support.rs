//! Shared fixture module for the unit suites
//!
//! A small guest with a bump allocator that reports its outstanding
//! allocation count through an exported global, plus a handful of exports
//! exercising each marshalling direction. Kept to two memory pages so
//! exhaustion is easy to provoke.

use crate::link::ModuleLinker;
use crate::runtime::LinkedModule;

pub const FIXTURE: &str = r#"
(module
  (memory (export "memory") 1 2)
  (global $bump (mut i32) (i32.const 1024))
  (global $live (export "live_allocations") (mut i32) (i32.const 0))

  (func (export "allocate") (param $len i32) (result i32)
    (local $ptr i32)
    (if (i32.le_s (local.get $len) (i32.const 0))
      (then (return (i32.const 0))))
    (block $grown
      (loop $more
        (br_if $grown
          (i32.le_u (i32.add (global.get $bump) (local.get $len))
                    (i32.mul (memory.size) (i32.const 65536))))
        (if (i32.eq (memory.grow (i32.const 1)) (i32.const -1))
          (then (return (i32.const 0))))
        (br $more)))
    (local.set $ptr (global.get $bump))
    (global.set $bump
      (i32.and (i32.add (i32.add (global.get $bump) (local.get $len)) (i32.const 7))
               (i32.const -8)))
    (global.set $live (i32.add (global.get $live) (i32.const 1)))
    (local.get $ptr))

  (func (export "release") (param $ptr i32)
    (global.set $live (i32.sub (global.get $live) (i32.const 1))))

  (func (export "double") (param $x f64) (result f64)
    (f64.mul (local.get $x) (f64.const 2)))

  (func (export "strlen") (param $ptr i32) (result i32)
    (local $n i32)
    (block $done
      (loop $scan
        (br_if $done
          (i32.eqz (i32.load8_u (i32.add (local.get $ptr) (local.get $n)))))
        (local.set $n (i32.add (local.get $n) (i32.const 1)))
        (br $scan)))
    (local.get $n))

  (func (export "identity_ptr") (param $ptr i32) (result i32)
    (local.get $ptr))

  (func (export "two_bufs") (param $a i32) (param $b i32) (result i32)
    (i32.add (local.get $a) (local.get $b)))

  (func (export "boom") (param $ptr i32) (result f64)
    unreachable))
"#;

pub fn link_fixture() -> LinkedModule {
    let _ = env_logger::builder().is_test(true).try_init();
    ModuleLinker::new()
        .expect("engine")
        .link_bytes(FIXTURE)
        .expect("fixture links")
}

pub fn live_allocations(module: &mut LinkedModule) -> i32 {
    module.read_global("live_allocations").expect("live counter") as i32
}
