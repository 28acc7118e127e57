//! Guest fixtures and helpers for the end-to-end suites
//!
//! The fixtures are text-format modules compiled by the engine at test
//! time. The main fixture carries a bump allocator that exports its
//! outstanding-allocation count, which is what the leak assertions read.

use wasmarshal_runtime::{BridgeResult, LinkedModule, ModuleLinker};

/// Self-contained guest: own memory, own allocator, exports covering every
/// marshalling direction. Imports the stock host functions.
pub const BRIDGE_MODULE: &str = r#"
(module
  (import "env" "host_log" (func $host_log (param i32)))
  (import "env" "abort" (func $abort))

  (memory (export "memory") 2 16)
  (global $bump (mut i32) (i32.const 65536))
  (global $live (export "live_allocations") (mut i32) (i32.const 0))
  (global $calls (mut i32) (i32.const 0))
  (data (i32.const 256) "marshalling online\00")

  (func $allocate (export "allocate") (param $len i32) (result i32)
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
    (if (i32.ne (local.get $ptr) (i32.const 0))
      (then (global.set $live (i32.sub (global.get $live) (i32.const 1))))))

  (func $strlen (export "strlen") (param $ptr i32) (result i32)
    (local $n i32)
    (block $done
      (loop $scan
        (br_if $done
          (i32.eqz (i32.load8_u (i32.add (local.get $ptr) (local.get $n)))))
        (local.set $n (i32.add (local.get $n) (i32.const 1)))
        (br $scan)))
    (local.get $n))

  (func (export "sum3") (param $a f64) (param $b f64) (param $c f64) (result f64)
    (f64.add (f64.add (local.get $a) (local.get $b)) (local.get $c)))

  (func (export "reverse_string") (param $src i32) (result i32)
    (local $len i32)
    (local $dst i32)
    (local $i i32)
    (local.set $len (call $strlen (local.get $src)))
    (local.set $dst (call $allocate (i32.add (local.get $len) (i32.const 1))))
    (if (i32.eqz (local.get $dst))
      (then (return (i32.const 0))))
    (block $done
      (loop $copy
        (br_if $done (i32.ge_u (local.get $i) (local.get $len)))
        (i32.store8
          (i32.add (local.get $dst) (local.get $i))
          (i32.load8_u
            (i32.add (local.get $src)
                     (i32.sub (i32.sub (local.get $len) (i32.const 1))
                              (local.get $i)))))
        (local.set $i (i32.add (local.get $i) (i32.const 1)))
        (br $copy)))
    (i32.store8 (i32.add (local.get $dst) (local.get $len)) (i32.const 0))
    (local.get $dst))

  (func (export "sum_array") (param $ptr i32) (param $len i32) (result f64)
    (local $i i32)
    (local $acc f64)
    (block $done
      (loop $next
        (br_if $done (i32.ge_s (local.get $i) (local.get $len)))
        (local.set $acc
          (f64.add (local.get $acc)
            (f64.convert_i32_s
              (i32.load (i32.add (local.get $ptr)
                                 (i32.mul (local.get $i) (i32.const 4)))))))
        (local.set $i (i32.add (local.get $i) (i32.const 1)))
        (br $next)))
    (local.get $acc))

  (func (export "shift_array") (param $delta f64) (param $ptr i32) (param $len i32)
    (local $i i32)
    (local $addr i32)
    (block $done
      (loop $next
        (br_if $done (i32.ge_s (local.get $i) (local.get $len)))
        (local.set $addr
          (i32.add (local.get $ptr) (i32.mul (local.get $i) (i32.const 4))))
        (i32.store (local.get $addr)
          (i32.add (i32.load (local.get $addr))
                   (i32.trunc_f64_s (local.get $delta))))
        (local.set $i (i32.add (local.get $i) (i32.const 1)))
        (br $next))))

  (func (export "bump_counter") (param $x f64) (result f64)
    (global.set $calls (i32.add (global.get $calls) (i32.const 1)))
    (f64.add (local.get $x) (f64.convert_i32_s (global.get $calls))))

  (func (export "announce")
    (call $host_log (i32.const 256)))

  (func (export "give_up")
    (call $abort))

  (func (export "boom") (param $ptr i32) (result f64)
    unreachable))
"#;

/// Guest with a C-style entrypoint: `main` returns the combined length of
/// argv[1..], which pins down the argv marshalling exactly.
pub const MAIN_MODULE: &str = r#"
(module
  (memory (export "memory") 1 4)
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

  (func $strlen (param $ptr i32) (result i32)
    (local $n i32)
    (block $done
      (loop $scan
        (br_if $done
          (i32.eqz (i32.load8_u (i32.add (local.get $ptr) (local.get $n)))))
        (local.set $n (i32.add (local.get $n) (i32.const 1)))
        (br $scan)))
    (local.get $n))

  (func (export "main") (param $argc i32) (param $argv i32) (result i32)
    (local $i i32)
    (local $total i32)
    (local.set $i (i32.const 1))
    (block $done
      (loop $next
        (br_if $done (i32.ge_s (local.get $i) (local.get $argc)))
        (local.set $total
          (i32.add (local.get $total)
            (call $strlen
              (i32.load (i32.add (local.get $argv)
                                 (i32.mul (local.get $i) (i32.const 4)))))))
        (local.set $i (i32.add (local.get $i) (i32.const 1)))
        (br $next)))
    (local.get $total)))
"#;

/// Guest for the host-supplied topology: memory and indirect-call table both
/// arrive as imports, along with one host function.
pub const IMPORTED_MEMORY_MODULE: &str = r#"
(module
  (import "env" "memory" (memory 1 10))
  (import "env" "table" (table 1 10 funcref))
  (import "env" "tick" (func $tick))

  (func (export "negate_doubles") (param $off i32) (param $len i32)
    (local $i i32)
    (local $addr i32)
    (block $done
      (loop $next
        (br_if $done (i32.ge_s (local.get $i) (local.get $len)))
        (local.set $addr
          (i32.add (local.get $off) (i32.mul (local.get $i) (i32.const 8))))
        (f64.store (local.get $addr) (f64.neg (f64.load (local.get $addr))))
        (local.set $i (i32.add (local.get $i) (i32.const 1)))
        (br $next))))

  (func (export "poke")
    (call $tick)))
"#;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Link the main fixture with the stock host imports in place.
pub fn link_bridge() -> BridgeResult<LinkedModule> {
    let mut linker = ModuleLinker::new()?;
    linker.define_host_defaults()?;
    linker.link_bytes(BRIDGE_MODULE)
}

/// Link the entrypoint fixture.
pub fn link_main() -> BridgeResult<LinkedModule> {
    ModuleLinker::new()?.link_bytes(MAIN_MODULE)
}

/// Outstanding guest-side allocations, as counted by the fixture allocator.
pub fn live_allocations(module: &mut LinkedModule) -> i64 {
    module
        .read_global("live_allocations")
        .expect("fixture exports its allocation counter") as i64
}
