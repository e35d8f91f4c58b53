//! Benchmarks for registry dispatch overhead

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use simbind::module::{MarshalLimits, ModuleRegistry, StaticLoader, SymbolTable};
use std::ffi::{c_char, c_void};
use std::sync::Arc;

/// Minimal in-process module: a bank of 64 registers and a cycle counter
struct Regs {
    signals: [i64; 64],
    cycles: i64,
}

unsafe fn regs<'a>(s: *mut c_void) -> &'a mut Regs {
    &mut *(s as *mut Regs)
}

unsafe extern "C" fn sim_init() -> *mut c_void {
    Box::into_raw(Box::new(Regs {
        signals: [0; 64],
        cycles: 0,
    })) as *mut c_void
}

unsafe extern "C" fn step(s: *mut c_void, cycles: i32) -> i64 {
    let r = regs(s);
    r.cycles += cycles as i64;
    r.cycles
}

unsafe extern "C" fn finish(s: *mut c_void) {
    drop(Box::from_raw(s as *mut Regs));
}

unsafe extern "C" fn nop(_s: *mut c_void) {}

unsafe extern "C" fn write_coverage(_s: *mut c_void, _filename: *const c_char) {}

unsafe extern "C" fn poke(s: *mut c_void, id: i32, value: i64) {
    regs(s).signals[(id & 63) as usize] = value;
}

unsafe extern "C" fn peek(s: *mut c_void, id: i32) -> i64 {
    regs(s).signals[(id & 63) as usize]
}

unsafe extern "C" fn poke_wide(s: *mut c_void, id: i32, _word: i32, value: i64) {
    poke(s, id, value)
}

unsafe extern "C" fn peek_wide(s: *mut c_void, id: i32, _word: i32) -> i64 {
    peek(s, id)
}

unsafe extern "C" fn set_args(_s: *mut c_void, _argc: i32, _argv: *mut *mut c_char) {}

fn registry_with_modules(count: usize) -> ModuleRegistry {
    let loader = Arc::new(StaticLoader::new());
    let symbols = SymbolTable::new()
        .with("sim_init", sim_init as *const () as usize)
        .with("step", step as *const () as usize)
        .with("update", nop as *const () as usize)
        .with("finish", finish as *const () as usize)
        .with("resetCoverage", nop as *const () as usize)
        .with("writeCoverage", write_coverage as *const () as usize)
        .with("poke", poke as *const () as usize)
        .with("peek", peek as *const () as usize)
        .with("poke_wide", poke_wide as *const () as usize)
        .with("peek_wide", peek_wide as *const () as usize)
        .with("set_args", set_args as *const () as usize);
    loader.register("mem://regs", symbols);

    let registry = ModuleRegistry::new(loader, MarshalLimits::default());
    for _ in 0..count {
        registry.load("mem://regs").unwrap();
    }
    registry
}

/// Poke then peek one signal, for registries of increasing size
fn bench_poke_peek(c: &mut Criterion) {
    let mut group = c.benchmark_group("poke_peek");

    for &modules in &[1usize, 16, 256] {
        let registry = registry_with_modules(modules);
        let handle = registry.load("mem://regs").unwrap();
        let state = registry.initialize(handle).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(modules), &modules, |b, _| {
            let mut v = 0i64;
            b.iter(|| {
                v = v.wrapping_add(1);
                registry.poke(handle, &state, 7, black_box(v)).unwrap();
                black_box(registry.peek(handle, &state, 7).unwrap())
            })
        });

        registry.finish(handle, state).unwrap();
    }

    group.finish();
}

/// Single-cycle step dispatch
fn bench_step(c: &mut Criterion) {
    let registry = registry_with_modules(1);
    let handle = registry.load("mem://regs").unwrap();
    let state = registry.initialize(handle).unwrap();

    c.bench_function("step_1", |b| {
        b.iter(|| black_box(registry.step(handle, &state, black_box(1)).unwrap()))
    });

    registry.finish(handle, state).unwrap();
}

/// Argument marshaling for set_args
fn bench_set_args(c: &mut Criterion) {
    let registry = registry_with_modules(1);
    let handle = registry.load("mem://regs").unwrap();
    let state = registry.initialize(handle).unwrap();
    let args: Vec<String> = (0..8).map(|i| format!("+plusarg{}=value", i)).collect();

    c.bench_function("set_args_8", |b| {
        b.iter(|| registry.set_args(handle, &state, black_box(&args)).unwrap())
    });

    registry.finish(handle, state).unwrap();
}

criterion_group!(benches, bench_poke_peek, bench_step, bench_set_args);
criterion_main!(benches);
