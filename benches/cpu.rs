use criterion::{criterion_group, criterion_main, Criterion};
use pocketcore::gb::GameBoy;

fn benchmark_cpu_clock(c: &mut Criterion) {
    let mut gb = GameBoy::new();
    gb.set_ppu_enabled(false);
    gb.set_apu_enabled(false);
    gb.set_dma_enabled(false);
    gb.set_timer_enabled(false);
    gb.boot();
    gb.load_rom_empty().unwrap();

    c.bench_function("cpu_cycles", |b| {
        b.iter(|| {
            gb.clocks_cycles(1_000_000);
        })
    });
}

criterion_group!(benches, benchmark_cpu_clock);
criterion_main!(benches);
