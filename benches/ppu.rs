use criterion::{criterion_group, criterion_main, Criterion};
use pocketcore::gb::GameBoy;

fn benchmark_ppu_frame(c: &mut Criterion) {
    let mut gb = GameBoy::new();
    gb.set_apu_enabled(false);
    gb.set_dma_enabled(false);
    gb.boot();
    gb.load_rom_empty().unwrap();

    c.bench_function("ppu_frame", |b| {
        b.iter(|| {
            gb.next_frame();
        })
    });
}

criterion_group!(benches, benchmark_ppu_frame);
criterion_main!(benches);
