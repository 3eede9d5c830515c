//! Headless ROM runner used to exercise the core without a display
//! frontend: boots a cartridge and clocks it for a fixed number of
//! frames, printing basic diagnostics along the way.

use pocketcore::{gb::GameBoy, info::Info};
use std::{env, time::Instant};

const DEFAULT_FRAMES: u32 = 600;

fn main() {
    let args: Vec<String> = env::args().collect();

    println!(
        "{} v{} ({}, {})",
        Info::name(),
        Info::version(),
        Info::system(),
        Info::compiler_version()
    );

    let mut game_boy = GameBoy::new();
    game_boy.boot();

    match args.get(1) {
        Some(path) => {
            game_boy
                .load_rom_file(path, None)
                .unwrap_or_else(|err| panic!("failed to load ROM at {}: {}", path, err));
            println!("Loaded {}", game_boy.rom_i());
        }
        None => {
            game_boy.load_rom_empty().unwrap();
            println!("No ROM path given, running with an empty cartridge");
        }
    }

    let frames: u32 = args
        .get(2)
        .and_then(|value| value.parse().ok())
        .unwrap_or(DEFAULT_FRAMES);

    let start = Instant::now();
    let mut cycles = 0_u64;
    for _ in 0..frames {
        cycles += game_boy.next_frame() as u64;
    }
    let elapsed = start.elapsed();

    println!(
        "Ran {} frames ({} cycles) in {:?}",
        frames, cycles, elapsed
    );
}
