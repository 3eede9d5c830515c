//! MMU (Memory Management Unit) functions and structures.
//!
//! Dispatches bus reads/writes to the owning component, applying the
//! PPU-mode-gated blocking and DMA bus locks that keep VRAM/OAM access
//! consistent with the real hardware's single bus.

use crate::{
    apu::Apu,
    dma::Dma,
    gb::{Components, GameBoyConfig},
    pad::Pad,
    ppu::Ppu,
    rom::Cartridge,
    serial::Serial,
    timer::Timer,
    util::SharedThread,
    warnln,
};

pub const RAM_SIZE: usize = 8192;

/// Identifies who is asking the bus for a byte. The PPU-mode VRAM/OAM
/// blocking rules only apply to the CPU; the PPU, DMA engine, and
/// timer read/write their own mapped registers unconditionally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requester {
    Cpu,
    Ppu,
    Dma,
    Timer,
}

pub trait BusComponent {
    fn read(&self, addr: u16) -> u8;
    fn write(&mut self, addr: u16, value: u8);
    fn read_many(&self, addr: u16, count: usize) -> Vec<u8> {
        (0..count)
            .map(|offset| self.read(addr + offset as u16))
            .collect()
    }
    fn write_many(&mut self, addr: u16, values: &[u8]) {
        for (offset, &value) in values.iter().enumerate() {
            self.write(addr + offset as u16, value);
        }
    }
}

pub struct Mmu {
    /// Register controlling which interrupts are enabled.
    pub ie: u8,

    ppu: Ppu,
    apu: Apu,
    dma: Dma,
    pad: Pad,
    timer: Timer,
    serial: Serial,
    rom: Cartridge,

    /// Working RAM, mapped at 0xC000-0xDFFF and echoed at 0xE000-0xFDFF.
    ram: Vec<u8>,

    gbc: SharedThread<GameBoyConfig>,
}

impl Mmu {
    pub fn new(components: Components, gbc: SharedThread<GameBoyConfig>) -> Self {
        Self {
            ppu: components.ppu,
            apu: components.apu,
            dma: components.dma,
            pad: components.pad,
            timer: components.timer,
            serial: components.serial,
            rom: Cartridge::new(),
            ram: vec![0x00; RAM_SIZE],
            ie: 0x0,
            gbc,
        }
    }

    pub fn reset(&mut self) {
        self.rom = Cartridge::new();
        self.ram = vec![0x00; RAM_SIZE];
        self.ie = 0x0;
    }

    pub fn ppu(&mut self) -> &mut Ppu {
        &mut self.ppu
    }

    pub fn ppu_i(&self) -> &Ppu {
        &self.ppu
    }

    pub fn apu(&mut self) -> &mut Apu {
        &mut self.apu
    }

    pub fn apu_i(&self) -> &Apu {
        &self.apu
    }

    pub fn dma(&mut self) -> &mut Dma {
        &mut self.dma
    }

    pub fn dma_i(&self) -> &Dma {
        &self.dma
    }

    pub fn pad(&mut self) -> &mut Pad {
        &mut self.pad
    }

    pub fn pad_i(&self) -> &Pad {
        &self.pad
    }

    pub fn timer(&mut self) -> &mut Timer {
        &mut self.timer
    }

    pub fn timer_i(&self) -> &Timer {
        &self.timer
    }

    pub fn serial(&mut self) -> &mut Serial {
        &mut self.serial
    }

    pub fn serial_i(&self) -> &Serial {
        &self.serial
    }

    /// Advances the DMA engine by `cycles` dot-steps, arming a transfer
    /// on a DMA register write and copying one byte into OAM per
    /// elapsed machine cycle once the arm delay has elapsed.
    pub fn clock_dma(&mut self, cycles: u16) {
        if !self.dma.active() {
            return;
        }
        for _ in 0..cycles {
            if let Some((source, dest)) = self.dma.tick() {
                let byte = self.read_for(source, Requester::Dma);
                self.ppu.write_oam_dma(dest, byte);
            }
        }
    }

    pub fn read(&self, addr: u16) -> u8 {
        self.read_for(addr, Requester::Cpu)
    }

    pub fn write(&mut self, addr: u16, value: u8) {
        self.write_for(addr, value, Requester::Cpu);
    }

    /// Bus read honoring DMA bus-locking and PPU-mode VRAM/OAM gating,
    /// the latter only applied for a CPU requester.
    pub fn read_for(&self, addr: u16, requester: Requester) -> u8 {
        use crate::consts::*;

        if requester == Requester::Cpu {
            if self.dma.oam_blocked() && (OAM_START..=OAM_END).contains(&addr) {
                return 0xff;
            }
            if self.dma.external_bus_blocked() && is_external_bus(addr) {
                return 0xff;
            }
            if self.dma.vram_bus_blocked() && (VRAM_START..=VRAM_END).contains(&addr) {
                return 0xff;
            }
            if self.ppu.enabled() {
                if (OAM_START..=OAM_END).contains(&addr) && self.ppu.oam_blocked() {
                    return 0xff;
                }
                if (VRAM_START..=VRAM_END).contains(&addr) && self.ppu.vram_blocked() {
                    return 0xff;
                }
            }
        }

        match addr {
            ROM_BANK0_START..=ROM_BANK1_END => self.rom.read(addr),
            VRAM_START..=VRAM_END => self.ppu.read(addr),
            ERAM_START..=ERAM_END => self.rom.read(addr),
            WRAM_START..=WRAM_END => self.ram[(addr - WRAM_START) as usize],
            ECHO_START..=ECHO_END => self.ram[(addr - ECHO_START) as usize],
            OAM_START..=OAM_END => self.ppu.read(addr),
            UNUSABLE_START..=UNUSABLE_END => 0xff,
            P1_ADDR => self.pad.read(addr),
            SB_ADDR | SC_ADDR => self.serial.read(addr),
            DIV_ADDR..=TAC_ADDR => self.timer.read(addr),
            IF_ADDR => {
                0xe0 | if self.ppu.int_vblank() { 0x01 } else { 0x00 }
                    | if self.ppu.int_stat() { 0x02 } else { 0x00 }
                    | if self.timer.int_tima() { 0x04 } else { 0x00 }
                    | if self.serial.int_serial() { 0x08 } else { 0x00 }
                    | if self.pad.int_pad() { 0x10 } else { 0x00 }
            }
            NR10_ADDR..=NR52_ADDR | WAVE_RAM_START..=WAVE_RAM_END => self.apu.read(addr),
            LCDC_ADDR..=LYC_ADDR | BGP_ADDR..=WX_ADDR => self.ppu.read(addr),
            DMA_ADDR => self.dma.read(addr),
            HRAM_START..=HRAM_END => self.ppu.read(addr),
            IE_ADDR => self.ie,
            addr => {
                warnln!("Reading from unknown location 0x{:04x}", addr);
                0xff
            }
        }
    }

    pub fn write_for(&mut self, addr: u16, value: u8, requester: Requester) {
        use crate::consts::*;

        if requester == Requester::Cpu {
            if self.dma.oam_blocked() && (OAM_START..=OAM_END).contains(&addr) {
                return;
            }
            if self.dma.external_bus_blocked() && is_external_bus(addr) {
                return;
            }
            if self.dma.vram_bus_blocked() && (VRAM_START..=VRAM_END).contains(&addr) {
                return;
            }
            if self.ppu.enabled() {
                if (OAM_START..=OAM_END).contains(&addr) && self.ppu.oam_blocked() {
                    return;
                }
                if (VRAM_START..=VRAM_END).contains(&addr) && self.ppu.vram_blocked() {
                    return;
                }
            }
        }

        match addr {
            ROM_BANK0_START..=ROM_BANK1_END => self.rom.write(addr, value),
            VRAM_START..=VRAM_END => self.ppu.write(addr, value),
            ERAM_START..=ERAM_END => self.rom.write(addr, value),
            WRAM_START..=WRAM_END => self.ram[(addr - WRAM_START) as usize] = value,
            ECHO_START..=ECHO_END => self.ram[(addr - ECHO_START) as usize] = value,
            OAM_START..=OAM_END => self.ppu.write(addr, value),
            UNUSABLE_START..=UNUSABLE_END => (),
            P1_ADDR => self.pad.write(addr, value),
            SB_ADDR | SC_ADDR => self.serial.write(addr, value),
            DIV_ADDR..=TAC_ADDR => self.timer.write(addr, value),
            IF_ADDR => {
                self.ppu.set_int_vblank(value & 0x01 != 0);
                self.ppu.set_int_stat(value & 0x02 != 0);
                self.timer.set_int_tima(value & 0x04 != 0);
                self.serial.set_int_serial(value & 0x08 != 0);
                self.pad.set_int_pad(value & 0x10 != 0);
            }
            NR10_ADDR..=NR52_ADDR | WAVE_RAM_START..=WAVE_RAM_END => self.apu.write(addr, value),
            LCDC_ADDR..=LYC_ADDR | BGP_ADDR..=WX_ADDR => self.ppu.write(addr, value),
            DMA_ADDR => self.dma.write(addr, value),
            HRAM_START..=HRAM_END => self.ppu.write(addr, value),
            IE_ADDR => self.ie = value,
            addr => warnln!("Writing to unknown location 0x{:04x}", addr),
        }
    }

    pub fn read_many(&mut self, addr: u16, count: u16) -> Vec<u8> {
        (0..count).map(|index| self.read(addr + index)).collect()
    }

    pub fn write_many(&mut self, addr: u16, data: &[u8]) {
        for (index, byte) in data.iter().enumerate() {
            self.write(addr + index as u16, *byte)
        }
    }

    pub fn ram(&mut self) -> &mut Vec<u8> {
        &mut self.ram
    }

    pub fn ram_i(&self) -> &Vec<u8> {
        &self.ram
    }

    pub fn set_ram(&mut self, value: Vec<u8>) {
        self.ram = value;
    }

    pub fn rom(&mut self) -> &mut Cartridge {
        &mut self.rom
    }

    pub fn rom_i(&self) -> &Cartridge {
        &self.rom
    }

    pub fn set_rom(&mut self, rom: Cartridge) {
        self.rom = rom;
    }

    pub fn set_gbc(&mut self, value: SharedThread<GameBoyConfig>) {
        self.gbc = value;
    }
}

/// ROM range 0x0000-0x7FFF plus external-RAM-through-echo-RAM range
/// 0xA000-0xFDFF, mirroring the hardware's external bus wiring.
fn is_external_bus(addr: u16) -> bool {
    (0x0000..=0x7fff).contains(&addr) || (0xa000..=0xfdff).contains(&addr)
}

impl Default for Mmu {
    fn default() -> Self {
        let gbc = SharedThread::new(std::sync::Mutex::new(GameBoyConfig::default()));
        let components = Components {
            ppu: Ppu::new(gbc.clone()),
            apu: Apu::default(),
            dma: Dma::default(),
            pad: Pad::default(),
            timer: Timer::default(),
            serial: Serial::default(),
        };
        Mmu::new(components, gbc)
    }
}
