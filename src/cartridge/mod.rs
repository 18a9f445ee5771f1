// Cartridge image loading and backup-signature detection.

pub mod backup;

pub use backup::Backup;

const SIGNATURES: &[(&[u8], fn() -> Backup)] = &[
    (b"FLASH1M_V", || Backup::flash_128k()),
    (b"FLASH512_V", || Backup::flash_64k()),
    (b"FLASH_V", || Backup::flash_64k()),
    (b"SRAM_V", || Backup::sram()),
];

/// A loaded cartridge image with its detected backup backend.
pub struct Cartridge {
    pub rom: Vec<u8>,
    pub backup: Backup,
}

impl Cartridge {
    pub fn load(rom: Vec<u8>) -> Self {
        let backup = detect_backup(&rom);
        Cartridge { rom, backup }
    }

    pub fn read(&self, offset: usize) -> u8 {
        self.rom.get(offset).copied().unwrap_or(0xFF)
    }
}

/// Scans the ROM image byte-by-byte for one of the ASCII backup-signature
/// tags; the first (and longest, checked first) match wins.
fn detect_backup(rom: &[u8]) -> Backup {
    for &(signature, make) in SIGNATURES {
        if rom.windows(signature.len()).any(|window| window == signature) {
            return make();
        }
    }
    Backup::None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_sram_signature_anywhere_in_the_image() {
        let mut rom = vec![0u8; 64];
        rom.splice(20..20 + 6, b"SRAM_V".iter().copied());
        let cart = Cartridge::load(rom);
        assert!(matches!(cart.backup, Backup::Sram(_)));
    }

    #[test]
    fn detects_flash1m_before_the_shorter_flash_v_substring() {
        let mut rom = vec![0u8; 64];
        rom.splice(0..10, b"FLASH1M_V\0".iter().copied());
        let cart = Cartridge::load(rom);
        match cart.backup {
            Backup::Flash(_) => {}
            other => panic!("expected Flash backup, got {other:?}"),
        }
    }

    #[test]
    fn no_signature_means_no_backup() {
        let cart = Cartridge::load(vec![0u8; 64]);
        assert!(matches!(cart.backup, Backup::None));
    }
}
