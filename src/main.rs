// Host entry point: loads configuration, boots the core from a boot ROM
// and optional cartridge image, and hands it to the windowed frontend.

use pocketdmi::config::EmulatorConfig;
use pocketdmi::gba::Gba;
use pocketdmi::host::{self, WindowConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = EmulatorConfig::load_or_default();
    log::info!("loaded configuration, boot ROM at {:?}", config.boot.boot_rom_path);

    let gba = Gba::from_files(&config.boot.boot_rom_path, config.boot.cartridge_path.as_deref())?;

    let window_config = WindowConfig::new().with_scale(config.video.scale);
    host::run(window_config, gba)?;

    Ok(())
}
