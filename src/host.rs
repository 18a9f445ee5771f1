// Host window: renders the core's 240x160 frame buffer through `pixels`
// inside a `winit` event loop, and forwards keyboard state into the
// keypad register each frame.

use std::sync::Arc;
use std::time::{Duration, Instant};

use gilrs::{Button, EventType, Gilrs};
use pixels::{Pixels, SurfaceTexture};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

use crate::audio::SilentMixer;
use crate::gba::{Gba, KeypadState};
use crate::ppu::{SCREEN_HEIGHT, SCREEN_WIDTH};

#[derive(Debug, Clone, Copy)]
pub struct WindowConfig {
    pub scale: u32,
    pub target_fps: u32,
    pub vsync: bool,
}

impl WindowConfig {
    pub fn new() -> Self {
        WindowConfig {
            scale: 3,
            target_fps: 60,
            vsync: true,
        }
    }

    pub fn with_scale(mut self, scale: u32) -> Self {
        self.scale = scale.clamp(1, 8);
        self
    }

    pub fn window_width(&self) -> u32 {
        SCREEN_WIDTH as u32 * self.scale
    }

    pub fn window_height(&self) -> u32 {
        SCREEN_HEIGHT as u32 * self.scale
    }

    fn frame_duration(&self) -> Duration {
        Duration::from_micros(1_000_000 / self.target_fps.max(1) as u64)
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self::new()
    }
}

pub struct HostWindow {
    window: Option<Arc<Window>>,
    pixels: Option<Pixels<'static>>,
    config: WindowConfig,
    gba: Gba<SilentMixer>,
    keyboard_keys: KeypadState,
    gamepad_keys: KeypadState,
    gilrs: Option<Gilrs>,
    last_frame_time: Instant,
}

impl HostWindow {
    pub fn new(config: WindowConfig, gba: Gba<SilentMixer>) -> Self {
        let gilrs = match Gilrs::new() {
            Ok(gilrs) => Some(gilrs),
            Err(err) => {
                log::warn!("gamepad input unavailable: {err}");
                None
            }
        };
        HostWindow {
            window: None,
            pixels: None,
            config,
            gba,
            keyboard_keys: KeypadState::default(),
            gamepad_keys: KeypadState::default(),
            gilrs,
            last_frame_time: Instant::now(),
        }
    }

    fn handle_key(&mut self, code: PhysicalKey, pressed: bool) {
        let PhysicalKey::Code(code) = code else {
            return;
        };
        match code {
            KeyCode::KeyZ => self.keyboard_keys.a = pressed,
            KeyCode::KeyX => self.keyboard_keys.b = pressed,
            KeyCode::ShiftRight => self.keyboard_keys.select = pressed,
            KeyCode::Enter => self.keyboard_keys.start = pressed,
            KeyCode::ArrowRight => self.keyboard_keys.right = pressed,
            KeyCode::ArrowLeft => self.keyboard_keys.left = pressed,
            KeyCode::ArrowUp => self.keyboard_keys.up = pressed,
            KeyCode::ArrowDown => self.keyboard_keys.down = pressed,
            KeyCode::KeyA => self.keyboard_keys.l = pressed,
            KeyCode::KeyS => self.keyboard_keys.r = pressed,
            _ => {}
        }
        self.apply_keys();
    }

    /// Drains pending gamepad button events and folds them into the next
    /// keypad-register write, merged with whatever the keyboard is holding.
    fn poll_gamepad(&mut self) {
        let Some(gilrs) = &mut self.gilrs else {
            return;
        };
        let mut changed = false;
        while let Some(event) = gilrs.next_event() {
            let (button, pressed) = match event.event {
                EventType::ButtonPressed(button, _) => (button, true),
                EventType::ButtonReleased(button, _) => (button, false),
                _ => continue,
            };
            if Self::apply_gamepad_button(&mut self.gamepad_keys, button, pressed) {
                changed = true;
            }
        }
        if changed {
            self.apply_keys();
        }
    }

    fn apply_gamepad_button(keys: &mut KeypadState, button: Button, pressed: bool) -> bool {
        match button {
            Button::South => keys.a = pressed,
            Button::East => keys.b = pressed,
            Button::Select => keys.select = pressed,
            Button::Start => keys.start = pressed,
            Button::DPadRight => keys.right = pressed,
            Button::DPadLeft => keys.left = pressed,
            Button::DPadUp => keys.up = pressed,
            Button::DPadDown => keys.down = pressed,
            Button::LeftTrigger => keys.l = pressed,
            Button::RightTrigger => keys.r = pressed,
            _ => return false,
        }
        true
    }

    fn apply_keys(&mut self) {
        let merged = KeypadState {
            a: self.keyboard_keys.a || self.gamepad_keys.a,
            b: self.keyboard_keys.b || self.gamepad_keys.b,
            select: self.keyboard_keys.select || self.gamepad_keys.select,
            start: self.keyboard_keys.start || self.gamepad_keys.start,
            right: self.keyboard_keys.right || self.gamepad_keys.right,
            left: self.keyboard_keys.left || self.gamepad_keys.left,
            up: self.keyboard_keys.up || self.gamepad_keys.up,
            down: self.keyboard_keys.down || self.gamepad_keys.down,
            r: self.keyboard_keys.r || self.gamepad_keys.r,
            l: self.keyboard_keys.l || self.gamepad_keys.l,
        };
        self.gba.set_keys(merged);
    }

    fn render(&mut self) -> Result<(), pixels::Error> {
        self.gba.run_frame();
        if let Some(pixels) = &mut self.pixels {
            let frame = pixels.frame_mut();
            for (pixel, argb) in frame.chunks_exact_mut(4).zip(self.gba.framebuffer()) {
                let bytes = argb.to_be_bytes(); // [A, R, G, B]
                pixel[0] = bytes[1];
                pixel[1] = bytes[2];
                pixel[2] = bytes[3];
                pixel[3] = bytes[0];
            }
            pixels.render()?;
        }
        Ok(())
    }

    fn should_render_frame(&mut self) -> bool {
        let elapsed = self.last_frame_time.elapsed();
        if elapsed >= self.config.frame_duration() {
            self.last_frame_time = Instant::now();
            true
        } else {
            false
        }
    }
}

impl ApplicationHandler for HostWindow {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attributes = Window::default_attributes()
            .with_title("pocketdmi")
            .with_inner_size(LogicalSize::new(
                self.config.window_width(),
                self.config.window_height(),
            ))
            .with_resizable(false);

        let window = event_loop
            .create_window(attributes)
            .expect("failed to create window");
        let window = Arc::new(window);
        let size = window.inner_size();

        let surface_texture = SurfaceTexture::new(size.width, size.height, window.clone());
        let pixels = Pixels::new(SCREEN_WIDTH as u32, SCREEN_HEIGHT as u32, surface_texture)
            .expect("failed to create pixel buffer");

        self.window = Some(window);
        self.pixels = Some(pixels);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::KeyboardInput {
                event: KeyEvent { physical_key, state, .. },
                ..
            } => {
                self.handle_key(physical_key, state == ElementState::Pressed);
            }
            WindowEvent::RedrawRequested => {
                if self.should_render_frame() {
                    if let Err(err) = self.render() {
                        log::error!("render error: {err}");
                        event_loop.exit();
                    }
                }
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        self.poll_gamepad();
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

pub fn run(config: WindowConfig, gba: Gba<SilentMixer>) -> Result<(), Box<dyn std::error::Error>> {
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(if config.vsync { ControlFlow::Wait } else { ControlFlow::Poll });

    let mut host = HostWindow::new(config, gba);
    event_loop.run_app(&mut host)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_config_defaults_to_3x_scale_and_60_fps() {
        let config = WindowConfig::new();
        assert_eq!(config.scale, 3);
        assert_eq!(config.target_fps, 60);
    }

    #[test]
    fn scale_is_clamped_to_the_one_to_eight_range() {
        assert_eq!(WindowConfig::new().with_scale(100).scale, 8);
        assert_eq!(WindowConfig::new().with_scale(0).scale, 1);
    }
}
