//! Fills the matrix with a single color. Config options: `color`.

use super::{config_color, AppConfig, AppError, Application};
use crate::display::Device;
use image::{Rgb, RgbImage};
use std::time::Duration;

const DEFAULT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

pub struct SolidApp {
    config: AppConfig,
    canvas: Option<RgbImage>,
    dirty: bool,
}

impl SolidApp {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            config: config.clone(),
            canvas: None,
            dirty: true,
        }
    }

    fn fill(&mut self) -> Result<(), AppError> {
        let color = config_color(&self.config, "color", DEFAULT_COLOR)?;
        if let Some(canvas) = self.canvas.as_mut() {
            for pixel in canvas.pixels_mut() {
                *pixel = color;
            }
        }
        self.dirty = true;
        Ok(())
    }
}

impl Application for SolidApp {
    fn setup(&mut self, device: &mut dyn Device) -> Result<(), AppError> {
        self.canvas = Some(device.create_canvas());
        self.fill()
    }

    fn render_frame(&mut self, device: &mut dyn Device) -> Result<(), AppError> {
        if let (true, Some(canvas)) = (self.dirty, self.canvas.as_ref()) {
            device.present(canvas)?;
            self.dirty = false;
        }
        Ok(())
    }

    fn update_config(&mut self, config: &AppConfig) -> Result<(), AppError> {
        config_color(config, "color", DEFAULT_COLOR)?;
        self.config = config.clone();
        self.fill()
    }

    fn frame_interval(&self) -> Duration {
        Duration::from_millis(250)
    }
}
