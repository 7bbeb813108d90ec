//! Binary-coded-decimal clock.
//!
//! Six columns (HH MM SS digits), four rows of bits each, scaled to fill the
//! matrix. Redraws only when the second changes.
//!
//! Config options: `color` (`[r, g, b]`, default white).

use super::{config_color, AppConfig, AppError, Application};
use crate::display::Device;
use chrono::Timelike;
use image::{Rgb, RgbImage};
use std::time::Duration;

const COLUMNS: u32 = 6;
const ROWS: u32 = 4;
const DEFAULT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

pub struct ClockApp {
    config: AppConfig,
    color: Rgb<u8>,
    canvas: Option<RgbImage>,
    last_second: Option<u32>,
}

impl ClockApp {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            config: config.clone(),
            color: DEFAULT_COLOR,
            canvas: None,
            last_second: None,
        }
    }

    /// Draw the given time of day into the canvas
    fn draw(canvas: &mut RgbImage, color: Rgb<u8>, hour: u32, minute: u32, second: u32) {
        let dim = Rgb(color.0.map(|c| c / 8));
        let cell = (canvas.width() / COLUMNS).min(canvas.height() / ROWS).max(1);
        let x_offset = canvas.width().saturating_sub(cell * COLUMNS) / 2;
        let y_offset = canvas.height().saturating_sub(cell * ROWS) / 2;
        let digits = [hour / 10, hour % 10, minute / 10, minute % 10, second / 10, second % 10];

        for pixel in canvas.pixels_mut() {
            *pixel = Rgb([0, 0, 0]);
        }

        for (column, digit) in (0u32..).zip(digits) {
            for row in 0..ROWS {
                let bit = ROWS - 1 - row;
                let lit = digit & (1 << bit) != 0;
                let shade = if lit { color } else { dim };

                // Leave a one-pixel gap between cells when there is room
                let size = if cell > 2 { cell - 1 } else { cell };
                for dy in 0..size {
                    for dx in 0..size {
                        let x = x_offset + column * cell + dx;
                        let y = y_offset + row * cell + dy;
                        if x < canvas.width() && y < canvas.height() {
                            canvas.put_pixel(x, y, shade);
                        }
                    }
                }
            }
        }
    }
}

impl Application for ClockApp {
    fn setup(&mut self, device: &mut dyn Device) -> Result<(), AppError> {
        self.color = config_color(&self.config, "color", DEFAULT_COLOR)?;
        device.clear();
        self.canvas = Some(device.create_canvas());
        self.last_second = None;
        Ok(())
    }

    fn render_frame(&mut self, device: &mut dyn Device) -> Result<(), AppError> {
        let now = chrono::Local::now();
        if self.last_second == Some(now.second()) {
            return Ok(());
        }

        let canvas = self
            .canvas
            .as_mut()
            .ok_or_else(|| AppError::Other("render before setup".to_string()))?;
        Self::draw(canvas, self.color, now.hour(), now.minute(), now.second());
        device.present(canvas)?;
        self.last_second = Some(now.second());
        Ok(())
    }

    fn update_config(&mut self, config: &AppConfig) -> Result<(), AppError> {
        self.color = config_color(config, "color", DEFAULT_COLOR)?;
        self.config = config.clone();
        // Force a redraw with the new color
        self.last_second = None;
        Ok(())
    }

    fn frame_interval(&self) -> Duration {
        Duration::from_millis(100)
    }
}
