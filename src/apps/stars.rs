//! Twinkling star field.
//!
//! Config options: `spawn_rate` (stars per frame, default 1, at most
//! 1024), `lifetime` (frames, default 40), `fps` (default 60, clamped to
//! 1-240).

use super::{config_number, AppConfig, AppError, Application, DEFAULT_FRAME_INTERVAL};
use crate::display::Device;
use image::{Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;
use std::time::Duration;

const MAX_SPAWN_RATE: f64 = 1024.0;
const MIN_FPS: f64 = 1.0;
const MAX_FPS: f64 = 240.0;

struct Star {
    x: u32,
    y: u32,
    color: [u8; 3],
    age: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Settings {
    spawn_rate: u32,
    lifetime: u32,
    fps: f64,
}

impl Settings {
    fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let spawn_rate = config_number(config, "spawn_rate", 1.0)?;
        if spawn_rate > MAX_SPAWN_RATE {
            return Err(AppError::InvalidConfig {
                key: "spawn_rate".to_string(),
                reason: format!("at most {} stars per frame, got {}", MAX_SPAWN_RATE, spawn_rate),
            });
        }

        Ok(Self {
            spawn_rate: spawn_rate as u32,
            lifetime: config_number(config, "lifetime", 40.0)?.max(1.0) as u32,
            fps: config_number(config, "fps", 60.0)?.clamp(MIN_FPS, MAX_FPS),
        })
    }
}

pub struct StarsApp {
    config: AppConfig,
    settings: Option<Settings>,
    stars: Vec<Star>,
    canvas: Option<RgbImage>,
    rng: StdRng,
}

impl StarsApp {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            config: config.clone(),
            settings: None,
            stars: Vec::new(),
            canvas: None,
            rng: StdRng::from_os_rng(),
        }
    }
}

impl Application for StarsApp {
    fn setup(&mut self, device: &mut dyn Device) -> Result<(), AppError> {
        self.settings = Some(Settings::from_config(&self.config)?);
        self.stars.clear();
        device.clear();
        self.canvas = Some(device.create_canvas());
        Ok(())
    }

    fn render_frame(&mut self, device: &mut dyn Device) -> Result<(), AppError> {
        let (Some(settings), Some(canvas)) = (self.settings, self.canvas.as_mut()) else {
            return Err(AppError::Other("render before setup".to_string()));
        };

        for pixel in canvas.pixels_mut() {
            *pixel = Rgb([0, 0, 0]);
        }

        // More stars than pixels only burns memory
        let spawn = settings.spawn_rate.min(canvas.width() * canvas.height());
        for _ in 0..spawn {
            self.stars.push(Star {
                x: self.rng.random_range(0..canvas.width()),
                y: self.rng.random_range(0..canvas.height()),
                color: self.rng.random(),
                age: 0,
            });
        }

        self.stars.retain_mut(|star| {
            star.age += 1;
            if star.age > settings.lifetime {
                return false;
            }
            let phase = (f64::from(star.age) / f64::from(settings.lifetime) * PI).sin();
            let faded = star.color.map(|c| (f64::from(c) * phase) as u8);
            canvas.put_pixel(star.x, star.y, Rgb(faded));
            true
        });

        device.present(canvas)?;
        Ok(())
    }

    fn update_config(&mut self, config: &AppConfig) -> Result<(), AppError> {
        self.settings = Some(Settings::from_config(config)?);
        self.config = config.clone();
        Ok(())
    }

    fn frame_interval(&self) -> Duration {
        let fps = self.settings.map(|s| s.fps).unwrap_or(60.0);
        Duration::try_from_secs_f64(1.0 / fps).unwrap_or(DEFAULT_FRAME_INTERVAL)
    }
}
