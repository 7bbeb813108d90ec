//! In-memory matrix used when no panel is attached.
//!
//! Every presented frame is published on a [`FrameTap`] so the web layer can
//! serve a preview without reaching into the device itself.

use super::{Device, DisplayError, MAX_BRIGHTNESS};
use image::RgbImage;
use std::sync::Arc;
use tokio::sync::watch;

/// Default simulated dimensions (one 64x32 HUB75 panel)
pub const DEFAULT_WIDTH: u32 = 64;
pub const DEFAULT_HEIGHT: u32 = 32;

/// Read side of the simulated matrix output
#[derive(Clone)]
pub struct FrameTap {
    rx: watch::Receiver<Arc<RgbImage>>,
}

impl FrameTap {
    /// Last frame shown on the matrix
    pub fn latest(&self) -> Arc<RgbImage> {
        Arc::clone(&self.rx.borrow())
    }
}

/// Simulated RGB matrix
pub struct SimulatedMatrix {
    width: u32,
    height: u32,
    brightness: u8,
    raw: RgbImage,
    tx: watch::Sender<Arc<RgbImage>>,
}

impl SimulatedMatrix {
    /// Create a blank matrix and the tap that observes it
    pub fn new(width: u32, height: u32) -> (Self, FrameTap) {
        let (tx, rx) = watch::channel(Arc::new(RgbImage::new(width, height)));
        let matrix = Self {
            width,
            height,
            brightness: MAX_BRIGHTNESS,
            raw: RgbImage::new(width, height),
            tx,
        };
        (matrix, FrameTap { rx })
    }

    /// Publish the raw frame scaled by brightness, the way the panel's PWM would
    fn publish(&self) {
        let level = u16::from(self.brightness);
        let mut shown = self.raw.clone();
        for pixel in shown.pixels_mut() {
            for channel in pixel.0.iter_mut() {
                *channel = (u16::from(*channel) * level / u16::from(MAX_BRIGHTNESS)) as u8;
            }
        }
        self.tx.send_replace(Arc::new(shown));
    }
}

impl Device for SimulatedMatrix {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn clear(&mut self) {
        self.raw = RgbImage::new(self.width, self.height);
        self.publish();
    }

    fn present(&mut self, frame: &RgbImage) -> Result<(), DisplayError> {
        if frame.width() != self.width || frame.height() != self.height {
            return Err(DisplayError::FrameSize {
                width: self.width,
                height: self.height,
                got_width: frame.width(),
                got_height: frame.height(),
            });
        }

        self.raw.clone_from(frame);
        self.publish();
        Ok(())
    }

    fn brightness(&self) -> u8 {
        self.brightness
    }

    fn set_brightness(&mut self, brightness: u8) {
        self.brightness = brightness.min(MAX_BRIGHTNESS);
        self.publish();
    }
}
