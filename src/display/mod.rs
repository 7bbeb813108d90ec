//! Display module for the RGB LED matrix.
//!
//! Applications draw into an offscreen canvas and hand complete frames to the
//! device, which swaps them in atomically. The device is owned by the control
//! loop; nothing else is allowed to touch it.

pub mod guard;
pub mod simulated;

pub use guard::{CrossThreadCalls, ThreadBoundDevice};
pub use simulated::{FrameTap, SimulatedMatrix};

use image::RgbImage;
use thiserror::Error;

/// Highest brightness value accepted by a device
pub const MAX_BRIGHTNESS: u8 = 100;

/// Display errors
#[derive(Error, Debug)]
pub enum DisplayError {
    #[error("Frame size {got_width}x{got_height} does not match display {width}x{height}")]
    FrameSize {
        width: u32,
        height: u32,
        got_width: u32,
        got_height: u32,
    },
}

/// Drawing surface and brightness control of a single matrix
pub trait Device: Send {
    /// Width in pixels
    fn width(&self) -> u32;

    /// Height in pixels
    fn height(&self) -> u32;

    /// Blank the visible frame
    fn clear(&mut self);

    /// Create an offscreen canvas matching the display size
    fn create_canvas(&self) -> RgbImage {
        RgbImage::new(self.width(), self.height())
    }

    /// Swap a fully drawn canvas onto the display
    fn present(&mut self, frame: &RgbImage) -> Result<(), DisplayError>;

    /// Current brightness (0-100)
    fn brightness(&self) -> u8;

    /// Set brightness, clamped to 0-100
    fn set_brightness(&mut self, brightness: u8);
}

impl<D: Device + ?Sized> Device for Box<D> {
    fn width(&self) -> u32 {
        (**self).width()
    }

    fn height(&self) -> u32 {
        (**self).height()
    }

    fn clear(&mut self) {
        (**self).clear()
    }

    fn create_canvas(&self) -> RgbImage {
        (**self).create_canvas()
    }

    fn present(&mut self, frame: &RgbImage) -> Result<(), DisplayError> {
        (**self).present(frame)
    }

    fn brightness(&self) -> u8 {
        (**self).brightness()
    }

    fn set_brightness(&mut self, brightness: u8) {
        (**self).set_brightness(brightness)
    }
}
