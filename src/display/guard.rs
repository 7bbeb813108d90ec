//! Thread binding for the device handle.
//!
//! The first thread that calls into the wrapped device becomes its owner.
//! Calls from any other thread still go through, but are counted so the
//! single-writer rule can be checked from the outside.

use super::{Device, DisplayError};
use image::RgbImage;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, ThreadId};

/// Shared counter of device calls made off the owning thread
#[derive(Clone, Default)]
pub struct CrossThreadCalls(Arc<AtomicUsize>);

impl CrossThreadCalls {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }
}

/// Device wrapper that records which thread owns it
pub struct ThreadBoundDevice<D> {
    inner: D,
    owner: OnceLock<ThreadId>,
    foreign: CrossThreadCalls,
}

impl<D: Device> ThreadBoundDevice<D> {
    pub fn new(inner: D) -> (Self, CrossThreadCalls) {
        let foreign = CrossThreadCalls::default();
        let device = Self {
            inner,
            owner: OnceLock::new(),
            foreign: foreign.clone(),
        };
        (device, foreign)
    }

    fn check(&self) {
        let current = thread::current().id();
        let owner = *self.owner.get_or_init(|| current);
        if owner != current {
            let calls = self.foreign.0.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::error!(
                "Device touched from {:?}, owned by {:?} ({} foreign calls)",
                current,
                owner,
                calls
            );
        }
    }
}

impl<D: Device> Device for ThreadBoundDevice<D> {
    fn width(&self) -> u32 {
        self.inner.width()
    }

    fn height(&self) -> u32 {
        self.inner.height()
    }

    fn clear(&mut self) {
        self.check();
        self.inner.clear()
    }

    fn create_canvas(&self) -> RgbImage {
        self.inner.create_canvas()
    }

    fn present(&mut self, frame: &RgbImage) -> Result<(), DisplayError> {
        self.check();
        self.inner.present(frame)
    }

    fn brightness(&self) -> u8 {
        self.inner.brightness()
    }

    fn set_brightness(&mut self, brightness: u8) {
        self.check();
        self.inner.set_brightness(brightness)
    }
}
