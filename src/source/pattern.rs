//! Synthetic test-pattern source
//!
//! A moving-gradient generator that satisfies [`VideoSource`] without any
//! hardware. Useful as a placeholder stream and for exercising the full
//! capture/encode pipeline in integration setups.

use bytes::Bytes;

use crate::registry::StreamKey;

use super::{Frame, SourceError, SourceOpener, VideoSource};

/// Generates a gradient that shifts one pixel per frame
pub struct PatternSource {
    width: u32,
    height: u32,
    tick: u32,
}

impl PatternSource {
    /// Create a pattern source at the given resolution
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            tick: 0,
        }
    }
}

impl VideoSource for PatternSource {
    fn read_frame(&mut self) -> Result<Frame, SourceError> {
        let mut data = Vec::with_capacity((self.width * self.height * 3) as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                data.push((x.wrapping_add(self.tick) % 256) as u8);
                data.push((y.wrapping_add(self.tick) % 256) as u8);
                data.push((self.tick % 256) as u8);
            }
        }
        self.tick = self.tick.wrapping_add(1);
        Ok(Frame::new(self.width, self.height, Bytes::from(data)))
    }
}

/// Opener that hands out a [`PatternSource`] for any key
pub struct PatternOpener;

impl SourceOpener for PatternOpener {
    fn open(&self, key: &StreamKey) -> Result<Box<dyn VideoSource>, SourceError> {
        Ok(Box::new(PatternSource::new(key.width, key.height)))
    }
}
