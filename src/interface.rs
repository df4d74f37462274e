//! Boundary traits for the collaborators the agent drives, and the grayscale
//! frame type exchanged with them.
//!
//! The agent core never touches a real screen, keyboard, or trade window. It
//! talks to four narrow traits ([`Perception`], [`Actuator`], [`Inventory`],
//! [`Commerce`]) so the same logic runs against a capture backend in
//! production and the scripted [`crate::sim::SimBackend`] in tests.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geom::{Direction, Point, Rect};

/// Owned 8-bit grayscale raster.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Frame {
    /// Zero-filled frame.
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, 0)
    }

    pub fn filled(width: u32, height: u32, value: u8) -> Self {
        Self {
            width,
            height,
            data: vec![value; (width * height) as usize],
        }
    }

    /// Wrap raw row-major bytes; `data` must hold `width * height` samples.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), (width * height) as usize);
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.data[(y * self.width + x) as usize]
    }

    pub fn set(&mut self, x: u32, y: u32, value: u8) {
        self.data[(y * self.width + x) as usize] = value;
    }

    /// Paint a rectangle, silently clipped to the frame bounds.
    pub fn fill_rect(&mut self, rect: Rect, value: u8) {
        let x0 = rect.x.max(0) as u32;
        let y0 = rect.y.max(0) as u32;
        let x1 = (rect.x + rect.width as i32).clamp(0, self.width as i32) as u32;
        let y1 = (rect.y + rect.height as i32).clamp(0, self.height as i32) as u32;
        for y in y0..y1 {
            for x in x0..x1 {
                self.set(x, y, value);
            }
        }
    }

    /// Copy out a sub-rectangle, clipped to the frame bounds.
    pub fn region(&self, rect: Rect) -> Frame {
        let x0 = rect.x.max(0) as u32;
        let y0 = rect.y.max(0) as u32;
        let x1 = (rect.x + rect.width as i32).clamp(0, self.width as i32) as u32;
        let y1 = (rect.y + rect.height as i32).clamp(0, self.height as i32) as u32;
        // A rect entirely past the frame clips to nothing on one axis even
        // when the other axis still overlaps.
        if x0 >= x1 || y0 >= y1 {
            return Frame::new(0, 0);
        }
        let width = x1 - x0;
        let height = y1 - y0;
        let mut data = Vec::with_capacity((width * height) as usize);
        for y in y0..y1 {
            let start = (y * self.width + x0) as usize;
            data.extend_from_slice(&self.data[start..start + width as usize]);
        }
        Frame {
            width,
            height,
            data,
        }
    }

    /// Copy another frame in at `at`, clipped to this frame's bounds.
    pub fn paste(&mut self, at: Point, source: &Frame) {
        for sy in 0..source.height {
            for sx in 0..source.width {
                let x = at.0 + sx as i32;
                let y = at.1 + sy as i32;
                if x >= 0 && y >= 0 && (x as u32) < self.width && (y as u32) < self.height {
                    self.set(x as u32, y as u32, source.get(sx, sy));
                }
            }
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(feature = "png")]
impl Frame {
    /// Load a template from disk, converting to 8-bit grayscale.
    pub fn from_png(path: &std::path::Path) -> Result<Frame, image::ImageError> {
        let img = image::open(path)?.to_luma8();
        let (width, height) = (img.width(), img.height());
        Ok(Frame::from_raw(width, height, img.into_raw()))
    }
}

/// Character classes the text extractor can be hinted with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Charset {
    Digits,
    Any,
}

/// Text extraction failed on undecodable image data.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("could not extract text from region {region:?}: {reason}")]
pub struct ParseError {
    pub region: Rect,
    pub reason: String,
}

/// The merchants the agent trades with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Merchant {
    Weapons,
    Blacksmith,
    Potions,
    Items,
    Banker,
}

/// A merchant declined or failed a purchase.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("could not buy {item:?} from the {merchant:?} merchant")]
pub struct CommerceError {
    pub item: String,
    pub merchant: Merchant,
}

/// Screen observation: frames, template matching, and text extraction.
pub trait Perception {
    /// Grab one full screen frame.
    fn capture(&mut self) -> Frame;

    /// Read text out of a screen region.
    fn extract_text(&mut self, region: Rect, charset: Charset) -> Result<String, ParseError>;

    /// Similarity of a captured region against a reference template, in
    /// `0.0..=1.0`.
    fn match_confidence(&mut self, region: &Frame, template: &Frame) -> f64;

    /// Best on-screen position of a template, with its confidence.
    fn locate(&mut self, template: &Frame) -> Option<(Point, f64)>;
}

/// Input dispatch: key presses, cursor motion, and pacing.
pub trait Actuator {
    fn press(&mut self, direction: Direction);

    fn move_cursor(&mut self, to: Point, duration: Duration);

    fn click(&mut self);

    fn double_click(&mut self);

    fn drag(&mut self, to: Point, duration: Duration);

    /// Block the agent for a fixed pacing delay.
    fn pause(&mut self, duration: Duration);

    /// Best-effort request that the observed application shut down.
    fn quit_application(&mut self);
}

/// Item management in the agent's pack.
pub trait Inventory {
    /// On-screen location of an item, or `None` when it cannot be seen.
    fn find_item(&mut self, item: &str) -> Option<Point>;

    /// Apply an item, optionally onto a screen target. Returns `false` when
    /// the item is absent.
    fn use_item(&mut self, item: &str, target: Option<Point>) -> bool;

    /// Shuffle loose items back into their designated pack slots.
    fn reorganize(&mut self);
}

/// Buying and selling through merchant windows.
pub trait Commerce {
    fn buy(&mut self, item: &str, merchant: Merchant) -> Result<(), CommerceError>;

    /// Sell every visible instance of an item; returns the number sold.
    fn sell(&mut self, item: &str, merchant: Merchant) -> u32;
}

/// Everything the agent needs from the outside world.
pub trait Backend: Perception + Actuator + Inventory + Commerce {}

impl<T: Perception + Actuator + Inventory + Commerce> Backend for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_get_set() {
        let mut frame = Frame::new(4, 3);
        assert_eq!(frame.get(2, 1), 0);
        frame.set(2, 1, 200);
        assert_eq!(frame.get(2, 1), 200);
        assert_eq!(frame.get(1, 2), 0);
    }

    #[test]
    fn test_frame_from_raw_round_trips_bytes() {
        let frame = Frame::from_raw(3, 2, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(frame.get(2, 0), 3);
        assert_eq!(frame.get(0, 1), 4);
        assert_eq!(frame.as_bytes(), &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_frame_region_copies_rows() {
        let mut frame = Frame::new(6, 6);
        frame.fill_rect(Rect::new(2, 2, 2, 2), 9);
        let region = frame.region(Rect::new(2, 2, 2, 2));
        assert_eq!(region.width(), 2);
        assert_eq!(region.height(), 2);
        assert!(region.as_bytes().iter().all(|&b| b == 9));
    }

    #[test]
    fn test_frame_region_clips_to_bounds() {
        let frame = Frame::filled(5, 5, 7);
        let region = frame.region(Rect::new(3, 3, 10, 10));
        assert_eq!(region.width(), 2);
        assert_eq!(region.height(), 2);

        let empty = frame.region(Rect::new(20, 20, 4, 4));
        assert_eq!(empty.width(), 0);
        assert_eq!(empty.height(), 0);
        assert!(empty.as_bytes().is_empty());

        // Past the frame on one axis only, still inside on the other.
        let past_x = frame.region(Rect::new(20, 2, 4, 4));
        assert_eq!((past_x.width(), past_x.height()), (0, 0));
        assert!(past_x.as_bytes().is_empty());
        let past_y = frame.region(Rect::new(2, 20, 4, 4));
        assert_eq!((past_y.width(), past_y.height()), (0, 0));
        assert!(past_y.as_bytes().is_empty());
    }

    #[test]
    fn test_fill_rect_clips() {
        let mut frame = Frame::new(4, 4);
        frame.fill_rect(Rect::new(-2, -2, 4, 4), 5);
        assert_eq!(frame.get(0, 0), 5);
        assert_eq!(frame.get(1, 1), 5);
        assert_eq!(frame.get(2, 2), 0);
    }

    #[test]
    fn test_paste_clips_at_edges() {
        let mut frame = Frame::new(4, 4);
        let patch = Frame::filled(3, 3, 8);
        frame.paste((2, 2), &patch);
        assert_eq!(frame.get(2, 2), 8);
        assert_eq!(frame.get(3, 3), 8);
        assert_eq!(frame.get(1, 1), 0);

        frame.paste((-1, -1), &patch);
        assert_eq!(frame.get(0, 0), 8);
        assert_eq!(frame.get(1, 1), 8);
    }
}
