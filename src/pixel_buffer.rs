use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{Error, OutOfRange};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}
impl Color {
    pub const BLACK: Color = Color::new(0, 0, 0);
    pub const WHITE: Color = Color::new(255, 255, 255);
    pub const RED: Color = Color::new(255, 0, 0);
    pub const GREEN: Color = Color::new(0, 255, 0);
    pub const BLUE: Color = Color::new(0, 0, 255);
    pub const YELLOW: Color = Color::new(255, 255, 0);
    pub const MAGENTA: Color = Color::new(255, 0, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn is_black(self) -> bool {
        self == Self::BLACK
    }

    /// Fully saturated color on a 256 step color wheel.
    pub fn from_hue(hue: u8) -> Self {
        let sector = hue / 43;
        let rise = (hue % 43) * 6;
        let fall = 255 - rise;
        match sector {
            0 => Self::new(255, rise, 0),
            1 => Self::new(fall, 255, 0),
            2 => Self::new(0, 255, rise),
            3 => Self::new(0, fall, 255),
            4 => Self::new(rise, 0, 255),
            _ => Self::new(255, 0, fall),
        }
    }
}

/// What every writer and the refresher get to see of the pixel buffer.
pub trait Canvas: Send + Sync {
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    fn set_pixel(&self, x: u32, y: u32, color: Color) -> Result<(), OutOfRange>;
    fn fill(&self, color: Color);
    fn clear(&self) {
        self.fill(Color::BLACK)
    }

    /// Copies the whole panel into `frame` as it stood at one instant.
    fn snapshot_into(&self, frame: &mut Frame);
}

// Row-major, one lock over every cell. Critical sections are a single store
// or a single copy of the whole panel.
pub struct PixelBuffer {
    width: u32,
    height: u32,
    cells: Mutex<Box<[Color]>>,
}
impl PixelBuffer {
    pub fn new(width: u32, height: u32) -> Result<Self, Error> {
        let len = cell_count(width, height).ok_or(Error::InvalidDimensions { width, height })?;
        Ok(Self {
            width,
            height,
            cells: Mutex::new(vec![Color::BLACK; len].into_boxed_slice()),
        })
    }

    fn index(&self, x: u32, y: u32) -> Result<usize, OutOfRange> {
        if x >= self.width || y >= self.height {
            return Err(OutOfRange {
                x,
                y,
                width: self.width,
                height: self.height,
            });
        }
        Ok(y as usize * self.width as usize + x as usize)
    }

    pub fn get_pixel(&self, x: u32, y: u32) -> Result<Color, OutOfRange> {
        let i = self.index(x, y)?;
        Ok(self.cells.lock()[i])
    }

    pub fn snapshot(&self) -> Frame {
        let mut frame = Frame::blank(self.width, self.height);
        self.snapshot_into(&mut frame);
        frame
    }

    /// Like [`Canvas::snapshot_into`], but gives up after `timeout` if a writer
    /// holds the lock. Returns whether `frame` was refreshed.
    pub fn try_snapshot_into(&self, frame: &mut Frame, timeout: Duration) -> bool {
        let Some(cells) = self.cells.try_lock_for(timeout) else {
            return false;
        };
        frame.copy_from(self.width, self.height, &cells);
        true
    }
}
impl Canvas for PixelBuffer {
    fn width(&self) -> u32 {
        self.width
    }
    fn height(&self) -> u32 {
        self.height
    }

    fn set_pixel(&self, x: u32, y: u32, color: Color) -> Result<(), OutOfRange> {
        let i = self.index(x, y)?;
        self.cells.lock()[i] = color;
        Ok(())
    }
    fn fill(&self, color: Color) {
        self.cells.lock().fill(color);
    }

    fn snapshot_into(&self, frame: &mut Frame) {
        let cells = self.cells.lock();
        frame.copy_from(self.width, self.height, &cells);
    }
}

fn cell_count(width: u32, height: u32) -> Option<usize> {
    if width == 0 || height == 0 {
        return None;
    }
    (width as usize).checked_mul(height as usize)
}

/// An owned copy of the panel, as handed to the hardware.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    pixels: Box<[Color]>,
}
impl Frame {
    pub fn blank(width: u32, height: u32) -> Self {
        let len = width as usize * height as usize;
        Self {
            width,
            height,
            pixels: vec![Color::BLACK; len].into_boxed_slice(),
        }
    }

    fn copy_from(&mut self, width: u32, height: u32, cells: &[Color]) {
        if self.pixels.len() != cells.len() {
            self.pixels = cells.into();
        } else {
            self.pixels.copy_from_slice(cells);
        }
        self.width = width;
        self.height = height;
    }

    pub fn width(&self) -> u32 {
        self.width
    }
    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: u32, y: u32) -> Option<Color> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = y as usize * self.width as usize + x as usize;
        self.pixels.get(i).copied()
    }

    pub fn pixels(&self) -> &[Color] {
        &self.pixels
    }
    pub fn rows(&self) -> impl Iterator<Item = &[Color]> {
        self.pixels.chunks_exact(self.width.max(1) as usize)
    }

    pub fn is_dark(&self) -> bool {
        self.pixels.iter().all(|c| c.is_black())
    }
    pub fn lit(&self) -> usize {
        self.pixels.iter().filter(|c| !c.is_black()).count()
    }
}
