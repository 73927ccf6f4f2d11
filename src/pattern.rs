use std::{sync::Arc, time::Duration};

use log::{debug, info};

use crate::{
    error::{Error, OutOfRange},
    pixel_buffer::{Canvas, Color},
    worker::{Priority, StopToken, Worker},
};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Draw a single frame and finish; the image stays in the buffer.
    OneShot,
    Continuous { frame_interval: Duration },
}

pub trait Pattern: Send {
    fn name(&self) -> &str;
    fn mode(&self) -> Mode;
    fn draw(&mut self, canvas: &dyn Canvas, frame: u64) -> Result<(), OutOfRange>;
}

pub fn by_name(name: &str) -> Option<Box<dyn Pattern>> {
    let pattern: Box<dyn Pattern> = match name {
        "diagonal" => Box::new(Diagonal::new(Color::WHITE)),
        "test-card" => Box::new(TestCard),
        "sweep" => Box::new(Sweep::new(Duration::from_millis(40))),
        _ => return None,
    };
    Some(pattern)
}

/// Writes one pattern into the buffer on its own thread.
pub struct PatternGenerator {
    pattern: Box<dyn Pattern>,
    canvas: Arc<dyn Canvas>,
}
impl PatternGenerator {
    pub fn new(pattern: Box<dyn Pattern>, canvas: Arc<dyn Canvas>) -> Self {
        Self { pattern, canvas }
    }

    pub fn spawn(self) -> Result<Worker<Result<u64, OutOfRange>>, Error> {
        let name = format!("pattern:{}", self.pattern.name());
        Worker::spawn(name, Priority::Normal, move |stop| self.run(&stop))
    }

    /// Returns the number of frames drawn. An out of range write ends the
    /// generator and is handed back to whoever joins it.
    pub fn run(mut self, stop: &StopToken) -> Result<u64, OutOfRange> {
        let mut frame = 0;
        match self.pattern.mode() {
            Mode::OneShot => {
                self.pattern.draw(&*self.canvas, frame)?;
                frame += 1;
            }
            Mode::Continuous { frame_interval } => {
                while !stop.is_requested() {
                    self.pattern.draw(&*self.canvas, frame)?;
                    frame += 1;
                    if !stop.sleep(frame_interval) {
                        break;
                    }
                }
            }
        }
        info!("{} finished after {frame} frames", self.pattern.name());
        Ok(frame)
    }
}

pub struct Diagonal {
    color: Color,
}
impl Diagonal {
    pub fn new(color: Color) -> Self {
        Self { color }
    }
}
impl Pattern for Diagonal {
    fn name(&self) -> &str {
        "diagonal"
    }
    fn mode(&self) -> Mode {
        Mode::OneShot
    }
    fn draw(&mut self, canvas: &dyn Canvas, _frame: u64) -> Result<(), OutOfRange> {
        let side = canvas.width().min(canvas.height());
        for i in 0..side {
            canvas.set_pixel(i, i, self.color)?;
        }
        Ok(())
    }
}

/// Static alignment image: both diagonals of the square region plus a
/// differently colored line along each edge.
pub struct TestCard;
impl Pattern for TestCard {
    fn name(&self) -> &str {
        "test-card"
    }
    fn mode(&self) -> Mode {
        Mode::OneShot
    }
    fn draw(&mut self, canvas: &dyn Canvas, _frame: u64) -> Result<(), OutOfRange> {
        let (width, height) = (canvas.width(), canvas.height());
        let side = width.min(height);
        for i in 0..side {
            canvas.set_pixel(i, i, Color::WHITE)?;
            canvas.set_pixel(side - 1 - i, i, Color::MAGENTA)?;
        }
        for x in 0..width {
            canvas.set_pixel(x, 0, Color::RED)?;
            canvas.set_pixel(x, height - 1, Color::YELLOW)?;
        }
        for y in 0..height {
            canvas.set_pixel(0, y, Color::BLUE)?;
            canvas.set_pixel(width - 1, y, Color::GREEN)?;
        }
        Ok(())
    }
}

pub struct Solid {
    color: Color,
}
impl Solid {
    pub fn new(color: Color) -> Self {
        Self { color }
    }
}
impl Pattern for Solid {
    fn name(&self) -> &str {
        "solid"
    }
    fn mode(&self) -> Mode {
        Mode::OneShot
    }
    fn draw(&mut self, canvas: &dyn Canvas, _frame: u64) -> Result<(), OutOfRange> {
        for y in 0..canvas.height() {
            for x in 0..canvas.width() {
                canvas.set_pixel(x, y, self.color)?;
            }
        }
        Ok(())
    }
}

/// A vertical bar that walks across the panel, shifting hue as it goes.
pub struct Sweep {
    frame_interval: Duration,
}
impl Sweep {
    pub fn new(frame_interval: Duration) -> Self {
        Self { frame_interval }
    }
}
impl Pattern for Sweep {
    fn name(&self) -> &str {
        "sweep"
    }
    fn mode(&self) -> Mode {
        Mode::Continuous {
            frame_interval: self.frame_interval,
        }
    }
    fn draw(&mut self, canvas: &dyn Canvas, frame: u64) -> Result<(), OutOfRange> {
        let width = u64::from(canvas.width());
        let column = (frame % width) as u32;
        let previous = ((frame + width - 1) % width) as u32;
        let color = Color::from_hue((frame.wrapping_mul(7) % 256) as u8);
        for y in 0..canvas.height() {
            if previous != column {
                canvas.set_pixel(previous, y, Color::BLACK)?;
            }
            canvas.set_pixel(column, y, color)?;
        }
        debug!("sweep frame {frame} at column {column}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel_buffer::PixelBuffer;
    use std::time::Instant;

    /// A pattern with the classic bug: walking the diagonal up to the width.
    struct Overrun;
    impl Pattern for Overrun {
        fn name(&self) -> &str {
            "overrun"
        }
        fn mode(&self) -> Mode {
            Mode::OneShot
        }
        fn draw(&mut self, canvas: &dyn Canvas, _frame: u64) -> Result<(), OutOfRange> {
            for x in 0..canvas.width() {
                canvas.set_pixel(x, x, Color::WHITE)?;
            }
            Ok(())
        }
    }

    #[test]
    fn diagonal_on_wide_panel() {
        let buffer = PixelBuffer::new(32, 16).unwrap();
        Diagonal::new(Color::WHITE).draw(&buffer, 0).unwrap();
        let frame = buffer.snapshot();
        for y in 0..16 {
            for x in 0..32 {
                let expected = if x == y { Color::WHITE } else { Color::BLACK };
                assert_eq!(frame.get(x, y), Some(expected), "at ({x}, {y})");
            }
        }
    }

    #[test]
    fn test_card_stays_in_bounds() {
        let buffer = PixelBuffer::new(32, 16).unwrap();
        TestCard.draw(&buffer, 0).unwrap();
        let frame = buffer.snapshot();
        assert_eq!(frame.get(5, 0), Some(Color::RED));
        assert_eq!(frame.get(5, 15), Some(Color::YELLOW));
        assert_eq!(frame.get(0, 7), Some(Color::BLUE));
        assert_eq!(frame.get(31, 7), Some(Color::GREEN));
        assert_eq!(frame.get(5, 5), Some(Color::WHITE));
        assert_eq!(frame.get(10, 5), Some(Color::MAGENTA));
        assert_eq!(frame.get(20, 8), Some(Color::BLACK));
    }

    #[test]
    fn overrun_is_surfaced() {
        let buffer: Arc<dyn Canvas> = Arc::new(PixelBuffer::new(32, 16).unwrap());
        let worker = PatternGenerator::new(Box::new(Overrun), buffer).spawn().unwrap();
        let result = worker.join_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(
            result,
            Err(OutOfRange {
                x: 16,
                y: 16,
                width: 32,
                height: 16
            })
        );
    }

    #[test]
    fn one_shot_finishes_on_its_own() {
        let buffer = Arc::new(PixelBuffer::new(4, 4).unwrap());
        let canvas: Arc<dyn Canvas> = buffer.clone();
        let worker = PatternGenerator::new(Box::new(Solid::new(Color::RED)), canvas)
            .spawn()
            .unwrap();
        assert_eq!(worker.join_timeout(Duration::from_secs(1)).unwrap(), Ok(1));
        assert_eq!(buffer.snapshot().lit(), 16);
    }

    #[test]
    fn continuous_runs_until_stopped() {
        let buffer = Arc::new(PixelBuffer::new(8, 2).unwrap());
        let canvas: Arc<dyn Canvas> = buffer.clone();
        let worker = PatternGenerator::new(Box::new(Sweep::new(Duration::from_millis(1))), canvas)
            .spawn()
            .unwrap();
        std::thread::sleep(Duration::from_millis(30));

        let started = Instant::now();
        let frames = worker.stop(Duration::from_secs(1)).unwrap().unwrap();
        assert!(started.elapsed() < Duration::from_millis(500));
        assert!(frames > 1);
        // Only the current column is lit.
        assert_eq!(buffer.snapshot().lit(), 2);
    }

    #[test]
    fn names_resolve() {
        assert_eq!(by_name("sweep").unwrap().name(), "sweep");
        assert_eq!(by_name("test-card").unwrap().mode(), Mode::OneShot);
        assert!(by_name("plasma").is_none());
    }
}
