//! Frame sources for the streaming server: a built-in procedural gallery,
//! or frames supplied externally (folder/video/custom image) by the caller.

use gige_proto::PixelFormat;
use serde::{Deserialize, Serialize};

/// A single frame ready to be packetised by the streaming server.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub data: Vec<u8>,
}

/// Configuration selecting which image source to use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ImageSourceConfig {
    /// Procedurally generated test pattern gallery.
    TestPattern { width: u32, height: u32 },
    /// A single fixed image, supplied by the caller out of band.
    Custom,
}

/// Produces successive frames for the streaming server, cycling forever.
pub trait ImageSource: Send {
    /// Return the next frame to send.
    fn next_frame(&mut self) -> Frame;
}

/// Built-in procedural test-pattern generator, grounded on the reference mock
/// camera's five-pattern fallback gallery: a horizontal hue gradient, a
/// left-to-right color gradient, a four-color checkerboard, concentric
/// rings, and a labelled banner frame.
pub struct TestPatternSource {
    width: u32,
    height: u32,
    index: usize,
    frame_id: u64,
}

impl TestPatternSource {
    pub fn new(width: u32, height: u32) -> Self {
        TestPatternSource {
            width,
            height,
            index: 0,
            frame_id: 0,
        }
    }

    fn generate(&self, pattern: usize) -> Vec<u8> {
        let (w, h) = (self.width as usize, self.height as usize);
        let mut buf = vec![0u8; w * h * 3];
        match pattern {
            0 => {
                // Horizontal hue gradient band, BGR8.
                for y in 0..h {
                    let hue = (y * 180 / h.max(1)) as u8;
                    let (b, g, r) = hsv_to_bgr(hue, 255, 255);
                    for x in 0..w {
                        let i = (y * w + x) * 3;
                        buf[i] = b;
                        buf[i + 1] = g;
                        buf[i + 2] = r;
                    }
                }
            }
            1 => {
                // Left-to-right color gradient.
                for x in 0..w {
                    let ratio = x as f64 / w.max(1) as f64;
                    let b = (255.0 * (1.0 - ratio)) as u8;
                    let r = (255.0 * ratio) as u8;
                    for y in 0..h {
                        let i = (y * w + x) * 3;
                        buf[i] = b;
                        buf[i + 1] = 0;
                        buf[i + 2] = r;
                    }
                }
            }
            2 => {
                // Four-color checkerboard.
                const COLORS: [[u8; 3]; 4] =
                    [[255, 0, 0], [0, 255, 0], [0, 0, 255], [255, 255, 0]];
                let square = 80usize.max(1);
                for y in 0..h {
                    for x in 0..w {
                        let idx = ((y / square) + (x / square)) % COLORS.len();
                        let i = (y * w + x) * 3;
                        buf[i..i + 3].copy_from_slice(&COLORS[idx]);
                    }
                }
            }
            3 => {
                // Concentric rings over a dark background.
                const COLORS: [[u8; 3]; 4] =
                    [[255, 0, 0], [0, 255, 0], [0, 0, 255], [255, 255, 0]];
                for y in 0..h {
                    for x in 0..w {
                        let i = (y * w + x) * 3;
                        buf[i..i + 3].copy_from_slice(&[20, 40, 60]);
                    }
                }
                let (cx, cy) = (w as i64 / 2, h as i64 / 2);
                for (ring_idx, radius) in (20..200).step_by(40).enumerate() {
                    let color = COLORS[ring_idx % COLORS.len()];
                    draw_ring(&mut buf, w, h, cx, cy, radius, 3, color);
                }
            }
            _ => {
                // Banner frame: solid background, no text rendering (no font
                // dependency); the frame id overlay happens in next_frame().
                for px in buf.chunks_exact_mut(3) {
                    px.copy_from_slice(&[40, 60, 80]);
                }
            }
        }
        buf
    }
}

impl ImageSource for TestPatternSource {
    fn next_frame(&mut self) -> Frame {
        let mut data = self.generate(self.index);
        self.index = (self.index + 1) % 5;
        self.frame_id += 1;
        // Stamp a simple frame-id marker into the top-left corner so
        // receivers can observe frame progression without a text renderer.
        stamp_frame_id(&mut data, self.width as usize, self.frame_id);
        Frame {
            width: self.width,
            height: self.height,
            pixel_format: PixelFormat::Bgr8,
            data,
        }
    }
}

fn stamp_frame_id(buf: &mut [u8], width: usize, frame_id: u64) {
    let bytes = frame_id.to_be_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if i * 3 + 2 < buf.len() && i < width {
            buf[i * 3] = b;
            buf[i * 3 + 1] = b;
            buf[i * 3 + 2] = b;
        }
    }
}

fn draw_ring(
    buf: &mut [u8],
    w: usize,
    h: usize,
    cx: i64,
    cy: i64,
    radius: i64,
    thickness: i64,
    color: [u8; 3],
) {
    for y in 0..h {
        for x in 0..w {
            let dx = x as i64 - cx;
            let dy = y as i64 - cy;
            let dist = ((dx * dx + dy * dy) as f64).sqrt() as i64;
            if (dist - radius).abs() <= thickness {
                let i = (y * w + x) * 3;
                buf[i..i + 3].copy_from_slice(&color);
            }
        }
    }
}

/// Minimal HSV (full saturation/value assumed elsewhere) to BGR conversion
/// used by the hue-gradient pattern.
fn hsv_to_bgr(h: u8, s: u8, v: u8) -> (u8, u8, u8) {
    let h = f64::from(h) * 2.0; // 0..360
    let s = f64::from(s) / 255.0;
    let v = f64::from(v) / 255.0;
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = v - c;
    let (r1, g1, b1) = match h as u32 {
        0..=59 => (c, x, 0.0),
        60..=119 => (x, c, 0.0),
        120..=179 => (0.0, c, x),
        180..=239 => (0.0, x, c),
        240..=299 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let to_u8 = |v: f64| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    (to_u8(b1), to_u8(g1), to_u8(r1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_cycles_and_sizes_correctly() {
        let mut source = TestPatternSource::new(64, 48);
        for _ in 0..5 {
            let frame = source.next_frame();
            assert_eq!(frame.width, 64);
            assert_eq!(frame.height, 48);
            assert_eq!(frame.data.len(), 64 * 48 * 3);
        }
    }

    #[test]
    fn frame_id_increments() {
        let mut source = TestPatternSource::new(32, 32);
        let _ = source.next_frame();
        assert_eq!(source.frame_id, 1);
        let _ = source.next_frame();
        assert_eq!(source.frame_id, 2);
    }
}
