//! Synthetic test patterns for the `videotestsrc` source.
//!
//! Pattern numbers follow GStreamer's `videotestsrc` so that scripts written
//! for the `test` remote control keep their meaning: pressing "2" shows black,
//! "1" shows snow, and so on.

use font8x8::{BASIC_FONTS, UnicodeFonts};
use image::{Rgb, RgbImage};
use std::time::Duration;

/// Number of patterns (valid indices are `0..PATTERN_COUNT`)
pub const PATTERN_COUNT: u8 = 21;

const WHITE: [u8; 3] = [255, 255, 255];
const BLACK: [u8; 3] = [0, 0, 0];

/// One of the 21 `videotestsrc` patterns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestPattern {
    Smpte,
    Snow,
    Black,
    White,
    Red,
    Green,
    Blue,
    Checkers1,
    Checkers2,
    Checkers4,
    Checkers8,
    Circular,
    Blink,
    Smpte75,
    ZonePlate,
    Gamut,
    ChromaZonePlate,
    SolidColor,
    Ball,
    Smpte100,
    Bar,
}

const ALL_PATTERNS: [TestPattern; PATTERN_COUNT as usize] = [
    TestPattern::Smpte,
    TestPattern::Snow,
    TestPattern::Black,
    TestPattern::White,
    TestPattern::Red,
    TestPattern::Green,
    TestPattern::Blue,
    TestPattern::Checkers1,
    TestPattern::Checkers2,
    TestPattern::Checkers4,
    TestPattern::Checkers8,
    TestPattern::Circular,
    TestPattern::Blink,
    TestPattern::Smpte75,
    TestPattern::ZonePlate,
    TestPattern::Gamut,
    TestPattern::ChromaZonePlate,
    TestPattern::SolidColor,
    TestPattern::Ball,
    TestPattern::Smpte100,
    TestPattern::Bar,
];

impl TestPattern {
    /// Look up a pattern by its `videotestsrc` number
    pub fn from_index(index: u8) -> Option<Self> {
        ALL_PATTERNS.get(usize::from(index)).copied()
    }

    /// The `videotestsrc` number of this pattern
    pub fn index(self) -> u8 {
        ALL_PATTERNS
            .iter()
            .position(|p| *p == self)
            .map(|i| i as u8)
            .unwrap_or(0)
    }

    /// The `videotestsrc` nickname of this pattern
    pub fn name(self) -> &'static str {
        match self {
            TestPattern::Smpte => "smpte",
            TestPattern::Snow => "snow",
            TestPattern::Black => "black",
            TestPattern::White => "white",
            TestPattern::Red => "red",
            TestPattern::Green => "green",
            TestPattern::Blue => "blue",
            TestPattern::Checkers1 => "checkers-1",
            TestPattern::Checkers2 => "checkers-2",
            TestPattern::Checkers4 => "checkers-4",
            TestPattern::Checkers8 => "checkers-8",
            TestPattern::Circular => "circular",
            TestPattern::Blink => "blink",
            TestPattern::Smpte75 => "smpte75",
            TestPattern::ZonePlate => "zone-plate",
            TestPattern::Gamut => "gamut",
            TestPattern::ChromaZonePlate => "chroma-zone-plate",
            TestPattern::SolidColor => "solid-color",
            TestPattern::Ball => "ball",
            TestPattern::Smpte100 => "smpte100",
            TestPattern::Bar => "bar",
        }
    }

    /// Whether consecutive frames of this pattern differ
    pub fn is_animated(self) -> bool {
        matches!(self, TestPattern::Snow | TestPattern::Blink | TestPattern::Ball)
    }

    /// Render frame number `sequence` of this pattern
    pub fn render(self, width: u32, height: u32, sequence: u64) -> RgbImage {
        let mut img = RgbImage::new(width, height);
        match self {
            TestPattern::Smpte => draw_smpte(&mut img),
            TestPattern::Snow => draw_snow(&mut img, sequence),
            TestPattern::Black => fill(&mut img, BLACK),
            TestPattern::White => fill(&mut img, WHITE),
            TestPattern::Red => fill(&mut img, [255, 0, 0]),
            TestPattern::Green => fill(&mut img, [0, 255, 0]),
            TestPattern::Blue => fill(&mut img, [0, 0, 255]),
            TestPattern::Checkers1 => draw_checkers(&mut img, 1),
            TestPattern::Checkers2 => draw_checkers(&mut img, 2),
            TestPattern::Checkers4 => draw_checkers(&mut img, 4),
            TestPattern::Checkers8 => draw_checkers(&mut img, 8),
            TestPattern::Circular => draw_rings(&mut img, false),
            TestPattern::Blink => fill(&mut img, if sequence % 2 == 0 { BLACK } else { WHITE }),
            TestPattern::Smpte75 => draw_bars(&mut img, 0, height, 191),
            TestPattern::ZonePlate => draw_zone_plate(&mut img),
            TestPattern::Gamut => draw_gamut(&mut img),
            TestPattern::ChromaZonePlate => draw_rings(&mut img, true),
            TestPattern::SolidColor => fill(&mut img, [128, 128, 128]),
            TestPattern::Ball => draw_ball(&mut img, sequence),
            TestPattern::Smpte100 => draw_bars(&mut img, 0, height, 255),
            TestPattern::Bar => {
                fill(&mut img, BLACK);
                fill_rect(&mut img, 0, 0, (width / 8).max(1), height, WHITE);
            }
        }
        img
    }
}

/// Fill the entire image with a color
pub fn fill(img: &mut RgbImage, color: [u8; 3]) {
    for pixel in img.pixels_mut() {
        *pixel = Rgb(color);
    }
}

/// Draw a filled rectangle, clipped to the image
pub fn fill_rect(img: &mut RgbImage, x: u32, y: u32, w: u32, h: u32, color: [u8; 3]) {
    let x_end = x.saturating_add(w).min(img.width());
    let y_end = y.saturating_add(h).min(img.height());
    for py in y..y_end {
        for px in x..x_end {
            img.put_pixel(px, py, Rgb(color));
        }
    }
}

/// Draw text using font8x8 glyphs on an opaque background.
///
/// Each character is 8x8 pixels. Text does not wrap.
pub fn draw_text(img: &mut RgbImage, x: u32, y: u32, text: &str, fg: [u8; 3], bg: [u8; 3]) {
    let mut cursor_x = x;
    for ch in text.chars() {
        if cursor_x >= img.width() {
            break;
        }
        let glyph = BASIC_FONTS.get(ch).unwrap_or([0u8; 8]);
        for (row_idx, row) in glyph.iter().enumerate() {
            let py = y + row_idx as u32;
            if py >= img.height() {
                break;
            }
            for bit in 0..8 {
                let px = cursor_x + bit;
                if px >= img.width() {
                    break;
                }
                // font8x8 stores LSB as leftmost pixel
                let color = if (row >> bit) & 1 == 1 { fg } else { bg };
                img.put_pixel(px, py, Rgb(color));
            }
        }
        cursor_x += 8;
    }
}

/// Burn the stream time into the top-left corner, like `timeoverlay`
pub fn draw_time_overlay(img: &mut RgbImage, timestamp: Duration) {
    let millis = timestamp.as_millis();
    let text = format!(
        "{}:{:02}:{:02}.{:03}",
        millis / 3_600_000,
        (millis / 60_000) % 60,
        (millis / 1000) % 60,
        millis % 1000
    );
    draw_text(img, 2, 2, &text, WHITE, BLACK);
}

fn bar_colors(level: u8) -> [[u8; 3]; 7] {
    [
        [level, level, level],
        [level, level, 0],
        [0, level, level],
        [0, level, 0],
        [level, 0, level],
        [level, 0, 0],
        [0, 0, level],
    ]
}

fn draw_bars(img: &mut RgbImage, y: u32, h: u32, level: u8) {
    let width = img.width();
    for (i, color) in bar_colors(level).iter().enumerate() {
        let x0 = width * i as u32 / 7;
        let x1 = width * (i as u32 + 1) / 7;
        fill_rect(img, x0, y, x1 - x0, h, *color);
    }
}

fn draw_smpte(img: &mut RgbImage) {
    let (width, height) = img.dimensions();
    let top = height * 2 / 3;
    let middle = height * 3 / 4;
    draw_bars(img, 0, top, 191);

    // Reverse castellations under the main bars
    let castellations = [
        [0, 0, 191],
        BLACK,
        [191, 0, 191],
        BLACK,
        [0, 191, 191],
        BLACK,
        [191, 191, 191],
    ];
    for (i, color) in castellations.iter().enumerate() {
        let x0 = width * i as u32 / 7;
        let x1 = width * (i as u32 + 1) / 7;
        fill_rect(img, x0, top, x1 - x0, middle - top, *color);
    }

    // -I, white, +Q, black and the pluge
    let bottom = [
        (0, 5, [0, 33, 76]),
        (5, 10, WHITE),
        (10, 15, [50, 0, 106]),
        (15, 20, [19, 19, 19]),
        (20, 22, [9, 9, 9]),
        (22, 24, [19, 19, 19]),
        (24, 26, [29, 29, 29]),
        (26, 28, [19, 19, 19]),
    ];
    for (start, end, color) in bottom {
        let x0 = width * start / 28;
        let x1 = width * end / 28;
        fill_rect(img, x0, middle, x1 - x0, height - middle, color);
    }
}

fn draw_checkers(img: &mut RgbImage, size: u32) {
    for (x, y, pixel) in img.enumerate_pixels_mut() {
        let on = ((x / size) + (y / size)) % 2 == 0;
        *pixel = Rgb(if on { WHITE } else { BLACK });
    }
}

fn draw_snow(img: &mut RgbImage, sequence: u64) {
    let mut state = sequence
        .wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .wrapping_add(0x2545_F491_4F6C_DD1D)
        | 1;
    for pixel in img.pixels_mut() {
        // xorshift64
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        let v = (state >> 56) as u8;
        *pixel = Rgb([v, v, v]);
    }
}

fn draw_rings(img: &mut RgbImage, chroma: bool) {
    let (width, height) = img.dimensions();
    let cx = width as f64 / 2.0;
    let cy = height as f64 / 2.0;
    let scale = 2.0 * std::f64::consts::PI / (width.max(height) as f64 / 8.0);
    for (x, y, pixel) in img.enumerate_pixels_mut() {
        let r = ((x as f64 - cx).powi(2) + (y as f64 - cy).powi(2)).sqrt();
        let v = ((r * scale).sin() * 127.5 + 127.5) as u8;
        *pixel = if chroma {
            Rgb([v, 255 - v, 128])
        } else {
            Rgb([v, v, v])
        };
    }
}

fn draw_zone_plate(img: &mut RgbImage) {
    let (width, height) = img.dimensions();
    let cx = width as f64 / 2.0;
    let cy = height as f64 / 2.0;
    let k = std::f64::consts::PI / width.max(1) as f64;
    for (x, y, pixel) in img.enumerate_pixels_mut() {
        let r2 = (x as f64 - cx).powi(2) + (y as f64 - cy).powi(2);
        let v = ((r2 * k).cos() * 127.5 + 127.5) as u8;
        *pixel = Rgb([v, v, v]);
    }
}

fn draw_gamut(img: &mut RgbImage) {
    let (width, height) = img.dimensions();
    for (x, y, pixel) in img.enumerate_pixels_mut() {
        let level = (x * 255 / width.max(1)) as u8;
        let band = y * 4 / height.max(1);
        *pixel = Rgb(match band {
            0 => [level, level, level],
            1 => [level, 0, 0],
            2 => [0, level, 0],
            _ => [0, 0, level],
        });
    }
}

fn draw_ball(img: &mut RgbImage, sequence: u64) {
    let (width, height) = img.dimensions();
    fill(img, BLACK);
    let radius = (width.min(height) / 10).max(1) as i64;
    let span = (i64::from(width) - 2 * radius).max(1);
    // Bounce back and forth across the frame
    let step = (sequence as i64 * 4) % (2 * span);
    let offset = if step < span { step } else { 2 * span - step };
    let cx = radius + offset;
    let cy = i64::from(height) / 2;
    for (x, y, pixel) in img.enumerate_pixels_mut() {
        let dx = i64::from(x) - cx;
        let dy = i64::from(y) - cy;
        if dx * dx + dy * dy <= radius * radius {
            *pixel = Rgb(WHITE);
        }
    }
}
