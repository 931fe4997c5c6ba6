//! Bitmap text drawing for the cover.
//!
//! Uses the 8x8 `font8x8` glyphs scaled up by an integer factor, so cover
//! text renders identically everywhere without any font files on disk.

use font8x8::{BASIC_FONTS, LATIN_FONTS, UnicodeFonts};
use image::{Rgba, RgbaImage};

const GLYPH_SIZE: u32 = 8;

/// A scaled bitmap face.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitmapFont {
    pub scale: u32,
    pub bold: bool,
}

/// Map typographic punctuation to ASCII lookalikes the glyph set covers.
fn fold_char(c: char) -> char {
    match c {
        '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{2032}' => '\'',
        '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{2033}' => '"',
        '\u{2010}'..='\u{2015}' | '\u{2212}' => '-',
        '\u{00A0}' | '\u{2009}' | '\u{202F}' => ' ',
        '\u{2022}' | '\u{00B7}' => '*',
        other => other,
    }
}

fn glyph(c: char) -> [u8; 8] {
    let c = fold_char(c);
    BASIC_FONTS
        .get(c)
        .or_else(|| LATIN_FONTS.get(c))
        .or_else(|| BASIC_FONTS.get('?'))
        .unwrap_or([0; 8])
}

impl BitmapFont {
    pub const fn new(scale: u32, bold: bool) -> Self {
        Self { scale, bold }
    }

    /// Horizontal advance of one character.
    pub fn advance(&self) -> u32 {
        GLYPH_SIZE * self.scale
    }

    pub fn line_height(&self) -> u32 {
        GLYPH_SIZE * self.scale
    }

    pub fn measure(&self, text: &str) -> u32 {
        text.chars().count() as u32 * self.advance()
    }

    /// Draw a single line with its top-left corner at `(x, y)`.
    /// Pixels falling outside the image are clipped.
    pub fn draw(&self, image: &mut RgbaImage, x: i64, y: i64, text: &str, color: Rgba<u8>) {
        let scale = i64::from(self.scale);
        let thicken = if self.bold { (scale / 4).max(1) } else { 0 };
        for (i, c) in text.chars().enumerate() {
            let origin_x = x + i as i64 * i64::from(self.advance());
            for (row, bits) in glyph(c).iter().enumerate() {
                for col in 0..8 {
                    if bits & (1 << col) == 0 {
                        continue;
                    }
                    let px = origin_x + col as i64 * scale;
                    let py = y + row as i64 * scale;
                    fill_rect(image, px, py, scale + thicken, scale, color);
                }
            }
        }
    }

    /// Greedy word wrap to `max_width` pixels; overlong words are split.
    pub fn wrap(&self, text: &str, max_width: u32) -> Vec<String> {
        let per_line = (max_width / self.advance()).max(1) as usize;
        let mut lines = Vec::new();
        let mut current = String::new();

        for word in text.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > per_line {
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
                let rest = word.split_off(per_line);
                lines.push(word.into_iter().collect());
                word = rest;
            }
            let word: String = word.into_iter().collect();
            let separator = usize::from(!current.is_empty());
            let needed = current.chars().count() + separator + word.chars().count();
            if needed > per_line && !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&word);
        }
        if !current.is_empty() {
            lines.push(current);
        }
        lines
    }

    /// Draw `text` wrapped to `max_width`, returning the height used.
    pub fn draw_wrapped(
        &self,
        image: &mut RgbaImage,
        x: i64,
        y: i64,
        text: &str,
        max_width: u32,
        color: Rgba<u8>,
    ) -> u32 {
        let leading = self.line_height() / 4;
        let lines = self.wrap(text, max_width);
        for (i, line) in lines.iter().enumerate() {
            let offset = i as i64 * i64::from(self.line_height() + leading);
            self.draw(image, x, y + offset, line, color);
        }
        match lines.len() as u32 {
            0 => 0,
            n => n * self.line_height() + (n - 1) * leading,
        }
    }
}

fn fill_rect(image: &mut RgbaImage, x: i64, y: i64, w: i64, h: i64, color: Rgba<u8>) {
    let (width, height) = (i64::from(image.width()), i64::from(image.height()));
    let (x0, y0) = (x.max(0), y.max(0));
    let (x1, y1) = ((x + w).min(width), (y + h).min(height));
    for py in y0..y1 {
        for px in x0..x1 {
            image.put_pixel(px as u32, py as u32, color);
        }
    }
}
