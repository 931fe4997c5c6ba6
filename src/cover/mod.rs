//! Cover art for the generated book.
//!
//! - [`select`]: picks a photo from the run's articles, if there is one
//! - [`render`]: draws the 1200x1600 JPEG cover, photo or text-only
//! - [`glyphs`]: the bitmap font used for cover text

pub mod glyphs;
pub mod render;
pub mod select;

pub use render::{COVER_HEIGHT, COVER_WIDTH, CoverKind, CoverRequest, create_cover_image};
pub use select::{parse_image_candidates, select_cover_image};
