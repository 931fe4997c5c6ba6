//! Cover image synthesis.
//!
//! Two strategies behind one entry point, [`create_cover_image`]:
//!
//! 1. **Photo cover**: load the selected image, cover-fit it to the canvas,
//!    darken a band along the bottom and print title, subtitle and caption
//!    in white.
//! 2. **Text cover**: white canvas with the title and subtitle centred.
//!
//! Any failure in the photo strategy falls through to the text strategy,
//! so a run always ends up with a cover file.

use crate::cover::glyphs::BitmapFont;
use crate::error::CoverError;
use crate::models::CoverSelection;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbaImage};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument, warn};
use url::Url;

pub const COVER_WIDTH: u32 = 1200;
pub const COVER_HEIGHT: u32 = 1600;

const JPEG_QUALITY: u8 = 90;
const MARGIN: u32 = 40;
const TEXT_COVER_PADDING: u32 = 20;

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);
const OVERLAY: Rgba<u8> = Rgba([0, 0, 0, 128]);

const TEXT_TITLE_FONT: BitmapFont = BitmapFont::new(12, true);
const TEXT_SUBTITLE_FONT: BitmapFont = BitmapFont::new(6, false);
const PHOTO_TITLE_FONT: BitmapFont = BitmapFont::new(7, true);
const PHOTO_SUBTITLE_FONT: BitmapFont = BitmapFont::new(4, false);
const PHOTO_CAPTION_FONT: BitmapFont = BitmapFont::new(3, false);

/// Which strategy produced the cover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoverKind {
    Photo,
    /// Text-only cover; `fallback_reason` is set when a photo was tried first.
    Text { fallback_reason: Option<String> },
}

/// Inputs for one cover.
#[derive(Debug, Clone, Copy)]
pub struct CoverRequest<'a> {
    pub output: &'a Path,
    pub title: &'a str,
    pub subtitle: &'a str,
    pub image: Option<&'a CoverSelection>,
}

/// Render the cover to `request.output`, preferring the photo strategy.
///
/// # Arguments
///
/// * `client` - HTTP client for `http(s)` image URLs
/// * `request` - Output path, title, subtitle and the selected image, if any
///
/// # Returns
///
/// [`CoverKind::Photo`], or [`CoverKind::Text`] with the reason the photo
/// was abandoned when one was tried.
///
/// # Errors
///
/// Only fails when even the text cover cannot be encoded or written.
#[instrument(level = "info", skip_all, fields(output = %request.output.display()))]
pub async fn create_cover_image(
    client: &reqwest::Client,
    request: &CoverRequest<'_>,
) -> Result<CoverKind, CoverError> {
    let mut fallback_reason = None;
    if let Some(selection) = request.image {
        match render_photo_cover(client, request, selection).await {
            Ok(()) => {
                info!(url = %selection.url, "Created photo cover");
                return Ok(CoverKind::Photo);
            }
            Err(e) => {
                warn!(url = %selection.url, error = %e, "Photo cover failed; falling back to text cover");
                fallback_reason = Some(e.to_string());
            }
        }
    }

    render_text_cover(request).await?;
    info!("Created text cover");
    Ok(CoverKind::Text { fallback_reason })
}

/// Solid background with the title and subtitle centred as one block.
pub async fn render_text_cover(request: &CoverRequest<'_>) -> Result<(), CoverError> {
    let image = text_cover(request.title, request.subtitle);
    write_jpeg(&image, request.output).await
}

fn text_cover(title: &str, subtitle: &str) -> RgbaImage {
    let mut image = RgbaImage::from_pixel(COVER_WIDTH, COVER_HEIGHT, WHITE);
    let max_width = COVER_WIDTH - 2 * TEXT_COVER_PADDING;
    let title_lines = TEXT_TITLE_FONT.wrap(title, max_width);
    let subtitle_lines = TEXT_SUBTITLE_FONT.wrap(subtitle, max_width);

    let title_height = title_lines.len() as u32 * TEXT_TITLE_FONT.line_height();
    let subtitle_height = subtitle_lines.len() as u32 * TEXT_SUBTITLE_FONT.line_height();
    let block = title_height + TEXT_COVER_PADDING + subtitle_height;
    let mut y = i64::from(COVER_HEIGHT.saturating_sub(block) / 2);

    for (font, lines) in [
        (TEXT_TITLE_FONT, &title_lines),
        (TEXT_SUBTITLE_FONT, &subtitle_lines),
    ] {
        for line in lines {
            let x = i64::from(COVER_WIDTH.saturating_sub(font.measure(line)) / 2);
            font.draw(&mut image, x, y, line, BLACK);
            y += i64::from(font.line_height());
        }
        y += i64::from(TEXT_COVER_PADDING);
    }
    image
}

/// Where a cover image is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ImageSource {
    Remote(String),
    Local(PathBuf),
}

/// Only `http(s)` URLs are fetched and only `file:` URLs are read from disk.
/// Protocol-relative `//host/...` URLs are taken as `https`.
fn resolve_image_source(raw: &str) -> Result<ImageSource, CoverError> {
    let raw = raw.trim();
    if let Some(rest) = raw.strip_prefix("//") {
        return Ok(ImageSource::Remote(format!("https://{rest}")));
    }
    let unsupported = || CoverError::UnsupportedSource(raw.to_string());
    let url = Url::parse(raw).map_err(|_| unsupported())?;
    match url.scheme() {
        "http" | "https" => Ok(ImageSource::Remote(raw.to_string())),
        "file" => url
            .to_file_path()
            .map(ImageSource::Local)
            .map_err(|()| unsupported()),
        _ => Err(unsupported()),
    }
}

async fn fetch_bytes(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, CoverError> {
    let fetch_error = |source: reqwest::Error| CoverError::Fetch {
        url: url.to_string(),
        source,
    };
    let response = client.get(url).send().await.map_err(fetch_error)?;
    if !response.status().is_success() {
        return Err(CoverError::Status {
            url: url.to_string(),
            status: response.status().as_u16(),
        });
    }
    Ok(response.bytes().await.map_err(fetch_error)?.to_vec())
}

async fn load_image(client: &reqwest::Client, url: &str) -> Result<DynamicImage, CoverError> {
    let bytes = match resolve_image_source(url)? {
        ImageSource::Remote(url) => fetch_bytes(client, &url).await?,
        ImageSource::Local(path) => {
            debug!(path = %path.display(), "Reading cover image from disk");
            fs::read(&path).await?
        }
    };
    Ok(image::load_from_memory(&bytes)?)
}

async fn render_photo_cover(
    client: &reqwest::Client,
    request: &CoverRequest<'_>,
    selection: &CoverSelection,
) -> Result<(), CoverError> {
    let source = load_image(client, &selection.url).await?;
    let image = photo_cover(source, request.title, request.subtitle, &selection.caption);
    write_jpeg(&image, request.output).await
}

fn photo_cover(source: DynamicImage, title: &str, subtitle: &str, caption: &str) -> RgbaImage {
    let mut image = source
        .resize_to_fill(COVER_WIDTH, COVER_HEIGHT, FilterType::Triangle)
        .to_rgba8();

    let band_height = if caption.is_empty() { 260 } else { 320 };
    let band_top = COVER_HEIGHT - band_height;
    let band = RgbaImage::from_pixel(COVER_WIDTH, band_height, OVERLAY);
    imageops::overlay(&mut image, &band, 0, i64::from(band_top));

    let x = i64::from(MARGIN);
    let top = i64::from(band_top);
    let max_width = COVER_WIDTH - 2 * MARGIN;
    PHOTO_TITLE_FONT.draw_wrapped(&mut image, x, top + 30, title, max_width, WHITE);
    PHOTO_SUBTITLE_FONT.draw_wrapped(&mut image, x, top + 120, subtitle, max_width, WHITE);
    if !caption.is_empty() {
        PHOTO_CAPTION_FONT.draw_wrapped(&mut image, x, top + 190, caption, max_width, WHITE);
    }
    image
}

/// Encode as JPEG and write the whole file before returning.
async fn write_jpeg(image: &RgbaImage, output: &Path) -> Result<(), CoverError> {
    let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY).encode_image(&rgb)?;
    fs::write(output, &buffer).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;

    fn request<'a>(output: &'a Path, image: Option<&'a CoverSelection>) -> CoverRequest<'a> {
        CoverRequest {
            output,
            title: "The Guardian",
            subtitle: "Friday 2024-03-15:09:05",
            image,
        }
    }

    #[tokio::test]
    async fn test_text_cover_when_no_image() {
        let tmp = tempfile::tempdir().unwrap();
        let output = tmp.path().join("cover.jpg");
        let kind = create_cover_image(&reqwest::Client::new(), &request(&output, None))
            .await
            .unwrap();

        assert_eq!(kind, CoverKind::Text { fallback_reason: None });
        let written = image::open(&output).unwrap();
        assert_eq!(written.dimensions(), (COVER_WIDTH, COVER_HEIGHT));
    }

    #[tokio::test]
    async fn test_text_cover_is_deterministic() {
        let tmp = tempfile::tempdir().unwrap();
        let first = tmp.path().join("a.jpg");
        let second = tmp.path().join("b.jpg");
        render_text_cover(&request(&first, None)).await.unwrap();
        render_text_cover(&request(&second, None)).await.unwrap();
        assert_eq!(std::fs::read(&first).unwrap(), std::fs::read(&second).unwrap());
    }

    #[test]
    fn test_text_cover_draws_centred_block() {
        let image = text_cover("The Guardian", "Friday");
        let dark_rows: Vec<u32> = (0..COVER_HEIGHT)
            .filter(|y| (0..COVER_WIDTH).any(|x| image.get_pixel(x, *y)[0] < 128))
            .collect();
        let (first, last) = (dark_rows[0], *dark_rows.last().unwrap());
        let above = first;
        let below = COVER_HEIGHT - 1 - last;
        assert!(above.abs_diff(below) < 40, "block not centred: {above} vs {below}");
    }

    #[tokio::test]
    async fn test_photo_cover_from_local_file() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("photo.png");
        RgbaImage::from_pixel(300, 200, Rgba([250, 250, 250, 255]))
            .save(&source)
            .unwrap();
        let selection = CoverSelection {
            url: Url::from_file_path(&source).unwrap().to_string(),
            caption: "A caption".to_string(),
        };
        let output = tmp.path().join("cover.jpg");

        let kind = create_cover_image(&reqwest::Client::new(), &request(&output, Some(&selection)))
            .await
            .unwrap();
        assert_eq!(kind, CoverKind::Photo);

        let written = image::open(&output).unwrap().to_rgb8();
        assert_eq!(written.dimensions(), (COVER_WIDTH, COVER_HEIGHT));
        assert!(written.get_pixel(5, 5)[0] > 200);
        assert!(written.get_pixel(5, COVER_HEIGHT - 5)[0] < 160);
    }

    #[tokio::test]
    async fn test_unloadable_image_falls_back_to_text() {
        let tmp = tempfile::tempdir().unwrap();
        let selection = CoverSelection {
            url: Url::from_file_path(tmp.path().join("missing.jpg")).unwrap().to_string(),
            caption: String::new(),
        };
        let output = tmp.path().join("cover.jpg");

        let kind = create_cover_image(&reqwest::Client::new(), &request(&output, Some(&selection)))
            .await
            .unwrap();
        assert!(matches!(kind, CoverKind::Text { fallback_reason: Some(_) }));
        assert!(output.exists());
    }

    #[tokio::test]
    async fn test_undecodable_image_falls_back_to_text() {
        let tmp = tempfile::tempdir().unwrap();
        let bogus = tmp.path().join("bogus.jpg");
        std::fs::write(&bogus, b"definitely not an image").unwrap();
        let selection = CoverSelection {
            url: Url::from_file_path(&bogus).unwrap().to_string(),
            caption: String::new(),
        };
        let output = tmp.path().join("cover.jpg");

        let kind = create_cover_image(&reqwest::Client::new(), &request(&output, Some(&selection)))
            .await
            .unwrap();
        assert!(matches!(kind, CoverKind::Text { fallback_reason: Some(_) }));
        assert_eq!(image::open(&output).unwrap().dimensions(), (COVER_WIDTH, COVER_HEIGHT));
    }

    #[test]
    fn test_resolve_image_source() {
        assert_eq!(
            resolve_image_source("//i.guim.co.uk/img/a.jpg").unwrap(),
            ImageSource::Remote("https://i.guim.co.uk/img/a.jpg".to_string())
        );
        assert_eq!(
            resolve_image_source("https://i.guim.co.uk/img/a.jpg").unwrap(),
            ImageSource::Remote("https://i.guim.co.uk/img/a.jpg".to_string())
        );
        assert_eq!(
            resolve_image_source("file:///tmp/photo.png").unwrap(),
            ImageSource::Local(PathBuf::from("/tmp/photo.png"))
        );
        for rejected in [
            "/etc/passwd",
            "photo.png",
            "ftp://example.com/a.jpg",
            "data:image/png;base64,AA==",
        ] {
            assert!(
                matches!(resolve_image_source(rejected), Err(CoverError::UnsupportedSource(_))),
                "{rejected} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_bare_path_is_not_read() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("photo.png");
        RgbaImage::from_pixel(300, 200, Rgba([250, 250, 250, 255]))
            .save(&source)
            .unwrap();
        let selection = CoverSelection {
            url: source.to_string_lossy().to_string(),
            caption: String::new(),
        };
        let output = tmp.path().join("cover.jpg");

        let kind = create_cover_image(&reqwest::Client::new(), &request(&output, Some(&selection)))
            .await
            .unwrap();
        match kind {
            CoverKind::Text {
                fallback_reason: Some(reason),
            } => assert!(reason.contains("not an http(s) or file URL")),
            other => panic!("expected text fallback, got {other:?}"),
        }
    }
}
