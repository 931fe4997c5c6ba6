//! EPUB container writer.
//!
//! Serialises the manifest into a standard EPUB 2 package: `mimetype`
//! stored first and uncompressed, `META-INF/container.xml`, the OPF,
//! an NCX and an HTML table of contents rendered from the two templates,
//! the cover, a stylesheet and one XHTML chapter per article.
//!
//! Templates are plain text with `{{name}}` placeholders. The HTML template
//! receives `{{toc_items}}`, the NCX template `{{nav_points}}`; both get
//! `{{title}}`, `{{author}}`, `{{book_id}}` and `{{lang}}`. The default pair
//! is compiled into the binary; a templates directory replaces it.

use crate::epub::toc::Manifest;
use crate::error::PackageError;
use crate::models::{ArticleItem, ContentItem};
use quick_xml::escape::escape;
use std::borrow::Cow;
use std::io::{Cursor, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#;

const STYLESHEET: &str = r#"body { font-family: serif; line-height: 1.4; }
h1 { font-size: 1.4em; margin-bottom: 0.2em; }
h2 { font-size: 1.2em; margin-top: 1.5em; }
p.epub-meta { color: #555; font-size: 0.85em; margin-top: 0; }
figure { margin: 1em 0; }
img { max-width: 100%; height: auto; }
.toc-section { margin-top: 1.2em; font-weight: bold; }
.toc-entry { margin: 0.3em 0; }
.toc-meta { color: #555; font-size: 0.8em; }
.cover { text-align: center; }
"#;

const TOC_FILE: &str = "toc.xhtml";
const COVER_PAGE: &str = "cover.xhtml";
const COVER_IMAGE: &str = "cover.jpg";

pub const BUILTIN_HTML_TOC: &str = include_str!("../../templates/guardian-toc-html.tmpl");
pub const BUILTIN_NCX_TOC: &str = include_str!("../../templates/guardian-toc-ncx.tmpl");

/// Where a table-of-contents template comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    /// A user-supplied file; it must exist when the book is packaged.
    File(PathBuf),
    Builtin(&'static str),
}

impl TemplateSource {
    async fn load(&self) -> Result<Cow<'static, str>, PackageError> {
        match self {
            Self::File(path) => read_template(path).await.map(Cow::Owned),
            Self::Builtin(text) => Ok(Cow::Borrowed(text)),
        }
    }
}

/// Everything the packager needs for one book.
#[derive(Debug, Clone)]
pub struct PackageRequest<'a> {
    pub title: &'a str,
    pub author: &'a str,
    /// Unique identifier written to the OPF and NCX.
    pub book_id: &'a str,
    pub lang: &'a str,
    pub manifest: &'a Manifest,
    pub cover_path: &'a Path,
    pub html_toc_template: &'a TemplateSource,
    pub ncx_toc_template: &'a TemplateSource,
}

/// Substitute `{{name}}` placeholders.
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{{{key}}}}}"), value)
    })
}

async fn read_template(path: &Path) -> Result<String, PackageError> {
    fs::read_to_string(path).await.map_err(|e| match e.kind() {
        ErrorKind::NotFound => PackageError::TemplateMissing(path.to_path_buf()),
        _ => PackageError::Io(e),
    })
}

/// Write the book to `output`.
///
/// Templates and cover are read before anything is written, so a missing
/// template leaves no partial file behind.
///
/// # Arguments
///
/// * `request` - Title, author, book id, manifest, cover and template sources
/// * `output` - Path of the `.epub` file to create or overwrite
///
/// # Returns
///
/// The path the book was written to.
///
/// # Errors
///
/// * [`PackageError::TemplateMissing`] if a template file does not exist
/// * [`PackageError::Cover`] if the cover image cannot be read
/// * [`PackageError::Zip`] or [`PackageError::Io`] if the archive cannot be built or written
#[instrument(level = "info", skip_all, fields(output = %output.display()))]
pub async fn package_epub(
    request: &PackageRequest<'_>,
    output: &Path,
) -> Result<PathBuf, PackageError> {
    let html_template = request.html_toc_template.load().await?;
    let ncx_template = request.ncx_toc_template.load().await?;
    let cover = fs::read(request.cover_path)
        .await
        .map_err(|source| PackageError::Cover {
            path: request.cover_path.to_path_buf(),
            source,
        })?;

    let bytes = build_archive(request, &html_template, &ncx_template, &cover)?;
    fs::write(output, &bytes).await?;
    info!(bytes = bytes.len(), "Wrote EPUB");
    Ok(output.to_path_buf())
}

fn build_archive(
    request: &PackageRequest<'_>,
    html_template: &str,
    ncx_template: &str,
    cover: &[u8],
) -> Result<Vec<u8>, PackageError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file("mimetype", stored)?;
    zip.write_all(b"application/epub+zip")?;

    zip.start_file("META-INF/container.xml", deflated)?;
    zip.write_all(CONTAINER_XML.as_bytes())?;

    let title = escape(request.title).into_owned();
    let author = escape(request.author).into_owned();
    let book_id = escape(request.book_id).into_owned();
    let common = [
        ("title", title.as_str()),
        ("author", author.as_str()),
        ("book_id", book_id.as_str()),
        ("lang", request.lang),
    ];
    let nav_points = render_nav_points(request.manifest);
    let toc_items = render_toc_items(request.manifest);
    let ncx = render_template(
        &render_template(ncx_template, &common),
        &[("nav_points", nav_points.as_str())],
    );
    let toc = render_template(
        &render_template(html_template, &common),
        &[("toc_items", toc_items.as_str())],
    );

    zip.start_file("OEBPS/content.opf", deflated)?;
    zip.write_all(render_opf(request).as_bytes())?;

    zip.start_file("OEBPS/toc.ncx", deflated)?;
    zip.write_all(ncx.as_bytes())?;

    zip.start_file(format!("OEBPS/{TOC_FILE}"), deflated)?;
    zip.write_all(toc.as_bytes())?;

    zip.start_file("OEBPS/style.css", deflated)?;
    zip.write_all(STYLESHEET.as_bytes())?;

    zip.start_file(format!("OEBPS/{COVER_PAGE}"), deflated)?;
    zip.write_all(render_cover_page(request).as_bytes())?;

    zip.start_file(format!("OEBPS/{COVER_IMAGE}"), stored)?;
    zip.write_all(cover)?;

    for chapter in chapters(request.manifest) {
        debug!(filename = %chapter.filename, "Writing chapter");
        zip.start_file(format!("OEBPS/{}", chapter.filename), deflated)?;
        zip.write_all(chapter.render(request.lang).as_bytes())?;
    }

    let cursor = zip.finish()?;
    Ok(cursor.into_inner())
}

/// One chapter file plus any section headings that open it.
struct Chapter<'a> {
    filename: &'a str,
    headings: Vec<&'a str>,
    item: &'a ArticleItem,
}

impl Chapter<'_> {
    fn render(&self, lang: &str) -> String {
        let title = escape(self.item.title.as_str());
        let meta = if self.item.author.is_empty() {
            escape(self.item.published_date_display.as_str()).into_owned()
        } else {
            format!(
                "{} · {}",
                escape(self.item.author.as_str()),
                escape(self.item.published_date_display.as_str())
            )
        };
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.1//EN" "http://www.w3.org/TR/xhtml11/DTD/xhtml11.dtd">
<html xmlns="http://www.w3.org/1999/xhtml" xml:lang="{lang}">
<head>
    <meta http-equiv="Content-Type" content="text/html; charset=UTF-8"/>
    <title>{title}</title>
    <link rel="stylesheet" type="text/css" href="style.css"/>
</head>
<body>
{headings}<h1>{title}</h1>
<p class="epub-meta">{meta}</p>
{body}
</body>
</html>"#,
            headings = self
                .headings
                .iter()
                .map(|h| format!("{h}\n"))
                .collect::<String>(),
            body = self.item.html_data,
        )
    }
}

/// Walk the manifest, attaching each section heading to the next chapter.
fn chapters(manifest: &Manifest) -> Vec<Chapter<'_>> {
    let mut out = Vec::new();
    let mut pending = Vec::new();
    for item in &manifest.items {
        match item {
            ContentItem::SectionHeader(header) => pending.push(header.html_data.as_str()),
            ContentItem::Article(article) => out.push(Chapter {
                filename: &article.filename,
                headings: std::mem::take(&mut pending),
                item: article,
            }),
        }
    }
    if !pending.is_empty() {
        debug!(count = pending.len(), "Trailing section headings without chapters");
    }
    out
}

fn chapter_id(index: usize) -> String {
    format!("chapter_{}", index + 1)
}

fn render_opf(request: &PackageRequest<'_>) -> String {
    let mut manifest_items = String::new();
    let mut spine = String::new();
    for (i, article) in request.manifest.articles().enumerate() {
        let id = chapter_id(i);
        manifest_items.push_str(&format!(
            "    <item id=\"{id}\" href=\"{}\" media-type=\"application/xhtml+xml\"/>\n",
            escape(article.filename.as_str())
        ));
        spine.push_str(&format!("    <itemref idref=\"{id}\"/>\n"));
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="BookId">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:opf="http://www.idpf.org/2007/opf">
    <dc:title>{title}</dc:title>
    <dc:creator opf:role="aut">{author}</dc:creator>
    <dc:identifier id="BookId">{book_id}</dc:identifier>
    <dc:language>{lang}</dc:language>
    <meta name="cover" content="cover-image"/>
  </metadata>
  <manifest>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
    <item id="toc" href="{TOC_FILE}" media-type="application/xhtml+xml"/>
    <item id="cover" href="{COVER_PAGE}" media-type="application/xhtml+xml"/>
    <item id="cover-image" href="{COVER_IMAGE}" media-type="image/jpeg"/>
    <item id="css" href="style.css" media-type="text/css"/>
{manifest_items}  </manifest>
  <spine toc="ncx">
    <itemref idref="cover" linear="no"/>
    <itemref idref="toc"/>
{spine}  </spine>
  <guide>
    <reference type="cover" title="Cover" href="{COVER_PAGE}"/>
    <reference type="toc" title="Table of Contents" href="{TOC_FILE}"/>
  </guide>
</package>
"#,
        title = escape(request.title),
        author = escape(request.author),
        book_id = escape(request.book_id),
        lang = request.lang,
    )
}

fn render_cover_page(request: &PackageRequest<'_>) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.1//EN" "http://www.w3.org/TR/xhtml11/DTD/xhtml11.dtd">
<html xmlns="http://www.w3.org/1999/xhtml" xml:lang="{lang}">
<head>
    <title>{title}</title>
    <link rel="stylesheet" type="text/css" href="style.css"/>
</head>
<body>
<div class="cover"><img src="{COVER_IMAGE}" alt="{title}"/></div>
</body>
</html>"#,
        lang = request.lang,
        title = escape(request.title),
    )
}

/// NCX navigation points: one per article, section headers omitted.
fn render_nav_points(manifest: &Manifest) -> String {
    manifest
        .articles()
        .enumerate()
        .map(|(i, article)| {
            format!(
                "    <navPoint id=\"{id}\" playOrder=\"{order}\">\n      <navLabel><text>{title}</text></navLabel>\n      <content src=\"{src}\"/>\n    </navPoint>\n",
                id = chapter_id(i),
                order = i + 1,
                title = escape(article.title.as_str()),
                src = escape(article.filename.as_str()),
            )
        })
        .collect()
}

/// HTML table of contents: sections as plain headings, articles as links.
fn render_toc_items(manifest: &Manifest) -> String {
    manifest
        .items
        .iter()
        .map(|item| match item {
            ContentItem::SectionHeader(header) => format!(
                "<h3 class=\"toc-section\">{}</h3>\n",
                escape(header.title.as_str())
            ),
            ContentItem::Article(article) => {
                let mut meta = escape(article.published_date_display.as_str()).into_owned();
                if !article.author.is_empty() {
                    meta = format!("{} · {meta}", escape(article.author.as_str()));
                }
                format!(
                    "<p class=\"toc-entry\"><a href=\"{}\">{}</a> <span class=\"toc-meta\">{meta}</span></p>\n",
                    escape(article.filename.as_str()),
                    escape(article.title.as_str()),
                )
            }
        })
        .collect()
}
