//! EPUB assembly: chapter naming, link localisation, manifest assembly and
//! the container writer.
//!
//! # Submodules
//!
//! - [`filenames`]: assigns each article a unique chapter filename
//! - [`links`]: points in-article links at local chapters
//! - [`toc`]: builds the ordered manifest of section headers and articles
//! - [`package`]: writes the `.epub` container from the manifest and templates
//!
//! # Package Layout
//!
//! ```text
//! guardian-2024-03-15-0905.epub
//! ├── mimetype
//! ├── META-INF/container.xml
//! └── OEBPS/
//!     ├── content.opf
//!     ├── toc.ncx            # from the NCX template
//!     ├── toc.xhtml          # from the HTML template
//!     ├── cover.xhtml
//!     ├── cover.jpg
//!     ├── style.css
//!     ├── 1_first-headline.xhtml
//!     └── 2_second-headline.xhtml
//! ```

pub mod filenames;
pub mod links;
pub mod package;
pub mod toc;

pub use filenames::{UrlToFileMap, allocate_filenames};
pub use links::{LinkRewriter, rewrite_article_links};
pub use package::{PackageRequest, package_epub};
pub use toc::{Manifest, assemble_manifest, assemble_manifest_with};
