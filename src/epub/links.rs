//! Localising links between articles of the same run.
//!
//! Article bodies link to other articles on the live site. When the target
//! is itself part of the book, the `href` is pointed at that article's
//! chapter file instead. Everything else is left as it was.
//!
//! Bodies are parsed leniently with `scraper` (html5ever) and serialised
//! back out as XHTML, since chapters inside the package must be well-formed
//! XML.

use crate::epub::filenames::UrlToFileMap;
use crate::error::RewriteError;
use quick_xml::Reader;
use quick_xml::escape::{escape, partial_escape};
use quick_xml::events::Event;
use scraper::{ElementRef, Html, Node};
use std::borrow::Cow;
use std::collections::HashSet;
use tracing::debug;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// An article body after link rewriting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenBody {
    pub html: String,
    /// How many anchors were pointed at local chapters.
    pub rewritten: usize,
}

/// Rewrites anchors whose target is a chapter of this run.
#[derive(Debug, Clone, Copy)]
pub struct LinkRewriter<'a> {
    map: &'a UrlToFileMap,
    domain_marker: &'a str,
}

impl<'a> LinkRewriter<'a> {
    pub fn new(map: &'a UrlToFileMap, domain_marker: &'a str) -> Self {
        Self { map, domain_marker }
    }

    /// The local filename for `href`, when it should be rewritten.
    ///
    /// Requires a non-empty href that contains the source domain marker and
    /// is a key of the map.
    pub fn local_target(&self, href: &str) -> Option<&'a str> {
        if href.is_empty() || !href.contains(self.domain_marker) {
            return None;
        }
        self.map.get(href)
    }

    /// Parse `body`, rewrite internal anchors and serialise it as XHTML.
    ///
    /// # Errors
    ///
    /// Returns [`RewriteError::Malformed`] if the serialised body does not
    /// read back as well-formed XML.
    pub fn rewrite(&self, body: &str) -> Result<RewrittenBody, RewriteError> {
        let fragment = Html::parse_fragment(body);

        let mut out = String::with_capacity(body.len());
        let mut rewritten = 0;
        self.write_children(fragment.root_element(), &mut out, &mut rewritten);
        check_well_formed(&out)?;

        debug!(rewritten, bytes = out.len(), "Rewrote article links");
        Ok(RewrittenBody {
            html: out,
            rewritten,
        })
    }

    fn write_children(&self, parent: ElementRef<'_>, out: &mut String, rewritten: &mut usize) {
        for child in parent.children() {
            match ElementRef::wrap(child) {
                Some(element) => self.write_element(element, out, rewritten),
                None => write_leaf(child.value(), out),
            }
        }
    }

    fn write_element(&self, element: ElementRef<'_>, out: &mut String, rewritten: &mut usize) {
        let value = element.value();
        let name = value.name();
        // Prefixed names such as `o:p`: keep the content, drop the tag.
        if !is_xml_name(name) {
            self.write_children(element, out, rewritten);
            return;
        }
        out.push('<');
        out.push_str(name);

        let mut seen = HashSet::new();
        for (attr, raw) in value.attrs() {
            if !is_xml_name(attr) || !seen.insert(attr) {
                continue;
            }
            let mut attr_value = raw;
            if name == "a" && attr == "href" {
                if let Some(local) = self.local_target(raw) {
                    attr_value = local;
                    *rewritten += 1;
                }
            }
            out.push(' ');
            out.push_str(attr);
            out.push_str("=\"");
            out.push_str(&escape(&*xml_chars(attr_value)));
            out.push('"');
        }

        if VOID_ELEMENTS.contains(&name) {
            out.push_str("/>");
            return;
        }
        out.push('>');
        self.write_children(element, out, rewritten);
        out.push_str("</");
        out.push_str(name);
        out.push('>');
    }
}

fn write_leaf(node: &Node, out: &mut String) {
    match node {
        Node::Text(text) => out.push_str(&partial_escape(&*xml_chars(text))),
        Node::Comment(comment) => {
            out.push_str("<!--");
            out.push_str(&comment_text(&comment.comment));
            out.push_str("-->");
        }
        _ => {}
    }
}

/// Comment text with every `--` run collapsed and no trailing `-`.
fn comment_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars().filter(|c| is_xml_char(*c)) {
        if c == '-' && out.ends_with('-') {
            continue;
        }
        out.push(c);
    }
    if out.ends_with('-') {
        out.push(' ');
    }
    out
}

/// Characters allowed by the XML 1.0 `Char` production.
fn is_xml_char(c: char) -> bool {
    matches!(c,
        '\u{9}' | '\u{A}' | '\u{D}'
        | '\u{20}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
}

/// `text` without the characters XML cannot carry.
pub(crate) fn xml_chars(text: &str) -> Cow<'_, str> {
    if text.chars().all(is_xml_char) {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(text.chars().filter(|c| is_xml_char(*c)).collect())
    }
}

/// Unprefixed XML names only: no namespace declarations are ever written.
fn is_xml_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

fn check_well_formed(xhtml: &str) -> Result<(), RewriteError> {
    let wrapped = format!("<body>{xhtml}</body>");
    let mut reader = Reader::from_str(&wrapped);
    reader.config_mut().check_comments = true;
    loop {
        match reader.read_event() {
            Ok(Event::Eof) => return Ok(()),
            Ok(_) => {}
            Err(e) => return Err(RewriteError::Malformed(e.to_string())),
        }
    }
}

/// Rewrite one article body against the run's filename map.
pub fn rewrite_article_links(
    body: &str,
    map: &UrlToFileMap,
    domain_marker: &str,
) -> Result<RewrittenBody, RewriteError> {
    LinkRewriter::new(map, domain_marker).rewrite(body)
}
