//! Event-driven reader turning RSS 2.0 / Atom XML into [`RawItem`]s.
//!
//! The reader records *which encoding* each field arrived in rather than
//! picking a winner; precedence between encodings is applied by
//! [`super::normalize`].

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

/// Maximum nesting depth accepted inside a feed document.
const MAX_DEPTH: usize = 64;

#[derive(Debug, Error)]
pub enum FeedParseError {
    #[error("XML parse error: {0}")]
    Xml(String),

    /// The document has no `<rss>`, `<feed>` or `<rdf:RDF>` root
    #[error("Document is not an RSS or Atom feed")]
    NotAFeed,

    #[error("Feed nesting depth exceeds maximum of {0} levels")]
    MaxDepthExceeded(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedFormat {
    /// RSS 2.0 (and RSS 1.0 `<rdf:RDF>`) `<item>` elements
    Rss,
    /// Atom `<entry>` elements
    Atom,
}

/// How an item's link was encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawLink {
    /// `<link href="..." rel="..."/>`, Atom style (also `atom:link` inside RSS)
    AtomHref { href: String, rel: Option<String> },
    /// `<link>https://...</link>`, RSS style
    Element(String),
}

/// How an item's image was encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawImage {
    /// `<image><url>...</url></image>` inside an Atom document or `atom:` prefix
    AtomNested(String),
    /// `<image><url>...</url></image>` inside an RSS document
    RssNested(String),
    /// `<image>https://...</image>` or `<image url="..."/>`
    Flat(String),
}

/// One feed item exactly as encoded in the document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawItem {
    pub title: Option<String>,
    pub links: Vec<RawLink>,
    /// `<description>` / `<summary>`
    pub description: Option<String>,
    /// `<content>` / `<content:encoded>`, used when no description exists
    pub content: Option<String>,
    pub category: Option<String>,
    pub images: Vec<RawImage>,
    /// `<pubDate>` / `<published>` / `<dc:date>`
    pub published: Option<String>,
    /// Atom `<updated>`
    pub updated: Option<String>,
}

/// A parsed feed document: its format and items in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFeed {
    pub format: FeedFormat,
    pub items: Vec<RawItem>,
}

/// Parses a feed document.
///
/// Items are returned in document order (feeds are usually newest-first).
/// Unknown elements are ignored. Malformed attribute values are skipped with a
/// warning rather than failing the whole document.
///
/// # Security
///
/// SEC-002: `quick-xml` 0.37 does not expand `<!ENTITY>` declarations, so
/// external entity payloads in a hostile feed are never resolved.
pub fn parse_feed(bytes: &[u8]) -> Result<RawFeed, FeedParseError> {
    read_feed(bytes, false)
}

/// Parses the leading part of a possibly truncated document.
///
/// Returns every item that was closed before the data ended or became
/// malformed. Fails only if the root element was never recognised.
pub fn parse_feed_prefix(bytes: &[u8]) -> Result<RawFeed, FeedParseError> {
    read_feed(bytes, true)
}

fn read_feed(bytes: &[u8], lenient: bool) -> Result<RawFeed, FeedParseError> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut format: Option<FeedFormat> = None;
    let mut items = Vec::new();

    // Open elements inside the current item, innermost last, with their text
    let mut current: Option<RawItem> = None;
    let mut stack: Vec<OpenElement> = Vec::new();
    let mut depth: usize = 0;

    loop {
        let event = match reader.read_event_into(&mut buf) {
            Ok(event) => event,
            Err(_) if lenient && format.is_some() => break,
            Err(e) => return Err(FeedParseError::Xml(e.to_string())),
        };

        match event {
            Event::Start(e) => {
                depth += 1;
                if depth > MAX_DEPTH {
                    return Err(FeedParseError::MaxDepthExceeded(MAX_DEPTH));
                }
                let name = local_name(&e);

                if format.is_none() {
                    format = root_format(&name);
                    if format.is_none() {
                        return Err(FeedParseError::NotAFeed);
                    }
                    buf.clear();
                    continue;
                }

                match current.as_mut() {
                    None if is_item(&name) => {
                        current = Some(RawItem::default());
                        stack.clear();
                    }
                    None => {}
                    Some(item) => {
                        let attrs = read_attributes(&e, &reader);
                        if stack.is_empty() {
                            on_field_attributes(item, &name, &attrs);
                        }
                        stack.push(OpenElement {
                            name,
                            atom_prefix: has_atom_prefix(&e),
                            text: String::new(),
                        });
                    }
                }
            }
            Event::Empty(e) => {
                let name = local_name(&e);
                if format.is_none() {
                    return Err(FeedParseError::NotAFeed);
                }
                if let Some(item) = current.as_mut() {
                    if stack.is_empty() {
                        let attrs = read_attributes(&e, &reader);
                        on_field_attributes(item, &name, &attrs);
                    }
                }
            }
            Event::Text(t) => {
                if let Some(open) = stack.last_mut() {
                    let raw = String::from_utf8_lossy(&t);
                    match quick_xml::escape::unescape(&raw) {
                        Ok(text) => open.text.push_str(&text),
                        // Non-XML entities such as &nbsp; are decoded later
                        Err(_) => open.text.push_str(&raw),
                    }
                }
            }
            Event::CData(c) => {
                if let Some(open) = stack.last_mut() {
                    open.text.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                match current.as_mut() {
                    Some(item) => match stack.pop() {
                        Some(closed) => on_element_closed(item, format, &stack, closed),
                        None => {
                            // Closing the item itself
                            if let Some(done) = current.take() {
                                items.push(done);
                            }
                        }
                    },
                    None => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let format = format.ok_or(FeedParseError::NotAFeed)?;
    Ok(RawFeed { format, items })
}

struct OpenElement {
    name: String,
    atom_prefix: bool,
    text: String,
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn has_atom_prefix(e: &BytesStart<'_>) -> bool {
    e.name()
        .prefix()
        .is_some_and(|p| p.as_ref().eq_ignore_ascii_case(b"atom"))
}

fn root_format(name: &str) -> Option<FeedFormat> {
    match name {
        "rss" | "RDF" => Some(FeedFormat::Rss),
        "feed" => Some(FeedFormat::Atom),
        _ => None,
    }
}

fn is_item(name: &str) -> bool {
    name == "item" || name == "entry"
}

fn read_attributes(e: &BytesStart<'_>, reader: &Reader<&[u8]>) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for attr_result in e.attributes() {
        let attr = match attr_result {
            Ok(attr) => attr,
            Err(err) => {
                tracing::warn!(error = %err, "Skipping malformed feed attribute");
                continue;
            }
        };
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        match attr.decode_and_unescape_value(reader.decoder()) {
            Ok(value) => out.push((key, value.into_owned())),
            Err(err) => {
                tracing::warn!(attribute = %key, error = %err, "Skipping undecodable feed attribute");
            }
        }
    }
    out
}

fn attribute<'a>(attrs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
        .filter(|v| !v.trim().is_empty())
}

/// Attribute-carried fields of a direct child of the item.
fn on_field_attributes(item: &mut RawItem, name: &str, attrs: &[(String, String)]) {
    match name {
        "link" => {
            if let Some(href) = attribute(attrs, "href") {
                item.links.push(RawLink::AtomHref {
                    href: href.trim().to_string(),
                    rel: attribute(attrs, "rel").map(str::to_string),
                });
            }
        }
        "category" => {
            if item.category.is_none() {
                item.category = attribute(attrs, "term")
                    .or_else(|| attribute(attrs, "label"))
                    .map(str::to_string);
            }
        }
        "image" => {
            if let Some(url) = attribute(attrs, "url").or_else(|| attribute(attrs, "href")) {
                item.images.push(RawImage::Flat(url.trim().to_string()));
            }
        }
        _ => {}
    }
}

/// Text-carried fields, applied when an element inside the item closes.
fn on_element_closed(
    item: &mut RawItem,
    format: Option<FeedFormat>,
    parents: &[OpenElement],
    closed: OpenElement,
) {
    let text = closed.text.trim();

    // Nested image: <image><url>...</url></image>
    if let Some(parent) = parents.last() {
        if parents.len() == 1 && parent.name == "image" && closed.name == "url" {
            if !text.is_empty() {
                let url = text.to_string();
                let image = if parent.atom_prefix || format == Some(FeedFormat::Atom) {
                    RawImage::AtomNested(url)
                } else {
                    RawImage::RssNested(url)
                };
                item.images.push(image);
            }
        }
        return;
    }

    let set_once = |slot: &mut Option<String>| {
        if slot.is_none() && !text.is_empty() {
            *slot = Some(text.to_string());
        }
    };

    match closed.name.as_str() {
        "title" => set_once(&mut item.title),
        "link" if !text.is_empty() => item.links.push(RawLink::Element(text.to_string())),
        "description" | "summary" => set_once(&mut item.description),
        "content" | "encoded" => set_once(&mut item.content),
        "category" => set_once(&mut item.category),
        "pubDate" | "published" | "date" | "issued" => set_once(&mut item.published),
        "updated" | "modified" => set_once(&mut item.updated),
        // Text directly inside <image> is the flat form; nested <url> children
        // were already captured above and leave no direct text
        "image" if !text.is_empty() => item.images.push(RawImage::Flat(text.to_string())),
        _ => {}
    }
}
