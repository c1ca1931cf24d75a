//! Content extraction from arbitrary news-site HTML.
//!
//! Real article pages bury their prose under navigation chrome, ad containers,
//! and boilerplate, with no consistent structure across outlets. This module
//! turns raw HTML into an [`ExtractedContent`] using a prioritized set of
//! structural heuristics:
//!
//! - **Heading**: first `h1`, else the document `title`, else a list of
//!   fallback selectors, else the `"No Heading"` sentinel.
//! - **Body**: paragraphs inside the first recognizable article container,
//!   else all sufficiently long paragraphs, else long generic `div` blocks.
//!
//! Text inside `script`, `style`, `nav`, `header`, `footer`, `aside`, and
//! `iframe` never contributes. The parsed DOM is immutable, so boilerplate is
//! excluded by walking ancestors when text is collected rather than by
//! removing nodes.

use crate::models::ExtractedContent;
use crate::utils::truncate_chars;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

/// Sentinel heading for documents with no heading-bearing element.
pub const NO_HEADING: &str = "No Heading";

/// Headings longer than this are truncated with an ellipsis marker.
const MAX_HEADING_CHARS: usize = 200;

/// Minimum trimmed length for a paragraph picked up by the whole-document scan.
const MIN_PARAGRAPH_CHARS: usize = 20;

/// Minimum trimmed length and word count for the generic block fallback.
const MIN_BLOCK_CHARS: usize = 100;
const MIN_BLOCK_WORDS: usize = 10;

/// Elements whose text is never article content.
const BOILERPLATE_TAGS: [&str; 7] = [
    "script", "style", "nav", "header", "footer", "aside", "iframe",
];

static H1: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").unwrap());
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").unwrap());
static PARAGRAPH: Lazy<Selector> = Lazy::new(|| Selector::parse("p").unwrap());
static DIV: Lazy<Selector> = Lazy::new(|| Selector::parse("div").unwrap());

/// Heading fallbacks, tried in order after `h1` and `title`.
static HEADING_FALLBACKS: Lazy<Vec<Selector>> = Lazy::new(|| {
    ["h2", "h3", ".title", ".headline", "[data-testid=\"headline\"]"]
        .iter()
        .map(|s| Selector::parse(s).unwrap())
        .collect()
});

/// Article container selectors, most specific conventions first.
static ARTICLE_CONTAINERS: Lazy<Vec<Selector>> = Lazy::new(|| {
    [
        "article",
        "[role=\"main\"]",
        ".article-content",
        ".content",
        ".story-body",
        ".entry-content",
        ".post-content",
        "#article-body",
        ".article-body",
    ]
    .iter()
    .map(|s| Selector::parse(s).unwrap())
    .collect()
});

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Everything outside word characters, whitespace, and common punctuation.
static DISALLOWED_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[^\w\s.,;:!?\-'"()]"#).unwrap());

/// Derive heading and body text from raw HTML.
///
/// Never fails: a document with no extractable paragraphs of any kind yields
/// an empty body, and the caller decides whether that is an error.
pub fn extract(html: &str) -> ExtractedContent {
    let document = Html::parse_document(html);

    let heading = select_heading(&document);
    let body = select_body(&document);

    debug!(
        heading_chars = heading.chars().count(),
        body_chars = body.chars().count(),
        "Extracted content"
    );

    ExtractedContent { heading, body }
}

/// True if the element is one of the boilerplate tags or sits inside one.
fn is_boilerplate(element: &ElementRef) -> bool {
    if BOILERPLATE_TAGS.contains(&element.value().name()) {
        return true;
    }
    element.ancestors().any(|node| {
        node.value()
            .as_element()
            .is_some_and(|e| BOILERPLATE_TAGS.contains(&e.name()))
    })
}

/// Collect the element's text, skipping anything inside boilerplate, with
/// whitespace runs collapsed to single spaces.
fn visible_text(element: &ElementRef) -> String {
    let mut raw = String::new();
    for node in element.descendants() {
        if let Some(text) = node.value().as_text() {
            let inside_boilerplate = node.ancestors().any(|n| {
                n.value()
                    .as_element()
                    .is_some_and(|e| BOILERPLATE_TAGS.contains(&e.name()))
            });
            if inside_boilerplate {
                continue;
            }
            raw.push_str(text);
            raw.push(' ');
        }
    }
    WHITESPACE_RUN.replace_all(raw.trim(), " ").into_owned()
}

fn select_heading(document: &Html) -> String {
    // First h1 outside boilerplate wins if it has text.
    if let Some(h1) = document.select(&H1).find(|el| !is_boilerplate(el)) {
        let text = visible_text(&h1);
        if !text.is_empty() {
            return cap_heading(text);
        }
    }

    if let Some(title) = document.select(&TITLE).next() {
        let text = visible_text(&title);
        if !text.is_empty() {
            return cap_heading(text);
        }
    }

    // Per selector: look at the first match only, then move on.
    for selector in HEADING_FALLBACKS.iter() {
        if let Some(el) = document.select(selector).find(|el| !is_boilerplate(el)) {
            let text = visible_text(&el);
            if !text.is_empty() {
                return cap_heading(text);
            }
        }
    }

    NO_HEADING.to_string()
}

fn cap_heading(heading: String) -> String {
    if heading.chars().count() > MAX_HEADING_CHARS {
        format!("{}...", truncate_chars(&heading, MAX_HEADING_CHARS))
    } else {
        heading
    }
}

fn select_body(document: &Html) -> String {
    let mut parts: Vec<String> = Vec::new();

    // Strategy 1: paragraphs of the first article container holding at least
    // two of them.
    for selector in ARTICLE_CONTAINERS.iter() {
        for container in document.select(selector) {
            if is_boilerplate(&container) {
                continue;
            }
            let paragraphs: Vec<ElementRef> = container
                .select(&PARAGRAPH)
                .filter(|p| !is_boilerplate(p))
                .collect();
            if paragraphs.len() >= 2 {
                parts.extend(
                    paragraphs
                        .iter()
                        .map(visible_text)
                        .filter(|t| !t.is_empty()),
                );
                break;
            }
        }
        if !parts.is_empty() {
            break;
        }
    }

    // Strategy 2: any paragraph in the document with enough text.
    if parts.is_empty() {
        parts.extend(
            document
                .select(&PARAGRAPH)
                .filter(|p| !is_boilerplate(p))
                .map(|p| visible_text(&p))
                .filter(|t| t.chars().count() > MIN_PARAGRAPH_CHARS),
        );
    }

    // Strategy 3: generic block containers with substantial text.
    if parts.is_empty() {
        parts.extend(
            document
                .select(&DIV)
                .filter(|d| !is_boilerplate(d))
                .map(|d| visible_text(&d))
                .filter(|t| {
                    t.chars().count() > MIN_BLOCK_CHARS
                        && t.split_whitespace().count() > MIN_BLOCK_WORDS
                }),
        );
    }

    let joined = parts.join(" ");
    DISALLOWED_CHARS.replace_all(&joined, "").trim().to_string()
}
