//! Field and link extraction for configured spiders
//!
//! This module handles turning a response body into record fields:
//! - CSS selector fields (`h1.title`, `a.next@href`) over HTML documents
//! - JSON pointer fields (`/data/room_id`) over JSON documents
//! - Links to follow, resolved against the page URL
//!
//! Everything here is synchronous. `scraper::Html` is not `Send`, so a parsed
//! document must never live across an `.await` in a stage handler.

use crate::ConfigError;
use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use url::Url;

/// Splits a field expression into its CSS part and optional attribute name
///
/// `"a.next@href"` selects the `href` attribute of the first `a.next`, while
/// `"h1"` selects the text of the first `h1`. An `@` inside an attribute
/// selector (`a[href*="@"]`) is part of the CSS.
///
/// # Example
///
/// ```
/// use feedcrawl::spider::split_field_expression;
///
/// assert_eq!(split_field_expression("a.next@href"), ("a.next", Some("href")));
/// assert_eq!(split_field_expression("h1.title"), ("h1.title", None));
/// ```
pub fn split_field_expression(expression: &str) -> (&str, Option<&str>) {
    match expression.rfind('@') {
        Some(index)
            if !expression[index + 1..].contains(|c: char| matches!(c, ']' | '"' | '\'')) =>
        {
            (
                expression[..index].trim(),
                Some(expression[index + 1..].trim()),
            )
        }
        _ => (expression.trim(), None),
    }
}

/// A compiled CSS field
#[derive(Debug, Clone)]
pub struct HtmlField {
    name: String,
    selector: Selector,
    attribute: Option<String>,
}

impl HtmlField {
    /// Compiles a field expression
    ///
    /// # Arguments
    ///
    /// * `name` - Output field name
    /// * `expression` - CSS selector, optionally suffixed with `@attribute`
    ///
    /// # Returns
    ///
    /// * `Ok(HtmlField)` - The selector compiled
    /// * `Err(ConfigError::InvalidSelector)` - The selector did not parse
    pub fn compile(name: &str, expression: &str) -> Result<Self, ConfigError> {
        let (css, attribute) = split_field_expression(expression);
        let selector = compile_selector(css)?;

        Ok(Self {
            name: name.to_string(),
            selector,
            attribute: attribute.map(str::to_string),
        })
    }

    /// Returns the output field name
    pub fn name(&self) -> &str {
        &self.name
    }

    fn extract(&self, document: &Html) -> Option<String> {
        let element = document.select(&self.selector).next()?;
        let value = match &self.attribute {
            Some(attribute) => element.value().attr(attribute)?.trim().to_string(),
            None => element_text(&element),
        };

        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }
}

/// Compiles every field of a `[spider.fields]` table
pub fn compile_html_fields(fields: &BTreeMap<String, String>) -> Result<Vec<HtmlField>, ConfigError> {
    fields
        .iter()
        .map(|(name, expression)| HtmlField::compile(name, expression))
        .collect()
}

/// Compiles a bare CSS selector
pub fn compile_selector(css: &str) -> Result<Selector, ConfigError> {
    Selector::parse(css)
        .map_err(|e| ConfigError::InvalidSelector(format!("'{}': {:?}", css, e)))
}

/// What was extracted from one HTML page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HtmlExtraction {
    /// Fields that matched, keyed by field name
    pub fields: Map<String, Value>,

    /// Absolute http(s) links selected by the follow selector
    pub links: Vec<String>,
}

/// Extracts fields and followable links from an HTML document
///
/// # Arguments
///
/// * `html` - The HTML content to parse
/// * `base_url` - Page URL for resolving relative links (no links without it)
/// * `fields` - Compiled field selectors
/// * `follow` - Selector of elements whose `href` should be followed
pub fn extract_html(
    html: &str,
    base_url: Option<&Url>,
    fields: &[HtmlField],
    follow: Option<&Selector>,
) -> HtmlExtraction {
    let document = Html::parse_document(html);

    let mut extraction = HtmlExtraction::default();
    for field in fields {
        if let Some(value) = field.extract(&document) {
            extraction
                .fields
                .insert(field.name.clone(), Value::String(value));
        }
    }

    if let (Some(selector), Some(base_url)) = (follow, base_url) {
        for element in document.select(selector) {
            // Skip download links
            if element.value().attr("download").is_some() {
                continue;
            }

            if let Some(href) = element.value().attr("href") {
                if let Some(absolute_url) = resolve_link(href, base_url) {
                    if !extraction.links.contains(&absolute_url) {
                        extraction.links.push(absolute_url);
                    }
                }
            }
        }
    }

    extraction
}

/// Extracts JSON pointer fields from a parsed document
///
/// Pointers that resolve to nothing or to `null` are left out.
pub fn extract_json(document: &Value, fields: &BTreeMap<String, String>) -> Map<String, Value> {
    fields
        .iter()
        .filter_map(|(name, pointer)| match document.pointer(pointer) {
            Some(Value::Null) | None => None,
            Some(value) => Some((name.clone(), value.clone())),
        })
        .collect()
}

/// Collects an element's text with whitespace runs collapsed
fn element_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - Fragment-only links
/// - Non-HTTP(S) URLs after resolution
pub fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    let mut absolute_url = base_url.join(href).ok()?;
    if absolute_url.scheme() != "http" && absolute_url.scheme() != "https" {
        return None;
    }
    absolute_url.set_fragment(None);

    Some(absolute_url.to_string())
}
