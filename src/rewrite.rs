//! HTML rewrite engine
//!
//! Walks the resource-bearing attributes of a fetched HTML document and
//! routes each one through the [`Resolver`], so that following any link,
//! form or embedded resource stays inside the proxy.
//!
//! The document additionally gets:
//! - a `Content-Security-Policy: upgrade-insecure-requests` meta tag and a
//!   `<base href>` pointing at the origin page, as the first children of `<head>`
//! - a hidden `#proxy-info` element at the end of `<body>`
//!
//! Documents are rewritten in their own encoding (the `Content-Type` charset,
//! a `<meta charset>`, or UTF-8), so bytes outside rewritten attributes are
//! passed through untouched.
//!
//! Rewriting is best effort. [`Rewriter::rewrite`] never fails: any error
//! returns the original bytes untouched.

use std::borrow::Cow;
use std::cell::Cell;

use bytes::Bytes;
use html_escape::{decode_html_entities, encode_double_quoted_attribute};
use lol_html::html_content::{ContentType, Element};
use lol_html::{element, end, AsciiCompatibleEncoding, HandlerResult, HtmlRewriter, Settings};
use tracing::{debug, warn};

use crate::charset::declared_encoding;
use crate::error::RewriteError;
use crate::resolver::{ProxyContext, Resolver};

/// An element attribute that carries a resource reference.
#[derive(Debug, Clone, Copy)]
pub struct AttributeTarget {
    pub tag: &'static str,
    pub attribute: &'static str,
    /// Leave inline `data:` values alone
    pub skip_data_uri: bool,
}

impl AttributeTarget {
    const fn new(tag: &'static str, attribute: &'static str) -> Self {
        Self {
            tag,
            attribute,
            skip_data_uri: false,
        }
    }

    fn selector(&self) -> String {
        format!("{}[{}]", self.tag, self.attribute)
    }
}

/// Every `(tag, attribute)` pair rewritten through the resolver.
///
/// `srcset` is handled separately since it holds a list of candidates.
pub const REWRITE_TARGETS: &[AttributeTarget] = &[
    AttributeTarget::new("a", "href"),
    AttributeTarget::new("form", "action"),
    AttributeTarget::new("link", "href"),
    AttributeTarget::new("script", "src"),
    AttributeTarget {
        tag: "img",
        attribute: "src",
        skip_data_uri: true,
    },
    AttributeTarget::new("iframe", "src"),
];

const CSP_META: &str = r#"<meta http-equiv="Content-Security-Policy" content="upgrade-insecure-requests">"#;

/// Rewrites HTML documents for a proxy.
#[derive(Debug, Clone)]
pub struct Rewriter {
    resolver: Resolver,
}

impl Rewriter {
    pub fn new(resolver: Resolver) -> Self {
        Self { resolver }
    }

    /// Rewrites `content`, falling back to the unmodified bytes on any failure.
    pub fn rewrite(
        &self,
        content: Bytes,
        content_type: Option<&str>,
        original_url: &str,
        proxy_base_url: &str,
    ) -> Bytes {
        match self.try_rewrite(&content, content_type, original_url, proxy_base_url) {
            Ok(rewritten) => Bytes::from(rewritten),
            Err(err) => {
                warn!(original_url, error = %err, "rewrite failed, serving original content");
                content
            }
        }
    }

    /// Rewrites `content`, reporting why it could not be processed.
    ///
    /// # Errors
    ///
    /// - [`RewriteError::Encoding`] - the document encoding is not ASCII-compatible
    /// - [`RewriteError::Url`] - `original_url` or `proxy_base_url` does not parse
    /// - [`RewriteError::Rewriting`] - the HTML rewriter aborted
    pub fn try_rewrite(
        &self,
        content: &[u8],
        content_type: Option<&str>,
        original_url: &str,
        proxy_base_url: &str,
    ) -> Result<Vec<u8>, RewriteError> {
        let encoding = document_encoding(content, content_type)?;
        let context = ProxyContext::new(original_url, proxy_base_url)?;
        let context = &context;

        let original = encode_double_quoted_attribute(context.original_url().as_str()).into_owned();
        let preamble = format!(r#"{CSP_META}<base href="{original}">"#);
        let head_block = format!("<head>{preamble}</head>");
        let proxy_info =
            format!(r#"<div id="proxy-info" style="display:none;" data-original-url="{original}"></div>"#);

        let preamble_injected = Cell::new(false);

        let mut element_handlers = Vec::with_capacity(REWRITE_TARGETS.len() + 5);
        for target in REWRITE_TARGETS {
            let target = *target;
            element_handlers.push(element!(target.selector(), move |el| {
                self.rewrite_attribute(el, target, context)
            }));
        }

        element_handlers.push(element!("[srcset]", |el| {
            if let Some(srcset) = el.get_attribute("srcset") {
                let rewritten = self.rewrite_srcset(context, &decode_html_entities(&srcset));
                el.set_attribute("srcset", &encode_double_quoted_attribute(&rewritten))?;
            }
            Ok(())
        }));

        element_handlers.push(element!("[style]", |el| {
            if let Some(style) = el.get_attribute("style") {
                if let Some(rewritten) = self.rewrite_style(context, &style) {
                    el.set_attribute("style", &rewritten)?;
                }
            }
            Ok(())
        }));

        // Replaced by the injected base
        element_handlers.push(element!("base", |el| {
            el.remove();
            Ok(())
        }));

        // The preamble opens the first <head>; without one, a <head> is created
        // right before the first element that cannot precede it.
        element_handlers.push(element!("*", |el| {
            if preamble_injected.get() {
                return Ok(());
            }
            let tag = el.tag_name();
            if tag.eq_ignore_ascii_case("head") {
                el.prepend(&preamble, ContentType::Html);
                preamble_injected.set(true);
            } else if !tag.eq_ignore_ascii_case("html") {
                el.before(&head_block, ContentType::Html);
                preamble_injected.set(true);
            }
            Ok(())
        }));

        element_handlers.push(element!("body", |el| {
            el.append(&proxy_info, ContentType::Html);
            Ok(())
        }));

        // Documents without any element
        let document_handlers = vec![end!(|end| {
            if !preamble_injected.get() {
                end.append(&head_block, ContentType::Html);
            }
            Ok(())
        })];

        let mut output = Vec::with_capacity(content.len() + head_block.len() + proxy_info.len());
        let mut rewriter = HtmlRewriter::new(
            Settings {
                element_content_handlers: element_handlers,
                document_content_handlers: document_handlers,
                encoding,
                ..Settings::default()
            },
            |chunk: &[u8]| output.extend_from_slice(chunk),
        );
        rewriter.write(content)?;
        rewriter.end()?;

        Ok(output)
    }

    fn rewrite_attribute(
        &self,
        el: &mut Element,
        target: AttributeTarget,
        context: &ProxyContext,
    ) -> HandlerResult {
        let Some(raw) = el.get_attribute(target.attribute) else {
            return Ok(());
        };
        let value = decode_html_entities(&raw);

        if target.skip_data_uri && value.trim_start().to_ascii_lowercase().starts_with("data:") {
            return Ok(());
        }
        if Resolver::is_pass_through(&value) {
            return Ok(());
        }

        match self.resolver.resolve(context, &value) {
            Ok(resolved) => {
                el.set_attribute(target.attribute, &encode_double_quoted_attribute(&resolved))?
            }
            Err(err) => {
                debug!(tag = target.tag, attribute = target.attribute, error = %err, "left reference untouched");
            }
        }
        Ok(())
    }

    /// Resolves each `url [descriptor]` candidate of a decoded `srcset` list.
    fn rewrite_srcset(&self, context: &ProxyContext, srcset: &str) -> String {
        parse_srcset(srcset)
            .into_iter()
            .map(|(url, descriptor)| {
                let url = if Resolver::is_pass_through(url) {
                    Cow::Borrowed(url)
                } else {
                    match self.resolver.resolve(context, url) {
                        Ok(resolved) => Cow::Owned(resolved),
                        Err(err) => {
                            debug!(error = %err, "left srcset candidate untouched");
                            Cow::Borrowed(url)
                        }
                    }
                };

                if descriptor.is_empty() {
                    url.into_owned()
                } else {
                    format!("{url} {descriptor}")
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Points `url(<asset prefix>...)` references in inline styles at the origin.
    ///
    /// Returns `None` when the style has nothing to rewrite.
    fn rewrite_style(&self, context: &ProxyContext, style: &str) -> Option<String> {
        let prefix = self.resolver.asset_prefix();
        if !style.contains(prefix) {
            return None;
        }

        let origin = context.original_url().origin();
        if !origin.is_tuple() {
            return None;
        }
        let origin = origin.ascii_serialization();
        let absolute_prefix = format!("{}/{}", origin, prefix.trim_start_matches('/'));

        let mut rewritten = style.to_string();
        for quote in ["\"", "'", ""] {
            rewritten = rewritten.replace(
                &format!("url({quote}{prefix}"),
                &format!("url({quote}{absolute_prefix}"),
            );
        }

        (rewritten != style).then_some(rewritten)
    }
}

fn document_encoding(
    content: &[u8],
    content_type: Option<&str>,
) -> Result<AsciiCompatibleEncoding, RewriteError> {
    let encoding = declared_encoding(content, content_type).unwrap_or(encoding_rs::UTF_8);
    AsciiCompatibleEncoding::new(encoding).ok_or(RewriteError::Encoding(encoding.name()))
}

/// Splits a `srcset` value into `(url, descriptor)` candidates.
///
/// URLs run up to whitespace, so commas inside them (as in `data:` URIs) do
/// not split candidates. Descriptors run up to the next comma outside
/// parentheses.
pub fn parse_srcset(srcset: &str) -> Vec<(&str, &str)> {
    let is_space = |c: char| c.is_ascii_whitespace();
    let mut candidates = Vec::new();
    let mut rest = srcset;

    loop {
        rest = rest.trim_start_matches(|c: char| is_space(c) || c == ',');
        if rest.is_empty() {
            break;
        }

        let url_end = rest.find(is_space).unwrap_or(rest.len());
        let url = &rest[..url_end];
        rest = &rest[url_end..];

        // A URL ending in commas carries no descriptor
        let trimmed_url = url.trim_end_matches(',');
        if trimmed_url.len() != url.len() {
            if !trimmed_url.is_empty() {
                candidates.push((trimmed_url, ""));
            }
            continue;
        }

        let mut depth = 0usize;
        let mut descriptor_end = rest.len();
        for (i, c) in rest.char_indices() {
            match c {
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                ',' if depth == 0 => {
                    descriptor_end = i;
                    break;
                }
                _ => {}
            }
        }

        candidates.push((url, rest[..descriptor_end].trim()));
        rest = &rest[descriptor_end..];
    }

    candidates
}
