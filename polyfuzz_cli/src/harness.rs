//! Demo targets. Each reports the branches it takes as coverage probes.

use polyfuzz_core::CoverageObserver;

fn hex_value(byte: u8) -> Option<u8> {
    char::from(byte)
        .to_digit(16)
        .and_then(|digit| u8::try_from(digit).ok())
}

/// Decodes a CGI query string: `+` becomes a space and `%xx` a byte.
///
/// Panics with "Invalid encoding" on a `%` not followed by two hex digits.
pub fn cgi_decode(input: &str, cov: &mut CoverageObserver) -> String {
    cov.hit(1u32);
    let bytes = input.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());

    let mut i = 0;
    while i < bytes.len() {
        cov.hit(2u32);
        match bytes[i] {
            b'+' => {
                cov.hit(3u32);
                decoded.push(b' ');
            }
            b'%' => {
                cov.hit(4u32);
                let high = bytes.get(i + 1).copied().and_then(hex_value);
                let low = bytes.get(i + 2).copied().and_then(hex_value);
                match (high, low) {
                    (Some(high), Some(low)) => {
                        cov.hit(5u32);
                        decoded.push(high * 16 + low);
                        i += 2;
                    }
                    _ => {
                        cov.hit(6u32);
                        panic!("Invalid encoding");
                    }
                }
            }
            other => {
                cov.hit(7u32);
                decoded.push(other);
            }
        }
        i += 1;
    }

    cov.hit(8u32);
    String::from_utf8_lossy(&decoded).into_owned()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UrlParts<'a> {
    pub scheme: &'a str,
    pub netloc: &'a str,
    pub path: &'a str,
    pub query: &'a str,
    pub fragment: &'a str,
}

fn is_scheme(candidate: &str) -> bool {
    let mut chars = candidate.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Splits a URL into `scheme://netloc/path?query#fragment`.
///
/// Panics with "Invalid IPv6 URL" when the network location has an unmatched bracket.
pub fn url_split<'a>(url: &'a str, cov: &mut CoverageObserver) -> UrlParts<'a> {
    cov.hit(100u32);
    let mut parts = UrlParts::default();
    let mut rest = url;

    if let Some((candidate, after)) = rest.split_once(':') {
        cov.hit(101u32);
        if is_scheme(candidate) {
            cov.hit(102u32);
            parts.scheme = candidate;
            rest = after;
        } else {
            cov.hit(103u32);
        }
    }

    if let Some(after) = rest.strip_prefix("//") {
        cov.hit(104u32);
        let end = after.find(['/', '?', '#']).unwrap_or(after.len());
        parts.netloc = &after[..end];
        rest = &after[end..];

        if parts.netloc.contains('[') != parts.netloc.contains(']') {
            cov.hit(105u32);
            panic!("Invalid IPv6 URL");
        }
        if parts.netloc.contains('@') {
            cov.hit(106u32);
        }
        if parts.netloc.contains(':') {
            cov.hit(107u32);
        }
    }

    if let Some((before, fragment)) = rest.split_once('#') {
        cov.hit(108u32);
        parts.fragment = fragment;
        rest = before;
    }
    if let Some((path, query)) = rest.split_once('?') {
        cov.hit(109u32);
        parts.query = query;
        rest = path;
    }

    parts.path = rest;
    if rest.is_empty() {
        cov.hit(110u32);
    } else if rest.starts_with('/') {
        cov.hit(111u32);
    } else {
        cov.hit(112u32);
    }
    parts
}

/// Shape of a document as seen by [`html_feed`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HtmlOutline {
    /// Start tags seen, void and self-closing ones included.
    pub elements: usize,
    pub max_depth: usize,
    /// Elements still open at the end of the input, outermost first.
    pub unclosed: Vec<String>,
}

const VOID_ELEMENTS: [&str; 6] = ["br", "hr", "img", "input", "link", "meta"];

/// Byte offset of the `>` closing a tag, ignoring any inside quoted values.
fn tag_end(tag: &str) -> Option<usize> {
    let mut quote = None;
    for (i, c) in tag.char_indices() {
        match (quote, c) {
            (None, '"' | '\'') => quote = Some(c),
            (Some(open), _) if c == open => quote = None,
            (None, '>') => return Some(i),
            _ => {}
        }
    }
    None
}

fn tag_name(tag: &str) -> &str {
    let end = tag
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-'))
        .unwrap_or(tag.len());
    &tag[..end]
}

/// Feeds a document through a lenient HTML tokenizer, tracking open elements.
///
/// Like a browser parser it never rejects input: a stray end tag is ignored,
/// an unterminated tag or comment ends the document, and a `<` that does not
/// open markup is text.
pub fn html_feed(input: &str, cov: &mut CoverageObserver) -> HtmlOutline {
    cov.hit(200u32);
    let mut outline = HtmlOutline::default();
    let mut open: Vec<String> = Vec::new();
    let mut rest = input;

    while let Some(start) = rest.find('<') {
        if start > 0 {
            cov.hit(201u32);
        }
        let markup = &rest[start + 1..];

        if let Some(comment) = markup.strip_prefix("!--") {
            let Some(end) = comment.find("-->") else {
                cov.hit(203u32);
                break;
            };
            cov.hit(202u32);
            rest = &comment[end + 3..];
            continue;
        }

        let opens_markup = markup
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || matches!(c, '!' | '?' | '/'));
        if !opens_markup {
            cov.hit(216u32);
            rest = markup;
            continue;
        }
        let Some(end) = tag_end(markup) else {
            cov.hit(217u32);
            break;
        };
        let tag = &markup[..end];
        rest = &markup[end + 1..];

        if let Some(declaration) = tag.strip_prefix('!') {
            cov.hit(204u32);
            if declaration.to_ascii_lowercase().starts_with("doctype") {
                cov.hit(205u32);
            }
        } else if tag.starts_with('?') {
            cov.hit(206u32);
        } else if let Some(closing) = tag.strip_prefix('/') {
            cov.hit(207u32);
            let name = tag_name(closing).to_ascii_lowercase();
            match open.iter().rposition(|element| *element == name) {
                Some(depth) => {
                    cov.hit(208u32);
                    open.truncate(depth);
                }
                None => cov.hit(209u32),
            }
        } else {
            cov.hit(210u32);
            outline.elements += 1;
            let name = tag_name(tag).to_ascii_lowercase();
            for attribute in tag[name.len()..]
                .split_whitespace()
                .filter(|attribute| *attribute != "/")
            {
                cov.hit(211u32);
                if attribute.contains("=\"") || attribute.contains("='") {
                    cov.hit(212u32);
                }
            }

            if tag.ends_with('/') {
                cov.hit(213u32);
            } else if VOID_ELEMENTS.contains(&name.as_str()) {
                cov.hit(214u32);
            } else {
                open.push(name);
                if open.len() > 3 {
                    cov.hit(215u32);
                }
                outline.max_depth = outline.max_depth.max(open.len());
            }
        }
    }

    if open.is_empty() {
        cov.hit(219u32);
    } else {
        cov.hit(218u32);
    }
    outline.unclosed = open;
    outline
}
