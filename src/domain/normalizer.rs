//! Text and price normalization for scraped listings
//!
//! Pure functions only. Invalid prices come back as `None` and the caller
//! drops the item; a zero price is never let through silently.

use unicode_normalization::UnicodeNormalization;

use super::product::{NormalizedItem, Price, RawCandidate, Source};

/// Canonical product name for `source`.
///
/// Kabum names are NFKD-decomposed and reduced to ASCII (diacritics and any
/// other non-ASCII code points are dropped). Mercado Livre keeps the display
/// text, trimmed.
pub fn normalize_name(raw: &str, source: Source) -> String {
    let trimmed = raw.trim();
    if source.folds_names() {
        trimmed.nfkd().filter(char::is_ascii).collect::<String>().trim().to_string()
    } else {
        trimmed.to_string()
    }
}

/// Parse a Brazilian-formatted price as shown by `source`.
pub fn parse_price(raw: &str, source: Source) -> Option<Price> {
    let amount = match source {
        Source::Kabum => parse_rendered_price(raw),
        Source::MercadoLivre => parse_static_price(raw),
    }?;
    Price::new(amount)
}

/// `"R$ 1.234,56"` -> `1234.56`: keep digits and commas, comma is the decimal mark.
fn parse_rendered_price(raw: &str) -> Option<f64> {
    let numeric: String = raw
        .replace("R$", "")
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    numeric.parse::<f64>().ok()
}

/// `"1.234,50"` -> `1234.50`: dots are thousands separators, comma is the decimal mark.
fn parse_static_price(raw: &str) -> Option<f64> {
    let numeric: String = raw
        .replace("R$", "")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '.')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    numeric.parse::<f64>().ok()
}

/// First URL of a `srcset`-style value (`"a.jpg 1x, b.jpg 2x"` -> `"a.jpg"`)
fn first_image_token(raw: &str) -> Option<String> {
    raw.split_whitespace()
        .next()
        .map(|token| token.trim_end_matches(',').to_string())
        .filter(|token| !token.is_empty())
}

/// Turn a raw candidate into an item, or `None` if it is unusable.
pub fn normalize_candidate(
    candidate: RawCandidate,
    source: Source,
    category: Option<&str>,
) -> Option<NormalizedItem> {
    let name = normalize_name(&candidate.name, source);
    let link = candidate.link.trim().to_string();
    if name.is_empty() || link.is_empty() {
        return None;
    }

    let price = parse_price(candidate.price_text.as_deref()?, source)?;

    let primary_image = candidate
        .image_candidates
        .iter()
        .find_map(|raw| first_image_token(raw));

    Some(NormalizedItem {
        name,
        price,
        link,
        primary_image,
        gallery_images: Vec::new(),
        category: category.map(str::to_string),
    })
}
