//! Compiled field queries and fallback chains

use scraper::{ElementRef, Selector};
use serde_json::Value;
use url::Url;

use super::config::FieldRule;
use super::error::{ParsingError, ParsingResult};

/// A [`FieldRule`] with its selector compiled
#[derive(Debug, Clone)]
pub enum FieldQuery {
    Text(Selector),
    Attr { selector: Selector, attrs: Vec<String> },
    JsonLdImage(Selector),
}

impl FieldQuery {
    pub fn compile(field: &str, rule: &FieldRule) -> ParsingResult<Self> {
        let selector = compile_selector(field, rule.css())?;
        Ok(match rule {
            FieldRule::Text { .. } => Self::Text(selector),
            FieldRule::Attr { attrs, .. } => Self::Attr {
                selector,
                attrs: attrs.clone(),
            },
            FieldRule::JsonLdImage { .. } => Self::JsonLdImage(selector),
        })
    }

    /// First non-empty value below `scope`
    pub fn first(&self, scope: ElementRef<'_>) -> Option<String> {
        match self {
            Self::Text(selector) => scope.select(selector).find_map(element_text),
            Self::Attr { selector, attrs } => scope
                .select(selector)
                .find_map(|element| first_attr(element, attrs)),
            Self::JsonLdImage(selector) => scope
                .select(selector)
                .find_map(|element| json_ld_images(element).into_iter().next()),
        }
    }

    /// Every non-empty value below `scope`, in document order
    pub fn all(&self, scope: ElementRef<'_>) -> Vec<String> {
        match self {
            Self::Text(selector) => scope.select(selector).filter_map(element_text).collect(),
            Self::Attr { selector, attrs } => scope
                .select(selector)
                .filter_map(|element| first_attr(element, attrs))
                .collect(),
            Self::JsonLdImage(selector) => scope.select(selector).flat_map(json_ld_images).collect(),
        }
    }
}

/// Ordered fallback queries for one field; the first query with a value wins
#[derive(Debug, Clone)]
pub struct FieldChain {
    field: &'static str,
    queries: Vec<FieldQuery>,
}

impl FieldChain {
    /// Compile `rules`. An empty chain is only allowed for optional fields.
    pub fn compile(field: &'static str, rules: &[FieldRule], required: bool) -> ParsingResult<Self> {
        if required && rules.is_empty() {
            return Err(ParsingError::EmptyChain {
                field: field.to_string(),
            });
        }
        let queries = rules
            .iter()
            .map(|rule| FieldQuery::compile(field, rule))
            .collect::<ParsingResult<Vec<_>>>()?;
        Ok(Self { field, queries })
    }

    pub const fn field(&self) -> &'static str {
        self.field
    }

    pub fn first(&self, scope: ElementRef<'_>) -> Option<String> {
        self.queries.iter().find_map(|query| query.first(scope))
    }

    /// Values of every query, chain order then document order
    pub fn all(&self, scope: ElementRef<'_>) -> Vec<String> {
        self.queries.iter().flat_map(|query| query.all(scope)).collect()
    }
}

pub(crate) fn compile_selector(field: &str, css: &str) -> ParsingResult<Selector> {
    Selector::parse(css).map_err(|e| ParsingError::invalid_selector(field, css, e))
}

/// Resolve `raw` against `base`. Only http(s) results are kept; inline
/// `data:` images and `javascript:` links are dropped.
pub fn resolve_url(base: &Url, raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let lowered = raw.to_ascii_lowercase();
    if lowered.starts_with("data:") || lowered.starts_with("javascript:") {
        return None;
    }
    let url = base.join(raw).ok()?;
    matches!(url.scheme(), "http" | "https").then(|| url.to_string())
}

fn element_text(element: ElementRef<'_>) -> Option<String> {
    let text = element.text().collect::<Vec<_>>().join(" ");
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!collapsed.is_empty()).then_some(collapsed)
}

fn first_attr(element: ElementRef<'_>, attrs: &[String]) -> Option<String> {
    attrs.iter().find_map(|attr| {
        element
            .value()
            .attr(attr)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    })
}

/// `image` entries of a JSON-LD block; malformed JSON yields nothing
fn json_ld_images(element: ElementRef<'_>) -> Vec<String> {
    let body = element.text().collect::<String>();
    let Ok(document) = serde_json::from_str::<Value>(body.trim()) else {
        return Vec::new();
    };
    let mut images = Vec::new();
    collect_ld_images(&document, &mut images);
    images
}

fn collect_ld_images(node: &Value, out: &mut Vec<String>) {
    match node {
        Value::Array(items) => items.iter().for_each(|item| collect_ld_images(item, out)),
        Value::Object(map) => {
            if let Some(image) = map.get("image") {
                push_image_value(image, out);
            }
            if let Some(graph) = map.get("@graph") {
                collect_ld_images(graph, out);
            }
        }
        _ => {}
    }
}

fn push_image_value(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(url) if !url.trim().is_empty() => out.push(url.trim().to_string()),
        Value::Array(items) => items.iter().for_each(|item| push_image_value(item, out)),
        Value::Object(map) => {
            if let Some(url) = map.get("url").or_else(|| map.get("contentUrl")) {
                push_image_value(url, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn base() -> Url {
        Url::parse("https://www.kabum.com.br").unwrap()
    }

    #[test]
    fn resolves_relative_and_protocol_relative_urls() {
        assert_eq!(
            resolve_url(&base(), "/produto/123/monitor").as_deref(),
            Some("https://www.kabum.com.br/produto/123/monitor")
        );
        assert_eq!(
            resolve_url(&base(), "//images.kabum.com.br/a.jpg").as_deref(),
            Some("https://images.kabum.com.br/a.jpg")
        );
        assert_eq!(
            resolve_url(&base(), "https://other.com/x").as_deref(),
            Some("https://other.com/x")
        );
    }

    #[test]
    fn drops_inline_and_script_urls() {
        assert_eq!(resolve_url(&base(), "data:image/gif;base64,R0lGOD"), None);
        assert_eq!(resolve_url(&base(), "javascript:void(0)"), None);
        assert_eq!(resolve_url(&base(), "   "), None);
    }

    #[test]
    fn chain_falls_back_to_later_rules() {
        let html = Html::parse_fragment(r#"<div><a class="other" href="/p/1">  Teclado   Gamer </a></div>"#);
        let chain = FieldChain::compile(
            "name",
            &[FieldRule::text("a.ui-search-link"), FieldRule::text("a[href]")],
            true,
        )
        .unwrap();
        assert_eq!(chain.first(html.root_element()).as_deref(), Some("Teclado Gamer"));
    }

    #[test]
    fn attr_rule_tries_attributes_in_order() {
        let html = Html::parse_fragment(r#"<div><img src="/s.jpg"><img data-src="/lazy.jpg" src="/p.gif"></div>"#);
        let query = FieldQuery::compile("image", &FieldRule::attr("img", &["data-src", "src"])).unwrap();
        assert_eq!(query.first(html.root_element()).as_deref(), Some("/s.jpg"));
        assert_eq!(query.all(html.root_element()), vec!["/s.jpg", "/lazy.jpg"]);
    }

    #[test]
    fn reads_images_from_structured_data() {
        let html = Html::parse_document(
            r#"<html><head>
            <script type="application/ld+json">{ not json</script>
            <script type="application/ld+json">
              {"@context":"https://schema.org","@graph":[{"@type":"Product","image":["https://img/1.jpg",{"url":"https://img/2.jpg"}]}]}
            </script>
            </head><body></body></html>"#,
        );
        let query = FieldQuery::compile(
            "image",
            &FieldRule::json_ld_image("script[type='application/ld+json']"),
        )
        .unwrap();
        assert_eq!(query.all(html.root_element()), vec!["https://img/1.jpg", "https://img/2.jpg"]);
        assert_eq!(query.first(html.root_element()).as_deref(), Some("https://img/1.jpg"));
    }

    #[test]
    fn rejects_invalid_selectors_and_empty_required_chains() {
        let err = FieldChain::compile("price", &[FieldRule::text("span[[")], true).unwrap_err();
        assert!(matches!(err, ParsingError::InvalidSelector { .. }));
        let err = FieldChain::compile("price", &[], true).unwrap_err();
        assert_eq!(err, ParsingError::EmptyChain { field: "price".to_string() });
        assert!(FieldChain::compile("price_cents", &[], false).is_ok());
    }
}
