//! Parsing configuration for HTML extraction
//!
//! Selector rules are plain data so a markup change on either site can be
//! patched from the config file. Order matters: rules are tried first to last.

use serde::{Deserialize, Serialize};

/// One way of reading a field from a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldRule {
    /// Trimmed text of the first matching element with any text
    Text { css: String },
    /// First non-empty attribute, in `attrs` order, of the first matching element that has one
    Attr { css: String, attrs: Vec<String> },
    /// `image` entry of the first parseable `application/ld+json` block
    JsonLdImage { css: String },
}

impl FieldRule {
    pub fn text(css: &str) -> Self {
        Self::Text { css: css.to_string() }
    }

    pub fn attr(css: &str, attrs: &[&str]) -> Self {
        Self::Attr {
            css: css.to_string(),
            attrs: attrs.iter().map(|a| (*a).to_string()).collect(),
        }
    }

    pub fn json_ld_image(css: &str) -> Self {
        Self::JsonLdImage { css: css.to_string() }
    }

    pub fn css(&self) -> &str {
        match self {
            Self::Text { css } | Self::Attr { css, .. } | Self::JsonLdImage { css } => css,
        }
    }
}

/// CSS rules for product listing pages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingSelectors {
    /// Candidate node strategies, most specific first; the first one that
    /// matches anything is used for the whole page
    pub candidates: Vec<String>,
    pub name: Vec<FieldRule>,
    pub price: Vec<FieldRule>,
    /// Optional cents part appended to the price as its decimal digits
    #[serde(default)]
    pub price_cents: Vec<FieldRule>,
    pub link: Vec<FieldRule>,
    pub image: Vec<FieldRule>,
    /// Card images whose URL contains any of these markers are ignored
    #[serde(default = "default_rejected_image_markers")]
    pub rejected_image_markers: Vec<String>,
}

/// Lazy-load stand-ins that must never be stored as product images
pub const PLACEHOLDER_MARKERS: [&str; 2] = ["placeholder", "loading"];

fn default_rejected_image_markers() -> Vec<String> {
    PLACEHOLDER_MARKERS.iter().map(|m| (*m).to_string()).collect()
}

const ML_ANCHORS: [&str; 3] = ["a.ui-search-link", "a.ui-search-result__content", "a[href]"];

impl ListingSelectors {
    /// Kabum product grid (rendered)
    pub fn kabum() -> Self {
        Self {
            candidates: vec!["article[class*='productCard']".to_string()],
            name: vec![
                FieldRule::text("span[class*='nameCard']"),
                FieldRule::text("h2, h3"),
                FieldRule::attr("img", &["alt", "title"]),
            ],
            price: vec![
                FieldRule::text("span[class*='priceCard']"),
                FieldRule::text("span[class*='finalPrice'], span[class*='price']"),
            ],
            price_cents: Vec::new(),
            link: vec![
                FieldRule::attr("a[class*='productLink']", &["href"]),
                FieldRule::attr("a[href]", &["href"]),
            ],
            image: vec![
                FieldRule::attr("img", &["data-src", "src"]),
                FieldRule::json_ld_image("script[type='application/ld+json']"),
            ],
            rejected_image_markers: default_rejected_image_markers(),
        }
    }

    /// Mercado Livre search results (static)
    pub fn mercadolivre() -> Self {
        Self {
            candidates: vec![
                "li.ui-search-layout__item".to_string(),
                "li.ui-search-result__wrapper".to_string(),
                "ol.ui-search-layout > li, ul.ui-search-layout > li".to_string(),
            ],
            name: ML_ANCHORS.iter().map(|css| FieldRule::text(css)).collect(),
            price: vec![
                FieldRule::text("span.ui-search-price__fraction"),
                FieldRule::text("span.andes-money-amount__fraction"),
                FieldRule::text("span.andes-money-amount__fraction--compact"),
                FieldRule::text("span"),
            ],
            price_cents: vec![FieldRule::text("span.andes-money-amount__cents")],
            link: ML_ANCHORS.iter().map(|css| FieldRule::attr(css, &["href"])).collect(),
            image: vec![
                FieldRule::attr("img.ui-search-result-image__element", &["data-src", "src", "data-srcset"]),
                FieldRule::attr("img.ui-search-result__image", &["data-src", "src", "data-srcset"]),
                FieldRule::attr("img", &["data-src", "src", "data-srcset"]),
            ],
            rejected_image_markers: default_rejected_image_markers(),
        }
    }
}

impl Default for ListingSelectors {
    fn default() -> Self {
        Self::kabum()
    }
}

/// Rules for collecting the image gallery of a product detail page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GallerySelectors {
    /// Class pattern of thumbnail/carousel containers (first pass)
    pub container_class_pattern: String,
    pub container_attrs: Vec<String>,
    /// Class pattern of the product area (second pass)
    pub product_area_class_pattern: String,
    pub product_area_attrs: Vec<String>,
    /// Structured data blocks (third pass)
    pub structured_data: String,
    /// URLs containing any of these markers are never collected
    pub rejected_markers: Vec<String>,
    /// Extra markers rejected in the product-area pass
    pub product_area_rejected_markers: Vec<String>,
    /// Later passes only run while fewer images than this were found
    pub min_images: usize,
    pub max_images: usize,
}

impl Default for GallerySelectors {
    fn default() -> Self {
        Self {
            container_class_pattern: "(?i)thumb|miniatura|carousel|gallery".to_string(),
            container_attrs: vec!["data-src".into(), "src".into(), "data-original".into()],
            product_area_class_pattern: "(?i)product|produto".to_string(),
            product_area_attrs: vec![
                "data-src".into(),
                "src".into(),
                "data-zoom".into(),
                "data-large".into(),
            ],
            structured_data: "script[type='application/ld+json']".to_string(),
            rejected_markers: default_rejected_image_markers(),
            product_area_rejected_markers: vec!["icon".into()],
            min_images: 2,
            max_images: crate::domain::product::MAX_GALLERY_IMAGES,
        }
    }
}
