//! Product detail page gallery collection
//!
//! Images are gathered in three passes over the page:
//! 1. `<img>` inside thumbnail/carousel containers
//! 2. `<img>` inside the first product area (or the whole page when there is
//!    none), only while pass 1 found too few
//! 3. `image` entries of JSON-LD structured data, only while still too few
//!
//! Results keep discovery order, are de-duplicated and capped.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use super::config::{FieldRule, GallerySelectors};
use super::error::{ParsingError, ParsingResult};
use super::query::{FieldQuery, compile_selector, resolve_url};

#[derive(Debug, Clone)]
pub struct GalleryCollector {
    origin: Url,
    divs: Selector,
    images: Selector,
    container_class: Regex,
    container_attrs: Vec<String>,
    product_area_class: Regex,
    product_area_attrs: Vec<String>,
    structured_data: FieldQuery,
    rejected: Vec<String>,
    product_area_rejected: Vec<String>,
    min_images: usize,
    max_images: usize,
}

impl GalleryCollector {
    pub fn new(selectors: &GallerySelectors, origin: &str) -> ParsingResult<Self> {
        let origin = Url::parse(origin).map_err(|e| ParsingError::InvalidOrigin {
            url: origin.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            origin,
            divs: compile_selector("gallery", "div[class]")?,
            images: compile_selector("gallery", "img")?,
            container_class: compile_pattern(&selectors.container_class_pattern)?,
            container_attrs: selectors.container_attrs.clone(),
            product_area_class: compile_pattern(&selectors.product_area_class_pattern)?,
            product_area_attrs: selectors.product_area_attrs.clone(),
            structured_data: FieldQuery::compile(
                "gallery",
                &FieldRule::JsonLdImage {
                    css: selectors.structured_data.clone(),
                },
            )?,
            rejected: lowercase_all(&selectors.rejected_markers),
            product_area_rejected: lowercase_all(&selectors.product_area_rejected_markers),
            min_images: selectors.min_images,
            max_images: selectors.max_images,
        })
    }

    pub fn collect_str(&self, html: &str) -> Vec<String> {
        self.collect(&Html::parse_document(html))
    }

    /// Absolute gallery URLs for a product page; an unparseable page yields none
    pub fn collect(&self, document: &Html) -> Vec<String> {
        let mut gallery = Vec::new();

        for container in self.classed_divs(document, &self.container_class) {
            self.push_images(container, &self.container_attrs, &[], &mut gallery);
        }
        let from_containers = gallery.len();

        if gallery.len() < self.min_images {
            let area = self
                .classed_divs(document, &self.product_area_class)
                .next()
                .unwrap_or_else(|| document.root_element());
            self.push_images(area, &self.product_area_attrs, &self.product_area_rejected, &mut gallery);
        }
        let from_product_area = gallery.len() - from_containers;

        if gallery.len() < self.min_images {
            for raw in self.structured_data.all(document.root_element()) {
                self.push(&raw, &[], &mut gallery);
            }
        }

        debug!(
            from_containers,
            from_product_area,
            total = gallery.len(),
            "Collected product gallery"
        );
        gallery.truncate(self.max_images);
        gallery
    }

    fn classed_divs<'a>(
        &'a self,
        document: &'a Html,
        pattern: &'a Regex,
    ) -> impl Iterator<Item = ElementRef<'a>> + 'a {
        document.select(&self.divs).filter(move |div| {
            div.value()
                .attr("class")
                .is_some_and(|class| pattern.is_match(class))
        })
    }

    fn push_images(&self, scope: ElementRef<'_>, attrs: &[String], extra: &[String], out: &mut Vec<String>) {
        for img in scope.select(&self.images) {
            let raw = attrs.iter().find_map(|attr| {
                img.value().attr(attr).map(str::trim).filter(|v| !v.is_empty())
            });
            if let Some(raw) = raw {
                self.push(raw, extra, out);
            }
        }
    }

    fn push(&self, raw: &str, extra: &[String], out: &mut Vec<String>) {
        let Some(url) = resolve_url(&self.origin, raw) else {
            return;
        };
        let lowered = url.to_lowercase();
        if self
            .rejected
            .iter()
            .chain(extra)
            .any(|marker| lowered.contains(marker.as_str()))
        {
            return;
        }
        if !out.contains(&url) {
            out.push(url);
        }
    }
}

fn compile_pattern(pattern: &str) -> ParsingResult<Regex> {
    Regex::new(pattern).map_err(|e| ParsingError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

fn lowercase_all(markers: &[String]) -> Vec<String> {
    markers.iter().map(|m| m.to_lowercase()).collect()
}
