//! Product listing extraction
//!
//! Candidate strategies are tried in order and the first one that matches
//! any node is used for the whole page. Each field then goes through its own
//! fallback chain. Candidates without a name or a link are dropped here;
//! price validation is left to the normalizer.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, trace};
use url::Url;

use super::config::ListingSelectors;
use super::error::{ParsingError, ParsingResult};
use super::query::{FieldChain, compile_selector, resolve_url};
use crate::domain::product::RawCandidate;

/// Extracts raw product candidates from one listing page
#[derive(Debug, Clone)]
pub struct ListingExtractor {
    origin: Url,
    candidates: Vec<Selector>,
    name: FieldChain,
    price: FieldChain,
    price_cents: FieldChain,
    link: FieldChain,
    image: FieldChain,
    rejected_image_markers: Vec<String>,
}

impl ListingExtractor {
    pub fn new(selectors: &ListingSelectors, origin: &str) -> ParsingResult<Self> {
        let origin = Url::parse(origin).map_err(|e| ParsingError::InvalidOrigin {
            url: origin.to_string(),
            reason: e.to_string(),
        })?;
        if selectors.candidates.is_empty() {
            return Err(ParsingError::EmptyChain {
                field: "candidates".to_string(),
            });
        }
        let candidates = selectors
            .candidates
            .iter()
            .map(|css| compile_selector("candidates", css))
            .collect::<ParsingResult<Vec<_>>>()?;

        Ok(Self {
            origin,
            candidates,
            name: FieldChain::compile("name", &selectors.name, true)?,
            price: FieldChain::compile("price", &selectors.price, true)?,
            price_cents: FieldChain::compile("price_cents", &selectors.price_cents, false)?,
            link: FieldChain::compile("link", &selectors.link, true)?,
            image: FieldChain::compile("image", &selectors.image, false)?,
            rejected_image_markers: selectors
                .rejected_image_markers
                .iter()
                .map(|marker| marker.to_lowercase())
                .collect(),
        })
    }

    pub fn extract_str(&self, html: &str) -> Vec<RawCandidate> {
        self.extract(&Html::parse_document(html))
    }

    /// Raw candidates in document order. An empty result means the page has
    /// no products (or the markup changed beyond every fallback).
    pub fn extract(&self, document: &Html) -> Vec<RawCandidate> {
        let Some((strategy, nodes)) = self
            .candidates
            .iter()
            .enumerate()
            .map(|(i, selector)| (i, document.select(selector).collect::<Vec<_>>()))
            .find(|(_, nodes)| !nodes.is_empty())
        else {
            debug!("No candidate nodes matched any strategy");
            return Vec::new();
        };

        debug!(strategy, nodes = nodes.len(), "Candidate strategy matched");
        let total = nodes.len();
        let extracted: Vec<RawCandidate> = nodes
            .into_iter()
            .filter_map(|node| self.candidate_from(node))
            .collect();
        if extracted.len() < total {
            debug!(
                dropped = total - extracted.len(),
                "Dropped candidates without name or link"
            );
        }
        extracted
    }

    fn candidate_from(&self, node: ElementRef<'_>) -> Option<RawCandidate> {
        let name = self.name.first(node)?;
        let link = self
            .link
            .all(node)
            .iter()
            .find_map(|href| resolve_url(&self.origin, href));
        let Some(link) = link else {
            trace!(%name, "Candidate has no usable link");
            return None;
        };

        let price_text = self.price.first(node).map(|whole| {
            match self.price_cents.first(node) {
                Some(cents) => format!("{whole},{cents}"),
                None => whole,
            }
        });

        let mut image_candidates: Vec<String> = Vec::new();
        for raw in self.image.all(node) {
            let Some(token) = raw.split_whitespace().next() else {
                continue;
            };
            let Some(url) = resolve_url(&self.origin, token.trim_end_matches(',')) else {
                continue;
            };
            if self.is_rejected_image(&url) {
                trace!(%url, "Skipping placeholder card image");
                continue;
            }
            if !image_candidates.contains(&url) {
                image_candidates.push(url);
            }
        }

        Some(RawCandidate {
            name,
            price_text,
            link,
            image_candidates,
        })
    }

    fn is_rejected_image(&self, url: &str) -> bool {
        let lowered = url.to_lowercase();
        self.rejected_image_markers
            .iter()
            .any(|marker| lowered.contains(marker.as_str()))
    }
}

/// Total item count advertised by a listing page (`"1.234 produtos"` -> 1234)
pub fn listing_total(document: &Html, css: &str) -> ParsingResult<Option<u32>> {
    let selector = compile_selector("listing_total", css)?;
    let number = Regex::new(r"\d[\d.]*").map_err(|e| ParsingError::InvalidPattern {
        pattern: r"\d[\d.]*".to_string(),
        reason: e.to_string(),
    })?;

    Ok(document.select(&selector).next().and_then(|element| {
        let text = element.text().collect::<String>();
        number
            .find(&text)
            .and_then(|m| m.as_str().replace('.', "").parse::<u32>().ok())
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::normalizer::normalize_candidate;
    use crate::domain::product::Source;
    use crate::infrastructure::config::{kabum, mercadolivre};

    const KABUM_PAGE: &str = r#"
        <html><body>
        <div id="listingCount"><b>1.234</b> produtos</div>
        <main>
          <article class="sc-1 productCard">
            <a href="/produto/101/monitor-lg"><img data-src="https://images.kabum.com.br/101.jpg" src="/placeholder.gif"></a>
            <span class="sc-2 nameCard">Monitor Gamer LG UltraGear</span>
            <span class="sc-3 priceCard">R$ 1.299,90</span>
          </article>
          <article class="productCard">
            <a href="https://www.kabum.com.br/produto/102/monitor-aoc"><img src="//images.kabum.com.br/102.jpg"></a>
            <span class="nameCard">Monitor AOC Hero</span>
            <span class="priceCard">R$ 899,00</span>
          </article>
          <article class="productCard">
            <span class="nameCard">Sem link</span>
            <span class="priceCard">R$ 10,00</span>
          </article>
        </main>
        </body></html>"#;

    #[test]
    fn extracts_rendered_cards() {
        let extractor = ListingExtractor::new(&ListingSelectors::kabum(), kabum::ORIGIN).unwrap();
        let candidates = extractor.extract_str(KABUM_PAGE);

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].name, "Monitor Gamer LG UltraGear");
        assert_eq!(candidates[0].link, "https://www.kabum.com.br/produto/101/monitor-lg");
        assert_eq!(candidates[0].price_text.as_deref(), Some("R$ 1.299,90"));
        assert_eq!(candidates[0].image_candidates, vec!["https://images.kabum.com.br/101.jpg"]);
        assert_eq!(candidates[1].image_candidates, vec!["https://images.kabum.com.br/102.jpg"]);
    }

    #[test]
    fn placeholder_card_image_never_reaches_gallery() {
        let page = r#"<html><body>
            <article class="productCard">
              <a href="/produto/201/monitor-philips"><img src="/static/placeholder-loading.gif"></a>
              <span class="nameCard">Monitor Philips 24</span>
              <span class="priceCard">R$ 749,00</span>
            </article></body></html>"#;
        let extractor = ListingExtractor::new(&ListingSelectors::kabum(), kabum::ORIGIN).unwrap();
        let candidates = extractor.extract_str(page);
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].image_candidates.is_empty());

        let mut item = normalize_candidate(candidates[0].clone(), Source::Kabum, Some("monitor")).unwrap();
        item.attach_gallery(Vec::new());
        assert_eq!(item.primary_image, None);
        assert!(item.gallery_images.is_empty());
    }

    #[test]
    fn placeholder_card_image_falls_back_to_structured_data() {
        let page = r#"<html><body>
            <article class="productCard">
              <a href="/produto/202/monitor-asus"><img src="https://images.kabum.com.br/LOADING.svg"></a>
              <span class="nameCard">Monitor ASUS TUF</span>
              <span class="priceCard">R$ 1.099,00</span>
              <script type="application/ld+json">{"@type":"Product","image":"https://images.kabum.com.br/202.jpg"}</script>
            </article></body></html>"#;
        let extractor = ListingExtractor::new(&ListingSelectors::kabum(), kabum::ORIGIN).unwrap();
        let candidates = extractor.extract_str(page);
        assert_eq!(candidates[0].image_candidates, vec!["https://images.kabum.com.br/202.jpg"]);
    }

    #[test]
    fn rendered_fields_use_secondary_rules_when_card_markup_drifts() {
        let page = r#"<html><body>
            <article class="productCard">
              <a class="tracking" href="/carrinho"></a>
              <a class="productLink" href="/produto/301/monitor-benq"><img alt="Monitor BenQ Zowie" src="https://images.kabum.com.br/301.jpg"></a>
              <span class="finalPrice">R$ 2.199,00</span>
            </article></body></html>"#;
        let extractor = ListingExtractor::new(&ListingSelectors::kabum(), kabum::ORIGIN).unwrap();
        let candidates = extractor.extract_str(page);

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].name, "Monitor BenQ Zowie");
        assert_eq!(candidates[0].link, "https://www.kabum.com.br/produto/301/monitor-benq");
        assert_eq!(candidates[0].price_text.as_deref(), Some("R$ 2.199,00"));
    }

    #[test]
    fn reads_listing_total() {
        let document = Html::parse_document(KABUM_PAGE);
        assert_eq!(listing_total(&document, kabum::LISTING_COUNT_SELECTOR).unwrap(), Some(1234));
        let empty = Html::parse_document("<html><body></body></html>");
        assert_eq!(listing_total(&empty, kabum::LISTING_COUNT_SELECTOR).unwrap(), None);
    }

    #[test]
    fn static_listing_uses_second_strategy_and_fallback_price() {
        let page = r#"
            <html><body><ol class="ui-search-layout">
              <li class="ui-search-result__wrapper">
                <a class="ui-search-result__content" href="https://produto.mercadolivre.com.br/MLB-1">Teclado Mecânico Redragon</a>
                <img class="ui-search-result__image" data-srcset="https://http2.mlstatic.com/a.webp 1x, https://http2.mlstatic.com/a2.webp 2x">
                <span class="andes-money-amount__fraction">1.234</span>
                <span class="andes-money-amount__cents">50</span>
              </li>
              <li class="ui-search-result__wrapper">
                <a href="/MLB-2">Teclado Sem Preço</a>
              </li>
            </ol></body></html>"#;
        let extractor =
            ListingExtractor::new(&ListingSelectors::mercadolivre(), mercadolivre::ORIGIN).unwrap();
        let candidates = extractor.extract_str(page);

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].name, "Teclado Mecânico Redragon");
        assert_eq!(candidates[0].price_text.as_deref(), Some("1.234,50"));
        assert_eq!(candidates[0].image_candidates, vec!["https://http2.mlstatic.com/a.webp"]);
        assert_eq!(candidates[1].link, "https://lista.mercadolivre.com.br/MLB-2");
        assert_eq!(candidates[1].price_text, None);
    }

    #[test]
    fn no_matching_strategy_yields_nothing() {
        let extractor =
            ListingExtractor::new(&ListingSelectors::mercadolivre(), mercadolivre::ORIGIN).unwrap();
        assert!(extractor.extract_str("<html><body><p>Nenhum resultado</p></body></html>").is_empty());
    }

    #[test]
    fn rejects_bad_origin() {
        let err = ListingExtractor::new(&ListingSelectors::kabum(), "not a url").unwrap_err();
        assert!(matches!(err, ParsingError::InvalidOrigin { .. }));
    }
}
