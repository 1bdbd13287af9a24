//! Listing extraction and normalization throughput
//!
//! Measures the per-page CPU cost of turning fetched markup into
//! normalized items for both sources.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use hunter_crawler_lib::domain::normalizer::normalize_candidate;
use hunter_crawler_lib::domain::product::Source;
use hunter_crawler_lib::infrastructure::config::{kabum, mercadolivre};
use hunter_crawler_lib::infrastructure::parsing::{GallerySelectors, GalleryCollector, ListingExtractor, ListingSelectors};

fn kabum_page(cards: usize) -> String {
    let body: String = (0..cards)
        .map(|i| {
            format!(
                r#"<article class="productCard">
                     <a href="/produto/{i}/monitor"><img data-src="https://images.kabum.com.br/{i}.jpg"></a>
                     <span class="nameCard">Monitor Gamer Série {i} 27"</span>
                     <span class="priceCard">R$ 1.{:03},90</span>
                   </article>"#,
                i % 1000
            )
        })
        .collect();
    format!(r#"<html><body><div id="listingCount">{cards} produtos</div>{body}</body></html>"#)
}

fn mercadolivre_page(items: usize) -> String {
    let body: String = (0..items)
        .map(|i| {
            format!(
                r#"<li class="ui-search-result__wrapper">
                     <a class="ui-search-result__content" href="https://produto.mercadolivre.com.br/MLB-{i}">Teclado Mecânico {i}</a>
                     <img class="ui-search-result__image" data-srcset="https://http2.mlstatic.com/{i}.webp 1x">
                     <span class="andes-money-amount__fraction">{}</span>
                     <span class="andes-money-amount__cents">90</span>
                   </li>"#,
                100 + i
            )
        })
        .collect();
    format!(r#"<html><body><ol class="ui-search-layout">{body}</ol></body></html>"#)
}

fn detail_page(images: usize) -> String {
    let thumbs: String = (0..images)
        .map(|i| format!(r#"<div class="thumbnail"><img src="https://images.kabum.com.br/g/{i}.jpg"></div>"#))
        .collect();
    format!(r#"<html><body><div class="product-gallery">{thumbs}</div></body></html>"#)
}

fn bench_listing_extraction(c: &mut Criterion) {
    let mut group = c.benchmark_group("listing_extraction");

    let rendered = ListingExtractor::new(&ListingSelectors::kabum(), kabum::ORIGIN).unwrap();
    let static_listing = ListingExtractor::new(&ListingSelectors::mercadolivre(), mercadolivre::ORIGIN).unwrap();

    for size in [20, 100] {
        let page = kabum_page(size);
        group.bench_with_input(BenchmarkId::new("kabum", size), &page, |b, page| {
            b.iter(|| {
                rendered
                    .extract_str(black_box(page))
                    .into_iter()
                    .filter_map(|c| normalize_candidate(c, Source::Kabum, Some("monitor")))
                    .count()
            });
        });

        let page = mercadolivre_page(size);
        group.bench_with_input(BenchmarkId::new("mercadolivre", size), &page, |b, page| {
            b.iter(|| {
                static_listing
                    .extract_str(black_box(page))
                    .into_iter()
                    .filter_map(|c| normalize_candidate(c, Source::MercadoLivre, Some("teclado")))
                    .count()
            });
        });
    }

    group.finish();
}

fn bench_gallery_collection(c: &mut Criterion) {
    let collector = GalleryCollector::new(&GallerySelectors::default(), kabum::ORIGIN).unwrap();
    let page = detail_page(30);

    c.bench_function("gallery_collection_30_thumbs", |b| {
        b.iter(|| collector.collect_str(black_box(&page)));
    });
}

criterion_group!(benches, bench_listing_extraction, bench_gallery_collection);
criterion_main!(benches);
