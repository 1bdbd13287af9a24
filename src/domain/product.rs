//! Product entities flowing through the ingestion pipeline
//!
//! `RawCandidate` -> `NormalizedItem` -> `CatalogRecord`. The first two are
//! ephemeral per extraction pass; the last one is owned by the catalog store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::upsert::UpsertPolicy;

/// Maximum number of gallery images kept per product
pub const MAX_GALLERY_IMAGES: usize = 10;

/// The origin sites the pipeline knows how to crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Kabum: JavaScript-rendered listing, requires a browser session
    Kabum,
    /// Mercado Livre: plain HTTP listing with frequently-changing markup
    MercadoLivre,
}

impl Source {
    pub const ALL: [Self; 2] = [Self::Kabum, Self::MercadoLivre];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Kabum => "kabum",
            Self::MercadoLivre => "mercadolivre",
        }
    }

    /// Table backing this source's catalog collection
    pub const fn table(self) -> &'static str {
        match self {
            Self::Kabum => "kabum_products",
            Self::MercadoLivre => "mercadolivre_products",
        }
    }

    pub const fn upsert_policy(self) -> UpsertPolicy {
        match self {
            Self::Kabum => UpsertPolicy::Overwrite,
            Self::MercadoLivre => UpsertPolicy::HistoryAppend,
        }
    }

    /// Whether display names are folded to plain ASCII before storage
    pub const fn folds_names(self) -> bool {
        matches!(self, Self::Kabum)
    }

    /// Whether detail pages are visited to collect an image gallery
    pub const fn has_gallery(self) -> bool {
        matches!(self, Self::Kabum)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kabum" => Ok(Self::Kabum),
            "mercadolivre" | "mercado-livre" | "ml" => Ok(Self::MercadoLivre),
            other => Err(format!("unknown source '{other}'")),
        }
    }
}

/// A strictly positive, finite price in BRL
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(f64);

impl Price {
    /// Returns `None` for zero, negative, NaN or infinite amounts
    pub fn new(amount: f64) -> Option<Self> {
        (amount.is_finite() && amount > 0.0).then_some(Self(amount))
    }

    pub const fn value(self) -> f64 {
        self.0
    }

    /// Compare at cent precision; stored REAL values do not round-trip exactly
    pub fn same_amount(self, other: Self) -> bool {
        (self.0 * 100.0).round() == (other.0 * 100.0).round()
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R$ {:.2}", self.0)
    }
}

/// One suspected product node, fields as found in the markup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawCandidate {
    pub name: String,
    pub price_text: Option<String>,
    /// Absolute URL, already resolved against the source origin
    pub link: String,
    pub image_candidates: Vec<String>,
}

/// A validated item ready for the upsert engine
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedItem {
    pub name: String,
    pub price: Price,
    pub link: String,
    pub primary_image: Option<String>,
    pub gallery_images: Vec<String>,
    pub category: Option<String>,
}

impl NormalizedItem {
    /// Merge a detail-page gallery into the item.
    ///
    /// Keeps discovery order, drops duplicates and caps at
    /// [`MAX_GALLERY_IMAGES`]. An empty gallery falls back to the card image,
    /// and a missing card image is taken from the gallery.
    pub fn attach_gallery(&mut self, images: Vec<String>) {
        let mut gallery: Vec<String> = Vec::with_capacity(images.len().min(MAX_GALLERY_IMAGES));
        for image in images {
            if gallery.len() == MAX_GALLERY_IMAGES {
                break;
            }
            if !image.is_empty() && !gallery.contains(&image) {
                gallery.push(image);
            }
        }

        if gallery.is_empty() {
            if let Some(primary) = &self.primary_image {
                gallery.push(primary.clone());
            }
        }
        if self.primary_image.is_none() {
            self.primary_image = gallery.first().cloned();
        }
        self.gallery_images = gallery;
    }
}

/// A persisted catalog row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogRecord {
    pub id: i64,
    pub name: String,
    pub price: Price,
    pub link: String,
    pub primary_image: Option<String>,
    pub gallery_images: Option<Vec<String>>,
    pub updated_at: DateTime<Utc>,
}

/// Row to insert; the id is assigned by the store
#[derive(Debug, Clone, PartialEq)]
pub struct NewCatalogRecord {
    pub name: String,
    pub price: Price,
    pub link: String,
    pub primary_image: Option<String>,
    pub gallery_images: Option<Vec<String>>,
}

impl NewCatalogRecord {
    pub fn from_item(item: &NormalizedItem, keep_gallery: bool) -> Self {
        Self {
            name: item.name.clone(),
            price: item.price,
            link: item.link.clone(),
            primary_image: item.primary_image.clone(),
            gallery_images: (keep_gallery && !item.gallery_images.is_empty())
                .then(|| item.gallery_images.clone()),
        }
    }
}

/// Partial update of an existing row; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordChanges {
    pub price: Option<Price>,
    pub primary_image: Option<String>,
    pub gallery_images: Option<Vec<String>>,
}

impl RecordChanges {
    pub const fn is_empty(&self) -> bool {
        self.price.is_none() && self.primary_image.is_none() && self.gallery_images.is_none()
    }
}

/// Read-side view used by downstream consumers (search API)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogListing {
    pub source: Source,
    #[serde(flatten)]
    pub record: CatalogRecord,
}
