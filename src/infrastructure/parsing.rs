//! HTML parsing infrastructure for listing and detail pages
//!
//! Every field is resolved through an ordered [`FieldChain`] of queries and
//! the first non-empty match wins. A selector that stops matching after a
//! markup change only costs the affected field, never the whole page.

pub mod config;
pub mod error;
pub mod product_detail_parser;
pub mod product_list_parser;
pub mod query;

// Re-export public types
pub use config::{FieldRule, GallerySelectors, ListingSelectors};
pub use error::{ParsingError, ParsingResult};
pub use product_detail_parser::GalleryCollector;
pub use product_list_parser::{ListingExtractor, listing_total};
pub use query::{FieldChain, FieldQuery, resolve_url};
