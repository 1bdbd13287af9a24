//! Hunter crawler: product discovery and ingestion
//!
//! Crawls the Kabum monitor catalog (browser-rendered) and Mercado Livre
//! search results (plain HTTP), normalizes names and prices, and upserts
//! the listings into one SQLite table per source.

pub mod application;
pub mod crawling;
pub mod domain;
pub mod infrastructure;
