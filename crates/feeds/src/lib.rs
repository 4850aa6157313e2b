//! Listing page retrieval and price extraction.
//!
//! ## Architecture
//!
//! - `proxy` - The rendering proxy seam (`RenderProxy`) and its ScrapingBee client
//! - `fetcher` - `SourceFetcher`, bounded retry on proxy server errors
//! - `extractor` - `PriceExtractor`, selector-driven price parsing from rendered HTML

pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod proxy;

pub use error::*;
pub use extractor::{parse_price, PriceExtractor};
pub use fetcher::{RetryPolicy, SourceFetcher};
pub use proxy::{ProxyResponse, RenderProxy, ScrapingBeeProxy};
