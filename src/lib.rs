// Price Catalog Importer - Core Library
// Vendor price lists in, one normalized priced catalog out

pub mod config;
pub mod error;
pub mod export;
pub mod filter;
pub mod join;       // Stream Join Engine - article/price correlation
pub mod logging;
pub mod pipeline;
pub mod record;     // Pricing Model - PricedRecord + factor arithmetic
pub mod sheet;
pub mod sources;    // Source Adapters - Alltron, Mitel, Suprag
pub mod summary;
pub mod tabular;    // Tabular Adapter - fixed and discovered columns
pub mod transport;
pub mod xml;

// Re-export commonly used types
pub use config::{AlltronConfig, Config, MitelConfig, SupragConfig};
pub use error::{ImportError, RecordError};
pub use export::{Export, MemorySink, RecordSink, ENCODINGS};
pub use filter::ExclusionFilter;
pub use join::{ArticleEntry, PriceEntry, PriceJoin, SpillBuffer};
pub use pipeline::{Pipeline, PipelineReport, SourceOutcome};
pub use record::{
    factor_from_margin, normalize_text, purchase_from_selling, recompute_factor, selling_price,
    PricedRecord,
};
pub use sheet::Sheet;
pub use sources::{AlltronSource, MitelSource, SourceAdapter, SupragSource};
pub use summary::RunSummary;
pub use tabular::{Column, ColumnMap, ColumnPatterns, Header, TableRows};
pub use transport::{Fetcher, Location};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
