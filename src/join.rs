// 🔗 Stream Join Engine - pair articles with prices from two unordered streams
//
// The price stream only ever moves forward. Prices read while looking for one
// article that belong to another land in the spill buffer and are handed out
// from there later, so every price element is decoded exactly once per run.

use std::collections::HashMap;
use tracing::debug;

use crate::error::{ImportError, Result};

// ============================================================================
// ENTRIES
// ============================================================================

/// ArticleEntry - one decoded element of the article stream
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArticleEntry {
    pub id: String,
    pub description: String,
    /// Manufacturer code (`MAFT`)
    pub manufacturer: String,
    /// Catalog category code (`CAT1`)
    pub category: String,
}

impl ArticleEntry {
    pub const MANUFACTURER: &'static str = "MAFT";
    pub const CATEGORY: &'static str = "CAT1";

    /// Classification code by field name, used by exclusion lists
    pub fn classification(&self, field: &str) -> Option<&str> {
        match field {
            Self::MANUFACTURER => Some(&self.manufacturer),
            Self::CATEGORY => Some(&self.category),
            _ => None,
        }
    }
}

/// PriceEntry - one decoded element of the price stream
#[derive(Debug, Clone, PartialEq)]
pub struct PriceEntry {
    pub id: String,
    pub purchase_price: f64,
}

// ============================================================================
// SPILL BUFFER
// ============================================================================

/// Prices seen but not yet claimed by an article, keyed by id
///
/// A second price with the same id replaces the first (last seen wins).
#[derive(Debug, Default)]
pub struct SpillBuffer {
    entries: HashMap<String, PriceEntry>,
    peak: usize,
    overwritten: usize,
}

impl SpillBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, price: PriceEntry) {
        if self.entries.insert(price.id.clone(), price).is_some() {
            self.overwritten += 1;
        }
        self.peak = self.peak.max(self.entries.len());
    }

    pub fn take(&mut self, id: &str) -> Option<PriceEntry> {
        self.entries.remove(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Largest number of prices held at any one time
    pub fn peak(&self) -> usize {
        self.peak
    }

    /// How many buffered prices were replaced by a later duplicate
    pub fn overwritten(&self) -> usize {
        self.overwritten
    }
}

// ============================================================================
// PRICE JOIN
// ============================================================================

/// PriceJoin - resolves article ids against a forward-only price stream
///
/// Each call to [`PriceJoin::resolve`] first checks the spill buffer, then
/// pulls from the stream until the id shows up or the stream runs dry.
pub struct PriceJoin<P> {
    prices: P,
    spill: SpillBuffer,
    decoded: usize,
    exhausted: bool,
}

impl<P> PriceJoin<P>
where
    P: Iterator<Item = Result<PriceEntry>>,
{
    pub fn new(prices: P) -> Self {
        PriceJoin {
            prices,
            spill: SpillBuffer::new(),
            decoded: 0,
            exhausted: false,
        }
    }

    /// Find the price for `id`
    ///
    /// Returns `ImportError::PriceNotFound` when neither the buffer nor the
    /// rest of the stream has it; the join stays usable for later ids.
    /// Decode errors from the stream are passed through unchanged.
    pub fn resolve(&mut self, id: &str) -> Result<PriceEntry> {
        if let Some(price) = self.spill.take(id) {
            return Ok(price);
        }

        while !self.exhausted {
            match self.prices.next() {
                None => self.exhausted = true,
                Some(price) => {
                    let price = price?;
                    self.decoded += 1;
                    if price.id == id {
                        return Ok(price);
                    }
                    self.spill.insert(price);
                }
            }
        }

        Err(ImportError::PriceNotFound(id.to_string()))
    }

    /// Number of price elements pulled from the stream so far
    pub fn decoded(&self) -> usize {
        self.decoded
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn spill(&self) -> &SpillBuffer {
        &self.spill
    }

    /// Log what is left over once the article side is done
    pub fn finish(self) -> SpillBuffer {
        debug!(
            decoded = self.decoded,
            unmatched = self.spill.len(),
            peak_buffered = self.spill.peak(),
            overwritten = self.spill.overwritten(),
            "price join finished"
        );
        self.spill
    }
}

// ============================================================================
// TESTS
// ============================================================================
