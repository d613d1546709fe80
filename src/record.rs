// 💰 Pricing Model - the normalized output record
// Every source converges on PricedRecord; selling price is always derived,
// never stored independently of purchase price and selling factor.

use serde::Serialize;

use crate::error::RecordError;

// ============================================================================
// PRICING ARITHMETIC
// ============================================================================

/// Selling price for a purchase price and a multiplicative selling factor
pub fn selling_price(purchase_price: f64, selling_factor: f64) -> f64 {
    purchase_price * selling_factor
}

/// Convert a margin percentage into a multiplicative selling factor
///
/// `factor = 100 / (100 - margin)`. A margin of 100% or more has no finite,
/// positive factor and is rejected.
pub fn factor_from_margin(margin_percent: f64) -> Result<f64, RecordError> {
    if !margin_percent.is_finite() || margin_percent >= 100.0 {
        return Err(RecordError::InvalidMargin(margin_percent));
    }
    Ok(100.0 / (100.0 - margin_percent))
}

/// Back out the purchase price when a source only ships selling price + factor
pub fn purchase_from_selling(selling_price: f64, selling_factor: f64) -> f64 {
    selling_price / selling_factor
}

/// Recover the selling factor from both prices
pub fn recompute_factor(selling_price: f64, purchase_price: f64) -> Result<f64, RecordError> {
    if purchase_price == 0.0 {
        return Err(RecordError::ZeroPurchasePrice);
    }
    Ok(selling_price / purchase_price)
}

/// Make free text safe for the quoted, comma separated output line
///
/// Commas become spaces, quotes are doubled.
pub fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            ',' => out.push(' '),
            '"' => out.push_str("\"\""),
            _ => out.push(c),
        }
    }
    out
}

// ============================================================================
// PRICED RECORD
// ============================================================================

/// Column titles of the output file, in line order
pub const HEADER_COLUMNS: [&str; 8] = [
    "Id",
    "Beschreibung",
    "Kategorie",
    "Einkaufspreis",
    "Einkaufsfaktor",
    "Verkaufspreis",
    "Verkaufsfaktor",
    "Kategorie-Nummer",
];

/// Header line written once before the first record
pub fn format_header() -> String {
    let quoted: Vec<String> = HEADER_COLUMNS.iter().map(|c| format!("\"{}\"", c)).collect();
    format!("{}\n", quoted.join(","))
}

/// PricedRecord - one line of the output catalog
///
/// Immutable once built. The description is normalized on construction so
/// every record that reaches a sink is already safe to quote.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricedRecord {
    id: String,
    id_prefix: String,
    description: String,
    purchase_price: f64,
    purchase_factor: f64,
    selling_factor: f64,
    selling_price: f64,
    category: String,
    category_number: String,
}

impl PricedRecord {
    /// Create a record from the resolved price side; selling price is derived
    pub fn new(id: &str, description: &str, purchase_price: f64, selling_factor: f64) -> Self {
        PricedRecord {
            id: id.to_string(),
            id_prefix: String::new(),
            description: normalize_text(description),
            purchase_price,
            purchase_factor: 1.0,
            selling_factor,
            selling_price: selling_price(purchase_price, selling_factor),
            category: String::new(),
            category_number: String::new(),
        }
    }

    /// Builder pattern: prefix prepended to the id in the output
    pub fn with_id_prefix(mut self, prefix: &str) -> Self {
        self.id_prefix = prefix.to_string();
        self
    }

    /// Builder pattern: purchase factor (informational, not used in arithmetic)
    pub fn with_purchase_factor(mut self, factor: f64) -> Self {
        self.purchase_factor = factor;
        self
    }

    /// Builder pattern: category label and number
    pub fn with_category(mut self, label: &str, number: &str) -> Self {
        self.category = normalize_text(label);
        self.category_number = normalize_text(number);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Id as written to the output (prefix included)
    pub fn full_id(&self) -> String {
        format!("{}{}", self.id_prefix, self.id)
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn purchase_price(&self) -> f64 {
        self.purchase_price
    }

    pub fn purchase_factor(&self) -> f64 {
        self.purchase_factor
    }

    pub fn selling_factor(&self) -> f64 {
        self.selling_factor
    }

    pub fn selling_price(&self) -> f64 {
        self.selling_price
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn category_number(&self) -> &str {
        &self.category_number
    }

    /// Render the record as one output line (newline terminated)
    pub fn format_line(&self) -> String {
        format!(
            "\"{}\",\"{}\",\"{}\",\"{:.2}\",\"{:.6}\",\"{:.2}\",\"{:.6}\",\"{}\"\n",
            normalize_text(&self.full_id()),
            self.description,
            self.category,
            self.purchase_price,
            self.purchase_factor,
            self.selling_price,
            self.selling_factor,
            self.category_number
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================
