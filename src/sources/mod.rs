// 🏭 Source Adapters - one importer per vendor behind a common trait
//
// The driver only sees `SourceAdapter`; which join or sheet strategy sits
// behind it is the adapter's business.
//
// - alltron: two XML streams joined by id (PriceJoin)
// - mitel:   workbook with a header row found by column patterns
// - suprag:  workbook/CSV with fixed column positions

pub mod alltron;
pub mod mitel;
pub mod suprag;

use anyhow::Result;
use tracing::{error, info};

use crate::config::{Config, RecordLabels};
use crate::export::RecordSink;
use crate::record::PricedRecord;
use crate::summary::RunSummary;

pub use alltron::AlltronSource;
pub use mitel::MitelSource;
pub use suprag::SupragSource;

/// SourceAdapter - the contract every vendor importer fulfils
pub trait SourceAdapter {
    /// Display name, also the default category label
    fn name(&self) -> &str;

    /// Validate configuration and prepare inputs
    ///
    /// Configuration errors (bad pattern, missing header, bad location)
    /// surface here, before any record is written.
    fn init(&mut self) -> Result<()>;

    /// Process the whole source into `sink`
    ///
    /// Re-running processes the full source again. On error the partial
    /// counters stay available through [`SourceAdapter::summary`].
    fn run(&mut self, sink: &mut dyn RecordSink) -> Result<RunSummary>;

    /// Counters of the current or last run
    fn summary(&self) -> &RunSummary;
}

/// Build the adapters for every section present in the config
///
/// Order is fixed: alltron, mitel, suprag.
pub fn from_config(config: &Config) -> Vec<Box<dyn SourceAdapter>> {
    let mut sources: Vec<Box<dyn SourceAdapter>> = Vec::new();
    if let Some(alltron) = &config.alltron {
        sources.push(Box::new(AlltronSource::new(alltron.clone())));
    }
    if let Some(mitel) = &config.mitel {
        sources.push(Box::new(MitelSource::new(mitel.clone())));
    }
    if let Some(suprag) = &config.suprag {
        sources.push(Box::new(SupragSource::new(suprag.clone())));
    }
    sources
}

/// Apply the per-source labels and factors to a freshly priced record
pub(crate) fn stamp(record: PricedRecord, labels: &RecordLabels, name: &str) -> PricedRecord {
    record
        .with_id_prefix(&labels.id_prefix)
        .with_purchase_factor(labels.purchase_factor)
        .with_category(labels.category_or(name), &labels.category_number)
}

/// Close a run: stop the summary, log it, hand back a copy
pub(crate) fn finish_run(name: &str, summary: &mut RunSummary, result: Result<()>) -> Result<RunSummary> {
    summary.stop();
    match result {
        Ok(()) => {
            info!(source = name, "{}", summary);
            Ok(summary.clone())
        }
        Err(err) => {
            error!(source = name, error = %format!("{:#}", err), "run aborted after {}", summary);
            Err(err)
        }
    }
}
