// 🧾 Suprag - fixed-layout price list (XLSX or CSV), usually downloaded
//
// Every row carries both purchase and selling price; the selling factor is
// recovered from the two. Rows from ignored manufacturers are dropped.

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::config::{delimiter_byte, SupragConfig};
use crate::error::{ImportError, RecordError};
use crate::export::RecordSink;
use crate::filter::ExclusionFilter;
use crate::record::{recompute_factor, PricedRecord};
use crate::sheet::Sheet;
use crate::sources::{finish_run, stamp, SourceAdapter};
use crate::summary::RunSummary;
use crate::tabular::{Column, ColumnMap, SheetRow, TableRows};
use crate::transport::{Fetcher, Location};

/// Classification field the manufacturer list is checked against
const MANUFACTURER: &str = "manufacturer";

pub struct SupragSource {
    config: SupragConfig,
    columns: ColumnMap,
    filter: ExclusionFilter,
    fetcher: Fetcher,
    input: Option<(Location, u8)>,
    summary: RunSummary,
}

impl SupragSource {
    pub const NAME: &'static str = "Suprag";

    pub fn new(config: SupragConfig) -> Self {
        let layout = &config.columns;
        let columns = ColumnMap::fixed([
            (Column::Id, layout.id),
            (Column::Manufacturer, layout.manufacturer),
            (Column::SellingPrice, layout.selling_price),
            (Column::PurchasePrice, layout.purchase_price),
            (Column::Description, layout.description),
        ]);
        let filter = ExclusionFilter::new()
            .with_list(MANUFACTURER, config.ignored_manufacturers.iter().cloned());
        let fetcher = Fetcher::new()
            .with_max_size(config.fetch.max_download_file_size)
            .with_save_dir(config.fetch.save_dir.clone())
            .with_progress(config.fetch.show_progress);
        SupragSource {
            config,
            columns,
            filter,
            fetcher,
            input: None,
            summary: RunSummary::new(),
        }
    }

    fn validate(&self) -> Result<(Location, u8), ImportError> {
        if self.config.start_line == 0 {
            return Err(ImportError::InvalidConfig(
                "start_line is 1-based, got 0".to_string(),
            ));
        }
        let delimiter = delimiter_byte(self.config.csv_delimiter)?;
        Ok((Location::parse(&self.config.file)?, delimiter))
    }

    fn record(&self, row: &SheetRow) -> Result<PricedRecord, RecordError> {
        let purchase = row.number(Column::PurchasePrice)?;
        let selling = row.number(Column::SellingPrice)?;
        let factor = recompute_factor(selling, purchase)?;
        let record = PricedRecord::new(
            row.text(Column::Id),
            row.text(Column::Description),
            purchase,
            factor,
        );
        Ok(stamp(record, &self.config.labels, Self::NAME))
    }

    /// Map every data row of `sheet` into `sink`
    pub fn process_sheet(&mut self, sheet: &Sheet, sink: &mut dyn RecordSink) -> Result<()> {
        let start = self.config.start_line.saturating_sub(1);
        let mut rows = TableRows::new(sheet, &self.columns, start);

        for row in rows.by_ref() {
            self.summary.count_article();

            let manufacturer = row.text(Column::Manufacturer);
            if let Some(hit) = self.filter.check(|field| (field == MANUFACTURER).then_some(manufacturer)) {
                debug!(line = row.line, code = %hit.code, "manufacturer ignored");
                self.summary.count_ignored();
                continue;
            }

            match self.record(&row) {
                Ok(record) => {
                    sink.write_record(&record)?;
                    self.summary.count_record();
                }
                Err(err) => {
                    warn!(line = row.line, "failed to read line: {}", err);
                    self.summary.count_failed();
                }
            }
        }

        debug!(skipped = rows.skipped(), "short lines skipped");
        sink.flush()
    }

    fn process_location(&mut self, sink: &mut dyn RecordSink) -> Result<()> {
        let (location, delimiter) = match &self.input {
            Some(input) => input.clone(),
            None => anyhow::bail!("{} importer used before init", Self::NAME),
        };
        let bytes = self
            .fetcher
            .read_all(&location)
            .with_context(|| format!("Failed to load {}", location))?;
        let sheet = Sheet::from_bytes(bytes, delimiter)?;
        info!(rows = sheet.len(), "loaded price list");
        self.process_sheet(&sheet, sink)
    }
}

impl SourceAdapter for SupragSource {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn init(&mut self) -> Result<()> {
        let input = self
            .validate()
            .with_context(|| format!("Failed to initialize {}", Self::NAME))?;
        self.input = Some(input);
        Ok(())
    }

    fn run(&mut self, sink: &mut dyn RecordSink) -> Result<RunSummary> {
        if self.input.is_none() {
            self.init()?;
        }
        self.summary = RunSummary::started();
        info!(source = Self::NAME, "start processing");
        let result = self.process_location(sink);
        finish_run(Self::NAME, &mut self.summary, result)
    }

    fn summary(&self) -> &RunSummary {
        &self.summary
    }
}

// ============================================================================
// TESTS
// ============================================================================
