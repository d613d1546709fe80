// 📞 Mitel - price list workbook with a header row somewhere near the top
//
// The sheet ships selling prices plus a margin name per row. The header row
// is found by column patterns; every data row below it yields one record and,
// when a repair price is filled in, a second repair record.

use anyhow::{Context, Result};
use std::collections::HashMap;
use tracing::{info, warn};

use crate::config::{delimiter_byte, MitelConfig};
use crate::error::RecordError;
use crate::export::RecordSink;
use crate::record::{factor_from_margin, purchase_from_selling, PricedRecord};
use crate::sheet::Sheet;
use crate::sources::{finish_run, stamp, SourceAdapter};
use crate::summary::RunSummary;
use crate::tabular::{Column, ColumnPatterns, Header, SheetRow, TableRows};
use crate::transport::{Fetcher, Location};

pub struct MitelSource {
    config: MitelConfig,
    /// Margin name (lowercase) -> margin percent
    margins: HashMap<String, f64>,
    fetcher: Fetcher,
    loaded: Option<(Sheet, Header)>,
    summary: RunSummary,
}

impl MitelSource {
    pub const NAME: &'static str = "Mitel";

    pub fn new(config: MitelConfig) -> Self {
        let margins = config
            .selling_factors
            .iter()
            .map(|(name, percent)| (name.trim().to_lowercase(), *percent))
            .collect();
        let fetcher = Fetcher::new()
            .with_max_size(config.fetch.max_download_file_size)
            .with_save_dir(config.fetch.save_dir.clone())
            .with_progress(config.fetch.show_progress);
        MitelSource {
            config,
            margins,
            fetcher,
            loaded: None,
            summary: RunSummary::new(),
        }
    }

    fn patterns(&self) -> Result<ColumnPatterns> {
        let pattern = &self.config.column_pattern;
        let patterns = ColumnPatterns::compile([
            (Column::Id, pattern.id.as_str()),
            (Column::SellingFactorName, pattern.selling_factor_name.as_str()),
            (Column::SellingPrice, pattern.selling_price.as_str()),
            (Column::RepairPrice, pattern.repair_price.as_str()),
            (Column::Description, pattern.description.as_str()),
        ])?;
        Ok(patterns)
    }

    /// Discover the header row of an already loaded sheet
    pub fn load(&mut self, sheet: Sheet) -> Result<()> {
        let mut header = self.patterns()?.discover(&sheet)?;
        // most rows have no repair price and end right before that cell
        header.columns = header.columns.with_optional(Column::RepairPrice);
        info!(source = Self::NAME, line = header.row + 1, "found header line");
        self.loaded = Some((sheet, header));
        Ok(())
    }

    fn margin(&self, name: &str) -> Result<f64, RecordError> {
        self.margins
            .get(&name.to_lowercase())
            .copied()
            .ok_or_else(|| RecordError::UnknownSellingFactor(name.to_string()))
    }

    fn primary(&self, row: &SheetRow) -> Result<PricedRecord, RecordError> {
        let selling = row.number(Column::SellingPrice)?;
        let factor = factor_from_margin(self.margin(row.text(Column::SellingFactorName))?)?;
        let record = PricedRecord::new(
            row.text(Column::Id),
            row.text(Column::Description),
            purchase_from_selling(selling, factor),
            factor,
        );
        Ok(stamp(record, &self.config.labels, Self::NAME))
    }

    /// Second record for the repair service; `None` when no repair price is set
    fn repair(&self, row: &SheetRow) -> Option<Result<PricedRecord, RecordError>> {
        if row.is_empty(Column::RepairPrice) {
            return None;
        }
        let record = row.number(Column::RepairPrice).map(|price| {
            let description = format!(
                "{}{}",
                self.config.repair_description_prefix,
                row.text(Column::Description)
            );
            let record = PricedRecord::new(
                row.text(Column::Id),
                &description,
                price,
                self.config.selling_repair_factor,
            );
            stamp(record, &self.config.labels, Self::NAME).with_id_prefix(&self.config.repair_id_prefix)
        });
        Some(record)
    }

    fn process(&mut self, sheet: &Sheet, header: &Header, sink: &mut dyn RecordSink) -> Result<()> {
        for row in TableRows::new(sheet, &header.columns, header.data_start()) {
            self.summary.count_article();

            match self.primary(&row) {
                Ok(record) => {
                    sink.write_record(&record)?;
                    self.summary.count_record();
                }
                Err(err) => {
                    warn!(line = row.line, "{}, skip row", err);
                    self.summary.count_failed();
                    continue;
                }
            }

            match self.repair(&row) {
                None => {}
                Some(Ok(record)) => {
                    sink.write_record(&record)?;
                    self.summary.count_record();
                }
                Some(Err(err)) => {
                    warn!(line = row.line, "{}, skip repair", err);
                    self.summary.count_failed();
                }
            }
        }
        sink.flush()
    }

    /// Process the loaded sheet into `sink`
    pub fn process_loaded(&mut self, sink: &mut dyn RecordSink) -> Result<()> {
        let (sheet, header) = match self.loaded.take() {
            Some(loaded) => loaded,
            None => anyhow::bail!("{} importer used before init", Self::NAME),
        };
        let result = self.process(&sheet, &header, sink);
        self.loaded = Some((sheet, header));
        result
    }
}

impl SourceAdapter for MitelSource {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn init(&mut self) -> Result<()> {
        let location = Location::parse(&self.config.file)
            .with_context(|| format!("Failed to initialize {}", Self::NAME))?;
        let delimiter = delimiter_byte(self.config.csv_delimiter)?;

        let bytes = self
            .fetcher
            .read_all(&location)
            .with_context(|| format!("Failed to load {}", location))?;
        let sheet = Sheet::from_bytes(bytes, delimiter)?;
        self.load(sheet)
            .with_context(|| format!("Failed to initialize {}", Self::NAME))
    }

    fn run(&mut self, sink: &mut dyn RecordSink) -> Result<RunSummary> {
        if self.loaded.is_none() {
            self.init()?;
        }
        self.summary = RunSummary::started();
        info!(source = Self::NAME, "start processing");
        let result = self.process_loaded(sink);
        finish_run(Self::NAME, &mut self.summary, result)
    }

    fn summary(&self) -> &RunSummary {
        &self.summary
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FetchConfig, MitelColumnPatterns, RecordLabels};
    use crate::error::ImportError;
    use crate::export::MemorySink;
    use rust_xlsxwriter::Workbook;

    const EPSILON: f64 = 1e-9;

    fn config() -> MitelConfig {
        MitelConfig {
            file: "mitel.xlsx".to_string(),
            column_pattern: MitelColumnPatterns {
                id: "^Art".to_string(),
                selling_factor_name: "^Rabatt".to_string(),
                selling_price: "^VP".to_string(),
                repair_price: "^Rep".to_string(),
                description: "^Bez".to_string(),
            },
            selling_factors: HashMap::from([("M1".to_string(), 20.0), ("M2".to_string(), 50.0)]),
            selling_repair_factor: 1.2,
            repair_id_prefix: "REP-".to_string(),
            repair_description_prefix: "REPARATUR: ".to_string(),
            csv_delimiter: ',',
            labels: RecordLabels {
                id_prefix: "MIT-".to_string(),
                category_number: "20".to_string(),
                ..RecordLabels::default()
            },
            fetch: FetchConfig::default(),
        }
    }

    fn sheet(rows: &[&[&str]]) -> Sheet {
        Sheet::from_rows(
            rows.iter()
                .map(|row| row.iter().map(|cell| cell.to_string()).collect())
                .collect(),
        )
    }

    fn price_list(rows: &[&[&str]]) -> Sheet {
        let mut all: Vec<&[&str]> = Vec::new();
        all.push(&["Mitel Preisliste"]);
        all.push(&["Artikel", "Bezeichnung", "Rabattgruppe", "VP CHF", "Reparatur"]);
        all.extend_from_slice(rows);
        sheet(&all)
    }

    fn run_sheet(sheet: Sheet) -> (MitelSource, MemorySink) {
        let mut source = MitelSource::new(config());
        source.load(sheet).unwrap();
        let mut sink = MemorySink::new();
        source.process_loaded(&mut sink).unwrap();
        (source, sink)
    }

    #[test]
    fn test_margin_converted_to_factor() {
        let (source, sink) = run_sheet(price_list(&[&["100", "Phone", "M1", "120", ""]]));

        assert_eq!(sink.records.len(), 1);
        let record = &sink.records[0];
        assert_eq!(record.full_id(), "MIT-100");
        assert!((record.selling_factor() - 1.25).abs() < EPSILON);
        assert!((record.purchase_price() - 96.0).abs() < EPSILON);
        assert!((record.selling_price() - 120.0).abs() < EPSILON);
        assert_eq!(record.category(), "Mitel");
        assert_eq!(source.summary().articles, 1);
    }

    #[test]
    fn test_margin_name_lookup_is_trimmed_and_case_insensitive() {
        let (_, sink) = run_sheet(price_list(&[&["100", "Phone", " m2 ", "50", ""]]));

        assert_eq!(sink.records.len(), 1);
        assert!((sink.records[0].selling_factor() - 2.0).abs() < EPSILON);
    }

    #[test]
    fn test_repair_price_adds_second_record() {
        let (source, sink) = run_sheet(price_list(&[&["100", "Phone", "M1", "120", "30"]]));

        assert_eq!(sink.records.len(), 2);
        let repair = &sink.records[1];
        assert_eq!(repair.full_id(), "REP-100");
        assert_eq!(repair.description(), "REPARATUR: Phone");
        assert_eq!(repair.purchase_price(), 30.0);
        assert!((repair.selling_price() - 36.0).abs() < EPSILON);
        assert_eq!(source.summary().articles, 1);
        assert_eq!(source.summary().records, 2);
    }

    #[test]
    fn test_bad_rows_are_skipped() {
        let (source, sink) = run_sheet(price_list(&[
            &["100", "Phone", "M1", "n/a", ""],
            &["101", "Headset", "M9", "80", ""],
            &[""],
            &["102", "Dock", "M1", "40", "oops"],
            &["103", "Cable", "M1", "10", ""],
        ]));

        let ids: Vec<String> = sink.records.iter().map(|r| r.full_id()).collect();
        assert_eq!(ids, vec!["MIT-102", "MIT-103"]);

        let summary = source.summary();
        // the empty row is not an article
        assert_eq!(summary.articles, 4);
        // unparsable price, unknown margin, unparsable repair price
        assert_eq!(summary.failed, 3);
        assert_eq!(summary.records, 2);
    }

    #[test]
    fn test_margin_of_hundred_fails_row() {
        let mut config = config();
        config.selling_factors.insert("ALL".to_string(), 100.0);
        let mut source = MitelSource::new(config);
        source
            .load(price_list(&[&["100", "Phone", "all", "120", ""], &["101", "Dock", "M1", "40", ""]]))
            .unwrap();

        let mut sink = MemorySink::new();
        source.process_loaded(&mut sink).unwrap();

        assert_eq!(sink.records.len(), 1);
        assert_eq!(source.summary().failed, 1);
    }

    #[test]
    fn test_missing_header_is_init_error() {
        let mut source = MitelSource::new(config());
        let err = source
            .load(sheet(&[&["Artikel", "Bezeichnung"], &["100", "Phone"]]))
            .unwrap_err();

        assert!(matches!(err.downcast_ref::<ImportError>(), Some(ImportError::HeaderNotFound)));
    }

    #[test]
    fn test_invalid_pattern_is_init_error() {
        let mut config = config();
        config.column_pattern.id = "([".to_string();
        let mut source = MitelSource::new(config);

        let err = source.load(price_list(&[])).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ImportError>(),
            Some(ImportError::InvalidPattern { column: Column::Id, .. })
        ));
    }

    #[test]
    fn test_run_from_xlsx_with_blank_row() {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.write_string(0, 0, "Mitel Preisliste").unwrap();
        for (col, title) in ["Artikel", "Bezeichnung", "Rabattgruppe", "VP CHF", "Reparatur"]
            .iter()
            .enumerate()
        {
            worksheet.write_string(1, col as u16, *title).unwrap();
        }
        worksheet.write_string(2, 0, "100").unwrap();
        worksheet.write_string(2, 1, "Phone").unwrap();
        worksheet.write_string(2, 2, "M1").unwrap();
        worksheet.write_number(2, 3, 120.0).unwrap();
        worksheet.write_number(2, 4, 30.0).unwrap();
        // row 4 stays blank
        worksheet.write_string(4, 0, "101").unwrap();
        worksheet.write_string(4, 1, "Dock").unwrap();
        worksheet.write_string(4, 2, "M1").unwrap();
        worksheet.write_number(4, 3, 40.0).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mitel.xlsx");
        workbook.save(&path).unwrap();

        let mut config = config();
        config.file = path.display().to_string();
        let mut source = MitelSource::new(config);
        let mut sink = MemorySink::new();
        let summary = source.run(&mut sink).unwrap();

        let ids: Vec<String> = sink.records.iter().map(|r| r.full_id()).collect();
        assert_eq!(ids, vec!["MIT-100", "REP-100", "MIT-101"]);
        assert!((sink.records[0].purchase_price() - 96.0).abs() < EPSILON);
        assert_eq!(summary.articles, 2);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.records, 3);
    }

    #[test]
    fn test_run_from_csv_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mitel.csv");
        std::fs::write(
            &path,
            "Artikel,Bezeichnung,Rabattgruppe,VP CHF,Reparatur\n200,\"Desk, phone\",M1,60,\n",
        )
        .unwrap();

        let mut config = config();
        config.file = path.display().to_string();
        let mut source = MitelSource::new(config);
        let mut sink = MemorySink::new();
        let summary = source.run(&mut sink).unwrap();

        assert!(summary.is_stopped());
        assert_eq!(summary.records, 1);
        assert_eq!(sink.records[0].description(), "Desk  phone");
    }
}
