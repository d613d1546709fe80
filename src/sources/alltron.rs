// 🔗 Alltron - article catalog + price list as two separate XML streams
//
// Articles drive the run; each surviving article asks the PriceJoin for its
// price. Neither file is ever loaded as a whole.

use anyhow::{Context, Result};
use std::io::{BufRead, BufReader};
use tracing::{debug, info, warn};

use crate::config::AlltronConfig;
use crate::error::ImportError;
use crate::export::RecordSink;
use crate::filter::ExclusionFilter;
use crate::join::{ArticleEntry, PriceEntry, PriceJoin};
use crate::record::PricedRecord;
use crate::sources::{finish_run, stamp, SourceAdapter};
use crate::summary::RunSummary;
use crate::transport::{Fetcher, Location};
use crate::xml::{ArticleStream, PriceStream};

pub struct AlltronSource {
    config: AlltronConfig,
    filter: ExclusionFilter,
    fetcher: Fetcher,
    locations: Option<(Location, Location)>,
    summary: RunSummary,
}

impl AlltronSource {
    pub const NAME: &'static str = "Alltron";

    pub fn new(config: AlltronConfig) -> Self {
        let filter = ExclusionFilter::from_map(&config.ignored);
        let fetcher = Fetcher::new()
            .with_max_size(config.fetch.max_download_file_size)
            .with_save_dir(config.fetch.save_dir.clone());
        AlltronSource {
            config,
            filter,
            fetcher,
            locations: None,
            summary: RunSummary::new(),
        }
    }

    fn validate(&self) -> Result<(Location, Location), ImportError> {
        for field in self.filter.fields() {
            if field != ArticleEntry::MANUFACTURER && field != ArticleEntry::CATEGORY {
                return Err(ImportError::InvalidConfig(format!(
                    "unknown classification '{}' in ignored (expected {} or {})",
                    field,
                    ArticleEntry::MANUFACTURER,
                    ArticleEntry::CATEGORY
                )));
            }
        }
        if !self.config.selling_factor.is_finite() || self.config.selling_factor <= 0.0 {
            return Err(ImportError::InvalidConfig(format!(
                "selling_factor must be positive, got {}",
                self.config.selling_factor
            )));
        }
        Ok((
            Location::parse(&self.config.article_file)?,
            Location::parse(&self.config.price_file)?,
        ))
    }

    fn record(&self, article: &ArticleEntry, price: &PriceEntry) -> PricedRecord {
        let record = PricedRecord::new(
            &article.id,
            &article.description,
            price.purchase_price,
            self.config.selling_factor,
        );
        stamp(record, &self.config.labels, Self::NAME)
    }

    /// Join an article stream with a price stream and write the records
    pub fn process<A, P>(&mut self, articles: A, prices: P, sink: &mut dyn RecordSink) -> Result<()>
    where
        A: BufRead,
        P: BufRead,
    {
        let mut join = PriceJoin::new(PriceStream::new(prices));

        for article in ArticleStream::new(articles) {
            let article = article.context("Failed to decode article stream")?;
            self.summary.count_article();

            if let Some(hit) = self.filter.check(|field| article.classification(field)) {
                debug!(id = %article.id, field = hit.field, code = %hit.code, "article ignored");
                self.summary.count_ignored();
                continue;
            }

            let price = match join.resolve(&article.id) {
                Ok(price) => price,
                Err(err) if err.is_recoverable() => {
                    warn!(id = %article.id, "{}", err);
                    self.summary.count_failed();
                    continue;
                }
                Err(err) => return Err(err).context("Failed to decode price stream"),
            };

            sink.write_record(&self.record(&article, &price))?;
            self.summary.count_record();
        }

        join.finish();
        sink.flush()
    }

    fn process_locations(&mut self, sink: &mut dyn RecordSink) -> Result<()> {
        let (article_location, price_location) = match &self.locations {
            Some(locations) => locations.clone(),
            None => anyhow::bail!("{} importer used before init", Self::NAME),
        };

        // Progress follows the article file, it drives the run
        let articles = self
            .fetcher
            .clone()
            .with_progress(self.config.fetch.show_progress)
            .open(&article_location)
            .with_context(|| format!("Failed to open article file {}", article_location))?;
        let prices = self
            .fetcher
            .open(&price_location)
            .with_context(|| format!("Failed to open price file {}", price_location))?;

        info!(articles = %article_location, prices = %price_location, "joining article and price streams");
        let result = self.process(
            BufReader::new(articles.reader),
            BufReader::new(prices.reader),
            sink,
        );
        if let Some(bar) = articles.progress {
            bar.finish_and_clear();
        }
        result
    }
}

impl SourceAdapter for AlltronSource {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn init(&mut self) -> Result<()> {
        let locations = self
            .validate()
            .with_context(|| format!("Failed to initialize {}", Self::NAME))?;
        self.locations = Some(locations);
        Ok(())
    }

    fn run(&mut self, sink: &mut dyn RecordSink) -> Result<RunSummary> {
        if self.locations.is_none() {
            self.init()?;
        }
        self.summary = RunSummary::started();
        info!(source = Self::NAME, "start processing");
        let result = self.process_locations(sink);
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
    use crate::config::{FetchConfig, RecordLabels};
    use crate::export::MemorySink;
    use std::collections::BTreeMap;

    fn config(ignored: &[(&str, &[&str])]) -> AlltronConfig {
        AlltronConfig {
            article_file: "articles.xml".to_string(),
            price_file: "prices.xml".to_string(),
            selling_factor: 1.5,
            ignored: ignored
                .iter()
                .map(|(field, codes)| (field.to_string(), codes.iter().map(|c| c.to_string()).collect()))
                .collect::<BTreeMap<_, _>>(),
            labels: RecordLabels {
                id_prefix: "ALL-".to_string(),
                category_number: "10".to_string(),
                ..RecordLabels::default()
            },
            fetch: FetchConfig::default(),
        }
    }

    fn article(id: &str, maft: &str, cat1: &str) -> String {
        format!(
            "<item><LITM>{}</LITM><part_description><DESC>Article {}</DESC></part_description>\
             <additional_information><MAFT>{}</MAFT></additional_information>\
             <part_catagory><CAT1>{}</CAT1></part_catagory></item>",
            id, id, maft, cat1
        )
    }

    fn price(id: &str, value: &str) -> String {
        format!("<item><LITM>{}</LITM><price><EXPR>{}</EXPR></price></item>", id, value)
    }

    fn doc(items: &[String]) -> String {
        format!("<?xml version=\"1.0\"?><root>{}</root>", items.concat())
    }

    #[test]
    fn test_single_article_priced() {
        let mut source = AlltronSource::new(config(&[]));
        let mut sink = MemorySink::new();

        let articles = doc(&[article("A1", "X", "C")]);
        let prices = doc(&[price("A1", "10.0")]);
        source.process(articles.as_bytes(), prices.as_bytes(), &mut sink).unwrap();

        assert_eq!(sink.records.len(), 1);
        let record = &sink.records[0];
        assert_eq!(record.full_id(), "ALL-A1");
        assert_eq!(record.purchase_price(), 10.0);
        assert_eq!(record.selling_price(), 15.0);
        assert_eq!(record.category(), "Alltron");
        assert_eq!(source.summary().articles, 1);
        assert_eq!(source.summary().records, 1);
    }

    #[test]
    fn test_reversed_price_order() {
        let mut source = AlltronSource::new(config(&[]));
        let mut sink = MemorySink::new();

        let articles = doc(&[article("A1", "X", "C"), article("A2", "X", "C")]);
        let prices = doc(&[price("A2", "5.0"), price("A1", "3.0")]);
        source.process(articles.as_bytes(), prices.as_bytes(), &mut sink).unwrap();

        let priced: Vec<(&str, f64)> = sink
            .records
            .iter()
            .map(|r| (r.id(), r.purchase_price()))
            .collect();
        assert_eq!(priced, vec![("A1", 3.0), ("A2", 5.0)]);
    }

    #[test]
    fn test_excluded_articles_counted_once() {
        let mut source = AlltronSource::new(config(&[("MAFT", &["ACME"]), ("CAT1", &["SW"])]));
        let mut sink = MemorySink::new();

        let articles = doc(&[
            article("A1", "ACME", "SW"),
            article("A2", "HP", "SW"),
            article("A3", "HP", "HW"),
        ]);
        let prices = doc(&[price("A1", "1"), price("A2", "2"), price("A3", "3")]);
        source.process(articles.as_bytes(), prices.as_bytes(), &mut sink).unwrap();

        assert_eq!(sink.records.len(), 1);
        assert_eq!(sink.records[0].id(), "A3");
        assert_eq!(source.summary().articles, 3);
        assert_eq!(source.summary().ignored, 2);
        assert_eq!(source.summary().failed, 0);
    }

    #[test]
    fn test_missing_price_skips_article_only() {
        let mut source = AlltronSource::new(config(&[]));
        let mut sink = MemorySink::new();

        let articles = doc(&[article("A1", "X", "C"), article("A2", "X", "C")]);
        let prices = doc(&[price("A2", "4.0")]);
        source.process(articles.as_bytes(), prices.as_bytes(), &mut sink).unwrap();

        assert_eq!(sink.records.len(), 1);
        assert_eq!(sink.records[0].id(), "A2");
        // a missing price is a failure, not an exclusion
        assert_eq!(source.summary().articles, 2);
        assert_eq!(source.summary().ignored, 0);
        assert_eq!(source.summary().failed, 1);
    }

    #[test]
    fn test_malformed_price_stream_aborts() {
        let mut source = AlltronSource::new(config(&[]));
        let mut sink = MemorySink::new();

        let articles = doc(&[article("A1", "X", "C")]);
        let prices = doc(&[price("A1", "ten")]);
        let err = source
            .process(articles.as_bytes(), prices.as_bytes(), &mut sink)
            .unwrap_err();

        assert!(format!("{:#}", err).contains("invalid price"));
        assert!(sink.records.is_empty());
    }

    #[test]
    fn test_init_rejects_unknown_classification() {
        let mut source = AlltronSource::new(config(&[("COLOR", &["red"])]));
        assert!(source.init().is_err());

        let mut source = AlltronSource::new(config(&[("CAT1", &["SW"])]));
        assert!(source.init().is_ok());
    }

    #[test]
    fn test_run_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let article_path = dir.path().join("articles.xml");
        let price_path = dir.path().join("prices.xml");
        std::fs::write(&article_path, doc(&[article("A1", "X", "C")])).unwrap();
        std::fs::write(&price_path, doc(&[price("A1", "2.0")])).unwrap();

        let mut config = config(&[]);
        config.article_file = article_path.display().to_string();
        config.price_file = price_path.display().to_string();

        let mut source = AlltronSource::new(config);
        let mut sink = MemorySink::new();
        let summary = source.run(&mut sink).unwrap();

        assert!(summary.is_stopped());
        assert_eq!(summary.records, 1);
        assert_eq!(sink.records[0].selling_price(), 3.0);
    }
}
