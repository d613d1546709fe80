// 🚦 Pipeline - run every configured source against one shared sink
//
// All adapters are initialised before the first row is processed, so a
// configuration mistake in the last source does not leave a half-written
// catalog behind. After that a failing source is reported and the next one
// still runs.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt;
use tracing::{error, info};

use crate::export::RecordSink;
use crate::sources::SourceAdapter;
use crate::summary::RunSummary;

/// Result of one source inside a pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct SourceOutcome {
    pub name: String,
    pub summary: RunSummary,
    /// Error chain when the source aborted
    pub error: Option<String>,
}

impl SourceOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// PipelineReport - per-source outcomes plus the merged counters
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub total: RunSummary,
    pub outcomes: Vec<SourceOutcome>,
}

impl PipelineReport {
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(SourceOutcome::is_success)
    }

    pub fn failed_sources(&self) -> impl Iterator<Item = &str> {
        self.outcomes
            .iter()
            .filter(|outcome| !outcome.is_success())
            .map(|outcome| outcome.name.as_str())
    }
}

impl fmt::Display for PipelineReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for outcome in &self.outcomes {
            match &outcome.error {
                None => writeln!(f, "✓ {}: {}", outcome.name, outcome.summary)?,
                Some(err) => writeln!(f, "✗ {}: {} ({})", outcome.name, err, outcome.summary)?,
            }
        }
        write!(f, "total: {}", self.total)
    }
}

#[derive(Default)]
pub struct Pipeline {
    sources: Vec<Box<dyn SourceAdapter>>,
}

impl Pipeline {
    pub fn new(sources: Vec<Box<dyn SourceAdapter>>) -> Self {
        Pipeline { sources }
    }

    /// Builder pattern: append a source; sources run in insertion order
    pub fn add(mut self, source: Box<dyn SourceAdapter>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Initialise every source; the first failure stops the pipeline
    pub fn init_all(&mut self) -> Result<()> {
        for source in &mut self.sources {
            let name = source.name().to_string();
            source
                .init()
                .with_context(|| format!("Failed to initialize source {}", name))?;
            info!(source = %name, "initialized");
        }
        Ok(())
    }

    /// Run the sources one after another against `sink`
    pub fn run(&mut self, sink: &mut dyn RecordSink) -> PipelineReport {
        let mut total = RunSummary::started();
        let mut outcomes = Vec::with_capacity(self.sources.len());

        for source in &mut self.sources {
            let name = source.name().to_string();
            let outcome = match source.run(sink) {
                Ok(summary) => SourceOutcome {
                    name,
                    summary,
                    error: None,
                },
                Err(err) => {
                    error!(source = %name, "source failed, continuing with the next one");
                    SourceOutcome {
                        name,
                        summary: source.summary().clone(),
                        error: Some(format!("{:#}", err)),
                    }
                }
            };
            total += &outcome.summary;
            outcomes.push(outcome);
        }

        total.stop();
        info!("{}", total);
        PipelineReport { total, outcomes }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::MemorySink;
    use crate::record::PricedRecord;

    /// Writes `records` records; `fail_run` turns the run into an error afterwards
    struct FakeSource {
        name: &'static str,
        records: usize,
        fail_init: bool,
        fail_run: bool,
        summary: RunSummary,
    }

    impl FakeSource {
        fn boxed(name: &'static str, records: usize) -> Box<dyn SourceAdapter> {
            Box::new(FakeSource {
                name,
                records,
                fail_init: false,
                fail_run: false,
                summary: RunSummary::new(),
            })
        }

        fn failing_run(name: &'static str, records: usize) -> Box<dyn SourceAdapter> {
            Box::new(FakeSource {
                name,
                records,
                fail_init: false,
                fail_run: true,
                summary: RunSummary::new(),
            })
        }

        fn failing_init(name: &'static str) -> Box<dyn SourceAdapter> {
            Box::new(FakeSource {
                name,
                records: 0,
                fail_init: true,
                fail_run: false,
                summary: RunSummary::new(),
            })
        }
    }

    impl SourceAdapter for FakeSource {
        fn name(&self) -> &str {
            self.name
        }

        fn init(&mut self) -> Result<()> {
            if self.fail_init {
                anyhow::bail!("bad pattern");
            }
            Ok(())
        }

        fn run(&mut self, sink: &mut dyn RecordSink) -> Result<RunSummary> {
            self.summary = RunSummary::started();
            for i in 0..self.records {
                self.summary.count_article();
                sink.write_record(&PricedRecord::new(&format!("{}-{}", self.name, i), "x", 1.0, 1.0))?;
                self.summary.count_record();
            }
            self.summary.stop();
            if self.fail_run {
                anyhow::bail!("malformed stream");
            }
            Ok(self.summary.clone())
        }

        fn summary(&self) -> &RunSummary {
            &self.summary
        }
    }

    #[test]
    fn test_runs_sources_in_order() {
        let mut pipeline = Pipeline::default()
            .add(FakeSource::boxed("Alltron", 2))
            .add(FakeSource::boxed("Suprag", 1));
        let mut sink = MemorySink::new();

        pipeline.init_all().unwrap();
        let report = pipeline.run(&mut sink);

        assert!(report.is_success());
        assert_eq!(report.total.records, 3);
        let ids: Vec<&str> = sink.records.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["Alltron-0", "Alltron-1", "Suprag-0"]);
    }

    #[test]
    fn test_failed_source_does_not_stop_the_rest() {
        let mut pipeline = Pipeline::new(vec![
            FakeSource::failing_run("Alltron", 1),
            FakeSource::boxed("Mitel", 2),
        ]);
        let mut sink = MemorySink::new();

        let report = pipeline.run(&mut sink);

        assert!(!report.is_success());
        assert_eq!(report.failed_sources().collect::<Vec<_>>(), vec!["Alltron"]);
        assert_eq!(report.outcomes[0].error.as_deref(), Some("malformed stream"));
        // partial counters of the failed source are kept
        assert_eq!(report.outcomes[0].summary.records, 1);
        assert_eq!(report.total.records, 3);
        assert_eq!(sink.records.len(), 3);
    }

    #[test]
    fn test_init_failure_stops_before_processing() {
        let mut pipeline = Pipeline::new(vec![
            FakeSource::boxed("Alltron", 1),
            FakeSource::failing_init("Mitel"),
        ]);

        let err = pipeline.init_all().unwrap_err();
        assert!(format!("{:#}", err).contains("Mitel"));
    }

    #[test]
    fn test_report_display() {
        let mut pipeline = Pipeline::new(vec![FakeSource::failing_run("Suprag", 0)]);
        let report = pipeline.run(&mut MemorySink::new());
        let text = report.to_string();

        assert!(text.starts_with("✗ Suprag: malformed stream"));
        assert!(text.contains("total: processed 0 articles"));
    }
}
