// ⚙️ Configuration - one file, one section per vendor
//
// TOML by default, JSON when the file ends in `.json`. Every value the
// importers need is resolved here; the importers never read files themselves.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::ImportError;

// ============================================================================
// TOP LEVEL
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_output_file")]
    pub output_file: PathBuf,

    /// Target charset of the output file (`utf8`, `iso-8859-1`, ...)
    #[serde(default)]
    pub output_encoding: String,

    pub alltron: Option<AlltronConfig>,
    pub mitel: Option<MitelConfig>,
    pub suprag: Option<SupragConfig>,
}

fn default_output_file() -> PathBuf {
    PathBuf::from("output.csv")
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let config = if is_json {
            Config::from_json_str(&content)
        } else {
            Config::from_toml_str(&content)
        };
        config.with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config TOML")?;
        let raw: Value = toml::from_str(content).context("Failed to parse config TOML")?;
        config.warn_unknown_keys(&raw);
        Ok(config)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let raw: Value = serde_json::from_str(content).context("Failed to parse config JSON")?;
        let config: Config =
            serde_json::from_value(raw.clone()).context("Failed to parse config JSON")?;
        config.warn_unknown_keys(&raw);
        Ok(config)
    }

    /// Dotted paths of keys in `raw` that no setting reads
    ///
    /// The flattened sections accept any key, so a misspelled setting would
    /// otherwise fall back to its default without a trace.
    pub fn unknown_keys(&self, raw: &Value) -> Vec<String> {
        let Ok(known) = serde_json::to_value(self) else {
            return Vec::new();
        };
        let mut unknown = Vec::new();
        collect_unknown(raw, &known, "", &mut unknown);
        unknown
    }

    fn warn_unknown_keys(&self, raw: &Value) {
        for key in self.unknown_keys(raw) {
            warn!(key = %key, "unknown config key ignored");
        }
    }
}

fn collect_unknown(raw: &Value, known: &Value, prefix: &str, unknown: &mut Vec<String>) {
    let (Value::Object(raw), Value::Object(known)) = (raw, known) else {
        return;
    };
    for (key, value) in raw {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        match known.get(key) {
            Some(known) => collect_unknown(value, known, &path, unknown),
            None => unknown.push(path),
        }
    }
}

// ============================================================================
// SHARED SECTIONS
// ============================================================================

/// Labels and factors stamped onto every record of a source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordLabels {
    #[serde(default)]
    pub id_prefix: String,

    /// Category label; the importer name when not set
    #[serde(default)]
    pub category: Option<String>,

    #[serde(default)]
    pub category_number: String,

    #[serde(default = "default_factor")]
    pub purchase_factor: f64,
}

impl Default for RecordLabels {
    fn default() -> Self {
        RecordLabels {
            id_prefix: String::new(),
            category: None,
            category_number: String::new(),
            purchase_factor: default_factor(),
        }
    }
}

impl RecordLabels {
    pub fn category_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.category.as_deref().unwrap_or(fallback)
    }
}

fn default_factor() -> f64 {
    1.0
}

/// How a source is fetched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Downloads larger than this many bytes are refused
    #[serde(default)]
    pub max_download_file_size: Option<u64>,

    /// Keep a copy of every download here
    #[serde(default)]
    pub save_dir: Option<PathBuf>,

    #[serde(default)]
    pub show_progress: bool,
}

fn default_delimiter() -> char {
    ','
}

/// CSV delimiter as a single byte
pub fn delimiter_byte(delimiter: char) -> Result<u8, ImportError> {
    u8::try_from(delimiter)
        .ok()
        .filter(|b| b.is_ascii())
        .ok_or_else(|| ImportError::InvalidConfig(format!("csv_delimiter '{}' is not ASCII", delimiter)))
}

// ============================================================================
// ALLTRON
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlltronConfig {
    pub article_file: String,
    pub price_file: String,

    pub selling_factor: f64,

    /// Classification field (`MAFT`, `CAT1`) -> excluded codes
    #[serde(default)]
    pub ignored: BTreeMap<String, Vec<String>>,

    #[serde(flatten)]
    pub labels: RecordLabels,

    #[serde(flatten)]
    pub fetch: FetchConfig,
}

// ============================================================================
// MITEL
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MitelConfig {
    pub file: String,

    pub column_pattern: MitelColumnPatterns,

    /// Margin name -> margin percent
    #[serde(default)]
    pub selling_factors: HashMap<String, f64>,

    pub selling_repair_factor: f64,

    #[serde(default = "default_repair_id_prefix")]
    pub repair_id_prefix: String,

    #[serde(default = "default_repair_description_prefix")]
    pub repair_description_prefix: String,

    #[serde(default = "default_delimiter")]
    pub csv_delimiter: char,

    #[serde(flatten)]
    pub labels: RecordLabels,

    #[serde(flatten)]
    pub fetch: FetchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MitelColumnPatterns {
    pub id: String,
    pub selling_factor_name: String,
    pub selling_price: String,
    pub repair_price: String,
    pub description: String,
}

fn default_repair_id_prefix() -> String {
    "REP-".to_string()
}

fn default_repair_description_prefix() -> String {
    "REPARATUR: ".to_string()
}

// ============================================================================
// SUPRAG
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupragConfig {
    pub file: String,

    /// 1-based line of the first data row
    #[serde(default = "default_start_line")]
    pub start_line: usize,

    #[serde(default)]
    pub columns: SupragColumns,

    #[serde(default)]
    pub ignored_manufacturers: Vec<String>,

    #[serde(default = "default_delimiter")]
    pub csv_delimiter: char,

    #[serde(flatten)]
    pub labels: RecordLabels,

    #[serde(flatten)]
    pub fetch: FetchConfig,
}

fn default_start_line() -> usize {
    1
}

/// Fixed column positions (0-based)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupragColumns {
    pub id: usize,
    pub manufacturer: usize,
    pub selling_price: usize,
    pub purchase_price: usize,
    pub description: usize,
}

impl Default for SupragColumns {
    fn default() -> Self {
        SupragColumns {
            id: 0,
            manufacturer: 2,
            selling_price: 6,
            purchase_price: 7,
            description: 9,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
output_file = "catalog.csv"
output_encoding = "iso-8859-1"

[alltron]
article_file = "articles.xml"
price_file = "https://example.com/prices.xml"
selling_factor = 1.5
id_prefix = "ALL-"
category_number = "10"
max_download_file_size = 1000

[alltron.ignored]
MAFT = ["ACME"]
CAT1 = ["SW", "LIC"]

[mitel]
file = "mitel.xlsx"
selling_repair_factor = 1.2

[mitel.column_pattern]
id = "^Art"
selling_factor_name = "^Rabatt"
selling_price = "^VP"
repair_price = "^Rep"
description = "^Bez"

[mitel.selling_factors]
M1 = 20
M2 = 35.5

[suprag]
file = "suprag.csv"
start_line = 2
csv_delimiter = ";"
ignored_manufacturers = ["Foo"]
"#;

    #[test]
    fn test_parse_toml() {
        let config = Config::from_toml_str(SAMPLE).unwrap();

        assert_eq!(config.output_file, PathBuf::from("catalog.csv"));
        assert_eq!(config.output_encoding, "iso-8859-1");

        let alltron = config.alltron.unwrap();
        assert_eq!(alltron.selling_factor, 1.5);
        assert_eq!(alltron.labels.id_prefix, "ALL-");
        assert_eq!(alltron.labels.purchase_factor, 1.0);
        assert_eq!(alltron.labels.category_or("Alltron"), "Alltron");
        assert_eq!(alltron.fetch.max_download_file_size, Some(1000));
        assert_eq!(alltron.ignored["CAT1"], vec!["SW", "LIC"]);

        let mitel = config.mitel.unwrap();
        assert_eq!(mitel.selling_factors["M1"], 20.0);
        assert_eq!(mitel.repair_id_prefix, "REP-");
        assert_eq!(mitel.repair_description_prefix, "REPARATUR: ");
        assert_eq!(mitel.csv_delimiter, ',');

        let suprag = config.suprag.unwrap();
        assert_eq!(suprag.start_line, 2);
        assert_eq!(suprag.columns.purchase_price, 7);
        assert_eq!(suprag.csv_delimiter, ';');
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_toml_str("").unwrap();

        assert_eq!(config.output_file, PathBuf::from("output.csv"));
        assert!(config.output_encoding.is_empty());
        assert!(config.alltron.is_none());
    }

    #[test]
    fn test_json_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"output_file": "out.csv", "suprag": {"file": "s.xlsx", "id_prefix": "SUP-"}}"#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        let suprag = config.suprag.unwrap();
        assert_eq!(suprag.labels.id_prefix, "SUP-");
        assert_eq!(suprag.start_line, 1);
    }

    #[test]
    fn test_missing_required_field() {
        let err = Config::from_toml_str("[alltron]\narticle_file = \"a.xml\"\n");
        assert!(err.is_err());
    }

    #[test]
    fn test_unknown_keys() {
        let content = r#"
out_file = "catalog.csv"

[alltron]
article_file = "articles.xml"
price_file = "prices.xml"
selling_factor = 1.5
selling_facter = 2.0
use_ftp = true

[alltron.ignored]
MAFT = ["ACME"]
"#;
        let config = Config::from_toml_str(content).unwrap();
        let raw: Value = toml::from_str(content).unwrap();

        // the typo does not replace the real setting
        assert_eq!(config.alltron.as_ref().unwrap().selling_factor, 1.5);
        let mut unknown = config.unknown_keys(&raw);
        unknown.sort();
        assert_eq!(unknown, vec!["alltron.selling_facter", "alltron.use_ftp", "out_file"]);
    }

    #[test]
    fn test_sample_has_no_unknown_keys() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        let raw: Value = toml::from_str(SAMPLE).unwrap();

        assert!(config.unknown_keys(&raw).is_empty());
    }

    #[test]
    fn test_delimiter_byte() {
        assert_eq!(delimiter_byte(';').unwrap(), b';');
        assert!(delimiter_byte('§').is_err());
    }
}
