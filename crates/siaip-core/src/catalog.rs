//! Static lookup tables loaded once at startup.
//!
//! Both tables are immutable for the lifetime of the process and are shared
//! between connection handlers behind an `Arc`, so no locking is involved.
//!
//! The on-disk format is YAML:
//!
//! ```yaml
//! # codes.yml
//! codes:
//!   - code: BA
//!     address: zone
//!   - code: OP
//!     address: user
//!
//! # blacklist.yml
//! codes:
//!   - code: "9999"
//! ```

use crate::Result;
use config::{Config, File, FileFormat, Source};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Category of a signal code.
///
/// Only `Zone` matters to the decoder: it is the one category whose trailing
/// digits are a zone address.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum CodeCategory {
    Zone,
    Other(String),
}

impl From<String> for CodeCategory {
    fn from(value: String) -> Self {
        if value.eq_ignore_ascii_case("zone") {
            CodeCategory::Zone
        } else {
            CodeCategory::Other(value)
        }
    }
}

#[derive(Debug, Deserialize)]
struct CodeEntry {
    code: String,
    #[serde(default, alias = "address")]
    category: Option<CodeCategory>,
}

#[derive(Debug, Deserialize)]
struct CodeList<T> {
    #[serde(default = "Vec::new")]
    codes: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct BlacklistEntry {
    code: String,
}

fn read_yaml<T: DeserializeOwned>(source: impl Source + Send + Sync + 'static) -> Result<T> {
    Ok(Config::builder().add_source(source).build()?.try_deserialize()?)
}

/// Mapping from signal code to category.
///
/// # Example
///
/// ```
/// use siaip_core::{CodeCatalog, CodeCategory};
///
/// let catalog = CodeCatalog::from_yaml_str("codes:\n  - code: BA\n    address: zone\n").unwrap();
/// assert!(catalog.is_zone("BA"));
/// assert!(!catalog.is_zone("OP"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct CodeCatalog {
    categories: HashMap<String, CodeCategory>,
}

impl CodeCatalog {
    /// Build a catalog from `(code, category)` pairs.
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, CodeCategory)>,
        S: Into<String>,
    {
        Self {
            categories: entries
                .into_iter()
                .map(|(code, category)| (code.into(), category))
                .collect(),
        }
    }

    /// Load the catalog from a YAML file.
    ///
    /// # Errors
    /// Returns `Error::Settings` if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let list: CodeList<CodeEntry> = read_yaml(File::from(path.as_ref()).format(FileFormat::Yaml))?;
        Ok(Self::from_entries(list.codes))
    }

    /// Parse the catalog from YAML text.
    ///
    /// # Errors
    /// Returns `Error::Settings` if the text is not a valid code list.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let list: CodeList<CodeEntry> = read_yaml(File::from_str(yaml, FileFormat::Yaml))?;
        Ok(Self::from_entries(list.codes))
    }

    fn from_entries(entries: Vec<CodeEntry>) -> Self {
        Self::new(entries.into_iter().map(|entry| {
            let category = entry
                .category
                .unwrap_or_else(|| CodeCategory::Other(String::new()));
            (entry.code, category)
        }))
    }

    /// Category of `code`, if the code is known.
    #[must_use]
    pub fn category(&self, code: &str) -> Option<&CodeCategory> {
        self.categories.get(code)
    }

    /// Returns `true` if `code` is catalogued as a zone code.
    #[must_use]
    pub fn is_zone(&self, code: &str) -> bool {
        matches!(self.category(code), Some(CodeCategory::Zone))
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

/// Set of account identifiers that are never acknowledged.
#[derive(Debug, Clone, Default)]
pub struct Blacklist {
    accounts: HashSet<String>,
}

impl Blacklist {
    /// Load the blacklist from a YAML file.
    ///
    /// # Errors
    /// Returns `Error::Settings` if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let list: CodeList<BlacklistEntry> =
            read_yaml(File::from(path.as_ref()).format(FileFormat::Yaml))?;
        Ok(list.codes.into_iter().map(|entry| entry.code).collect())
    }

    /// Parse the blacklist from YAML text.
    ///
    /// # Errors
    /// Returns `Error::Settings` if the text is not a valid code list.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let list: CodeList<BlacklistEntry> = read_yaml(File::from_str(yaml, FileFormat::Yaml))?;
        Ok(list.codes.into_iter().map(|entry| entry.code).collect())
    }

    #[must_use]
    pub fn contains(&self, account: &str) -> bool {
        self.accounts.contains(account)
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for Blacklist {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            accounts: iter.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CODES_YAML: &str = r#"
codes:
  - code: BA
    address: zone
  - code: FA
    category: Zone
  - code: OP
    address: user
  - code: RP
"#;

    #[test]
    fn test_catalog_from_yaml() {
        let catalog = CodeCatalog::from_yaml_str(CODES_YAML).unwrap();

        assert_eq!(catalog.len(), 4);
        assert!(catalog.is_zone("BA"));
        assert!(catalog.is_zone("FA"));
        assert!(!catalog.is_zone("OP"));
        assert!(!catalog.is_zone("RP"));
        assert_eq!(
            catalog.category("OP"),
            Some(&CodeCategory::Other("user".to_string()))
        );
        assert_eq!(catalog.category("ZZ"), None);
    }

    #[test]
    fn test_catalog_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        file.write_all(CODES_YAML.as_bytes()).unwrap();

        let catalog = CodeCatalog::load(file.path()).unwrap();
        assert!(catalog.is_zone("BA"));
    }

    #[test]
    fn test_catalog_missing_file_is_error() {
        let result = CodeCatalog::load("/nonexistent/codes.yml");
        assert!(matches!(result, Err(crate::Error::Settings(_))));
    }

    #[test]
    fn test_blacklist_from_yaml() {
        let blacklist = Blacklist::from_yaml_str("codes:\n  - code: \"9999\"\n  - code: ABCD\n").unwrap();

        assert_eq!(blacklist.len(), 2);
        assert!(blacklist.contains("9999"));
        assert!(blacklist.contains("ABCD"));
        assert!(!blacklist.contains("1234"));
    }

    #[test]
    fn test_blacklist_empty_list() {
        let blacklist = Blacklist::from_yaml_str("codes: []\n").unwrap();
        assert!(blacklist.is_empty());
    }

    #[test]
    fn test_blacklist_from_iter() {
        let blacklist: Blacklist = ["1111", "2222"].into_iter().collect();
        assert!(blacklist.contains("1111"));
        assert!(!blacklist.contains("3333"));
    }
}
