use crate::error::{DomainError, DomainResult};
use std::collections::HashMap;

/// Maps ISO country codes to the numeric dialing codes recorded on the
/// energy ledger.
///
/// The table is configured as a comma-separated list of `CODE=number`
/// entries, e.g. `"NG=234,KE=254,ZA=27"`. Lookups are exact; codes are not
/// case-normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountryCodes {
    codes: HashMap<String, u32>,
}

impl CountryCodes {
    /// Default table covering the deployed mini-grid countries.
    pub const DEFAULT_SPEC: &'static str = "NG=234,KE=254,ZA=27";

    /// Parse a `CODE=number` list into a country table.
    ///
    /// Empty segments are skipped, whitespace around entries is trimmed.
    pub fn from_spec(spec: &str) -> DomainResult<Self> {
        let mut codes = HashMap::new();
        for entry in spec.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let (code, number) = entry
                .split_once('=')
                .ok_or_else(|| DomainError::InvalidCountryTable(entry.to_string()))?;
            let code = code.trim();
            if code.is_empty() {
                return Err(DomainError::InvalidCountryTable(entry.to_string()));
            }
            let number = number
                .trim()
                .parse::<u32>()
                .map_err(|_| DomainError::InvalidCountryTable(entry.to_string()))?;
            codes.insert(code.to_string(), number);
        }
        Ok(Self { codes })
    }

    /// Numeric code for a country, or `None` when the country is not in the
    /// table.
    pub fn resolve(&self, country_code: &str) -> Option<u32> {
        self.codes.get(country_code).copied()
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

impl Default for CountryCodes {
    fn default() -> Self {
        let mut codes = HashMap::new();
        codes.insert("NG".to_string(), 234);
        codes.insert("KE".to_string(), 254);
        codes.insert("ZA".to_string(), 27);
        Self { codes }
    }
}
