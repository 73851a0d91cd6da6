use std::collections::BTreeMap;

/// Static `TICKER -> provider id` table with per-actor overrides.
///
/// Lookups never guess: a ticker missing from both the table and the
/// overrides is unknown to the provider.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    entries: &'static [(&'static str, &'static str)],
    overrides: BTreeMap<String, String>,
}

impl SymbolTable {
    pub fn new(
        entries: &'static [(&'static str, &'static str)],
        overrides: &BTreeMap<String, String>,
    ) -> Self {
        let overrides = overrides
            .iter()
            .map(|(ticker, native)| (ticker.trim().to_ascii_uppercase(), native.trim().to_owned()))
            .filter(|(ticker, native)| !ticker.is_empty() && !native.is_empty())
            .collect();
        Self { entries, overrides }
    }

    pub fn lookup(&self, ticker: &str) -> Option<&str> {
        if let Some(native) = self.overrides.get(ticker) {
            return Some(native.as_str());
        }

        self.entries
            .iter()
            .find(|(known, _)| *known == ticker)
            .map(|(_, native)| *native)
    }

    pub fn len(&self) -> usize {
        self.entries.len() + self.overrides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
