use std::collections::HashSet;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::ValidationError;

const MAX_SYMBOL_LEN: usize = 15;

/// Normalized ticker symbol in the price provider's format.
///
/// Normalization trims, uppercases and rewrites every `.` class separator to
/// `-` (`BRK.B` becomes `BRK-B`). Parsing an already normalized symbol yields
/// the same symbol.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Parse and normalize a symbol.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptySymbol);
        }

        let normalized = trimmed.to_ascii_uppercase().replace('.', "-");
        let len = normalized.chars().count();
        if len > MAX_SYMBOL_LEN {
            return Err(ValidationError::SymbolTooLong {
                len,
                max: MAX_SYMBOL_LEN,
            });
        }

        if let Some(first) = normalized.chars().next() {
            if !first.is_ascii_alphabetic() {
                return Err(ValidationError::SymbolInvalidStart { ch: first });
            }
        }

        for (index, ch) in normalized.chars().enumerate() {
            let valid = ch.is_ascii_alphanumeric() || ch == '-';
            if !valid {
                return Err(ValidationError::SymbolInvalidChar { ch, index });
            }
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Symbol {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for Symbol {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Symbol> for String {
    fn from(value: Symbol) -> Self {
        value.0
    }
}

/// Ordered, duplicate-free, non-empty set of symbols tracked by one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Universe {
    symbols: Vec<Symbol>,
}

impl Universe {
    /// Build a universe keeping the first occurrence of every symbol.
    pub fn new(symbols: impl IntoIterator<Item = Symbol>) -> Result<Self, ValidationError> {
        let mut seen = HashSet::new();
        let symbols: Vec<Symbol> = symbols
            .into_iter()
            .filter(|symbol| seen.insert(symbol.clone()))
            .collect();

        if symbols.is_empty() {
            return Err(ValidationError::EmptyUniverse);
        }
        Ok(Self { symbols })
    }

    /// Parse raw catalog entries into a universe.
    pub fn parse<I, S>(entries: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let symbols = entries
            .into_iter()
            .map(|entry| Symbol::parse(entry.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(symbols)
    }

    /// Keep at most `limit` symbols, preserving order.
    pub fn truncated(mut self, limit: usize) -> Self {
        self.symbols.truncate(limit.max(1));
        self
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }
}
