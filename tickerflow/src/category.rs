use derive_more::Display;
use serde::{Deserialize, Deserializer, Serialize};
use smol_str::{SmolStr, ToSmolStr};
use std::str::FromStr;

/// Uppercase ticker symbol used as the primary cache & request key.
///
/// Construction trims and uppercases, so `"aapl"` and `" AAPL "` are the same key.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display, Serialize)]
pub struct TickerKey(SmolStr);

impl TickerKey {
    pub fn new<S: AsRef<str>>(symbol: S) -> Self {
        Self(symbol.as_ref().trim().to_uppercase().to_smolstr())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for TickerKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TickerKey {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl AsRef<str> for TickerKey {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl<'de> Deserialize<'de> for TickerKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(TickerKey::new)
    }
}

/// Closed set of per-ticker data categories.
///
/// The wire identifiers double as the consumer's tab identifiers. Every category has an
/// independent cache lifetime and an independent failure domain.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display, Deserialize, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    #[display("ownership")]
    Ownership,
    #[display("activity")]
    Activity,
    #[display("hedge_funds")]
    HedgeFunds,
    #[display("insiders")]
    Insiders,
    #[display("congress")]
    Congress,
    #[display("options")]
    Options,
    #[display("dark_pool")]
    DarkPool,
    #[display("filings")]
    Filings,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Ownership,
        Category::Activity,
        Category::HedgeFunds,
        Category::Insiders,
        Category::Congress,
        Category::Options,
        Category::DarkPool,
        Category::Filings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Ownership => "ownership",
            Category::Activity => "activity",
            Category::HedgeFunds => "hedge_funds",
            Category::Insiders => "insiders",
            Category::Congress => "congress",
            Category::Options => "options",
            Category::DarkPool => "dark_pool",
            Category::Filings => "filings",
        }
    }
}

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Accept both snake_case and camelCase identifiers
        let folded: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .map(|c| c.to_ascii_lowercase())
            .collect();

        match folded.as_str() {
            "ownership" => Ok(Category::Ownership),
            "activity" => Ok(Category::Activity),
            "hedgefunds" => Ok(Category::HedgeFunds),
            "insiders" => Ok(Category::Insiders),
            "congress" => Ok(Category::Congress),
            "options" => Ok(Category::Options),
            "darkpool" => Ok(Category::DarkPool),
            "filings" => Ok(Category::Filings),
            _ => Err(UnknownCategory(s.to_smolstr())),
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, thiserror::Error)]
#[error("unknown category: {0}")]
pub struct UnknownCategory(pub SmolStr);

/// Upstream data provider.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display, Deserialize, Serialize,
)]
pub enum Provider {
    /// Financial Modeling Prep.
    #[serde(rename = "FMP", alias = "fmp")]
    #[display("FMP")]
    Fmp,
    /// Unusual Whales.
    #[serde(rename = "UW", alias = "uw")]
    #[display("UW")]
    UnusualWhales,
}

impl FromStr for Provider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fmp" => Ok(Provider::Fmp),
            "uw" | "unusual_whales" | "unusualwhales" => Ok(Provider::UnusualWhales),
            _ => Err(UnknownProvider(s.to_smolstr())),
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, thiserror::Error)]
#[error("unknown provider: {0}")]
pub struct UnknownProvider(pub SmolStr);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticker_key_case_insensitive() {
        assert_eq!(TickerKey::new("aapl"), TickerKey::new(" AAPL "));
        assert_eq!(TickerKey::new("brk.b").as_str(), "BRK.B");
    }

    #[test]
    fn test_de_ticker_key() {
        let actual: TickerKey = serde_json::from_str(r#""nvda""#).unwrap();
        assert_eq!(actual, TickerKey::new("NVDA"));
    }

    #[test]
    fn test_category_from_str() {
        struct TestCase {
            input: &'static str,
            expected: Result<Category, UnknownCategory>,
        }

        let tests = vec![
            TestCase {
                // TC0: snake_case wire identifier
                input: "dark_pool",
                expected: Ok(Category::DarkPool),
            },
            TestCase {
                // TC1: camelCase identifier
                input: "hedgeFunds",
                expected: Ok(Category::HedgeFunds),
            },
            TestCase {
                // TC2: uppercase identifier
                input: "FILINGS",
                expected: Ok(Category::Filings),
            },
            TestCase {
                // TC3: unknown identifier
                input: "crypto",
                expected: Err(UnknownCategory("crypto".into())),
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = test.input.parse::<Category>();
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_category_wire_names_match_display() {
        for category in Category::ALL {
            let json = serde_json::to_string(&category).unwrap();
            assert_eq!(json, format!("\"{}\"", category));
            assert_eq!(category.as_str().parse::<Category>(), Ok(category));
        }
    }
}
