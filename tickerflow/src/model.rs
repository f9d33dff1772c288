use crate::category::Provider;
use chrono::{DateTime, NaiveDate, Utc};
use derive_more::Display;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use smol_str::{SmolStr, ToSmolStr};
use std::cmp::Ordering;

/// Sentinel used for unknown or missing entity names.
pub const NAME_UNKNOWN: &str = "N/A";

/// Set of upstream [`Provider`]s that contributed to a record.
///
/// Rendered as `"FMP"`, `"UW"` or `"BOTH"`.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct Provenance {
    pub fmp: bool,
    pub uw: bool,
}

impl Provenance {
    pub const FMP: Self = Self { fmp: true, uw: false };
    pub const UW: Self = Self { fmp: false, uw: true };
    pub const BOTH: Self = Self { fmp: true, uw: true };

    pub fn contains(&self, provider: Provider) -> bool {
        match provider {
            Provider::Fmp => self.fmp,
            Provider::UnusualWhales => self.uw,
        }
    }

    pub fn union(self, other: Self) -> Self {
        Self {
            fmp: self.fmp || other.fmp,
            uw: self.uw || other.uw,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.fmp && !self.uw
    }

    pub fn as_str(&self) -> &'static str {
        match (self.fmp, self.uw) {
            (true, true) => "BOTH",
            (true, false) => "FMP",
            (false, true) => "UW",
            (false, false) => "NONE",
        }
    }
}

impl From<Provider> for Provenance {
    fn from(provider: Provider) -> Self {
        match provider {
            Provider::Fmp => Self::FMP,
            Provider::UnusualWhales => Self::UW,
        }
    }
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for Provenance {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Provenance {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        match raw.to_ascii_uppercase().as_str() {
            "BOTH" => Ok(Self::BOTH),
            "FMP" => Ok(Self::FMP),
            "UW" => Ok(Self::UW),
            "NONE" => Ok(Self::default()),
            other => Err(serde::de::Error::custom(format!(
                "unknown provenance: {other}"
            ))),
        }
    }
}

/// Option contract type of an options flow record.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionKind {
    #[display("call")]
    Call,
    #[display("put")]
    Put,
}

/// Normalised record shared by every [`Category`](crate::category::Category).
///
/// Numeric fields default to `0.0` so downstream arithmetic never has to handle missing
/// values, and `name` defaults to [`NAME_UNKNOWN`].
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct CanonicalRecord {
    /// Institution or entity name.
    pub name: SmolStr,
    /// Normalised institution identifier (CIK or upstream id), if any.
    pub institution_id: Option<SmolStr>,
    pub shares: f64,
    pub premium: f64,
    pub volume: f64,
    /// Positive for buys & inflows, negative for sells & outflows.
    pub signed_change: f64,
    pub price: f64,
    pub value: f64,
    pub option_kind: Option<OptionKind>,
    /// Event date.
    pub occurred_at: Option<DateTime<Utc>>,
    /// Disclosure or filing date.
    pub reported_at: Option<DateTime<Utc>>,
    /// 13F report period end.
    pub report_period: Option<NaiveDate>,
    pub is_hedge_fund: bool,
    /// Sorted & de-duplicated.
    pub tags: Vec<SmolStr>,
    /// Set when `occurred_at` is after `reported_at`.
    pub disclosure_anomaly: bool,
    pub provenance: Provenance,
}

impl CanonicalRecord {
    pub fn new(provenance: Provenance) -> Self {
        Self {
            name: SmolStr::new_static(NAME_UNKNOWN),
            institution_id: None,
            shares: 0.0,
            premium: 0.0,
            volume: 0.0,
            signed_change: 0.0,
            price: 0.0,
            value: 0.0,
            option_kind: None,
            occurred_at: None,
            reported_at: None,
            report_period: None,
            is_hedge_fund: false,
            tags: Vec::new(),
            disclosure_anomaly: false,
            provenance,
        }
    }

    pub fn has_name(&self) -> bool {
        self.name != NAME_UNKNOWN
    }

    /// Recompute `disclosure_anomaly` from the current timestamps.
    pub fn check_disclosure_order(&mut self) {
        self.disclosure_anomaly = matches!(
            (self.occurred_at, self.reported_at),
            (Some(occurred), Some(reported)) if occurred > reported
        );
    }

    /// Case-insensitive substring match against any tag.
    pub fn has_tag_containing(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.tags
            .iter()
            .any(|tag| tag.to_lowercase().contains(&needle))
    }

    /// Total order used to make merge folding & output independent of input order.
    pub(crate) fn content_cmp(&self, other: &Self) -> Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.reported_at.cmp(&other.reported_at))
            .then_with(|| self.occurred_at.cmp(&other.occurred_at))
            .then_with(|| self.shares.total_cmp(&other.shares))
            .then_with(|| self.value.total_cmp(&other.value))
            .then_with(|| self.signed_change.total_cmp(&other.signed_change))
            .then_with(|| self.price.total_cmp(&other.price))
            .then_with(|| self.premium.total_cmp(&other.premium))
            .then_with(|| self.volume.total_cmp(&other.volume))
            .then_with(|| self.tags.cmp(&other.tags))
            .then_with(|| self.is_hedge_fund.cmp(&other.is_hedge_fund))
            .then_with(|| self.provenance.cmp(&other.provenance))
    }
}

/// Normalise an institution identifier: trim, uppercase, and treat empty or the literal
/// `"None"` as missing.
pub fn normalise_institution_id(raw: &str) -> Option<SmolStr> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
        None
    } else {
        Some(trimmed.to_uppercase().to_smolstr())
    }
}

/// Normalise an entity name, mapping empty or the literal `"None"` to [`NAME_UNKNOWN`].
pub fn normalise_name(raw: &str) -> SmolStr {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
        SmolStr::new_static(NAME_UNKNOWN)
    } else {
        trimmed.to_smolstr()
    }
}

/// Identity of a 13F-style filing: (normalised institution, report period).
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize)]
pub struct FilingKey {
    pub institution: SmolStr,
    pub report_period: Option<NaiveDate>,
}

impl FilingKey {
    /// Derive the identity of a record.
    ///
    /// Falls back to the uppercased entity name when no institution identifier is present.
    /// Returns `None` for anonymous records, which are never grouped.
    pub fn of(record: &CanonicalRecord) -> Option<Self> {
        let institution = match &record.institution_id {
            Some(id) => id.clone(),
            None if record.has_name() => normalise_institution_id(&record.name)?,
            None => return None,
        };

        Some(Self {
            institution,
            report_period: record.report_period,
        })
    }
}

/// Merged 13F-style filing.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct FilingRecord {
    /// `None` for anonymous filings that could not be grouped.
    pub key: Option<FilingKey>,
    pub record: CanonicalRecord,
}

impl FilingRecord {
    pub fn from_record(record: CanonicalRecord) -> Self {
        Self {
            key: FilingKey::of(&record),
            record,
        }
    }

    pub fn into_record(self) -> CanonicalRecord {
        self.record
    }

    pub fn institution(&self) -> Option<&str> {
        self.key.as_ref().map(|key| key.institution.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalise_name() {
        struct TestCase {
            input: &'static str,
            expected: &'static str,
        }

        let tests = vec![
            TestCase {
                // TC0: literal "None" is the sentinel
                input: "None",
                expected: NAME_UNKNOWN,
            },
            TestCase {
                // TC1: whitespace only is the sentinel
                input: "   ",
                expected: NAME_UNKNOWN,
            },
            TestCase {
                // TC2: names are trimmed but case is kept
                input: "  Vanguard Group Inc ",
                expected: "Vanguard Group Inc",
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = normalise_name(test.input);
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_normalise_institution_id() {
        assert_eq!(normalise_institution_id(" 0000102909 "), Some("0000102909".into()));
        assert_eq!(normalise_institution_id("blackrock"), Some("BLACKROCK".into()));
        assert_eq!(normalise_institution_id("None"), None);
        assert_eq!(normalise_institution_id(""), None);
    }

    #[test]
    fn test_provenance_serde() {
        assert_eq!(serde_json::to_string(&Provenance::BOTH).unwrap(), r#""BOTH""#);
        assert_eq!(
            Provenance::from(Provider::Fmp).union(Provider::UnusualWhales.into()),
            Provenance::BOTH
        );
        let actual: Provenance = serde_json::from_str(r#""uw""#).unwrap();
        assert_eq!(actual, Provenance::UW);
    }

    #[test]
    fn test_filing_key_falls_back_to_name() {
        let mut record = CanonicalRecord::new(Provenance::FMP);
        assert_eq!(FilingKey::of(&record), None);

        record.name = "Citadel Advisors".into();
        assert_eq!(
            FilingKey::of(&record).map(|key| key.institution),
            Some("CITADEL ADVISORS".into())
        );

        record.institution_id = Some("0001423053".into());
        assert_eq!(
            FilingKey::of(&record).map(|key| key.institution),
            Some("0001423053".into())
        );
    }

    #[test]
    fn test_check_disclosure_order() {
        let mut record = CanonicalRecord::new(Provenance::UW);
        record.occurred_at = DateTime::from_timestamp(1_700_000_000, 0);
        record.reported_at = DateTime::from_timestamp(1_600_000_000, 0);
        record.check_disclosure_order();
        assert!(record.disclosure_anomaly);

        record.reported_at = DateTime::from_timestamp(1_800_000_000, 0);
        record.check_disclosure_order();
        assert!(!record.disclosure_anomaly);
    }
}
