//! Cross-provider 13F filing de-duplication, plus the filter & sort facility consumers run over
//! the merged set.

use crate::{
    category::Provider,
    model::{CanonicalRecord, FilingKey, FilingRecord, Provenance},
};
use chrono::{DateTime, NaiveDate, Utc};
use fnv::FnvHashMap;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

/// Provider priority used to resolve conflicting field values for the same filing.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Deserialize, Serialize)]
pub struct MergePolicy {
    /// Highest priority first.
    pub priority: [Provider; 2],
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self {
            priority: [Provider::Fmp, Provider::UnusualWhales],
        }
    }
}

impl MergePolicy {
    pub fn preferring(provider: Provider) -> Self {
        match provider {
            Provider::Fmp => Self::default(),
            Provider::UnusualWhales => Self {
                priority: [Provider::UnusualWhales, Provider::Fmp],
            },
        }
    }

    /// Rank of a record's provenance; lower is preferred. Multi-source records rank with their
    /// best contributor.
    fn rank(&self, provenance: Provenance) -> usize {
        self.priority
            .iter()
            .position(|provider| provenance.contains(*provider))
            .unwrap_or(self.priority.len())
    }
}

/// Groups filings by [`FilingKey`] and folds each group into one [`FilingRecord`].
#[derive(Copy, Clone, Debug, Default)]
pub struct FilingMerger {
    policy: MergePolicy,
}

impl FilingMerger {
    pub fn new(policy: MergePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> MergePolicy {
        self.policy
    }

    /// Merge normalised filings from every provider.
    ///
    /// The result depends only on the multiset of inputs, never on their order: group members
    /// are folded in (priority, content) order and output is sorted by identity key. Records
    /// without an identity (anonymous) pass through unmerged.
    pub fn merge<I>(&self, records: I) -> Vec<FilingRecord>
    where
        I: IntoIterator<Item = CanonicalRecord>,
    {
        let mut groups: FnvHashMap<FilingKey, Vec<CanonicalRecord>> = FnvHashMap::default();
        let mut anonymous = Vec::new();

        for record in records {
            match FilingKey::of(&record) {
                Some(key) => groups.entry(key).or_default().push(record),
                None => anonymous.push(record),
            }
        }

        let mut merged: Vec<FilingRecord> = groups
            .into_iter()
            .filter_map(|(key, group)| {
                self.fold(&key, group).map(|record| FilingRecord {
                    key: Some(key),
                    record,
                })
            })
            .collect();

        merged.extend(
            anonymous
                .into_iter()
                .map(|record| FilingRecord { key: None, record }),
        );

        merged.sort_by(|a, b| {
            a.key
                .cmp(&b.key)
                .then_with(|| a.record.content_cmp(&b.record))
        });
        merged
    }

    fn fold(&self, key: &FilingKey, mut group: Vec<CanonicalRecord>) -> Option<CanonicalRecord> {
        group.sort_by(|a, b| {
            self.policy
                .rank(a.provenance)
                .cmp(&self.policy.rank(b.provenance))
                .then_with(|| a.content_cmp(b))
        });

        let mut merged = group
            .into_iter()
            .reduce(|merged, other| absorb(key, merged, other))?;

        merged.tags.sort();
        merged.tags.dedup();
        merged.check_disclosure_order();
        Some(merged)
    }
}

/// Fold a lower priority group member into the merged record.
fn absorb(key: &FilingKey, mut merged: CanonicalRecord, other: CanonicalRecord) -> CanonicalRecord {
    if merged.has_name() && other.has_name() && merged.name != other.name {
        debug!(
            institution = %key.institution,
            kept = %merged.name,
            discarded = %other.name,
            "filing name conflict resolved by provider priority"
        );
    }
    if !merged.has_name() && other.has_name() {
        merged.name = other.name;
    }

    merged.institution_id = merged.institution_id.or(other.institution_id);
    merged.shares = prefer_non_zero(merged.shares, other.shares);
    merged.premium = prefer_non_zero(merged.premium, other.premium);
    merged.volume = prefer_non_zero(merged.volume, other.volume);
    merged.signed_change = prefer_non_zero(merged.signed_change, other.signed_change);
    merged.price = prefer_non_zero(merged.price, other.price);
    merged.value = prefer_non_zero(merged.value, other.value);
    merged.option_kind = merged.option_kind.or(other.option_kind);
    merged.occurred_at = earliest(merged.occurred_at, other.occurred_at);
    merged.reported_at = earliest(merged.reported_at, other.reported_at);
    merged.report_period = merged.report_period.or(other.report_period);
    merged.is_hedge_fund |= other.is_hedge_fund;
    merged.tags.extend(other.tags);
    merged.provenance = merged.provenance.union(other.provenance);
    merged
}

fn prefer_non_zero(current: f64, candidate: f64) -> f64 {
    if current == 0.0 { candidate } else { current }
}

fn earliest(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

/// Holder filter over the `is_hedge_fund` flag.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HolderFilter {
    #[default]
    All,
    HedgeFundsOnly,
    OthersOnly,
}

/// Sort key for merged filings.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilingSort {
    /// Most recent `reported_at` first, missing dates last, ties by name ascending.
    #[default]
    ReportedAt,
    Name,
    InstitutionId,
}

/// Filter & sort specification over merged filings.
#[derive(Clone, Eq, PartialEq, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct FilingQuery {
    pub holders: HolderFilter,
    /// Exact provenance match (`FMP`, `UW` or `BOTH`).
    pub source: Option<Provenance>,
    /// Inclusive bounds on the `reported_at` date.
    pub reported_from: Option<NaiveDate>,
    pub reported_to: Option<NaiveDate>,
    /// Case-insensitive substring matched against each tag.
    pub tag: Option<String>,
    pub sort: FilingSort,
    pub limit: Option<usize>,
}

impl FilingQuery {
    pub fn matches(&self, filing: &FilingRecord) -> bool {
        let record = &filing.record;

        let holder_ok = match self.holders {
            HolderFilter::All => true,
            HolderFilter::HedgeFundsOnly => record.is_hedge_fund,
            HolderFilter::OthersOnly => !record.is_hedge_fund,
        };

        let source_ok = self
            .source
            .is_none_or(|source| source == record.provenance);

        let date_ok = if self.reported_from.is_none() && self.reported_to.is_none() {
            true
        } else {
            record.reported_at.is_some_and(|reported| {
                let date = reported.date_naive();
                self.reported_from.is_none_or(|from| date >= from)
                    && self.reported_to.is_none_or(|to| date <= to)
            })
        };

        let tag_ok = self
            .tag
            .as_deref()
            .is_none_or(|tag| record.has_tag_containing(tag));

        holder_ok && source_ok && date_ok && tag_ok
    }

    /// Total order for the configured sort key.
    pub fn compare(&self, a: &FilingRecord, b: &FilingRecord) -> Ordering {
        let primary = match self.sort {
            FilingSort::ReportedAt => match (a.record.reported_at, b.record.reported_at) {
                (Some(a), Some(b)) => b.cmp(&a),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
            .then_with(|| a.record.name.cmp(&b.record.name)),
            FilingSort::Name => a.record.name.cmp(&b.record.name),
            FilingSort::InstitutionId => a.institution().cmp(&b.institution()),
        };

        primary
            .then_with(|| a.key.cmp(&b.key))
            .then_with(|| a.record.content_cmp(&b.record))
    }

    pub fn apply<'a, I>(&self, filings: I) -> Vec<FilingRecord>
    where
        I: IntoIterator<Item = &'a FilingRecord>,
    {
        filings
            .into_iter()
            .filter(|filing| self.matches(filing))
            .sorted_by(|a, b| self.compare(a, b))
            .take(self.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NAME_UNKNOWN;

    fn filing(
        provider: Provider,
        institution_id: Option<&str>,
        name: &str,
        period: (i32, u32, u32),
        reported: &str,
    ) -> CanonicalRecord {
        let mut record = CanonicalRecord::new(Provenance::from(provider));
        record.institution_id = institution_id.map(Into::into);
        record.name = name.into();
        record.report_period = NaiveDate::from_ymd_opt(period.0, period.1, period.2);
        record.reported_at = Some(
            DateTime::parse_from_rfc3339(reported)
                .unwrap()
                .with_timezone(&Utc),
        );
        record
    }

    fn fmp_uw_pair() -> (Vec<CanonicalRecord>, Vec<CanonicalRecord>) {
        let mut fmp_berkshire = filing(
            Provider::Fmp,
            Some("0001067983"),
            "BERKSHIRE HATHAWAY INC",
            (2023, 12, 31),
            "2024-02-14T00:00:00Z",
        );
        fmp_berkshire.shares = 905_560_000.0;

        let mut uw_berkshire = filing(
            Provider::UnusualWhales,
            Some("0001067983"),
            "Berkshire Hathaway",
            (2023, 12, 31),
            "2024-02-13T00:00:00Z",
        );
        uw_berkshire.value = 161_750_000_000.0;
        uw_berkshire.tags = vec!["value_investor".into()];

        let mut uw_citadel = filing(
            Provider::UnusualWhales,
            Some("0001423053"),
            "CITADEL ADVISORS LLC",
            (2023, 12, 31),
            "2024-02-14T00:00:00Z",
        );
        uw_citadel.is_hedge_fund = true;
        uw_citadel.tags = vec!["hedge_fund".into()];

        let fmp_vanguard = filing(
            Provider::Fmp,
            Some("0000102909"),
            NAME_UNKNOWN,
            (2023, 12, 31),
            "2024-02-09T00:00:00Z",
        );
        let uw_vanguard = filing(
            Provider::UnusualWhales,
            Some("0000102909"),
            "VANGUARD GROUP INC",
            (2023, 12, 31),
            "2024-02-12T00:00:00Z",
        );

        (
            vec![fmp_berkshire, fmp_vanguard],
            vec![uw_berkshire, uw_citadel, uw_vanguard],
        )
    }

    #[test]
    fn test_merge_same_identity_key_yields_both_provenance() {
        let (fmp, uw) = fmp_uw_pair();
        let merged = FilingMerger::default().merge(fmp.into_iter().chain(uw));

        assert_eq!(merged.len(), 3);

        let berkshire = merged
            .iter()
            .find(|filing| filing.institution() == Some("0001067983"))
            .unwrap();
        assert_eq!(berkshire.record.provenance, Provenance::BOTH);
        // FMP name wins by priority, earliest reported_at wins regardless of provider
        assert_eq!(berkshire.record.name, "BERKSHIRE HATHAWAY INC");
        assert_eq!(
            berkshire.record.reported_at.map(|at| at.date_naive()),
            NaiveDate::from_ymd_opt(2024, 2, 13)
        );
        // Most complete values come from whichever provider has them
        assert_eq!(berkshire.record.shares, 905_560_000.0);
        assert_eq!(berkshire.record.value, 161_750_000_000.0);
        assert_eq!(berkshire.record.tags, vec!["value_investor"]);

        let vanguard = merged
            .iter()
            .find(|filing| filing.institution() == Some("0000102909"))
            .unwrap();
        // Non "N/A" name preferred over priority
        assert_eq!(vanguard.record.name, "VANGUARD GROUP INC");
        assert_eq!(vanguard.record.provenance, Provenance::BOTH);

        let citadel = merged
            .iter()
            .find(|filing| filing.institution() == Some("0001423053"))
            .unwrap();
        assert_eq!(citadel.record.provenance, Provenance::UW);
    }

    #[test]
    fn test_merge_is_commutative() {
        let (fmp, uw) = fmp_uw_pair();
        let merger = FilingMerger::default();

        let a_then_b = merger.merge(fmp.iter().cloned().chain(uw.iter().cloned()));
        let b_then_a = merger.merge(uw.iter().cloned().chain(fmp.iter().cloned()));
        let shuffled = merger.merge(
            vec![uw[2].clone(), fmp[0].clone(), uw[0].clone(), fmp[1].clone(), uw[1].clone()],
        );

        assert_eq!(a_then_b, b_then_a);
        assert_eq!(a_then_b, shuffled);
    }

    #[test]
    fn test_merge_policy_preferring_uw() {
        let (fmp, uw) = fmp_uw_pair();
        let merged = FilingMerger::new(MergePolicy::preferring(Provider::UnusualWhales))
            .merge(fmp.into_iter().chain(uw));

        let berkshire = merged
            .iter()
            .find(|filing| filing.institution() == Some("0001067983"))
            .unwrap();
        assert_eq!(berkshire.record.name, "Berkshire Hathaway");
    }

    #[test]
    fn test_merge_different_periods_stay_separate() {
        let q3 = filing(Provider::Fmp, Some("1"), "A", (2023, 9, 30), "2023-11-14T00:00:00Z");
        let q4 = filing(
            Provider::UnusualWhales,
            Some("1"),
            "A",
            (2023, 12, 31),
            "2024-02-14T00:00:00Z",
        );

        let merged = FilingMerger::default().merge(vec![q3, q4]);
        assert_eq!(merged.len(), 2);
        assert!(merged.iter().all(|filing| filing.record.provenance != Provenance::BOTH));
    }

    #[test]
    fn test_merge_anonymous_records_are_not_grouped() {
        let a = filing(Provider::Fmp, None, NAME_UNKNOWN, (2023, 12, 31), "2024-02-14T00:00:00Z");
        let b = filing(
            Provider::UnusualWhales,
            None,
            NAME_UNKNOWN,
            (2023, 12, 31),
            "2024-02-14T00:00:00Z",
        );

        let merged = FilingMerger::default().merge(vec![a, b]);
        assert_eq!(merged.len(), 2);
        assert!(merged.iter().all(|filing| filing.key.is_none()));
    }

    #[test]
    fn test_filing_query() {
        let (fmp, uw) = fmp_uw_pair();
        let merged = FilingMerger::default().merge(fmp.into_iter().chain(uw));

        struct TestCase {
            query: FilingQuery,
            expected: Vec<&'static str>,
        }

        let tests = vec![
            TestCase {
                // TC0: default sort is reported_at descending, ties by name ascending
                query: FilingQuery::default(),
                expected: vec!["0001423053", "0001067983", "0000102909"],
            },
            TestCase {
                // TC1: hedge funds only
                query: FilingQuery {
                    holders: HolderFilter::HedgeFundsOnly,
                    ..FilingQuery::default()
                },
                expected: vec!["0001423053"],
            },
            TestCase {
                // TC2: others only, sorted by name
                query: FilingQuery {
                    holders: HolderFilter::OthersOnly,
                    sort: FilingSort::Name,
                    ..FilingQuery::default()
                },
                expected: vec!["0001067983", "0000102909"],
            },
            TestCase {
                // TC3: inclusive date range on reported_at
                query: FilingQuery {
                    reported_from: NaiveDate::from_ymd_opt(2024, 2, 12),
                    reported_to: NaiveDate::from_ymd_opt(2024, 2, 13),
                    sort: FilingSort::InstitutionId,
                    ..FilingQuery::default()
                },
                expected: vec!["0001067983"],
            },
            TestCase {
                // TC4: case-insensitive tag containment
                query: FilingQuery {
                    tag: Some("VALUE".to_string()),
                    ..FilingQuery::default()
                },
                expected: vec!["0001067983"],
            },
            TestCase {
                // TC5: single source filter & institution id sort
                query: FilingQuery {
                    source: Some(Provenance::BOTH),
                    sort: FilingSort::InstitutionId,
                    ..FilingQuery::default()
                },
                expected: vec!["0000102909", "0001067983"],
            },
            TestCase {
                // TC6: limit
                query: FilingQuery {
                    limit: Some(1),
                    ..FilingQuery::default()
                },
                expected: vec!["0001423053"],
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual: Vec<String> = test
                .query
                .apply(&merged)
                .iter()
                .filter_map(|filing| filing.institution().map(str::to_string))
                .collect();
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }
}
