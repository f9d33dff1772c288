use crate::{
    category::Category,
    model::{CanonicalRecord, OptionKind, Provenance},
};
use serde::{Deserialize, Serialize};

/// Options flow premium summary.
#[derive(Clone, Copy, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct OptionsFlowStats {
    pub call_premium: f64,
    pub put_premium: f64,
    /// `put_premium / call_premium`, defined as `0` when there is no call premium.
    pub put_call_ratio: f64,
}

/// Dark-pool print summary.
#[derive(Clone, Copy, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct DarkPoolStats {
    pub total_volume: f64,
    pub total_notional: f64,
    pub print_count: usize,
}

/// Buy/sell split of signed transactions.
#[derive(Clone, Copy, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct TransactionStats {
    pub buys: usize,
    pub sells: usize,
    /// Sum of `signed_change`.
    pub net_change: f64,
}

#[derive(Clone, Copy, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct FilingStats {
    pub count: usize,
    /// Filings confirmed by both providers.
    pub both_sources: usize,
}

/// Summary metrics derived from whichever categories are resolved.
///
/// Never cached: recomputed from the current category data on every snapshot, so partial data
/// yields partial stats.
#[derive(Clone, Copy, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct DerivedStats {
    pub reference_price: f64,
    pub total_institutions: usize,
    pub total_hedge_funds: usize,
    pub total_institutional_shares: f64,
    pub total_institutional_value: f64,
    /// Buyers minus sellers among institutional activity records.
    pub net_activity: i64,
    pub options_flow: OptionsFlowStats,
    pub dark_pool: DarkPoolStats,
    pub insiders: TransactionStats,
    pub congress: TransactionStats,
    pub filings: FilingStats,
}

impl DerivedStats {
    /// True when no resolved category contributed anything.
    pub fn is_empty(&self) -> bool {
        *self
            == Self {
                reference_price: self.reference_price,
                ..Self::default()
            }
    }
}

/// Compute [`DerivedStats`] from resolved category data. Pure & deterministic.
///
/// Categories may be absent or repeated; repeated categories accumulate. Non-finite
/// contributions count as `0`.
pub fn compute_stats<'a, I>(categories: I, reference_price: f64) -> DerivedStats
where
    I: IntoIterator<Item = (Category, &'a [CanonicalRecord])>,
{
    let reference_price = finite(reference_price);
    let mut stats = DerivedStats {
        reference_price,
        ..DerivedStats::default()
    };

    for (category, records) in categories {
        match category {
            Category::Ownership => {
                stats.total_institutions += records.len();
                stats.total_institutional_shares +=
                    records.iter().map(|record| finite(record.shares)).sum::<f64>();
            }
            Category::HedgeFunds => {
                stats.total_hedge_funds += records.len();
            }
            Category::Activity => {
                stats.net_activity += records
                    .iter()
                    .map(|record| signum(record.signed_change))
                    .sum::<i64>();
            }
            Category::Options => {
                for record in records {
                    match record.option_kind {
                        Some(OptionKind::Call) => {
                            stats.options_flow.call_premium += finite(record.premium)
                        }
                        Some(OptionKind::Put) => {
                            stats.options_flow.put_premium += finite(record.premium)
                        }
                        None => {}
                    }
                }
            }
            Category::DarkPool => {
                stats.dark_pool.print_count += records.len();
                for record in records {
                    let volume = finite(record.volume);
                    stats.dark_pool.total_volume += volume;
                    stats.dark_pool.total_notional += finite(volume * record.price);
                }
            }
            Category::Insiders => accumulate_transactions(&mut stats.insiders, records),
            Category::Congress => accumulate_transactions(&mut stats.congress, records),
            Category::Filings => {
                stats.filings.count += records.len();
                stats.filings.both_sources += records
                    .iter()
                    .filter(|record| record.provenance == Provenance::BOTH)
                    .count();
            }
        }
    }

    stats.total_institutional_value = finite(stats.total_institutional_shares * reference_price);
    stats.options_flow.put_call_ratio = if stats.options_flow.call_premium > 0.0 {
        finite(stats.options_flow.put_premium / stats.options_flow.call_premium)
    } else {
        0.0
    };

    stats
}

/// Reference price implied by the data: latest dark-pool print, else latest options record
/// carrying an underlying price.
pub fn implied_reference_price<'a, I>(categories: I) -> Option<f64>
where
    I: IntoIterator<Item = (Category, &'a [CanonicalRecord])>,
{
    let mut dark_pool = None;
    let mut options = None;

    for (category, records) in categories {
        let slot = match category {
            Category::DarkPool => &mut dark_pool,
            Category::Options => &mut options,
            _ => continue,
        };

        if let Some(latest) = records
            .iter()
            .filter(|record| record.price.is_finite() && record.price > 0.0)
            .max_by_key(|record| record.occurred_at)
        {
            *slot = Some(latest.price);
        }
    }

    dark_pool.or(options)
}

fn accumulate_transactions(stats: &mut TransactionStats, records: &[CanonicalRecord]) {
    for record in records {
        match signum(record.signed_change) {
            1 => stats.buys += 1,
            -1 => stats.sells += 1,
            _ => {}
        }
        stats.net_change += finite(record.signed_change);
    }
}

fn signum(value: f64) -> i64 {
    if value > 0.0 {
        1
    } else if value < 0.0 {
        -1
    } else {
        0
    }
}

fn finite(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn record(configure: impl FnOnce(&mut CanonicalRecord)) -> CanonicalRecord {
        let mut record = CanonicalRecord::new(Provenance::UW);
        configure(&mut record);
        record
    }

    #[test]
    fn test_total_institutional_value() {
        let ownership: Vec<_> = [100.0, 200.0, 300.0]
            .into_iter()
            .map(|shares| record(|r| r.shares = shares))
            .collect();

        let stats = compute_stats([(Category::Ownership, ownership.as_slice())], 10.0);

        assert_eq!(stats.total_institutions, 3);
        assert_eq!(stats.total_institutional_shares, 600.0);
        assert_eq!(stats.total_institutional_value, 6000.0);
    }

    #[test]
    fn test_put_call_ratio() {
        struct TestCase {
            input: Vec<(OptionKind, f64)>,
            expected: f64,
        }

        let tests = vec![
            TestCase {
                // TC0: no call premium is defined as 0
                input: vec![(OptionKind::Put, 500.0)],
                expected: 0.0,
            },
            TestCase {
                // TC1: ratio of put to call premium
                input: vec![
                    (OptionKind::Put, 300.0),
                    (OptionKind::Call, 400.0),
                    (OptionKind::Call, 200.0),
                ],
                expected: 0.5,
            },
            TestCase {
                // TC2: no options at all
                input: vec![],
                expected: 0.0,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let options: Vec<_> = test
                .input
                .into_iter()
                .map(|(kind, premium)| {
                    record(|r| {
                        r.option_kind = Some(kind);
                        r.premium = premium;
                    })
                })
                .collect();

            let stats = compute_stats([(Category::Options, options.as_slice())], 0.0);
            assert_eq!(stats.options_flow.put_call_ratio, test.expected, "TC{} failed", index);
            assert!(stats.options_flow.put_call_ratio.is_finite(), "TC{} failed", index);
        }
    }

    #[test]
    fn test_net_activity_and_transactions() {
        let activity: Vec<_> = [500.0, -20.0, 0.0, 30.0]
            .into_iter()
            .map(|change| record(|r| r.signed_change = change))
            .collect();
        let insiders: Vec<_> = [-1000.0, -200.0, 50.0]
            .into_iter()
            .map(|change| record(|r| r.signed_change = change))
            .collect();

        let stats = compute_stats(
            [
                (Category::Activity, activity.as_slice()),
                (Category::Insiders, insiders.as_slice()),
            ],
            0.0,
        );

        assert_eq!(stats.net_activity, 1);
        assert_eq!(stats.insiders.buys, 1);
        assert_eq!(stats.insiders.sells, 2);
        assert_eq!(stats.insiders.net_change, -1150.0);
        assert_eq!(stats.congress, TransactionStats::default());
    }

    #[test]
    fn test_dark_pool_and_non_finite_values() {
        let prints = vec![
            record(|r| {
                r.volume = 1000.0;
                r.price = 10.0;
            }),
            record(|r| {
                r.volume = f64::NAN;
                r.price = 10.0;
            }),
            record(|r| r.volume = 500.0),
        ];

        let stats = compute_stats([(Category::DarkPool, prints.as_slice())], f64::INFINITY);

        assert_eq!(stats.dark_pool.total_volume, 1500.0);
        assert_eq!(stats.dark_pool.total_notional, 10_000.0);
        assert_eq!(stats.dark_pool.print_count, 3);
        assert_eq!(stats.reference_price, 0.0);
    }

    #[test]
    fn test_partial_stats_are_empty_without_data() {
        assert!(compute_stats([], 42.0).is_empty());

        let hedge_funds = vec![record(|_| {})];
        let stats = compute_stats([(Category::HedgeFunds, hedge_funds.as_slice())], 0.0);
        assert!(!stats.is_empty());
        assert_eq!(stats.total_hedge_funds, 1);
    }

    #[test]
    fn test_implied_reference_price() {
        let dark_pool = vec![
            record(|r| {
                r.price = 101.0;
                r.occurred_at = DateTime::from_timestamp(1_700_000_100, 0);
            }),
            record(|r| {
                r.price = 100.0;
                r.occurred_at = DateTime::from_timestamp(1_700_000_000, 0);
            }),
        ];
        let options = vec![record(|r| r.price = 99.0)];

        assert_eq!(
            implied_reference_price([
                (Category::Options, options.as_slice()),
                (Category::DarkPool, dark_pool.as_slice()),
            ]),
            Some(101.0)
        );
        assert_eq!(
            implied_reference_price([(Category::Options, options.as_slice())]),
            Some(99.0)
        );
        assert_eq!(implied_reference_price([]), None);
    }
}
