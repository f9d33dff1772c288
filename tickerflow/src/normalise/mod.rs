use self::de::{FieldReader, parse_amount_range};
use crate::{
    category::{Category, Provider},
    model::{CanonicalRecord, OptionKind, Provenance, normalise_institution_id, normalise_name},
    provider::RawProviderRecord,
};
use tracing::debug;

/// Lenient JSON field coercion helpers.
pub mod de;

/// Field priority lists for Financial Modeling Prep payloads.
pub mod fmp;

/// Field priority lists for Unusual Whales payloads.
pub mod uw;

/// Ordered candidate field names for each [`CanonicalRecord`] field.
///
/// For every field the first candidate present in the raw record wins. An empty list means the
/// provider never supplies that field for the category.
#[derive(Debug, Clone, Copy)]
pub struct FieldMap {
    pub name: &'static [&'static str],
    pub institution_id: &'static [&'static str],
    pub shares: &'static [&'static str],
    pub premium: &'static [&'static str],
    /// Premium expressed in minor units (cents).
    pub premium_minor: &'static [&'static str],
    pub volume: &'static [&'static str],
    /// Token style amounts in base units, scaled by `decimals`. Used when `volume` is absent.
    pub volume_base_units: &'static [&'static str],
    pub decimals: &'static [&'static str],
    pub signed_change: &'static [&'static str],
    pub price: &'static [&'static str],
    pub value: &'static [&'static str],
    /// Dollar amount ranges (`"$1,001 - $15,000"`), normalised to the midpoint `value`.
    pub amount_range: &'static [&'static str],
    pub occurred_at: &'static [&'static str],
    pub reported_at: &'static [&'static str],
    pub report_period: &'static [&'static str],
    /// Transaction type strings forcing the sign of `signed_change`.
    pub transaction_type: &'static [&'static str],
    pub option_kind: &'static [&'static str],
    pub hedge_fund: &'static [&'static str],
    pub tags: &'static [&'static str],
}

impl FieldMap {
    pub const EMPTY: FieldMap = FieldMap {
        name: &[],
        institution_id: &[],
        shares: &[],
        premium: &[],
        premium_minor: &[],
        volume: &[],
        volume_base_units: &[],
        decimals: &[],
        signed_change: &[],
        price: &[],
        value: &[],
        amount_range: &[],
        occurred_at: &[],
        reported_at: &[],
        report_period: &[],
        transaction_type: &[],
        option_kind: &[],
        hedge_fund: &[],
        tags: &[],
    };
}

/// Output of [`normalise`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Normalised {
    pub records: Vec<CanonicalRecord>,
    /// Count of present-but-unparsable values and non-object records that were defaulted or
    /// skipped.
    pub anomalies: usize,
}

/// Map provider-native records for one [`Category`] into [`CanonicalRecord`]s.
///
/// Pure: performs no I/O and never fails. Unparsable values default (`0`, `None`, `"N/A"`)
/// and are tallied in [`Normalised::anomalies`].
pub fn normalise(
    category: Category,
    provider: Provider,
    raw: Vec<RawProviderRecord>,
) -> Normalised {
    let fields = field_map(provider, category);
    let mut output = Normalised {
        records: Vec::with_capacity(raw.len()),
        anomalies: 0,
    };

    for record in raw {
        let Some(object) = record.as_object() else {
            output.anomalies += 1;
            continue;
        };

        let mut reader = FieldReader::new(object);
        let canonical = normalise_record(category, provider, fields, &mut reader);
        output.anomalies += reader.anomalies();
        output.records.push(canonical);
    }

    if output.anomalies > 0 {
        debug!(
            %provider,
            %category,
            anomalies = output.anomalies,
            records = output.records.len(),
            "normalisation defaulted unparsable values"
        );
    }

    output
}

/// Field priority lists for a provider & category.
pub fn field_map(provider: Provider, category: Category) -> &'static FieldMap {
    match provider {
        Provider::Fmp => fmp::fields(category),
        Provider::UnusualWhales => uw::fields(category),
    }
}

fn normalise_record(
    category: Category,
    provider: Provider,
    fields: &FieldMap,
    reader: &mut FieldReader<'_>,
) -> CanonicalRecord {
    let mut record = CanonicalRecord::new(Provenance::from(provider));

    if let Some(name) = reader.text(fields.name) {
        record.name = normalise_name(&name);
    }
    record.institution_id = reader
        .text(fields.institution_id)
        .and_then(|id| normalise_institution_id(&id));

    record.shares = reader.number(fields.shares);
    record.premium = match reader.number_opt(fields.premium) {
        Some(premium) => premium,
        None => reader.minor_units(fields.premium_minor).unwrap_or(0.0),
    };
    record.volume = match reader.number_opt(fields.volume) {
        Some(volume) => volume,
        None => reader
            .base_units(fields.volume_base_units, fields.decimals)
            .unwrap_or(0.0),
    };
    record.price = reader.number(fields.price);
    record.value = match reader.number_opt(fields.value) {
        Some(value) => value,
        None => reader
            .text(fields.amount_range)
            .and_then(|range| parse_amount_range(&range))
            .unwrap_or(0.0),
    };

    record.signed_change = reader.number(fields.signed_change);
    if let Some(sign) = reader
        .text(fields.transaction_type)
        .and_then(|kind| transaction_sign(&kind))
    {
        let magnitude = [record.signed_change, record.value, record.shares]
            .into_iter()
            .map(f64::abs)
            .find(|magnitude| *magnitude > 0.0)
            .unwrap_or(0.0);
        record.signed_change = sign * magnitude;
    }

    record.option_kind = reader
        .text(fields.option_kind)
        .and_then(|kind| option_kind(&kind));

    record.occurred_at = reader.datetime(fields.occurred_at);
    record.reported_at = reader.datetime(fields.reported_at);
    record.report_period = reader.date(fields.report_period);
    record.check_disclosure_order();

    record.tags = reader.tags(fields.tags);
    record.is_hedge_fund = category == Category::HedgeFunds
        || reader.flag(fields.hedge_fund).unwrap_or(false)
        || record.has_tag_containing("hedge_fund");

    record
}

/// Sign implied by an insider or congressional transaction type.
///
/// Purchases are `+1`, sales and dispositions are `-1`. Unknown types (awards, exchanges,
/// gifts) imply no sign.
pub fn transaction_sign(kind: &str) -> Option<f64> {
    let kind = kind.trim().to_ascii_lowercase();

    if kind == "p" || kind.starts_with("p-") || kind.contains("purchase") || kind.contains("buy") {
        Some(1.0)
    } else if kind == "s"
        || kind == "d"
        || kind.starts_with("s-")
        || kind.contains("sale")
        || kind.contains("sell")
    {
        Some(-1.0)
    } else {
        None
    }
}

/// Parse an option contract type: `call`/`c` or `put`/`p`, case-insensitive.
pub fn option_kind(kind: &str) -> Option<OptionKind> {
    match kind.trim().to_ascii_lowercase().as_str() {
        "call" | "c" | "calls" => Some(OptionKind::Call),
        "put" | "p" | "puts" => Some(OptionKind::Put),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NAME_UNKNOWN;
    use chrono::NaiveDate;
    use serde_json::json;

    #[test]
    fn test_transaction_sign() {
        struct TestCase {
            input: &'static str,
            expected: Option<f64>,
        }

        let tests = vec![
            TestCase {
                // TC0: FMP sale code
                input: "S-Sale",
                expected: Some(-1.0),
            },
            TestCase {
                // TC1: FMP purchase code
                input: "P-Purchase",
                expected: Some(1.0),
            },
            TestCase {
                // TC2: congress partial sale
                input: "Sale (Partial)",
                expected: Some(-1.0),
            },
            TestCase {
                // TC3: UW single letter code
                input: "s",
                expected: Some(-1.0),
            },
            TestCase {
                // TC4: disposition flag
                input: "D",
                expected: Some(-1.0),
            },
            TestCase {
                // TC5: award is unsigned
                input: "A-Award",
                expected: None,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = transaction_sign(test.input);
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_normalise_none_name_is_sentinel() {
        let raw = vec![json!({
            "name": "None",
            "cik": "None",
            "units": 1000,
        })];

        let actual = normalise(Category::Ownership, Provider::UnusualWhales, raw);

        assert_eq!(actual.records.len(), 1);
        assert_eq!(actual.records[0].name, NAME_UNKNOWN);
        assert_eq!(actual.records[0].institution_id, None);
        assert_eq!(actual.records[0].shares, 1000.0);
    }

    #[test]
    fn test_normalise_uw_ownership_field_priority() {
        let raw = vec![json!({
            "name": "VANGUARD GROUP INC",
            "cik": "0000102909",
            "units": "1,200,000",
            "shares_change": -5000,
            "change": 2500,
            "value": 228000000.0,
            "report_date": "2024-03-31",
            "filing_date": "2024-05-14",
            "tags": ["index_fund"],
        })];

        let actual = normalise(Category::Ownership, Provider::UnusualWhales, raw);
        let record = &actual.records[0];

        assert_eq!(actual.anomalies, 0);
        assert_eq!(record.institution_id.as_deref(), Some("0000102909"));
        assert_eq!(record.shares, 1_200_000.0);
        // "change" precedes "shares_change"
        assert_eq!(record.signed_change, 2500.0);
        assert_eq!(record.report_period, NaiveDate::from_ymd_opt(2024, 3, 31));
        assert!(!record.is_hedge_fund);
        assert!(!record.disclosure_anomaly);
        assert_eq!(record.provenance, Provenance::UW);
    }

    #[test]
    fn test_normalise_fmp_insider_sale_is_negative() {
        let raw = vec![json!({
            "reportingName": "COOK TIMOTHY D",
            "reportingCik": "0001214156",
            "transactionType": "S-Sale",
            "securitiesTransacted": 511000,
            "securitiesOwned": 3280180,
            "price": 181.19,
            "transactionDate": "2023-10-02",
            "filingDate": "2023-10-04 18:31:40",
        })];

        let actual = normalise(Category::Insiders, Provider::Fmp, raw);
        let record = &actual.records[0];

        assert_eq!(record.name, "COOK TIMOTHY D");
        assert_eq!(record.signed_change, -511000.0);
        assert_eq!(record.price, 181.19);
        assert!(record.occurred_at < record.reported_at);
    }

    #[test]
    fn test_normalise_congress_amount_range() {
        let raw = vec![json!({
            "name": "Nancy Pelosi",
            "amounts": "$1,001 - $15,000",
            "txn_type": "Buy",
            "transaction_date": "2024-01-10",
            "filed_at_date": "2024-01-05",
        })];

        let actual = normalise(Category::Congress, Provider::UnusualWhales, raw);
        let record = &actual.records[0];

        assert_eq!(record.value, 8000.5);
        assert_eq!(record.signed_change, 8000.5);
        // Filed before the transaction date: tagged, not rejected
        assert!(record.disclosure_anomaly);
    }

    #[test]
    fn test_normalise_options_and_anomalies() {
        let raw = vec![
            json!({"type": "put", "total_premium": "500.00", "executed_at": "garbage"}),
            json!({"type": "C", "premium_cents": 25000, "volume": 10}),
            json!("not an object"),
        ];

        let actual = normalise(Category::Options, Provider::UnusualWhales, raw);

        assert_eq!(actual.records.len(), 2);
        assert_eq!(actual.records[0].option_kind, Some(OptionKind::Put));
        assert_eq!(actual.records[0].premium, 500.0);
        assert_eq!(actual.records[0].occurred_at, None);
        assert_eq!(actual.records[1].option_kind, Some(OptionKind::Call));
        assert_eq!(actual.records[1].premium, 250.0);
        // Unparsable date & non-object record
        assert_eq!(actual.anomalies, 2);
    }

    #[test]
    fn test_normalise_dark_pool_counterparty_fallback() {
        let raw = vec![
            json!({"to_address": "VENUE-A", "to": "VENUE-B", "size": 100, "price": "190.5"}),
            json!({"to": "VENUE-B", "amount": "2500000000", "decimals": 8, "price": 191}),
        ];

        let actual = normalise(Category::DarkPool, Provider::UnusualWhales, raw);

        assert_eq!(actual.records[0].name, "VENUE-A");
        assert_eq!(actual.records[0].volume, 100.0);
        assert_eq!(actual.records[1].name, "VENUE-B");
        assert_eq!(actual.records[1].volume, 25.0);
    }

    #[test]
    fn test_normalise_hedge_fund_category_flags_records() {
        let raw = vec![json!({"name": "Citadel Advisors", "units": 10})];
        let actual = normalise(Category::HedgeFunds, Provider::UnusualWhales, raw);
        assert!(actual.records[0].is_hedge_fund);

        let raw = vec![json!({"name": "Bridgewater", "tags": "hedge_fund"})];
        let actual = normalise(Category::Filings, Provider::UnusualWhales, raw);
        assert!(actual.records[0].is_hedge_fund);
    }
}
