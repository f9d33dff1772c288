use super::FieldMap;
use crate::category::Category;

/// `api/stock/{ticker}/ownership`, also used for hedge funds (`tags=hedge_fund`).
///
/// ```json
/// { "name": "VANGUARD GROUP INC", "short_name": "Vanguard", "cik": "0000102909",
///   "units": 1299197472, "units_change": -19417683, "value": 227316572000, "avg_price": 174.97,
///   "report_date": "2023-12-31", "filing_date": "2024-02-13", "tags": ["index_fund"],
///   "is_hedge_fund": false }
/// ```
static OWNERSHIP: FieldMap = FieldMap {
    name: &["name", "short_name", "institution_name"],
    institution_id: &["cik", "institution_id"],
    shares: &["units", "shares"],
    signed_change: &["units_change", "change", "shares_change"],
    price: &["avg_price", "price"],
    value: &["value"],
    occurred_at: &["report_date"],
    reported_at: &["filing_date"],
    report_period: &["report_date"],
    hedge_fund: &["is_hedge_fund"],
    tags: &["tags"],
    ..FieldMap::EMPTY
};

/// `api/stock/{ticker}/institution-activity`
///
/// ```json
/// { "institution_name": "CITADEL ADVISORS LLC", "cik": "0001423053", "units_change": 120000,
///   "avg_price": 182.1, "close": 185.6, "report_date": "2023-12-31", "filing_date": "2024-02-14" }
/// ```
static ACTIVITY: FieldMap = FieldMap {
    name: &["institution_name", "name", "short_name"],
    institution_id: &["cik", "institution_id"],
    shares: &["units", "shares"],
    signed_change: &["units_change", "change", "shares_change"],
    price: &["avg_price", "close", "price"],
    value: &["value"],
    occurred_at: &["report_date"],
    reported_at: &["filing_date"],
    report_period: &["report_date"],
    hedge_fund: &["is_hedge_fund"],
    tags: &["tags"],
    ..FieldMap::EMPTY
};

/// `api/stock/{ticker}/insider-buy-sells`
///
/// ```json
/// { "owner_name": "COOK TIMOTHY D", "transaction_code": "S", "amount": -511000,
///   "shares_owned_after": 3280180, "price": "181.19", "transaction_date": "2023-10-02",
///   "filing_date": "2023-10-04" }
/// ```
static INSIDERS: FieldMap = FieldMap {
    name: &["owner_name", "insider_name", "name"],
    institution_id: &["owner_cik"],
    shares: &["shares_owned_after", "shares_owned"],
    signed_change: &["amount", "units_change", "change", "shares_change"],
    price: &["price", "stock_price"],
    transaction_type: &["transaction_code", "transaction_type"],
    occurred_at: &["transaction_date"],
    reported_at: &["filing_date"],
    ..FieldMap::EMPTY
};

/// `api/congress/recent-trades`
///
/// ```json
/// { "name": "Nancy Pelosi", "reporter": "Nancy Pelosi", "amounts": "$1,001 - $15,000",
///   "txn_type": "Buy", "transaction_date": "2024-01-10", "filed_at_date": "2024-01-24" }
/// ```
static CONGRESS: FieldMap = FieldMap {
    name: &["name", "reporter", "politician"],
    amount_range: &["amounts", "amount"],
    transaction_type: &["txn_type", "type"],
    occurred_at: &["transaction_date"],
    reported_at: &["filed_at_date", "disclosure_date"],
    ..FieldMap::EMPTY
};

/// `api/stock/{ticker}/flow-recent`
///
/// ```json
/// { "option_chain_id": "AAPL240119C00190000", "type": "call", "total_premium": "123456.00",
///   "volume": 820, "underlying_price": "185.64", "executed_at": "2024-01-02T15:30:00Z",
///   "tags": ["bullish", "sweep"] }
/// ```
static OPTIONS: FieldMap = FieldMap {
    name: &["option_chain_id", "option_symbol"],
    premium: &["total_premium", "premium"],
    premium_minor: &["total_premium_cents", "premium_cents"],
    volume: &["volume", "size"],
    price: &["underlying_price", "stock_price", "price"],
    option_kind: &["type", "put_call", "option_type"],
    occurred_at: &["executed_at", "created_at", "start_time"],
    tags: &["tags"],
    ..FieldMap::EMPTY
};

/// `api/darkpool/{ticker}`
///
/// ```json
/// { "executed_at": "2024-01-02T15:30:00Z", "market_center": "L", "price": "190.10",
///   "size": 100000, "premium": "19010000" }
/// ```
static DARK_POOL: FieldMap = FieldMap {
    name: &["to_address", "to", "market_center", "venue"],
    volume: &["size", "volume"],
    volume_base_units: &["amount"],
    decimals: &["decimals"],
    price: &["price"],
    premium: &["premium"],
    value: &["premium", "value"],
    occurred_at: &["executed_at", "timestamp"],
    tags: &["tags"],
    ..FieldMap::EMPTY
};

/// `api/stock/{ticker}/institution-filings` and `api/institution/{cik}/filings`
///
/// ```json
/// { "name": "BERKSHIRE HATHAWAY INC", "cik": "0001067983", "report_date": "2023-12-31",
///   "filing_date": "2024-02-14", "units": 905560000, "units_change": -10000000,
///   "value": 161750000000, "is_hedge_fund": false, "tags": ["value_investor"] }
/// ```
static FILINGS: FieldMap = FieldMap {
    name: &["name", "institution_name", "short_name"],
    institution_id: &["cik", "institution_id"],
    shares: &["units", "shares"],
    signed_change: &["units_change", "change", "shares_change"],
    price: &["avg_price", "price"],
    value: &["value"],
    reported_at: &["filing_date"],
    report_period: &["report_date", "period"],
    hedge_fund: &["is_hedge_fund"],
    tags: &["tags"],
    ..FieldMap::EMPTY
};

pub fn fields(category: Category) -> &'static FieldMap {
    match category {
        Category::Ownership | Category::HedgeFunds => &OWNERSHIP,
        Category::Activity => &ACTIVITY,
        Category::Insiders => &INSIDERS,
        Category::Congress => &CONGRESS,
        Category::Options => &OPTIONS,
        Category::DarkPool => &DARK_POOL,
        Category::Filings => &FILINGS,
    }
}
