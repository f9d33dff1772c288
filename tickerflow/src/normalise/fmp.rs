use super::FieldMap;
use crate::category::Category;

/// `api/v3/institutional-holder/{ticker}`
///
/// ```json
/// { "holder": "Vanguard Group Inc", "shares": 1299197472, "dateReported": "2023-06-30", "change": -19417683 }
/// ```
static OWNERSHIP: FieldMap = FieldMap {
    name: &["holder", "investorName", "name"],
    institution_id: &["cik"],
    shares: &["shares", "sharesNumber"],
    signed_change: &["change", "changeInSharesNumber", "sharesChange"],
    value: &["marketValue", "value"],
    reported_at: &["dateReported", "filingDate", "date"],
    report_period: &["dateReported", "date"],
    ..FieldMap::EMPTY
};

/// `api/v4/insider-trading`
///
/// ```json
/// { "reportingName": "COOK TIMOTHY D", "reportingCik": "0001214156", "transactionType": "S-Sale",
///   "securitiesTransacted": 511000, "securitiesOwned": 3280180, "price": 181.19,
///   "transactionDate": "2023-10-02", "filingDate": "2023-10-04 18:31:40" }
/// ```
static INSIDERS: FieldMap = FieldMap {
    name: &["reportingName", "insiderName", "name"],
    institution_id: &["reportingCik"],
    shares: &["securitiesOwned"],
    signed_change: &["securitiesTransacted"],
    price: &["price"],
    transaction_type: &["transactionType", "acquistionOrDisposition"],
    occurred_at: &["transactionDate"],
    reported_at: &["filingDate"],
    ..FieldMap::EMPTY
};

/// `api/v4/senate-trading`
///
/// ```json
/// { "office": "Tommy Tuberville", "type": "Sale (Full)", "amount": "$1,001 - $15,000",
///   "transactionDate": "2023-11-27", "dateRecieved": "2023-12-14" }
/// ```
static CONGRESS: FieldMap = FieldMap {
    name: &["office", "representative", "senator"],
    amount_range: &["amount"],
    transaction_type: &["type"],
    occurred_at: &["transactionDate"],
    // Upstream spelling
    reported_at: &["dateRecieved", "disclosureDate"],
    ..FieldMap::EMPTY
};

/// `api/v4/institutional-ownership/institutional-holders/symbol-ownership-percent` and
/// `api/v3/form-thirteen/{cik}`.
///
/// ```json
/// { "date": "2023-06-30", "cik": "0000102909", "filingDate": "2023-08-14",
///   "investorName": "VANGUARD GROUP INC", "sharesNumber": 1299197472,
///   "changeInSharesNumber": -19417683, "marketValue": 227316572000, "quarterEndPrice": 193.97 }
/// ```
static FILINGS: FieldMap = FieldMap {
    name: &["investorName", "holder", "name"],
    institution_id: &["cik"],
    shares: &["sharesNumber", "shares"],
    signed_change: &["changeInSharesNumber", "change"],
    price: &["quarterEndPrice", "avgPricePaid"],
    value: &["marketValue", "value"],
    // Upstream spelling on form-thirteen
    reported_at: &["filingDate", "fillingDate", "acceptedDate"],
    report_period: &["date"],
    tags: &["tags"],
    ..FieldMap::EMPTY
};

static UNSUPPORTED: FieldMap = FieldMap::EMPTY;

pub fn fields(category: Category) -> &'static FieldMap {
    match category {
        Category::Ownership => &OWNERSHIP,
        Category::Insiders => &INSIDERS,
        Category::Congress => &CONGRESS,
        Category::Filings => &FILINGS,
        Category::Activity | Category::HedgeFunds | Category::Options | Category::DarkPool => {
            &UNSUPPORTED
        }
    }
}
