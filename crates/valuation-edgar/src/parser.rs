//! Company-facts payload parsing.
//!
//! The payload is the SEC `companyfacts` document: a top-level object whose
//! `facts` object maps taxonomies to tags, tags to units, and units to lists
//! of filed records. Only the `us-gaap` taxonomy and the tags listed in
//! [`xbrl_tags`] are read; everything else is ignored.
//!
//! Records that cannot be used (wrong unit family, unknown form, bad dates,
//! year-to-date flows) are dropped with a [`DataQualityNote`] rather than
//! failing the parse.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Map, Number, Value};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, trace, warn};
use valuation_core::{ConceptKey, DatedValue, FilingType, FinancialSeries, ParseError, Unit};

use crate::client::RawPayload;

/// The us-gaap tags that may carry a concept, highest priority first.
///
/// Companies switch tags over time (`SalesRevenueNet` was superseded by
/// `RevenueFromContractWithCustomerExcludingAssessedTax` under ASC 606), so
/// several are tried for each concept.
#[must_use]
pub const fn xbrl_tags(concept: ConceptKey) -> &'static [&'static str] {
    match concept {
        ConceptKey::Revenue => &[
            "Revenues",
            "RevenueFromContractWithCustomerExcludingAssessedTax",
            "SalesRevenueNet",
            "RevenueFromContractWithCustomerIncludingAssessedTax",
            "SalesRevenueGoodsNet",
        ],
        ConceptKey::CostOfRevenue => &[
            "CostOfRevenue",
            "CostOfGoodsAndServicesSold",
            "CostOfGoodsSold",
        ],
        ConceptKey::GrossProfit => &["GrossProfit"],
        ConceptKey::OperatingIncome => &["OperatingIncomeLoss"],
        ConceptKey::NetIncome => &[
            "NetIncomeLoss",
            "ProfitLoss",
            "NetIncomeLossAvailableToCommonStockholdersBasic",
        ],
        ConceptKey::OperatingCashFlow => &[
            "NetCashProvidedByUsedInOperatingActivities",
            "NetCashProvidedByUsedInOperatingActivitiesContinuingOperations",
        ],
        ConceptKey::CapitalExpenditures => &[
            "PaymentsToAcquirePropertyPlantAndEquipment",
            "PaymentsToAcquireProductiveAssets",
        ],
        ConceptKey::ShareBasedCompensation => &[
            "ShareBasedCompensation",
            "AllocatedShareBasedCompensationExpense",
        ],
        ConceptKey::TotalAssets => &["Assets"],
        ConceptKey::CurrentAssets => &["AssetsCurrent"],
        ConceptKey::CashAndEquivalents => &[
            "CashAndCashEquivalentsAtCarryingValue",
            "Cash",
            "CashCashEquivalentsAndShortTermInvestments",
        ],
        ConceptKey::TotalLiabilities => &["Liabilities"],
        ConceptKey::CurrentLiabilities => &["LiabilitiesCurrent"],
        ConceptKey::LongTermDebt => &[
            "LongTermDebt",
            "LongTermDebtNoncurrent",
            "LongTermDebtAndCapitalLeaseObligations",
        ],
        ConceptKey::ShortTermDebt => &[
            "ShortTermBorrowings",
            "DebtCurrent",
            "LongTermDebtCurrent",
        ],
        ConceptKey::StockholdersEquity => &[
            "StockholdersEquity",
            "StockholdersEquityIncludingPortionAttributableToNoncontrollingInterest",
        ],
        ConceptKey::SharesOutstanding => &[
            "CommonStockSharesOutstanding",
            "WeightedAverageNumberOfDilutedSharesOutstanding",
            "WeightedAverageNumberOfSharesOutstandingBasicAndDiluted",
        ],
    }
}

/// Why a record was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteKind {
    /// The unit belongs to the wrong family (e.g. shares for a currency concept).
    UnitMismatch {
        /// Unit label as filed.
        unit: String,
    },
    /// The unit label is not a currency code or `shares`.
    UnrecognizedUnit {
        /// Unit label as filed.
        unit: String,
    },
    /// The record could not be read (missing `end` or `val`, wrong types).
    MalformedRecord(String),
    /// A date did not parse.
    InvalidDate(String),
    /// The value is not representable as a decimal.
    InvalidValue(String),
    /// A flow value without a period start.
    MissingStart,
    /// A flow value whose period length does not match its filing type.
    DurationMismatch {
        /// Period length in days.
        days: i64,
        /// Filing type of the record.
        filing_type: FilingType,
    },
}

/// A record the parser dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataQualityNote {
    /// Concept being extracted.
    pub concept: ConceptKey,
    /// us-gaap tag the record came from.
    pub tag: &'static str,
    /// Reason.
    pub kind: NoteKind,
}

impl fmt::Display for DataQualityNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): ", self.concept, self.tag)?;
        match &self.kind {
            NoteKind::UnitMismatch { unit } => {
                write!(f, "unit {unit} does not match {:?}", self.concept.unit_family())
            }
            NoteKind::UnrecognizedUnit { unit } => write!(f, "unrecognized unit {unit}"),
            NoteKind::MalformedRecord(e) => write!(f, "malformed record: {e}"),
            NoteKind::InvalidDate(d) => write!(f, "invalid date {d:?}"),
            NoteKind::InvalidValue(v) => write!(f, "invalid value {v}"),
            NoteKind::MissingStart => f.write_str("flow value without a period start"),
            NoteKind::DurationMismatch { days, filing_type } => {
                write!(f, "{days}-day period in a {filing_type} filing")
            }
        }
    }
}

/// Result of [`parse_with_notes`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFilings {
    /// Extracted series.
    pub series: FinancialSeries,
    /// `entityName` from the payload, if present.
    pub entity_name: Option<String>,
    /// Dropped records.
    pub notes: Vec<DataQualityNote>,
}

/// One filed value as it appears under `units.<label>[]`.
#[derive(Debug, Deserialize)]
struct FactRecord {
    end: String,
    val: Number,
    #[serde(default)]
    start: Option<String>,
    #[serde(default)]
    form: Option<String>,
    #[serde(default)]
    filed: Option<String>,
}

/// Parses a company-facts payload into a series.
///
/// # Errors
/// Returns [`ParseError::MalformedStructure`] only if the payload is not a
/// JSON object with a `facts` object.
pub fn parse(payload: &RawPayload) -> Result<FinancialSeries, ParseError> {
    parse_with_notes(payload).map(|parsed| parsed.series)
}

/// Parses a company-facts payload, also returning what was dropped.
///
/// # Errors
/// Same as [`parse`].
pub fn parse_with_notes(payload: &RawPayload) -> Result<ParsedFilings, ParseError> {
    let root: Value = serde_json::from_slice(payload.body())
        .map_err(|e| ParseError::MalformedStructure(format!("not JSON: {e}")))?;
    let Value::Object(root) = root else {
        return Err(ParseError::MalformedStructure(
            "top level is not an object".to_string(),
        ));
    };
    let facts = match root.get("facts") {
        Some(Value::Object(facts)) => facts,
        Some(_) => {
            return Err(ParseError::MalformedStructure(
                "`facts` is not an object".to_string(),
            ));
        }
        None => {
            return Err(ParseError::MalformedStructure(
                "missing `facts` object".to_string(),
            ));
        }
    };

    let mut parsed = ParsedFilings {
        entity_name: root
            .get("entityName")
            .and_then(Value::as_str)
            .map(str::to_string),
        ..ParsedFilings::default()
    };

    match facts.get("us-gaap") {
        Some(Value::Object(gaap)) => {
            for &concept in ConceptKey::all() {
                extract_concept(gaap, concept, &mut parsed);
            }
        }
        Some(_) => warn!(target: "data_quality", "`us-gaap` is not an object, ignoring it"),
        None => debug!("payload has no us-gaap facts"),
    }

    debug!(
        values = parsed.series.len(),
        notes = parsed.notes.len(),
        "parsed company facts"
    );
    Ok(parsed)
}

fn extract_concept(gaap: &Map<String, Value>, concept: ConceptKey, parsed: &mut ParsedFilings) {
    for &tag in xbrl_tags(concept) {
        let Some(units) = gaap
            .get(tag)
            .and_then(|t| t.get("units"))
            .and_then(Value::as_object)
        else {
            continue;
        };

        for (label, records) in units {
            let Some(unit) = Unit::parse(label) else {
                note(parsed, concept, tag, NoteKind::UnrecognizedUnit { unit: label.clone() });
                continue;
            };
            if unit.family() != concept.unit_family() {
                note(parsed, concept, tag, NoteKind::UnitMismatch { unit: label.clone() });
                continue;
            }
            let Some(records) = records.as_array() else {
                note(
                    parsed,
                    concept,
                    tag,
                    NoteKind::MalformedRecord(format!("units.{label} is not a list")),
                );
                continue;
            };

            for record in records {
                match read_record(record, concept, &unit) {
                    Ok(Some(value)) => {
                        parsed.series.insert(concept, value);
                    }
                    Ok(None) => {}
                    Err(kind) => note(parsed, concept, tag, kind),
                }
            }
        }
    }
}

fn read_record(record: &Value, concept: ConceptKey, unit: &Unit) -> Result<Option<DatedValue>, NoteKind> {
    let record = FactRecord::deserialize(record).map_err(|e| NoteKind::MalformedRecord(e.to_string()))?;

    let Some(filing_type) = record.form.as_deref().and_then(FilingType::from_form) else {
        trace!(form = ?record.form, "skipping non-periodic form");
        return Ok(None);
    };

    let end = parse_date(&record.end)?;
    if concept.is_flow() {
        let start = record.start.as_deref().ok_or(NoteKind::MissingStart)?;
        let days = (end - parse_date(start)?).num_days();
        let (min, max) = filing_type.duration_days();
        if !(min..=max).contains(&days) {
            return Err(NoteKind::DurationMismatch { days, filing_type });
        }
    }

    let value = parse_decimal(&record.val).ok_or_else(|| NoteKind::InvalidValue(record.val.to_string()))?;
    let mut dated = DatedValue::new(end, value, unit.clone(), filing_type);
    if let Some(filed) = record.filed.as_deref() {
        dated = dated.with_filed(parse_date(filed)?);
    }
    Ok(Some(dated))
}

fn parse_date(raw: &str) -> Result<NaiveDate, NoteKind> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| NoteKind::InvalidDate(raw.to_string()))
}

fn parse_decimal(n: &Number) -> Option<Decimal> {
    let text = n.to_string();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

fn note(parsed: &mut ParsedFilings, concept: ConceptKey, tag: &'static str, kind: NoteKind) {
    let note = DataQualityNote { concept, tag, kind };
    match note.kind {
        NoteKind::UnitMismatch { .. } | NoteKind::UnrecognizedUnit { .. } => {
            warn!(target: "data_quality", %note, "dropped record");
        }
        _ => debug!(target: "data_quality", %note, "dropped record"),
    }
    parsed.notes.push(note);
}
