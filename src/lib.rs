use std::collections::HashMap;
use std::str::FromStr;

use calamine::{Data, Range};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use thiserror::Error;
use time::{macros::date, Date};
use tracing::debug;
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

pub type Result<T> = std::result::Result<T, ReportError>;

const EXCHANGE: &str = "BINANCE";
const ASSET: &str = "USDT";

// Spreadsheet serial dates count days from this epoch.
const SERIAL_EPOCH: Date = date!(1899 - 12 - 30);

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("workbook has no worksheets")]
    NoSheets,
    #[error("worksheet \"{0}\" could not be read from the workbook")]
    SheetNotFound(String),
    #[error("value \"{0}\" cannot be read as a number")]
    InvalidMagnitude(String),
}

/// A single cell, discriminated once at parse time so the classifier can
/// match on shape instead of probing strings.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Date(Date),
}

/// One worksheet row: header/value pairs in original column order.
#[derive(Debug, Clone, Default)]
pub struct Row {
    cells: Vec<(String, Cell)>,
}

impl Row {
    pub fn new(cells: Vec<(String, Cell)>) -> Self {
        Self { cells }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    Purchase,
    Sale,
}

impl Code {
    pub fn as_str(self) -> &'static str {
        match self {
            Code::Purchase => "0110",
            Code::Sale => "0120",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExchangeInfo {
    pub url: String,
    pub country: String,
}

/// Lookup tables injected into classification. Immutable once built, so a
/// single instance can be shared across requests.
#[derive(Debug, Clone)]
pub struct ReportTables {
    pub type_map: HashMap<String, Code>,
    pub exchange_info: HashMap<String, ExchangeInfo>,
    pub fixed_indicator: String,
}

impl Default for ReportTables {
    fn default() -> Self {
        Self {
            type_map: HashMap::from([
                ("COMPRA".to_string(), Code::Purchase),
                ("VENDA".to_string(), Code::Sale),
            ]),
            exchange_info: HashMap::from([(
                EXCHANGE.to_string(),
                ExchangeInfo {
                    url: "https://www.binance.com/".to_string(),
                    country: "KY".to_string(),
                },
            )]),
            fixed_indicator: "I".to_string(),
        }
    }
}

/// Logical input fields and the header spellings accepted for each, tried in
/// order against normalized header names.
#[derive(Debug, Clone, Copy)]
enum Field {
    Date,
    Kind,
    Quantity,
    GrossValue,
    Fee,
}

impl Field {
    fn header_variants(self) -> &'static [&'static str] {
        match self {
            Field::Date => &["DATA"],
            Field::Kind => &["TIPO"],
            Field::Quantity => &["QUANTIDADE"],
            Field::GrossValue => &["VALOR TOTAL", " VALOR TOTAL"],
            Field::Fee => &["TAXA FIXA", "Valor das taxas em reais"],
        }
    }
}

/// Strips diacritics and case: NFD decomposition, drop combining marks,
/// lowercase. Used for header, sheet-name and label comparison only.
pub fn normalize(s: &str) -> String {
    s.nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

/// Resolves which worksheet to process: exact hint match first, then the
/// first sheet whose normalized name contains the normalized hint, then the
/// first sheet. First match in workbook order wins.
pub fn pick_sheet<'a>(names: &'a [String], hint: Option<&str>) -> Result<&'a str> {
    let Some(first) = names.first() else {
        return Err(ReportError::NoSheets);
    };
    if let Some(hint) = hint {
        if let Some(name) = names.iter().find(|n| n.as_str() == hint) {
            return Ok(name);
        }
        let want = normalize(hint);
        for name in names {
            if normalize(name).contains(&want) {
                return Ok(name);
            }
        }
    }
    Ok(first)
}

fn format_dmy(date: Date) -> String {
    format!(
        "{:02}{:02}{:04}",
        date.day(),
        u8::from(date.month()),
        date.year()
    )
}

fn serial_to_date(serial: f64) -> Option<Date> {
    if !serial.is_finite() {
        return None;
    }
    let days = serial.floor();
    if days < i32::MIN as f64 || days > i32::MAX as f64 {
        return None;
    }
    let julian = SERIAL_EPOCH.to_julian_day().checked_add(days as i32)?;
    Date::from_julian_day(julian).ok()
}

fn parse_date_text(s: &str) -> Option<String> {
    let parts: Vec<&str> = s.split(['/', '-']).collect();
    if parts.len() != 3
        || parts
            .iter()
            .any(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()))
    {
        return None;
    }
    let (day, month, year): (u32, u32, u32) =
        if parts[0].len() <= 2 && parts[1].len() <= 2 && (2..=4).contains(&parts[2].len()) {
            let mut year = parts[2].parse().ok()?;
            if parts[2].len() == 2 {
                // Two-digit years are read as 20xx.
                year += 2000;
            }
            (parts[0].parse().ok()?, parts[1].parse().ok()?, year)
        } else if parts[0].len() == 4 && parts[1].len() <= 2 && parts[2].len() <= 2 {
            (
                parts[2].parse().ok()?,
                parts[1].parse().ok()?,
                parts[0].parse().ok()?,
            )
        } else {
            return None;
        };
    Some(format!("{day:02}{month:02}{year:04}"))
}

/// Canonicalizes any cell into `DDMMYYYY` text. Never fails: unrecognized
/// shapes fall back to their verbatim string form, and empty cells map to an
/// empty string so the record builder can apply its own default.
pub fn to_ddmmyyyy(cell: &Cell) -> String {
    match cell {
        Cell::Empty => String::new(),
        Cell::Date(date) => format_dmy(*date),
        Cell::Number(serial) => match serial_to_date(*serial) {
            Some(date) => format_dmy(date),
            None => serial.to_string(),
        },
        Cell::Text(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return String::new();
            }
            parse_date_text(trimmed).unwrap_or_else(|| trimmed.to_string())
        }
    }
}

fn parse_magnitude(cell: &Cell) -> Result<Decimal> {
    match cell {
        Cell::Empty => Ok(Decimal::ZERO),
        Cell::Number(n) => {
            // Go through the string form rather than the binary float to
            // avoid carrying float representation error into the output.
            Decimal::from_str(&n.to_string())
                .map_err(|_| ReportError::InvalidMagnitude(n.to_string()))
        }
        Cell::Text(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Ok(Decimal::ZERO);
            }
            Decimal::from_str(trimmed)
                .or_else(|_| Decimal::from_str(&trimmed.replace(',', ".")))
                .or_else(|_| Decimal::from_scientific(trimmed))
                .map_err(|_| ReportError::InvalidMagnitude(trimmed.to_string()))
        }
        Cell::Date(date) => Err(ReportError::InvalidMagnitude(format_dmy(*date))),
    }
}

fn render_decimal(value: Decimal, ndigits: u32) -> String {
    let rounded = value
        .abs()
        .round_dp_with_strategy(ndigits, RoundingStrategy::MidpointAwayFromZero);
    format!("{rounded:.prec$}", prec = ndigits as usize).replace('.', ",")
}

/// Formats a magnitude with `ndigits` fractional digits, comma separator,
/// round-half-up, sign discarded. Empty cells count as zero; anything that
/// cannot be read as a number is an `InvalidMagnitude` error, which callers
/// recover from per field.
pub fn fmt_decimal_br(cell: &Cell, ndigits: u32) -> Result<String> {
    Ok(render_decimal(parse_magnitude(cell)?, ndigits))
}

fn cell_to_string(cell: &Cell) -> String {
    match cell {
        Cell::Empty => String::new(),
        Cell::Text(s) => s.clone(),
        Cell::Number(n) => n.to_string(),
        Cell::Date(date) => format!(
            "{:04}-{:02}-{:02}",
            date.year(),
            u8::from(date.month()),
            date.day()
        ),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalRecord {
    pub code: Code,
    pub line: String,
}

/// Builds the pipe-delimited record for one row, or `None` when the row's
/// type label maps to no known code and the row is skipped.
pub fn classify_row(row: &Row, tables: &ReportTables) -> Option<CanonicalRecord> {
    let lookup: HashMap<String, &Cell> = row
        .cells
        .iter()
        .map(|(header, cell)| (normalize(header), cell))
        .collect();
    let get = |field: Field| {
        field
            .header_variants()
            .iter()
            .find_map(|variant| lookup.get(&normalize(variant)).copied())
    };

    let kind = get(Field::Kind)
        .map(cell_to_string)
        .unwrap_or_default()
        .trim()
        .to_uppercase();
    let Some(code) = tables.type_map.get(&kind).copied() else {
        debug!(%kind, "row skipped: unrecognized transaction type");
        return None;
    };

    let date = to_ddmmyyyy(get(Field::Date).unwrap_or(&Cell::Empty));

    // A field that fails to parse is zero-filled; it never sinks the row.
    let value = fmt_decimal_br(get(Field::GrossValue).unwrap_or(&Cell::Empty), 2)
        .unwrap_or_else(|_| render_decimal(Decimal::ZERO, 2));
    let fee = fmt_decimal_br(get(Field::Fee).unwrap_or(&Cell::Empty), 2)
        .unwrap_or_else(|_| render_decimal(Decimal::ZERO, 2));
    let quantity = fmt_decimal_br(get(Field::Quantity).unwrap_or(&Cell::Empty), 10)
        .unwrap_or_else(|_| render_decimal(Decimal::ZERO, 10));

    let (url, country) = tables
        .exchange_info
        .get(EXCHANGE)
        .map(|info| (info.url.as_str(), info.country.as_str()))
        .unwrap_or(("", ""));

    let line = [
        code.as_str(),
        &date,
        &tables.fixed_indicator,
        &value,
        &fee,
        ASSET,
        &quantity,
        EXCHANGE,
        url,
        country,
    ]
    .join("|");

    Some(CanonicalRecord { code, line })
}

#[derive(Debug, Serialize)]
pub struct Summary {
    pub sheet_name: String,
    pub ignored: u32,
    pub count_0110: usize,
    pub count_0120: usize,
}

#[derive(Debug)]
pub struct Report {
    pub sheet_name: String,
    pub purchases: Vec<String>,
    pub sales: Vec<String>,
    pub ignored: u32,
}

impl Report {
    pub fn purchases_text(&self) -> String {
        join_crlf(&self.purchases)
    }

    pub fn sales_text(&self) -> String {
        join_crlf(&self.sales)
    }

    pub fn summary(&self) -> Summary {
        Summary {
            sheet_name: self.sheet_name.clone(),
            ignored: self.ignored,
            count_0110: self.purchases.len(),
            count_0120: self.sales.len(),
        }
    }
}

// An empty bucket still renders as a single terminator.
fn join_crlf(lines: &[String]) -> String {
    let mut text = lines.join("\r\n");
    text.push_str("\r\n");
    text
}

/// Runs every row through classification in input order and accumulates the
/// two output buckets plus the skip counter.
pub fn generate_report(rows: &[Row], sheet_name: &str, tables: &ReportTables) -> Report {
    let mut report = Report {
        sheet_name: sheet_name.to_string(),
        purchases: Vec::new(),
        sales: Vec::new(),
        ignored: 0,
    };
    for row in rows {
        match classify_row(row, tables) {
            Some(record) => match record.code {
                Code::Purchase => report.purchases.push(record.line),
                Code::Sale => report.sales.push(record.line),
            },
            None => report.ignored += 1,
        }
    }
    report
}

fn convert_cell(data: &Data) -> Cell {
    match data {
        Data::Empty | Data::Error(_) => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Text(b.to_string()),
        Data::DateTime(dt) => match serial_to_date(dt.as_f64()) {
            Some(date) => Cell::Date(date),
            None => Cell::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
    }
}

/// Turns a worksheet range into rows keyed by the header line, with blank
/// cells preserved as `Cell::Empty`.
pub fn rows_from_range(range: &Range<Data>) -> Vec<Row> {
    let mut rows = range.rows();
    let Some(header_row) = rows.next() else {
        return Vec::new();
    };
    let headers: Vec<String> = header_row
        .iter()
        .map(|cell| cell_to_string(&convert_cell(cell)))
        .collect();
    rows.map(|row| {
        Row::new(
            headers
                .iter()
                .enumerate()
                .map(|(i, header)| {
                    let cell = row.get(i).map(convert_cell).unwrap_or(Cell::Empty);
                    (header.clone(), cell)
                })
                .collect(),
        )
    })
    .collect()
}
