use std::{
    path::{Path, PathBuf},
    str::FromStr,
};

use itertools::{Itertools, MinMaxResult};
use rust_decimal::{prelude::ToPrimitive, Decimal};
use time::Date;
use tracing::{debug, info, warn};

use crate::{
    broker::Broker,
    records::{
        CashTransfer, Col, Dividend, OptionOperation, OptionTrade, OptionType,
        ShareAction, ShareTrade, TableKind, TransferAction, TxRecord,
    },
    util::{
        date::parse_standard_date, decimal::GreaterEqualZeroDecimal,
        rw::DescribedReader,
    },
};

use super::{
    error::ImportError,
    section::{self, BOM},
    table::{Cell, RawTable, Row},
};

/// Where the table lives within an export file, in physical lines.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct FileLayout {
    // Lines before the header
    pub skip_rows: usize,
    // Trailing summary/disclaimer lines
    pub skip_footer: usize,
}

impl FileLayout {
    pub fn new(skip_rows: usize, skip_footer: usize) -> FileLayout {
        FileLayout { skip_rows, skip_footer }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ProcessOptions {
    /// When set, the table is written here as csv after each stage.
    pub debug_dir: Option<PathBuf>,
    /// Fail when a sectioned export lacks the expected section,
    /// rather than assuming it starts at line 1.
    pub strict_sections: bool,
    /// Replaces each cleaner's own layout.
    pub layout_override: Option<FileLayout>,
}

/// The broker-specific stage of the pipeline, for one kind of record.
pub trait Cleaner {
    fn broker(&self) -> Broker;

    fn kind(&self) -> TableKind;

    /// Determines where this cleaner's table is in `text`.
    fn layout(&self, text: &str, options: &ProcessOptions) -> Result<FileLayout, ImportError>;

    /// Filters the raw table down to this cleaner's kind of rows, and renames
    /// or derives the canonical columns (see records::Col).
    ///
    /// Returns an empty table (not an error) when nothing matches.
    fn clean(&self, table: RawTable) -> Result<RawTable, ImportError>;
}

/// Resolves the header offset of a sectioned export.
///
/// If the section can't be found, `fallback` is used when given, otherwise
/// the section locator's own fallback. In strict mode, it is an error.
pub fn section_skip_rows(
    text: &str,
    header_marker: &str,
    next_line_contains: Option<&str>,
    fallback: Option<usize>,
    options: &ProcessOptions,
) -> Result<usize, ImportError> {
    if let Some(offset) = section::locate_section(text, header_marker, next_line_contains) {
        return Ok(offset);
    }
    if options.strict_sections {
        return Err(ImportError::Format(format!(
            "No section starting with '{}'{} was found",
            header_marker,
            next_line_contains
                .map(|n| format!(" followed by '{n}'"))
                .unwrap_or_default()
        )));
    }
    match fallback {
        Some(offset) => {
            debug!("Section '{header_marker}' not found. Using line {offset}");
            Ok(offset)
        }
        None => Ok(section::find_section(text, header_marker, next_line_contains)),
    }
}

#[derive(PartialEq, Eq, Debug)]
pub struct ProcessedTable {
    pub kind: TableKind,
    pub records: Vec<TxRecord>,
    // Both None when there is nothing to import
    pub start_date: Option<Date>,
    pub end_date: Option<Date>,
}

impl ProcessedTable {
    fn new(kind: TableKind, records: Vec<TxRecord>) -> ProcessedTable {
        let (start_date, end_date) = match records.iter().map(|r| r.date()).minmax() {
            MinMaxResult::NoElements => (None, None),
            MinMaxResult::OneElement(d) => (Some(d), Some(d)),
            MinMaxResult::MinMax(min, max) => (Some(min), Some(max)),
        };
        ProcessedTable { kind, records, start_date, end_date }
    }
}

/// Parses delimited text into a raw table, skipping `layout.skip_rows`
/// lines before the header and `layout.skip_footer` lines at the end.
pub fn load_table(text: &str, layout: &FileLayout) -> Result<RawTable, ImportError> {
    let lines: Vec<&str> = text.lines().collect();
    let end = lines.len().saturating_sub(layout.skip_footer);
    if layout.skip_rows >= end {
        return Err(ImportError::Format(format!(
            "No header line after skipping {} lines ({} footer lines, {} lines total)",
            layout.skip_rows,
            layout.skip_footer,
            lines.len()
        )));
    }
    let body = lines[layout.skip_rows..end].join("\n");
    let body = body.trim_start_matches(BOM);

    let mut csv_r = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(body.as_bytes());

    let columns: Vec<String> = csv_r
        .headers()
        .map_err(|e| ImportError::Format(e.to_string()))?
        .iter()
        .map(String::from)
        .collect();
    if columns.iter().all(|c| c.is_empty()) {
        return Err(ImportError::Format(format!(
            "Empty header at line {}",
            layout.skip_rows + 1
        )));
    }

    let mut rows = Vec::new();
    for record in csv_r.records() {
        let record = record.map_err(|e| ImportError::Format(e.to_string()))?;
        rows.push(record.iter().map(Cell::text).collect());
    }
    Ok(RawTable::new(columns, rows))
}

fn write_snapshot(
    options: &ProcessOptions,
    stem: &str,
    kind: TableKind,
    stage: &str,
    table: &RawTable,
) {
    let dir = match &options.debug_dir {
        Some(dir) => dir,
        None => return,
    };
    let path = dir.join(format!("{stem}_{kind}_{stage}.csv"));
    let res = std::fs::create_dir_all(dir)
        .map_err(|e| e.to_string())
        .and_then(|_| std::fs::File::create(&path).map_err(|e| e.to_string()))
        .and_then(|f| table.write_csv(f));
    match res {
        Ok(()) => debug!("Wrote {}", path.display()),
        Err(e) => warn!("Unable to write debug snapshot {}: {}", path.display(), e),
    }
}

/// Runs the full pipeline for one cleaner over an export's text.
///
/// `stem` names the export in logs and debug snapshots.
pub fn process_text(
    cleaner: &dyn Cleaner,
    stem: &str,
    text: &str,
    options: &ProcessOptions,
) -> Result<ProcessedTable, ImportError> {
    let kind = cleaner.kind();
    let broker = cleaner.broker();

    let layout = match options.layout_override {
        Some(layout) => layout,
        None => cleaner.layout(text, options)?,
    };
    debug!("{broker} {kind}: reading {stem} with {layout:?}");

    let mut table = load_table(text, &layout)?;
    write_snapshot(options, stem, kind, "load", &table);

    table.trim();
    let table = cleaner.clean(table)?;
    write_snapshot(options, stem, kind, "clean", &table);

    if table.is_empty() {
        info!("{broker} {kind}: nothing to import from {stem}");
        return Ok(ProcessedTable::new(kind, vec![]));
    }

    let table = table.select(kind.required_columns())?;
    let records = validate(kind, &table)?;
    write_snapshot(options, stem, kind, "validate", &table);

    let processed = ProcessedTable::new(kind, records);
    info!(
        "{broker} {kind}: {} records from {stem} ({:?} to {:?})",
        processed.records.len(),
        processed.start_date,
        processed.end_date
    );
    Ok(processed)
}

pub fn process(
    cleaner: &dyn Cleaner,
    source: &DescribedReader,
    options: &ProcessOptions,
) -> Result<ProcessedTable, ImportError> {
    let text = source.read_to_string().map_err(|e| {
        ImportError::Format(format!("Unable to read {}: {}", source.desc(), e))
    })?;
    process_text(cleaner, &source.stem(), &text, options)
}

pub fn process_file(
    cleaner: &dyn Cleaner,
    path: &Path,
    options: &ProcessOptions,
) -> Result<ProcessedTable, ImportError> {
    process(cleaner, &DescribedReader::from_file_path(path.to_path_buf()), options)
}

// Validation. Cells already typed by a cleaner are taken as-is, and text
// must parse strictly.

fn date_field(row: &Row, col: &str) -> Result<Date, ImportError> {
    match row.get(col) {
        Cell::Date(d) => Ok(*d),
        Cell::Text(s) => parse_standard_date(s)
            .map_err(|_| row.err(format!("{col} \"{s}\" is not a YYYY-MM-DD date"))),
        Cell::Empty => Err(row.err(format!("{col} is empty"))),
        Cell::Num(d) => Err(row.err(format!("{col} {d} is not a date"))),
    }
}

fn decimal_field(row: &Row, col: &str) -> Result<Decimal, ImportError> {
    match row.get(col) {
        Cell::Num(d) => Ok(*d),
        Cell::Text(s) => Decimal::from_str(s)
            .or_else(|_| Decimal::from_scientific(s))
            .map_err(|_| row.err(format!("{col} \"{s}\" is not a number"))),
        Cell::Empty => Err(row.err(format!("{col} is empty"))),
        Cell::Date(d) => Err(row.err(format!("{col} {d} is not a number"))),
    }
}

fn gez_field(row: &Row, col: &str) -> Result<GreaterEqualZeroDecimal, ImportError> {
    let d = decimal_field(row, col)?;
    GreaterEqualZeroDecimal::try_from(d)
        .map_err(|_| row.err(format!("{col} {d} is negative")))
}

fn contracts_field(row: &Row) -> Result<u32, ImportError> {
    let d = decimal_field(row, Col::CONTRACTS)?;
    if d.is_sign_negative() && !d.is_zero() {
        return Err(row.err(format!("{} {} is negative", Col::CONTRACTS, d)));
    }
    if !d.fract().is_zero() {
        return Err(row.err(format!("{} {} is not a whole number", Col::CONTRACTS, d)));
    }
    d.to_u32()
        .ok_or_else(|| row.err(format!("{} {} is out of range", Col::CONTRACTS, d)))
}

fn text_field<'a>(row: &Row<'a>, col: &str) -> Result<&'a str, ImportError> {
    match row.get(col) {
        Cell::Text(s) => Ok(s.as_str()),
        Cell::Empty => Err(row.err(format!("{col} is empty"))),
        other => Err(row.err(format!("{col} {other} is not text"))),
    }
}

fn validate_row(kind: TableKind, row: &Row) -> Result<TxRecord, ImportError> {
    let date = date_field(row, Col::DATE)?;
    let record = match kind {
        TableKind::Options => {
            let trade = OptionTrade {
                date,
                operation: OptionOperation::from_code(text_field(row, Col::ACTION)?),
                contracts: contracts_field(row)?,
                symbol: text_field(row, Col::SYMBOL)?.to_string(),
                expiration_date: date_field(row, Col::EXPIRATION)?,
                strike_price: gez_field(row, Col::STRIKE)?,
                option_type: OptionType::from_word(text_field(row, Col::OPTION_TYPE)?)
                    .map_err(|e| row.err(e))?,
                premium: decimal_field(row, Col::PRICE)?,
                total: decimal_field(row, Col::AMOUNT)?,
            };
            if !trade.total_matches_operation() {
                warn!(
                    "Row {}: {} {} total {} has an unexpected sign",
                    row.num(),
                    trade.operation,
                    trade.symbol,
                    trade.total
                );
            }
            TxRecord::Option(trade)
        }
        TableKind::Shares => {
            let action =
                ShareAction::try_from(text_field(row, Col::ACTION)?).map_err(|e| row.err(e))?;
            TxRecord::Share(ShareTrade {
                date,
                action,
                symbol: text_field(row, Col::SYMBOL)?.to_string(),
                price: gez_field(row, Col::PRICE)?,
                quantity: action.signed_quantity(decimal_field(row, Col::QUANTITY)?),
                amount: decimal_field(row, Col::AMOUNT)?,
            })
        }
        TableKind::Dividends => TxRecord::Dividend(Dividend {
            date,
            symbol: text_field(row, Col::SYMBOL)?.to_string(),
            amount: decimal_field(row, Col::AMOUNT)?,
        }),
        TableKind::Deposits => {
            let action = TransferAction::try_from(text_field(row, Col::ACTION)?)
                .map_err(|e| row.err(e))?;
            let amount = decimal_field(row, Col::AMOUNT)?;
            TxRecord::Transfer(
                CashTransfer::new(date, action, amount).map_err(|e| row.err(e))?,
            )
        }
    };
    Ok(record)
}

/// Re-parses a projected table into canonical records.
/// Any invalid row fails the whole table.
pub fn validate(kind: TableKind, table: &RawTable) -> Result<Vec<TxRecord>, ImportError> {
    table
        .rows()
        .map(|row| validate_row(kind, &row))
        .collect::<Result<Vec<TxRecord>, ImportError>>()
        .map_err(|e| {
            tracing::error!("{}", e);
            e
        })
}
