//! Schwab transaction history exports.

use tracing::info;

use crate::{
    pipeline::{
        normalize::{currency_to_decimal, DescriptionLayout, OptionDescription},
        table::{Cell, RawTable, Row},
        Cleaner, FileLayout, ImportError, ProcessOptions,
    },
    records::{Col, OptionOperation, ShareAction, TableKind},
    util::date::to_canonical_date,
};

use super::{currency_cell, decimal_of, Broker};

const DATE_FMT: &str = "%m/%d/%Y";

struct SchwabCol();
impl SchwabCol {
    const DATE: &'static str = "Date";
    const ACTION: &'static str = "Action";
    const SYMBOL: &'static str = "Symbol";
    const QUANTITY: &'static str = "Quantity";
    const PRICE: &'static str = "Price";
    const AMOUNT: &'static str = "Amount";
}

fn option_operation(action: &str) -> Option<OptionOperation> {
    match action {
        "Sell to Open" => Some(OptionOperation::Sto),
        "Buy to Close" => Some(OptionOperation::Btc),
        "Buy to Open" => Some(OptionOperation::Bto),
        "Sell to Close" => Some(OptionOperation::Stc),
        _ => None,
    }
}

fn share_action(action: &str) -> Option<ShareAction> {
    match action {
        "Buy" | "Reinvest Shares" => Some(ShareAction::Buy),
        "Sell" => Some(ShareAction::Sell),
        _ => None,
    }
}

// Only called once rows are filtered down to the recognized actions
fn row_share_action(row: &Row) -> ShareAction {
    share_action(row.str(SchwabCol::ACTION)).unwrap_or(ShareAction::Buy)
}

const DIVIDEND_ACTIONS: [&str; 2] = ["Cash Dividend", "Reinvest Dividend"];

/// Dates may carry a qualifier, as in "08/25/2025 as of 08/22/2025".
/// The first date is used.
fn derive_date(table: &mut RawTable) -> Result<(), ImportError> {
    table.derive_column(Col::DATE, |r| {
        let value = r.str(SchwabCol::DATE);
        let first = value.split_whitespace().next().unwrap_or_default();
        to_canonical_date(first, DATE_FMT)
            .map(Cell::Date)
            .map_err(|e| r.err(format!("Date: {e}")))
    })
}

/// Option symbols look like "AAPL 08/15/2025 150.00 P"
fn option_symbol<'a>(row: &Row<'a>) -> Result<OptionDescription<'a>, ImportError> {
    OptionDescription::parse(row.str(SchwabCol::SYMBOL), DescriptionLayout::SymbolExpiryStrikeType)
        .map_err(|e| row.err(e))
}

pub struct SchwabOptions;

impl Cleaner for SchwabOptions {
    fn broker(&self) -> Broker {
        Broker::Schwab
    }

    fn kind(&self) -> TableKind {
        TableKind::Options
    }

    fn layout(&self, _text: &str, _options: &ProcessOptions) -> Result<FileLayout, ImportError> {
        Ok(FileLayout::new(0, 0))
    }

    fn clean(&self, mut table: RawTable) -> Result<RawTable, ImportError> {
        table.require_columns(&[
            SchwabCol::DATE,
            SchwabCol::ACTION,
            SchwabCol::SYMBOL,
            SchwabCol::QUANTITY,
            SchwabCol::PRICE,
            SchwabCol::AMOUNT,
        ])?;

        table.retain(|r| option_operation(r.str(SchwabCol::ACTION)).is_some());

        if table.is_empty() {
            info!("No option transactions found");
            return Ok(table);
        }

        table.derive_column(Col::ACTION, |r| {
            let op = option_operation(r.str(SchwabCol::ACTION)).unwrap_or(OptionOperation::Unknown);
            Ok(Cell::text(op.code()))
        })?;
        table.derive_column(Col::CONTRACTS, |r| currency_cell(r, SchwabCol::QUANTITY))?;
        table.derive_column(Col::PRICE, |r| currency_cell(r, SchwabCol::PRICE))?;
        table.derive_column(Col::AMOUNT, |r| currency_cell(r, SchwabCol::AMOUNT))?;
        table.derive_column(Col::EXPIRATION, |r| {
            let sym = option_symbol(r)?;
            to_canonical_date(sym.expiration, DATE_FMT)
                .map(Cell::Date)
                .map_err(|e| r.err(format!("Expiration: {e}")))
        })?;
        table.derive_column(Col::STRIKE, |r| {
            let sym = option_symbol(r)?;
            currency_to_decimal(sym.strike)
                .map(Cell::Num)
                .map_err(|e| r.err(format!("Strike: {e}")))
        })?;
        table.derive_column(Col::OPTION_TYPE, |r| {
            option_symbol(r).map(|s| Cell::text(s.option_type.code()))
        })?;
        // Replaces the full option symbol with the underlying, so it goes last
        table.derive_column(Col::SYMBOL, |r| option_symbol(r).map(|s| Cell::text(s.symbol)))?;
        derive_date(&mut table)?;
        Ok(table)
    }
}

pub struct SchwabShares;

impl Cleaner for SchwabShares {
    fn broker(&self) -> Broker {
        Broker::Schwab
    }

    fn kind(&self) -> TableKind {
        TableKind::Shares
    }

    fn layout(&self, _text: &str, _options: &ProcessOptions) -> Result<FileLayout, ImportError> {
        Ok(FileLayout::new(0, 0))
    }

    fn clean(&self, mut table: RawTable) -> Result<RawTable, ImportError> {
        table.require_columns(&[
            SchwabCol::DATE,
            SchwabCol::ACTION,
            SchwabCol::SYMBOL,
            SchwabCol::QUANTITY,
            SchwabCol::PRICE,
            SchwabCol::AMOUNT,
        ])?;

        table.retain(|r| share_action(r.str(SchwabCol::ACTION)).is_some());

        if table.is_empty() {
            info!("No share transactions found");
            return Ok(table);
        }

        table.derive_column(Col::QUANTITY, |r| {
            decimal_of(r, SchwabCol::QUANTITY)
                .map(|q| Cell::Num(row_share_action(r).signed_quantity(q)))
        })?;
        table.derive_column(Col::PRICE, |r| currency_cell(r, SchwabCol::PRICE))?;
        table.derive_column(Col::AMOUNT, |r| currency_cell(r, SchwabCol::AMOUNT))?;
        // Reinvested shares count as bought
        table.derive_column(Col::ACTION, |r| Ok(Cell::text(row_share_action(r).to_string())))?;
        derive_date(&mut table)?;
        Ok(table)
    }
}

pub struct SchwabDividends;

impl Cleaner for SchwabDividends {
    fn broker(&self) -> Broker {
        Broker::Schwab
    }

    fn kind(&self) -> TableKind {
        TableKind::Dividends
    }

    fn layout(&self, _text: &str, _options: &ProcessOptions) -> Result<FileLayout, ImportError> {
        Ok(FileLayout::new(0, 0))
    }

    fn clean(&self, mut table: RawTable) -> Result<RawTable, ImportError> {
        table.require_columns(&[
            SchwabCol::DATE,
            SchwabCol::ACTION,
            SchwabCol::SYMBOL,
            SchwabCol::AMOUNT,
        ])?;

        table.retain(|r| DIVIDEND_ACTIONS.contains(&r.str(SchwabCol::ACTION)));

        if table.is_empty() {
            info!("No dividend transactions found");
            return Ok(table);
        }

        table.derive_column(Col::AMOUNT, |r| currency_cell(r, SchwabCol::AMOUNT))?;
        derive_date(&mut table)?;
        Ok(table)
    }
}
