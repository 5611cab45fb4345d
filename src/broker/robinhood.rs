//! Robinhood account activity reports.
//!
//! The header is on the first line, and the file ends with a blank line and
//! a disclaimer, which are skipped.

use rust_decimal_macros::dec;
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

use super::{currency_cell, date_cell, decimal_of, Broker};

const FOOTER_LINES: usize = 2;
const DATE_FMT: &str = "%m/%d/%Y";

struct RhCol();
impl RhCol {
    const PROCESS_DATE: &'static str = "Process Date";
    const SETTLE_DATE: &'static str = "Settle Date";
    const INSTRUMENT: &'static str = "Instrument";
    const DESCRIPTION: &'static str = "Description";
    const TRANS_CODE: &'static str = "Trans Code";
    const QUANTITY: &'static str = "Quantity";
    const PRICE: &'static str = "Price";
    const AMOUNT: &'static str = "Amount";
}

const OPTION_CODES: [&str; 4] = ["STO", "BTC", "BTO", "STC"];
const SHARE_CODES: [&str; 2] = ["Buy", "Sell"];
const DIVIDEND_CODE_PREFIX: &str = "CDIV";

fn rh_layout() -> FileLayout {
    FileLayout::new(0, FOOTER_LINES)
}

/// Option descriptions look like "YMAX 5/30/2025 Call $15.00"
fn description<'a>(row: &Row<'a>) -> Result<OptionDescription<'a>, ImportError> {
    OptionDescription::parse(row.str(RhCol::DESCRIPTION), DescriptionLayout::SymbolExpiryTypeStrike)
        .map_err(|e| row.err(e))
}

fn trans_code<'a>(row: &Row<'a>) -> &'a str {
    row.str(RhCol::TRANS_CODE)
}

pub struct RobinhoodOptions;

impl Cleaner for RobinhoodOptions {
    fn broker(&self) -> Broker {
        Broker::Robinhood
    }

    fn kind(&self) -> TableKind {
        TableKind::Options
    }

    fn layout(&self, _text: &str, _options: &ProcessOptions) -> Result<FileLayout, ImportError> {
        Ok(rh_layout())
    }

    fn clean(&self, mut table: RawTable) -> Result<RawTable, ImportError> {
        table.require_columns(&[
            RhCol::PROCESS_DATE,
            RhCol::TRANS_CODE,
            RhCol::INSTRUMENT,
            RhCol::DESCRIPTION,
            RhCol::QUANTITY,
            RhCol::PRICE,
        ])?;

        table.retain(|r| OPTION_CODES.contains(&trans_code(r)));

        if table.is_empty() {
            info!("No option transactions found");
            return Ok(table);
        }

        // The reported amount includes fees. It is recomputed from the
        // contract price instead.
        table.drop_columns(&[RhCol::AMOUNT]);

        let hundred = dec!(100);
        table.derive_column(Col::AMOUNT, |r| {
            let amount = decimal_of(r, RhCol::QUANTITY)? * hundred * decimal_of(r, RhCol::PRICE)?;
            if OptionOperation::from_code(trans_code(r)).is_buy() {
                Ok(Cell::Num(-amount))
            } else {
                Ok(Cell::Num(amount))
            }
        })?;
        table.derive_column(Col::CONTRACTS, |r| currency_cell(r, RhCol::QUANTITY))?;
        // Replaces the "$0.45" text in place
        table.derive_column(Col::PRICE, |r| currency_cell(r, RhCol::PRICE))?;
        table.derive_column(Col::EXPIRATION, |r| {
            let desc = description(r)?;
            to_canonical_date(desc.expiration, DATE_FMT)
                .map(Cell::Date)
                .map_err(|e| r.err(format!("Expiration: {e}")))
        })?;
        table.derive_column(Col::STRIKE, |r| {
            let desc = description(r)?;
            currency_to_decimal(desc.strike)
                .map(Cell::Num)
                .map_err(|e| r.err(format!("Strike: {e}")))
        })?;
        table.derive_column(Col::OPTION_TYPE, |r| {
            description(r).map(|d| Cell::text(d.option_type.code()))
        })?;
        table.rename(RhCol::TRANS_CODE, Col::ACTION);
        table.rename(RhCol::INSTRUMENT, Col::SYMBOL);
        table.derive_column(Col::DATE, |r| date_cell(r, RhCol::PROCESS_DATE, DATE_FMT))?;
        Ok(table)
    }
}

pub struct RobinhoodShares;

impl Cleaner for RobinhoodShares {
    fn broker(&self) -> Broker {
        Broker::Robinhood
    }

    fn kind(&self) -> TableKind {
        TableKind::Shares
    }

    fn layout(&self, _text: &str, _options: &ProcessOptions) -> Result<FileLayout, ImportError> {
        Ok(rh_layout())
    }

    fn clean(&self, mut table: RawTable) -> Result<RawTable, ImportError> {
        table.require_columns(&[
            RhCol::SETTLE_DATE,
            RhCol::TRANS_CODE,
            RhCol::INSTRUMENT,
            RhCol::QUANTITY,
            RhCol::PRICE,
            RhCol::AMOUNT,
        ])?;

        table.retain(|r| SHARE_CODES.contains(&trans_code(r)));

        if table.is_empty() {
            info!("No share transactions found");
            return Ok(table);
        }

        table.derive_column(Col::PRICE, |r| currency_cell(r, RhCol::PRICE))?;
        table.derive_column(Col::AMOUNT, |r| currency_cell(r, RhCol::AMOUNT))?;
        table.derive_column(Col::QUANTITY, |r| {
            let action = ShareAction::try_from(trans_code(r)).map_err(|e| r.err(e))?;
            decimal_of(r, RhCol::QUANTITY).map(|q| Cell::Num(action.signed_quantity(q)))
        })?;
        table.rename(RhCol::TRANS_CODE, Col::ACTION);
        table.rename(RhCol::INSTRUMENT, Col::SYMBOL);
        table.derive_column(Col::DATE, |r| date_cell(r, RhCol::SETTLE_DATE, DATE_FMT))?;
        Ok(table)
    }
}

pub struct RobinhoodDividends;

impl Cleaner for RobinhoodDividends {
    fn broker(&self) -> Broker {
        Broker::Robinhood
    }

    fn kind(&self) -> TableKind {
        TableKind::Dividends
    }

    fn layout(&self, _text: &str, _options: &ProcessOptions) -> Result<FileLayout, ImportError> {
        Ok(rh_layout())
    }

    fn clean(&self, mut table: RawTable) -> Result<RawTable, ImportError> {
        table.require_columns(&[
            RhCol::SETTLE_DATE,
            RhCol::TRANS_CODE,
            RhCol::INSTRUMENT,
            RhCol::AMOUNT,
        ])?;

        table.retain(|r| trans_code(r).starts_with(DIVIDEND_CODE_PREFIX));

        if table.is_empty() {
            info!("No dividend transactions found");
            return Ok(table);
        }

        table.derive_column(Col::AMOUNT, |r| currency_cell(r, RhCol::AMOUNT))?;
        table.rename(RhCol::INSTRUMENT, Col::SYMBOL);
        table.derive_column(Col::DATE, |r| date_cell(r, RhCol::SETTLE_DATE, DATE_FMT))?;
        Ok(table)
    }
}
