//! Fidelity "Accounts History" csv exports.
//!
//! The header row ("Run Date,Account,...") follows a couple of blank lines,
//! and every kind of transaction is listed together, newest first.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, info, warn};

use crate::{
    pipeline::{
        normalize::{classify_fidelity_action, currency_to_decimal, FidelityOptionSymbol},
        section_skip_rows,
        table::{Cell, RawTable, Row},
        Cleaner, FileLayout, ImportError, ProcessOptions,
    },
    records::{Col, OptionOperation, ShareAction, TableKind, TransferAction},
    util::date::to_canonical_date,
};

use super::{currency_cell, date_cell, decimal_of, Broker};

const DEFAULT_SKIP_ROWS: usize = 2;
const DATE_FMT: &str = "%m/%d/%Y";
const EXPIRATION_FMT: &str = "%y%m%d";

struct FidelityCol();
impl FidelityCol {
    const RUN_DATE: &'static str = "Run Date";
    const ACTION: &'static str = "Action";
    const SYMBOL: &'static str = "Symbol";
    const DESCRIPTION: &'static str = "Description";
    const QUANTITY: &'static str = "Quantity";
    const PRICE: &'static str = "Price ($)";
    const AMOUNT: &'static str = "Amount ($)";
    const SETTLEMENT_DATE: &'static str = "Settlement Date";
}

fn fidelity_layout(text: &str, options: &ProcessOptions) -> Result<FileLayout, ImportError> {
    let skip_rows =
        section_skip_rows(text, FidelityCol::RUN_DATE, None, Some(DEFAULT_SKIP_ROWS), options)?;
    Ok(FileLayout::new(skip_rows, 0))
}

fn is_option_symbol(symbol: &str) -> bool {
    symbol.starts_with('-')
}

fn decode_symbol(row: &Row) -> Result<FidelityOptionSymbol, ImportError> {
    let symbol = row.str(FidelityCol::SYMBOL);
    FidelityOptionSymbol::decode(symbol)
        .ok_or_else(|| row.err(format!("Unable to decode option symbol \"{symbol}\"")))
}

fn derive_date(table: &mut RawTable) -> Result<(), ImportError> {
    table.derive_column(Col::DATE, |r| date_cell(r, FidelityCol::RUN_DATE, DATE_FMT))
}

fn derive_amount(table: &mut RawTable) -> Result<(), ImportError> {
    table.derive_column(Col::AMOUNT, |r| currency_cell(r, FidelityCol::AMOUNT))
}

/// Option trades, with symbols like "-MSTU250815P8".
pub struct FidelityOptions;

impl Cleaner for FidelityOptions {
    fn broker(&self) -> Broker {
        Broker::Fidelity
    }

    fn kind(&self) -> TableKind {
        TableKind::Options
    }

    fn layout(&self, text: &str, options: &ProcessOptions) -> Result<FileLayout, ImportError> {
        fidelity_layout(text, options)
    }

    fn clean(&self, mut table: RawTable) -> Result<RawTable, ImportError> {
        table.require_columns(&[
            FidelityCol::RUN_DATE,
            FidelityCol::ACTION,
            FidelityCol::SYMBOL,
            FidelityCol::DESCRIPTION,
            FidelityCol::QUANTITY,
            FidelityCol::PRICE,
            FidelityCol::AMOUNT,
        ])?;

        table.drop_empty(&[FidelityCol::SYMBOL, FidelityCol::AMOUNT, FidelityCol::PRICE]);
        table.retain(|r| is_option_symbol(r.str(FidelityCol::SYMBOL)));
        table.retain(|r| {
            let decodable = FidelityOptionSymbol::decode(r.str(FidelityCol::SYMBOL)).is_some();
            if !decodable {
                warn!("Row {}: skipping undecodable option symbol {}", r.num(), r.str(FidelityCol::SYMBOL));
            }
            decodable
        });
        // Expirations and assignments don't form an operation code.
        table.retain(|r| {
            let op = classify_fidelity_action(r.str(FidelityCol::ACTION));
            if op == OptionOperation::Unknown {
                debug!("Row {}: skipping option action {}", r.num(), r.str(FidelityCol::ACTION));
            }
            op != OptionOperation::Unknown
        });

        if table.is_empty() {
            info!("No option transactions found");
            return Ok(table);
        }

        // Fidelity quantities are negative when selling, and the total is
        // recomputed from the contract price (excluding commission and fees).
        let hundred = dec!(100);
        table.derive_column(Col::AMOUNT, |r| {
            let quantity = decimal_of(r, FidelityCol::QUANTITY)?;
            let price = decimal_of(r, FidelityCol::PRICE)?;
            Ok(Cell::Num(-quantity * hundred * price))
        })?;
        table.derive_column(Col::CONTRACTS, |r| {
            decimal_of(r, FidelityCol::QUANTITY).map(|q| Cell::Num(q.abs()))
        })?;
        table.derive_column(Col::PRICE, |r| currency_cell(r, FidelityCol::PRICE))?;
        table.derive_column(Col::EXPIRATION, |r| {
            let decoded = decode_symbol(r)?;
            to_canonical_date(&decoded.expiration, EXPIRATION_FMT)
                .map(Cell::Date)
                .map_err(|e| r.err(e))
        })?;
        table.derive_column(Col::OPTION_TYPE, |r| {
            decode_symbol(r).map(|d| Cell::text(d.option_type.code()))
        })?;
        table.derive_column(Col::STRIKE, |r| {
            let decoded = decode_symbol(r)?;
            currency_to_decimal(&decoded.strike)
                .map(Cell::Num)
                .map_err(|e| r.err(format!("Strike: {e}")))
        })?;
        table.derive_column(Col::ACTION, |r| {
            Ok(Cell::text(classify_fidelity_action(r.str(FidelityCol::ACTION)).code()))
        })?;
        // Last, since the other derivations decode the raw symbol
        table.derive_column(Col::SYMBOL, |r| decode_symbol(r).map(|d| Cell::text(d.symbol)))?;
        derive_date(&mut table)?;
        Ok(table)
    }
}

/// "YOU BOUGHT ..." -> Buy, "YOU SOLD ..." -> Sell
fn share_action(action: &str) -> Option<ShareAction> {
    match action.split_whitespace().nth(1)? {
        "BOUGHT" => Some(ShareAction::Buy),
        "SOLD" => Some(ShareAction::Sell),
        _ => None,
    }
}

// Only called once rows are filtered down to the recognized actions
fn row_share_action(row: &Row) -> ShareAction {
    share_action(row.str(FidelityCol::ACTION)).unwrap_or(ShareAction::Buy)
}

pub struct FidelityShares;

impl Cleaner for FidelityShares {
    fn broker(&self) -> Broker {
        Broker::Fidelity
    }

    fn kind(&self) -> TableKind {
        TableKind::Shares
    }

    fn layout(&self, text: &str, options: &ProcessOptions) -> Result<FileLayout, ImportError> {
        fidelity_layout(text, options)
    }

    fn clean(&self, mut table: RawTable) -> Result<RawTable, ImportError> {
        table.require_columns(&[
            FidelityCol::RUN_DATE,
            FidelityCol::ACTION,
            FidelityCol::SYMBOL,
            FidelityCol::SETTLEMENT_DATE,
            FidelityCol::QUANTITY,
            FidelityCol::PRICE,
            FidelityCol::AMOUNT,
        ])?;

        table.retain(|r| !is_option_symbol(r.str(FidelityCol::SYMBOL)));
        table.retain(|r| !r.str(FidelityCol::ACTION).starts_with("DIVIDEND"));
        table.drop_empty(&[
            FidelityCol::ACTION,
            FidelityCol::SYMBOL,
            FidelityCol::AMOUNT,
            FidelityCol::SETTLEMENT_DATE,
        ]);
        table.retain(|r| {
            let action = r.str(FidelityCol::ACTION);
            let is_trade = share_action(action).is_some();
            if !is_trade {
                debug!("Row {}: skipping non-trade action {}", r.num(), action);
            }
            is_trade
        });

        if table.is_empty() {
            info!("No share transactions found");
            return Ok(table);
        }

        table.derive_column(Col::QUANTITY, |r| {
            decimal_of(r, FidelityCol::QUANTITY)
                .map(|q| Cell::Num(row_share_action(r).signed_quantity(q)))
        })?;
        // No price is given for some entries, like stock awards
        table.derive_column(Col::PRICE, |r| {
            if r.get(FidelityCol::PRICE).is_empty() {
                Ok(Cell::Num(Decimal::ZERO))
            } else {
                currency_cell(r, FidelityCol::PRICE)
            }
        })?;
        table.derive_column(Col::ACTION, |r| Ok(Cell::text(row_share_action(r).to_string())))?;
        derive_amount(&mut table)?;
        derive_date(&mut table)?;
        Ok(table)
    }
}

pub struct FidelityDividends;

impl Cleaner for FidelityDividends {
    fn broker(&self) -> Broker {
        Broker::Fidelity
    }

    fn kind(&self) -> TableKind {
        TableKind::Dividends
    }

    fn layout(&self, text: &str, options: &ProcessOptions) -> Result<FileLayout, ImportError> {
        fidelity_layout(text, options)
    }

    fn clean(&self, mut table: RawTable) -> Result<RawTable, ImportError> {
        table.require_columns(&[
            FidelityCol::RUN_DATE,
            FidelityCol::ACTION,
            FidelityCol::SYMBOL,
            FidelityCol::AMOUNT,
        ])?;

        table.retain(|r| r.str(FidelityCol::ACTION).starts_with("DIVIDEND"));

        if table.is_empty() {
            info!("No dividend transactions found");
            return Ok(table);
        }

        derive_amount(&mut table)?;
        derive_date(&mut table)?;
        Ok(table)
    }
}

/// Electronic funds transfers in and out of the account
pub struct FidelityDeposits;

impl Cleaner for FidelityDeposits {
    fn broker(&self) -> Broker {
        Broker::Fidelity
    }

    fn kind(&self) -> TableKind {
        TableKind::Deposits
    }

    fn layout(&self, text: &str, options: &ProcessOptions) -> Result<FileLayout, ImportError> {
        fidelity_layout(text, options)
    }

    fn clean(&self, mut table: RawTable) -> Result<RawTable, ImportError> {
        table.require_columns(&[
            FidelityCol::RUN_DATE,
            FidelityCol::ACTION,
            FidelityCol::AMOUNT,
        ])?;

        table.retain(|r| {
            r.str(FidelityCol::ACTION)
                .to_lowercase()
                .contains("electronic funds transfer")
        });

        if table.is_empty() {
            info!("No deposit transactions found");
            return Ok(table);
        }

        derive_amount(&mut table)?;
        table.derive_column(Col::ACTION, |r| match r.get(Col::AMOUNT) {
            Cell::Num(amount) => Ok(Cell::text(TransferAction::for_amount(amount).to_string())),
            other => Err(r.err(format!("Amount {other} is not a number"))),
        })?;
        derive_date(&mut table)?;
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use crate::{
        gezdec,
        pipeline::{process_text, ImportError, ProcessOptions},
        records::{
            CashTransfer, Dividend, OptionOperation, OptionTrade, OptionType,
            ShareAction, ShareTrade, TransferAction, TxRecord,
        },
        testlib::{assert_err_re, assert_vec_eq},
        util::date::pub_testlib::ymd,
    };

    use super::*;

    const HEADER: &str = "Run Date,Account,Account Number,Action,Symbol,Description,Type,\
Quantity,Price ($),Commission ($),Fees ($),Accrued Interest ($),Amount ($),Settlement Date";

    fn export(rows: &[&str]) -> String {
        let mut text = format!("\n\n{HEADER}\n");
        for r in rows {
            text += r;
            text += "\n";
        }
        text += "\n\"The data and information in this spreadsheet is provided to you solely for your use.\"\n";
        text += "\"Date downloaded 08/20/2025 10:01 am\"\n";
        text
    }

    fn run(cleaner: &dyn Cleaner, text: &str) -> Result<Vec<TxRecord>, ImportError> {
        process_text(cleaner, "Accounts_History", text, &ProcessOptions::default())
            .map(|p| p.records)
    }

    const BOUGHT_PUT: &str = "08/01/2025,Individual,Z123,\"YOU BOUGHT OPENING TRANSACTION PUT (MSTU) \
T REX 2X LONG MSTR AUG 15 25 $8 (100 SHS) (Cash)\",-MSTU250815P8,PUT (MSTU) T REX 2X LONG MSTR,\
Cash,3,0.16,1.95,0.06,,-50.01,08/04/2025";
    const SOLD_CALL: &str = "07/28/2025,Individual,Z123,YOU SOLD OPENING TRANSACTION CALL (TSLL),\
-TSLL250808C15.5,CALL (TSLL) DIREXION,Margin,-2,0.45,1.30,0.04,,88.66,07/29/2025";
    const EXPIRED: &str = "08/18/2025,Individual,Z123,EXPIRED PUT (MSTU),-MSTU250815P8,PUT (MSTU),\
Cash,-3,,,,,0.00,";
    const BUY_SHARES: &str = "07/30/2025,Individual,Z123,YOU BOUGHT T REX 2X LONG MSTR (MSTU) (Cash),\
MSTU,T REX 2X LONG MSTR,Cash,100,7.95,0,,,-795.00,07/31/2025";
    const SELL_SHARES: &str = "07/31/2025,Individual,Z123,YOU SOLD MICROSOFT CORP (MSFT) (Margin),\
MSFT,MICROSOFT CORP,Margin,-5,510.25,0,0.02,,2551.23,08/01/2025";
    const DIVIDEND: &str = "07/31/2025,Individual,Z123,DIVIDEND RECEIVED YIELDMAX (YMAX) (Cash),\
YMAX,YIELDMAX,Cash,,,,,,15.01,";
    const REINVEST: &str = "07/31/2025,Individual,Z123,REINVESTMENT FIDELITY GOVT MONEY (SPAXX),\
SPAXX,FIDELITY GOVT,Cash,1.2,1,,,,-1.20,07/31/2025";
    const EFT_IN: &str = "07/25/2025,Individual,Z123,Electronic Funds Transfer Received (Cash),,\
No Description,Cash,,,,,,1000.00,";
    const EFT_OUT: &str = "07/26/2025,Individual,Z123,Electronic Funds Transfer Paid (Cash),,\
No Description,Cash,,,,,,-250.00,";

    #[test]
    fn test_options() {
        let text = export(&[BOUGHT_PUT, SOLD_CALL, EXPIRED, BUY_SHARES, DIVIDEND]);
        let records = run(&FidelityOptions, &text).unwrap();
        assert_vec_eq(
            records,
            vec![
                TxRecord::Option(OptionTrade {
                    date: ymd(2025, 8, 1),
                    operation: OptionOperation::Bto,
                    contracts: 3,
                    symbol: "MSTU".to_string(),
                    expiration_date: ymd(2025, 8, 15),
                    strike_price: gezdec!(8),
                    option_type: OptionType::Put,
                    premium: dec!(0.16),
                    total: dec!(-48.00),
                }),
                TxRecord::Option(OptionTrade {
                    date: ymd(2025, 7, 28),
                    operation: OptionOperation::Sto,
                    contracts: 2,
                    symbol: "TSLL".to_string(),
                    expiration_date: ymd(2025, 8, 8),
                    strike_price: gezdec!(15.5),
                    option_type: OptionType::Call,
                    premium: dec!(0.45),
                    total: dec!(90.00),
                }),
            ],
        );
    }

    #[test]
    fn test_shares() {
        let text = export(&[BOUGHT_PUT, BUY_SHARES, SELL_SHARES, DIVIDEND, REINVEST, EFT_IN]);
        let records = run(&FidelityShares, &text).unwrap();
        assert_vec_eq(
            records,
            vec![
                TxRecord::Share(ShareTrade {
                    date: ymd(2025, 7, 30),
                    action: ShareAction::Buy,
                    symbol: "MSTU".to_string(),
                    price: gezdec!(7.95),
                    quantity: dec!(100),
                    amount: dec!(-795.00),
                }),
                TxRecord::Share(ShareTrade {
                    date: ymd(2025, 7, 31),
                    action: ShareAction::Sell,
                    symbol: "MSFT".to_string(),
                    price: gezdec!(510.25),
                    quantity: dec!(-5),
                    amount: dec!(2551.23),
                }),
            ],
        );
    }

    #[test]
    fn test_dividends() {
        let text = export(&[BOUGHT_PUT, DIVIDEND, BUY_SHARES]);
        let records = run(&FidelityDividends, &text).unwrap();
        assert_vec_eq(
            records,
            vec![TxRecord::Dividend(Dividend {
                date: ymd(2025, 7, 31),
                symbol: "YMAX".to_string(),
                amount: dec!(15.01),
            })],
        );
    }

    #[test]
    fn test_deposits() {
        let text = export(&[EFT_IN, BUY_SHARES, EFT_OUT]);
        let records = run(&FidelityDeposits, &text).unwrap();
        assert_vec_eq(
            records,
            vec![
                TxRecord::Transfer(
                    CashTransfer::new(ymd(2025, 7, 25), TransferAction::Deposit, dec!(1000))
                        .unwrap(),
                ),
                TxRecord::Transfer(
                    CashTransfer::new(ymd(2025, 7, 26), TransferAction::Withdrawal, dec!(-250))
                        .unwrap(),
                ),
            ],
        );
    }

    #[test]
    fn test_nothing_matching() {
        let text = export(&[BUY_SHARES]);
        for cleaner in Broker::Fidelity.cleaners() {
            if cleaner.kind() == TableKind::Shares {
                continue;
            }
            let res = process_text(cleaner.as_ref(), "x", &text, &ProcessOptions::default())
                .unwrap();
            assert_eq!(res.records, vec![]);
            assert_eq!((res.start_date, res.end_date), (None, None));
        }
    }

    #[test]
    fn test_header_without_blank_lines() {
        // Newer exports start right at the header
        let text = format!("{HEADER}\n{DIVIDEND}\n");
        assert_eq!(run(&FidelityDividends, &text).unwrap().len(), 1);
    }

    #[test]
    fn test_missing_columns() {
        let text = "\n\nRun Date,Action,Symbol\n08/01/2025,YOU BOUGHT,AAPL\n";
        assert_err_re(
            concat!(
                r"^Missing required columns: Description, Quantity, Price \(\$\), ",
                r"Amount \(\$\)\. Found columns: Run Date, Action, Symbol$"
            ),
            run(&FidelityOptions, text),
        );
    }

    #[test]
    fn test_bad_run_date() {
        let row = DIVIDEND.replace("07/31/2025", "2025/31/07");
        assert_err_re(
            "Run Date: Unable to parse date",
            run(&FidelityDividends, &export(&[&row])),
        );
    }
}
