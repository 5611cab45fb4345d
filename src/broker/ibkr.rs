//! Interactive Brokers activity statements.
//!
//! A statement is a sequence of sections ("Statement", "Trades", "Dividends",
//! ...), each with its own header line. The first two fields of every line
//! are the section name and the line type (Header, Data, SubTotal, Total).
//! Tables are read from the header of the section of interest onward, so
//! rows from later sections are filtered out by those two fields.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};

use crate::{
    pipeline::{
        normalize::{
            classify_ibkr_action, currency_to_decimal, DescriptionLayout, OptionDescription,
        },
        section_skip_rows,
        table::{Cell, RawTable, Row},
        Cleaner, FileLayout, ImportError, ProcessOptions,
    },
    records::{Col, ShareAction, TableKind},
    util::date::to_canonical_date,
};

use super::{currency_cell, decimal_of, Broker};

const TRADES_SECTION_MARKER: &str = "Trades,Header,DataDiscriminator,Asset Category";
const DIVIDENDS_SECTION_MARKER: &str = "Dividends,Header,Currency,Date";

const OPTIONS_CATEGORY: &str = "Equity and Index Options";
const STOCKS_CATEGORY: &str = "Stocks";

const EXPIRATION_FMT: &str = "%d%b%y";

struct IbkrCol();
impl IbkrCol {
    const TRADES: &'static str = "Trades";
    const DIVIDENDS: &'static str = "Dividends";
    const HEADER: &'static str = "Header";
    const DATA_DISCRIMINATOR: &'static str = "DataDiscriminator";
    const ASSET_CATEGORY: &'static str = "Asset Category";
    const CURRENCY: &'static str = "Currency";
    const SYMBOL: &'static str = "Symbol";
    const DATE_TIME: &'static str = "Date/Time";
    const DATE: &'static str = "Date";
    const DESCRIPTION: &'static str = "Description";
    const QUANTITY: &'static str = "Quantity";
    const T_PRICE: &'static str = "T. Price";
    const PROCEEDS: &'static str = "Proceeds";
    const AMOUNT: &'static str = "Amount";
    const CODE: &'static str = "Code";
}

const DATA_LINE: &str = "Data";

lazy_static! {
    // "TSLY(US88636J4445) Cash Dividend USD 0.5 per Share (Ordinary Dividend)"
    static ref DIVIDEND_SYMBOL_RE: Regex = Regex::new(r"^([A-Z]+)\(").unwrap();
}

fn is_section_data(row: &Row, section: &str) -> bool {
    row.str(section) == section && row.str(IbkrCol::HEADER) == DATA_LINE
}

/// Whether the loaded header is a line of some other statement section.
/// That happens when `section` is absent, and the locator fell back to
/// a line near the top (eg. "Statement,Data,BrokerName,...").
fn lacks_section(table: &RawTable, section: &str) -> bool {
    let cols = table.columns();
    let other_section = cols.first().map(|c| c != section).unwrap_or(false);
    let statement_line = cols
        .get(1)
        .map(|c| c == IbkrCol::HEADER || c == DATA_LINE)
        .unwrap_or(false);
    other_section && statement_line
}

/// Empties the table when the statement has no `section` at all.
fn skip_missing_section(table: &mut RawTable, section: &str, kind: TableKind) -> bool {
    if !lacks_section(table, section) {
        return false;
    }
    info!("No {section} section in the statement. No {kind} to import");
    table.retain(|_| false);
    true
}

fn trades_layout(
    text: &str,
    category: &str,
    options: &ProcessOptions,
) -> Result<FileLayout, ImportError> {
    let skip_rows = section_skip_rows(text, TRADES_SECTION_MARKER, Some(category), None, options)?;
    Ok(FileLayout::new(skip_rows, 0))
}

/// "2025-08-01, 10:15:32" -> "2025-08-01"
fn derive_trade_date(table: &mut RawTable) -> Result<(), ImportError> {
    table.derive_column(Col::DATE, |r| {
        let date_time = r.str(IbkrCol::DATE_TIME);
        Ok(Cell::text(date_time.split(',').next().unwrap_or_default().trim()))
    })
}

/// Option symbols look like "AAPL 15AUG25 150 P"
fn option_symbol<'a>(row: &Row<'a>) -> Result<OptionDescription<'a>, ImportError> {
    OptionDescription::parse(row.str(IbkrCol::SYMBOL), DescriptionLayout::SymbolExpiryStrikeType)
        .map_err(|e| row.err(e))
}

pub struct IbkrOptions;

impl Cleaner for IbkrOptions {
    fn broker(&self) -> Broker {
        Broker::Ibkr
    }

    fn kind(&self) -> TableKind {
        TableKind::Options
    }

    fn layout(&self, text: &str, options: &ProcessOptions) -> Result<FileLayout, ImportError> {
        trades_layout(text, OPTIONS_CATEGORY, options)
    }

    fn clean(&self, mut table: RawTable) -> Result<RawTable, ImportError> {
        if skip_missing_section(&mut table, IbkrCol::TRADES, TableKind::Options) {
            return Ok(table);
        }
        table.require_columns(&[
            IbkrCol::TRADES,
            IbkrCol::HEADER,
            IbkrCol::DATA_DISCRIMINATOR,
            IbkrCol::ASSET_CATEGORY,
            IbkrCol::CURRENCY,
            IbkrCol::SYMBOL,
            IbkrCol::DATE_TIME,
            IbkrCol::QUANTITY,
            IbkrCol::T_PRICE,
            IbkrCol::PROCEEDS,
            IbkrCol::CODE,
        ])?;

        table.retain(|r| is_section_data(r, IbkrCol::TRADES));
        table.retain(|r| r.str(IbkrCol::ASSET_CATEGORY) == OPTIONS_CATEGORY);

        if table.is_empty() {
            info!("No option transactions found");
            return Ok(table);
        }

        table.derive_column(Col::ACTION, |r| {
            let quantity = decimal_of(r, IbkrCol::QUANTITY)?;
            let op = classify_ibkr_action(&quantity, r.str(IbkrCol::CODE));
            Ok(Cell::text(op.code()))
        })?;
        table.derive_column(Col::CONTRACTS, |r| {
            decimal_of(r, IbkrCol::QUANTITY).map(|q| Cell::Num(q.abs()))
        })?;
        table.derive_column(Col::PRICE, |r| currency_cell(r, IbkrCol::T_PRICE))?;
        table.derive_column(Col::AMOUNT, |r| currency_cell(r, IbkrCol::PROCEEDS))?;
        table.derive_column(Col::EXPIRATION, |r| {
            let sym = option_symbol(r)?;
            to_canonical_date(sym.expiration, EXPIRATION_FMT)
                .map(Cell::Date)
                .map_err(|e| r.err(format!("Expiration: {e}")))
        })?;
        table.derive_column(Col::STRIKE, |r| {
            option_symbol(r).and_then(|s| {
                currency_to_decimal(s.strike)
                    .map(Cell::Num)
                    .map_err(|e| r.err(format!("Strike: {e}")))
            })
        })?;
        table.derive_column(Col::OPTION_TYPE, |r| {
            option_symbol(r).map(|s| Cell::text(s.option_type.code()))
        })?;
        table.derive_column(Col::SYMBOL, |r| option_symbol(r).map(|s| Cell::text(s.symbol)))?;
        derive_trade_date(&mut table)?;
        Ok(table)
    }
}

pub struct IbkrShares;

impl Cleaner for IbkrShares {
    fn broker(&self) -> Broker {
        Broker::Ibkr
    }

    fn kind(&self) -> TableKind {
        TableKind::Shares
    }

    fn layout(&self, text: &str, options: &ProcessOptions) -> Result<FileLayout, ImportError> {
        trades_layout(text, STOCKS_CATEGORY, options)
    }

    fn clean(&self, mut table: RawTable) -> Result<RawTable, ImportError> {
        if skip_missing_section(&mut table, IbkrCol::TRADES, TableKind::Shares) {
            return Ok(table);
        }
        table.require_columns(&[
            IbkrCol::TRADES,
            IbkrCol::HEADER,
            IbkrCol::DATA_DISCRIMINATOR,
            IbkrCol::ASSET_CATEGORY,
            IbkrCol::CURRENCY,
            IbkrCol::SYMBOL,
            IbkrCol::DATE_TIME,
            IbkrCol::QUANTITY,
            IbkrCol::T_PRICE,
            IbkrCol::PROCEEDS,
        ])?;

        table.retain(|r| is_section_data(r, IbkrCol::TRADES));
        table.retain(|r| r.str(IbkrCol::ASSET_CATEGORY) == STOCKS_CATEGORY);

        if table.is_empty() {
            info!("No share transactions found");
            return Ok(table);
        }

        table.derive_column(Col::ACTION, |r| {
            let quantity = decimal_of(r, IbkrCol::QUANTITY)?;
            let action = if quantity.is_sign_positive() && !quantity.is_zero() {
                ShareAction::Buy
            } else {
                ShareAction::Sell
            };
            Ok(Cell::text(action.to_string()))
        })?;
        table.derive_column(Col::QUANTITY, |r| currency_cell(r, IbkrCol::QUANTITY))?;
        table.derive_column(Col::PRICE, |r| currency_cell(r, IbkrCol::T_PRICE))?;
        table.derive_column(Col::AMOUNT, |r| currency_cell(r, IbkrCol::PROCEEDS))?;
        derive_trade_date(&mut table)?;
        Ok(table)
    }
}

pub struct IbkrDividends;

impl Cleaner for IbkrDividends {
    fn broker(&self) -> Broker {
        Broker::Ibkr
    }

    fn kind(&self) -> TableKind {
        TableKind::Dividends
    }

    fn layout(&self, text: &str, options: &ProcessOptions) -> Result<FileLayout, ImportError> {
        let skip_rows = section_skip_rows(text, DIVIDENDS_SECTION_MARKER, None, None, options)?;
        Ok(FileLayout::new(skip_rows, 0))
    }

    fn clean(&self, mut table: RawTable) -> Result<RawTable, ImportError> {
        if skip_missing_section(&mut table, IbkrCol::DIVIDENDS, TableKind::Dividends) {
            return Ok(table);
        }
        table.require_columns(&[
            IbkrCol::DIVIDENDS,
            IbkrCol::HEADER,
            IbkrCol::CURRENCY,
            IbkrCol::DATE,
            IbkrCol::DESCRIPTION,
            IbkrCol::AMOUNT,
        ])?;

        table.retain(|r| is_section_data(r, IbkrCol::DIVIDENDS));
        // "Total", "Total in USD", ...
        table.retain(|r| !r.str(IbkrCol::CURRENCY).starts_with("Total"));
        table.retain(|r| {
            let matched = DIVIDEND_SYMBOL_RE.is_match(r.str(IbkrCol::DESCRIPTION));
            if !matched {
                warn!(
                    "Row {}: no symbol found in dividend description \"{}\". Skipping",
                    r.num(),
                    r.str(IbkrCol::DESCRIPTION)
                );
            }
            matched
        });

        if table.is_empty() {
            info!("No dividend transactions found");
            return Ok(table);
        }

        table.derive_column(Col::SYMBOL, |r| {
            let desc = r.str(IbkrCol::DESCRIPTION);
            DIVIDEND_SYMBOL_RE
                .captures(desc)
                .and_then(|c| c.get(1))
                .map(|m| Cell::text(m.as_str()))
                .ok_or_else(|| r.err(format!("No symbol in \"{desc}\"")))
        })?;
        // Dates are already YYYY-MM-DD
        table.derive_column(Col::AMOUNT, |r| currency_cell(r, IbkrCol::AMOUNT))?;
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use crate::{
        gezdec,
        import::{import, ImportOptions},
        pipeline::process_text,
        records::{
            Dividend, OptionOperation, OptionTrade, OptionType, RecordOwner, ShareTrade,
            TxRecord,
        },
        store::InMemoryRecordStore,
        testlib::{assert_err_re, assert_vec_eq},
        util::{date::pub_testlib::ymd, rw::DescribedReader},
    };

    use super::*;

    const STATEMENT: &str = "\u{feff}Statement,Header,Field Name,Field Value
Statement,Data,BrokerName,Interactive Brokers LLC
Statement,Data,Title,Activity Statement
Statement,Data,Period,\"August 1, 2025 - August 31, 2025\"
Open Positions,Header,DataDiscriminator,Asset Category,Currency,Symbol,Quantity,Mult,Cost Price
Open Positions,Data,Summary,Stocks,USD,AAPL,100,1,201.5
Trades,Header,DataDiscriminator,Asset Category,Currency,Symbol,Date/Time,Quantity,T. Price,C. Price,Proceeds,Comm/Fee,Basis,Realized P/L,MTM P/L,Code
Trades,Data,Order,Stocks,USD,AAPL,\"2025-08-01, 10:15:32\",100,201.5,202,-20150,-1,20151,0,50,O
Trades,Data,Order,Stocks,USD,MSFT,\"2025-08-04, 11:00:01\",\"-1,000\",510.25,510,510250,-1.5,-500000,10248.5,250,C
Trades,SubTotal,,Stocks,USD,AAPL,,100,,,-20150,-1,20151,0,50,
Trades,Total,,Stocks,USD,,,,,,490100,-2.5,,,,
Trades,Header,DataDiscriminator,Asset Category,Currency,Symbol,Date/Time,Quantity,T. Price,C. Price,Proceeds,Comm/Fee,Basis,Realized P/L,MTM P/L,Code
Trades,Data,Order,Equity and Index Options,USD,AAPL 15AUG25 200 P,\"2025-08-05, 09:45:00\",-2,1.25,1.3,250,-2.1,-247.9,0,-10,O
Trades,Data,Order,Equity and Index Options,USD,AAPL 15AUG25 200 P,\"2025-08-12, 14:20:10\",2,0.3,0.25,-60,-2.1,247.9,185.8,10,C
Trades,Data,Order,Equity and Index Options,USD,SPY 29AUG25 650 C,\"2025-08-29, 16:20:00\",-1,0,0,0,0,0,0,0,C;Ep
Trades,Total,,Equity and Index Options,USD,,,,,,190,-4.2,,,,
Dividends,Header,Currency,Date,Description,Amount
Dividends,Data,USD,2025-08-15,TSLY(US88636J4445) Cash Dividend USD 0.5 per Share (Ordinary Dividend),12.5
Dividends,Data,USD,2025-08-28,AAPL(US0378331005) Cash Dividend USD 0.26 per Share (Ordinary Dividend),26
Dividends,Data,USD,2025-08-30,Payment in lieu of dividend,1.5
Dividends,Data,Total,,,40
Dividends,Data,Total in USD,,,40
Codes,Header,Code,Meaning
Codes,Data,O,Opening Trade
Codes,Data,C,Closing Trade
";

    fn run(cleaner: &dyn Cleaner, text: &str) -> Result<Vec<TxRecord>, ImportError> {
        process_text(cleaner, "activity", text, &ProcessOptions::default()).map(|p| p.records)
    }

    #[test]
    fn test_options() {
        let records = run(&IbkrOptions, STATEMENT).unwrap();
        let aapl = |date, operation, premium, total| {
            TxRecord::Option(OptionTrade {
                date,
                operation,
                contracts: 2,
                symbol: "AAPL".to_string(),
                expiration_date: ymd(2025, 8, 15),
                strike_price: gezdec!(200),
                option_type: OptionType::Put,
                premium,
                total,
            })
        };
        assert_vec_eq(
            records,
            vec![
                aapl(ymd(2025, 8, 5), OptionOperation::Sto, dec!(1.25), dec!(250)),
                aapl(ymd(2025, 8, 12), OptionOperation::Btc, dec!(0.3), dec!(-60)),
                // Expired, closed with no cash flow
                TxRecord::Option(OptionTrade {
                    date: ymd(2025, 8, 29),
                    operation: OptionOperation::Stc,
                    contracts: 1,
                    symbol: "SPY".to_string(),
                    expiration_date: ymd(2025, 8, 29),
                    strike_price: gezdec!(650),
                    option_type: OptionType::Call,
                    premium: dec!(0),
                    total: dec!(0),
                }),
            ],
        );
    }

    #[test]
    fn test_shares() {
        let records = run(&IbkrShares, STATEMENT).unwrap();
        assert_vec_eq(
            records,
            vec![
                TxRecord::Share(ShareTrade {
                    date: ymd(2025, 8, 1),
                    action: ShareAction::Buy,
                    symbol: "AAPL".to_string(),
                    price: gezdec!(201.5),
                    quantity: dec!(100),
                    amount: dec!(-20150),
                }),
                TxRecord::Share(ShareTrade {
                    date: ymd(2025, 8, 4),
                    action: ShareAction::Sell,
                    symbol: "MSFT".to_string(),
                    price: gezdec!(510.25),
                    quantity: dec!(-1000),
                    amount: dec!(510250),
                }),
            ],
        );
    }

    #[test]
    fn test_dividends() {
        let records = run(&IbkrDividends, STATEMENT).unwrap();
        assert_vec_eq(
            records,
            vec![
                TxRecord::Dividend(Dividend {
                    date: ymd(2025, 8, 15),
                    symbol: "TSLY".to_string(),
                    amount: dec!(12.5),
                }),
                TxRecord::Dividend(Dividend {
                    date: ymd(2025, 8, 28),
                    symbol: "AAPL".to_string(),
                    amount: dec!(26),
                }),
            ],
        );
    }

    fn without_lines(text: &str, pred: impl Fn(&str) -> bool) -> String {
        text.lines().filter(|&l| !pred(l)).map(|l| format!("{l}\n")).collect()
    }

    #[test]
    fn test_no_matching_rows() {
        // Each section is present, with only its total lines left
        let text = without_lines(STATEMENT, |l| {
            l.starts_with("Trades,Data") || l.starts_with("Dividends,Data,USD,")
        });
        for cleaner in Broker::Ibkr.cleaners() {
            let res = process_text(cleaner.as_ref(), "activity", &text, &ProcessOptions::default())
                .unwrap();
            assert!(res.records.is_empty(), "{}", cleaner.kind());
            assert_eq!((res.start_date, res.end_date), (None, None));
        }
    }

    #[test]
    fn test_missing_section() {
        let stocks_only = without_lines(STATEMENT, |l| {
            l.contains(OPTIONS_CATEGORY) || l.starts_with("Dividends,")
        });

        for cleaner in [&IbkrOptions as &dyn Cleaner, &IbkrDividends] {
            let res =
                process_text(cleaner, "activity", &stocks_only, &ProcessOptions::default()).unwrap();
            assert!(res.records.is_empty(), "{}", cleaner.kind());
            assert_eq!((res.start_date, res.end_date), (None, None));
        }
        // The stock trades are still found
        assert_eq!(run(&IbkrShares, &stocks_only).unwrap().len(), 2);

        let strict = ProcessOptions { strict_sections: true, ..Default::default() };
        assert_err_re(
            "^Format error: No section starting with 'Trades,Header,DataDiscriminator,Asset \
Category' followed by 'Equity and Index Options'",
            process_text(&IbkrOptions, "activity", &stocks_only, &strict),
        );
        assert_err_re(
            "^Format error: No section starting with 'Dividends,Header,Currency,Date'",
            process_text(&IbkrDividends, "activity", &stocks_only, &strict),
        );
    }

    #[test]
    fn test_import_statement_without_options_or_dividends() {
        let stocks_only = without_lines(STATEMENT, |l| {
            l.contains(OPTIONS_CATEGORY) || l.starts_with("Dividends,")
        });
        let mut store = InMemoryRecordStore::new();
        let summary = import(
            Broker::Ibkr,
            &DescribedReader::from_string("activity".to_string(), stocks_only),
            &RecordOwner::new("sam"),
            &mut store,
            &ImportOptions::default(),
        )
        .unwrap();
        assert_eq!(
            summary.tables.iter().map(|t| (t.kind, t.inserted)).collect::<Vec<_>>(),
            vec![(TableKind::Options, 0), (TableKind::Dividends, 0), (TableKind::Shares, 2)]
        );
        assert_eq!(store.records.len(), 2);
    }

    #[test]
    fn test_other_format_is_not_a_missing_section() {
        let text = "Date,Action,Symbol,Quantity\n08/01/2025,Buy,AAPL,1\n08/02/2025,Sell,AAPL,1\n";
        assert_err_re(
            "^Missing required columns: Trades, Header, ",
            run(&IbkrShares, text),
        );
    }
}
