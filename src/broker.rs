use std::fmt::Display;

use rust_decimal::Decimal;

use crate::{
    pipeline::{
        normalize::currency_to_decimal,
        table::{Cell, Row},
        Cleaner, ImportError,
    },
    util::date::to_canonical_date,
};

// Individual brokers
pub mod fidelity;
pub mod ibkr;
pub mod identify;
pub mod robinhood;
pub mod schwab;

#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug)]
pub enum Broker {
    Fidelity,
    Robinhood,
    Schwab,
    Ibkr,
}

impl Broker {
    pub fn all() -> [Broker; 4] {
        [Broker::Fidelity, Broker::Robinhood, Broker::Schwab, Broker::Ibkr]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Broker::Fidelity => "fidelity",
            Broker::Robinhood => "robinhood",
            Broker::Schwab => "schwab",
            Broker::Ibkr => "ibkr",
        }
    }

    /// Every cleaner for this broker's exports, in import order.
    pub fn cleaners(&self) -> Vec<Box<dyn Cleaner>> {
        match self {
            Broker::Fidelity => vec![
                Box::new(fidelity::FidelityOptions),
                Box::new(fidelity::FidelityDividends),
                Box::new(fidelity::FidelityShares),
                Box::new(fidelity::FidelityDeposits),
            ],
            Broker::Robinhood => vec![
                Box::new(robinhood::RobinhoodOptions),
                Box::new(robinhood::RobinhoodDividends),
                Box::new(robinhood::RobinhoodShares),
            ],
            Broker::Schwab => vec![
                Box::new(schwab::SchwabOptions),
                Box::new(schwab::SchwabDividends),
                Box::new(schwab::SchwabShares),
            ],
            Broker::Ibkr => vec![
                Box::new(ibkr::IbkrOptions),
                Box::new(ibkr::IbkrDividends),
                Box::new(ibkr::IbkrShares),
            ],
        }
    }
}

impl Display for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl TryFrom<&str> for Broker {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Broker::all()
            .into_iter()
            .find(|b| b.name().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| format!("Unsupported brokerage format '{value}'"))
    }
}

// Helpers for cleaners deriving typed cells from source columns.

fn decimal_of(row: &Row, col: &str) -> Result<Decimal, ImportError> {
    currency_to_decimal(row.str(col)).map_err(|e| row.err(format!("{col}: {e}")))
}

fn currency_cell(row: &Row, col: &str) -> Result<Cell, ImportError> {
    decimal_of(row, col).map(Cell::Num)
}

fn date_cell(row: &Row, col: &str, source_fmt: &str) -> Result<Cell, ImportError> {
    to_canonical_date(row.str(col), source_fmt)
        .map(Cell::Date)
        .map_err(|e| row.err(format!("{col}: {e}")))
}
