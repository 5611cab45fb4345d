use std::fmt::Display;

/// Canonical pre-validation column names.
/// Broker cleaners rename or derive their columns into these.
pub struct Col();
impl Col {
    pub const DATE: &'static str = "Date";
    pub const ACTION: &'static str = "Action";
    pub const SYMBOL: &'static str = "Symbol";
    pub const PRICE: &'static str = "Price";
    pub const QUANTITY: &'static str = "Quantity";
    pub const CONTRACTS: &'static str = "Contracts";
    pub const STRIKE: &'static str = "Strike";
    pub const EXPIRATION: &'static str = "Expiration";
    pub const OPTION_TYPE: &'static str = "Option Type";
    pub const AMOUNT: &'static str = "Amount";
}

/// The four kinds of events (and store tables) an export is normalized into.
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug, PartialOrd, Ord)]
pub enum TableKind {
    Options,
    Shares,
    Dividends,
    Deposits,
}

impl TableKind {
    pub fn all() -> [TableKind; 4] {
        [
            TableKind::Options,
            TableKind::Shares,
            TableKind::Dividends,
            TableKind::Deposits,
        ]
    }

    /// Required columns, in canonical order.
    pub fn required_columns(&self) -> &'static [&'static str] {
        match self {
            TableKind::Options => &[
                Col::ACTION,
                Col::SYMBOL,
                Col::DATE,
                Col::EXPIRATION,
                Col::CONTRACTS,
                Col::STRIKE,
                Col::OPTION_TYPE,
                Col::PRICE,
                Col::AMOUNT,
            ],
            TableKind::Shares => &[
                Col::DATE,
                Col::ACTION,
                Col::SYMBOL,
                Col::PRICE,
                Col::QUANTITY,
                Col::AMOUNT,
            ],
            TableKind::Dividends => &[Col::DATE, Col::SYMBOL, Col::AMOUNT],
            TableKind::Deposits => &[Col::DATE, Col::ACTION, Col::AMOUNT],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TableKind::Options => "options",
            TableKind::Shares => "shares",
            TableKind::Dividends => "dividends",
            TableKind::Deposits => "deposits",
        }
    }
}

impl Display for TableKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl TryFrom<&str> for TableKind {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        TableKind::all()
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| format!("Invalid table kind '{value}'"))
    }
}
