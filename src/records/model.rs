use std::fmt::Display;

use rust_decimal::Decimal;
use time::Date;

use crate::util::decimal::{is_negative, GreaterEqualZeroDecimal};

use super::kind::TableKind;

pub const DEFAULT_ACCOUNT: &str = "default";

/// The four option trade operations, plus Unknown for broker rows whose
/// open/close direction could not be determined.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum OptionOperation {
    Sto, // Sell to open
    Bto, // Buy to open
    Btc, // Buy to close
    Stc, // Sell to close
    Unknown,
}

impl OptionOperation {
    pub fn code(&self) -> &'static str {
        match self {
            OptionOperation::Sto => "STO",
            OptionOperation::Bto => "BTO",
            OptionOperation::Btc => "BTC",
            OptionOperation::Stc => "STC",
            OptionOperation::Unknown => "Unknown",
        }
    }

    /// Parses an operation code. Anything unrecognized is Unknown.
    pub fn from_code(code: &str) -> OptionOperation {
        match code.trim().to_uppercase().as_str() {
            "STO" => OptionOperation::Sto,
            "BTO" => OptionOperation::Bto,
            "BTC" => OptionOperation::Btc,
            "STC" => OptionOperation::Stc,
            _ => OptionOperation::Unknown,
        }
    }

    pub fn is_buy(&self) -> bool {
        matches!(self, OptionOperation::Bto | OptionOperation::Btc)
    }

    /// +1 when the operation receives premium, -1 when it pays it.
    pub fn cash_flow_sign(&self) -> Option<Decimal> {
        match self {
            OptionOperation::Sto | OptionOperation::Stc => Some(Decimal::ONE),
            OptionOperation::Bto | OptionOperation::Btc => Some(Decimal::NEGATIVE_ONE),
            OptionOperation::Unknown => None,
        }
    }
}

impl Display for OptionOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    pub fn code(&self) -> &'static str {
        match self {
            OptionType::Call => "C",
            OptionType::Put => "P",
        }
    }

    /// Accepts "C"/"P", or words starting with them ("Call", "PUT").
    pub fn from_word(word: &str) -> Result<OptionType, String> {
        match word.trim().chars().next().map(|c| c.to_ascii_uppercase()) {
            Some('C') => Ok(OptionType::Call),
            Some('P') => Ok(OptionType::Put),
            _ => Err(format!("Invalid option type '{word}'")),
        }
    }
}

impl Display for OptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum ShareAction {
    Buy,
    Sell,
}

impl ShareAction {
    /// Applies the sign convention for share quantities:
    /// positive on Buy, negative on Sell.
    pub fn signed_quantity(&self, quantity: Decimal) -> Decimal {
        match self {
            ShareAction::Buy => quantity.abs(),
            ShareAction::Sell => -quantity.abs(),
        }
    }
}

impl TryFrom<&str> for ShareAction {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_lowercase().as_str() {
            "buy" => Ok(ShareAction::Buy),
            "sell" => Ok(ShareAction::Sell),
            _ => Err(format!("Invalid share action '{value}'")),
        }
    }
}

impl Display for ShareAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum TransferAction {
    Deposit,
    Withdrawal,
}

impl TransferAction {
    pub fn for_amount(amount: &Decimal) -> TransferAction {
        if is_negative(amount) {
            TransferAction::Withdrawal
        } else {
            TransferAction::Deposit
        }
    }
}

impl TryFrom<&str> for TransferAction {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_lowercase().as_str() {
            "deposit" => Ok(TransferAction::Deposit),
            "withdrawal" => Ok(TransferAction::Withdrawal),
            _ => Err(format!("Invalid transfer action '{value}'")),
        }
    }
}

impl Display for TransferAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(PartialEq, Eq, Clone, Debug)]
pub struct OptionTrade {
    pub date: Date,
    pub operation: OptionOperation,
    pub contracts: u32,
    pub symbol: String,
    pub expiration_date: Date,
    pub strike_price: GreaterEqualZeroDecimal,
    pub option_type: OptionType,
    // Per-share price of the contract
    pub premium: Decimal,
    pub total: Decimal,
}

impl OptionTrade {
    /// Whether the sign of total agrees with the operation (premium received
    /// on sells, paid on buys). Zero totals and Unknown operations pass.
    pub fn total_matches_operation(&self) -> bool {
        match self.operation.cash_flow_sign() {
            Some(sign) => self.total.is_zero() || (self.total * sign).is_sign_positive(),
            None => true,
        }
    }
}

#[derive(PartialEq, Eq, Clone, Debug)]
pub struct ShareTrade {
    pub date: Date,
    pub action: ShareAction,
    pub symbol: String,
    pub price: GreaterEqualZeroDecimal,
    // Negative on Sell
    pub quantity: Decimal,
    pub amount: Decimal,
}

#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Dividend {
    pub date: Date,
    pub symbol: String,
    pub amount: Decimal,
}

#[derive(PartialEq, Eq, Clone, Debug)]
pub struct CashTransfer {
    pub date: Date,
    pub action: TransferAction,
    pub amount: Decimal,
}

impl CashTransfer {
    pub fn new(
        date: Date,
        action: TransferAction,
        amount: Decimal,
    ) -> Result<CashTransfer, String> {
        let consistent = match action {
            TransferAction::Deposit => !is_negative(&amount),
            TransferAction::Withdrawal => is_negative(&amount),
        };
        if !consistent {
            return Err(format!("{action} with amount {amount}"));
        }
        Ok(CashTransfer { date, action, amount })
    }
}

/// One canonical, broker-independent event.
#[derive(PartialEq, Eq, Clone, Debug)]
pub enum TxRecord {
    Option(OptionTrade),
    Share(ShareTrade),
    Dividend(Dividend),
    Transfer(CashTransfer),
}

impl TxRecord {
    pub fn kind(&self) -> TableKind {
        match self {
            TxRecord::Option(_) => TableKind::Options,
            TxRecord::Share(_) => TableKind::Shares,
            TxRecord::Dividend(_) => TableKind::Dividends,
            TxRecord::Transfer(_) => TableKind::Deposits,
        }
    }

    pub fn date(&self) -> Date {
        match self {
            TxRecord::Option(r) => r.date,
            TxRecord::Share(r) => r.date,
            TxRecord::Dividend(r) => r.date,
            TxRecord::Transfer(r) => r.date,
        }
    }
}

/// Who (and which account) a stored record belongs to.
#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub struct RecordOwner {
    pub username: String,
    pub guild_id: Option<u64>,
    pub account: String,
}

impl RecordOwner {
    pub fn new(username: &str) -> RecordOwner {
        RecordOwner {
            username: username.to_string(),
            guild_id: None,
            account: DEFAULT_ACCOUNT.to_string(),
        }
    }

    pub fn with_account(mut self, account: &str) -> RecordOwner {
        self.account = account.to_string();
        self
    }

    pub fn with_guild(mut self, guild_id: Option<u64>) -> RecordOwner {
        self.guild_id = guild_id;
        self
    }
}

#[derive(PartialEq, Eq, Clone, Debug)]
pub struct OwnedRecord {
    pub owner: RecordOwner,
    pub record: TxRecord,
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use crate::util::date::pub_testlib::ymd;

    use super::*;

    #[test]
    fn test_operation_codes() {
        for op in [
            OptionOperation::Sto,
            OptionOperation::Bto,
            OptionOperation::Btc,
            OptionOperation::Stc,
        ] {
            assert_eq!(OptionOperation::from_code(op.code()), op);
        }
        assert_eq!(OptionOperation::from_code("bto"), OptionOperation::Bto);
        assert_eq!(OptionOperation::from_code("E"), OptionOperation::Unknown);
        assert_eq!(OptionOperation::from_code("Unknown"), OptionOperation::Unknown);
    }

    #[test]
    fn test_option_type_from_word() {
        assert_eq!(OptionType::from_word("Call"), Ok(OptionType::Call));
        assert_eq!(OptionType::from_word("P"), Ok(OptionType::Put));
        assert_eq!(OptionType::from_word("put"), Ok(OptionType::Put));
        assert!(OptionType::from_word("").is_err());
        assert!(OptionType::from_word("X").is_err());
    }

    #[test]
    fn test_share_quantity_sign() {
        assert_eq!(ShareAction::Sell.signed_quantity(dec!(10)), dec!(-10));
        assert_eq!(ShareAction::Sell.signed_quantity(dec!(-10)), dec!(-10));
        assert_eq!(ShareAction::Buy.signed_quantity(dec!(-2.5)), dec!(2.5));
        assert_eq!(ShareAction::try_from("SELL"), Ok(ShareAction::Sell));
        assert!(ShareAction::try_from("Reinvest").is_err());
    }

    #[test]
    fn test_cash_transfer_sign() {
        let d = ymd(2025, 1, 2);
        assert!(CashTransfer::new(d, TransferAction::Deposit, dec!(100)).is_ok());
        assert!(CashTransfer::new(d, TransferAction::Deposit, dec!(0)).is_ok());
        assert!(CashTransfer::new(d, TransferAction::Withdrawal, dec!(-5)).is_ok());
        assert!(CashTransfer::new(d, TransferAction::Withdrawal, dec!(5)).is_err());
        assert!(CashTransfer::new(d, TransferAction::Deposit, dec!(-5)).is_err());
        assert_eq!(TransferAction::for_amount(&dec!(-0.01)), TransferAction::Withdrawal);
        assert_eq!(TransferAction::for_amount(&dec!(0)), TransferAction::Deposit);
    }

    #[test]
    fn test_total_matches_operation() {
        let mut trade = OptionTrade {
            date: ymd(2025, 8, 1),
            operation: OptionOperation::Bto,
            contracts: 3,
            symbol: "MSTU".to_string(),
            expiration_date: ymd(2025, 8, 15),
            strike_price: crate::gezdec!(8),
            option_type: OptionType::Put,
            premium: dec!(0.16),
            total: dec!(-48),
        };
        assert!(trade.total_matches_operation());
        trade.operation = OptionOperation::Sto;
        assert!(!trade.total_matches_operation());
        trade.operation = OptionOperation::Unknown;
        assert!(trade.total_matches_operation());
        assert_eq!(TxRecord::Option(trade).kind(), TableKind::Options);
    }
}
