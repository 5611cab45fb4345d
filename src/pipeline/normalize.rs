//! Field normalizers shared by the broker cleaners.

use std::{fmt::Display, str::FromStr};

use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;

use crate::{
    records::{OptionOperation, OptionType},
    util::basic::SError,
};

/// Parses an accounting-style currency string.
/// "$" and "," are ignored, and parentheses denote a negative value,
/// so "($12.34)" is -12.34 and "$1,234.56" is 1234.56.
pub fn currency_to_decimal(value: &str) -> Result<Decimal, SError> {
    let cleaned: String = value
        .trim()
        .chars()
        .filter(|c| !matches!(c, ')' | '$' | ','))
        .map(|c| if c == '(' { '-' } else { c })
        .collect();
    Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .map_err(|_| format!("Unable to parse number from \"{value}\""))
}

/// A decoded Fidelity option symbol, eg. "-MSTU250815P8".
///
/// Expiration (yymmdd) and strike are kept as written, so the symbol can be
/// re-encoded exactly.
#[derive(PartialEq, Eq, Debug)]
pub struct FidelityOptionSymbol {
    pub symbol: String,
    pub expiration: String,
    pub option_type: OptionType,
    pub strike: String,
}

const FIDELITY_EXPIRATION_LEN: usize = 6;

impl FidelityOptionSymbol {
    /// Scans from the right for the option type letter (C or P).
    /// The strike follows it, and the 6 characters before it are the
    /// expiration. Everything before that (minus the leading '-') is the
    /// underlying symbol.
    pub fn decode(value: &str) -> Option<FidelityOptionSymbol> {
        let upper = value.trim().to_uppercase();
        let body = upper.strip_prefix('-').unwrap_or(&upper);
        // Only ascii is meaningful here. Byte indexing below relies on it.
        if !body.is_ascii() {
            return None;
        }
        let type_idx = body.rfind(|c: char| c == 'C' || c == 'P')?;
        if type_idx <= FIDELITY_EXPIRATION_LEN {
            return None;
        }
        let exp_idx = type_idx - FIDELITY_EXPIRATION_LEN;
        let option_type = OptionType::from_word(&body[type_idx..type_idx + 1]).ok()?;
        Some(FidelityOptionSymbol {
            symbol: body[..exp_idx].to_string(),
            expiration: body[exp_idx..type_idx].to_string(),
            option_type,
            strike: body[type_idx + 1..].to_string(),
        })
    }
}

impl Display for FidelityOptionSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "-{}{}{}{}",
            self.symbol, self.expiration, self.option_type, self.strike
        )
    }
}

/// Order of the tokens in a whitespace-separated option description.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum DescriptionLayout {
    /// "AAPL 08/15/2025 150.00 P" (Schwab), "AAPL 15AUG25 150 P" (IBKR)
    SymbolExpiryStrikeType,
    /// "YMAX 5/30/2025 Call $15.00" (Robinhood)
    SymbolExpiryTypeStrike,
}

#[derive(PartialEq, Eq, Debug)]
pub struct OptionDescription<'a> {
    pub symbol: &'a str,
    pub expiration: &'a str,
    pub strike: &'a str,
    pub option_type: OptionType,
}

impl<'a> OptionDescription<'a> {
    pub fn parse(
        value: &'a str,
        layout: DescriptionLayout,
    ) -> Result<OptionDescription<'a>, SError> {
        let tokens: Vec<&str> = value.split_whitespace().take(4).collect();
        if tokens.len() < 4 {
            return Err(format!("Unable to decode option description \"{value}\""));
        }
        let (strike, type_word) = match layout {
            DescriptionLayout::SymbolExpiryStrikeType => (tokens[2], tokens[3]),
            DescriptionLayout::SymbolExpiryTypeStrike => (tokens[3], tokens[2]),
        };
        Ok(OptionDescription {
            symbol: tokens[0],
            expiration: tokens[1],
            strike,
            option_type: OptionType::from_word(type_word)
                .map_err(|e| format!("{e} in \"{value}\""))?,
        })
    }
}

lazy_static! {
    static ref FIDELITY_ACTION_KEYWORDS: Regex =
        Regex::new(r"BOUGHT|SOLD|OPENING|CLOSING|ASSIGNED|EXPIRED").unwrap();
}

/// Classifies a Fidelity action description ("YOU SOLD OPENING TRANSACTION")
/// into an operation code, by joining the first letters of its keywords
/// with 'T' (SOLD OPENING -> STO, BOUGHT CLOSING -> BTC).
/// Anything else (eg. "EXPIRED") is Unknown.
pub fn classify_fidelity_action(action: &str) -> OptionOperation {
    let upper = action.to_uppercase();
    let letters: Vec<String> = FIDELITY_ACTION_KEYWORDS
        .find_iter(&upper)
        .map(|m| m.as_str()[..1].to_string())
        .collect();
    OptionOperation::from_code(&letters.join("T"))
}

/// Classifies an IBKR trade from the sign of its quantity and its
/// open/close code ("O", "C", possibly among others like "C;P").
pub fn classify_ibkr_action(quantity: &Decimal, code: &str) -> OptionOperation {
    let opening = code.contains('O');
    let closing = code.contains('C');
    if quantity.is_zero() {
        return OptionOperation::Unknown;
    }
    let selling = quantity.is_sign_negative();
    if selling && opening {
        OptionOperation::Sto
    } else if !selling && closing {
        OptionOperation::Btc
    } else if !selling && opening {
        OptionOperation::Bto
    } else if selling && closing {
        OptionOperation::Stc
    } else {
        OptionOperation::Unknown
    }
}
