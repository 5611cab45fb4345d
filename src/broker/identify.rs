//! Guesses which broker produced an export, from fingerprints in its first
//! lines (headers, transaction codes, section names) and its footer.

use std::{fmt::Display, path::Path};

use itertools::Itertools;
use tracing::{debug, info, warn};

use crate::pipeline::{section::BOM, ImportError};

use super::Broker;

const MAX_LINES: usize = 50;
const FOOTER_LINES: usize = 10;

// Scores are kept in tenths, so they add up exactly.
const MIN_CONFIDENCE_TENTHS: u32 = 3;

struct FidelitySig();
impl FidelitySig {
    const HEADERS: [&'static str; 9] = [
        "Run Date",
        "Account",
        "Account Number",
        "Action",
        "Price ($)",
        "Commission ($)",
        "Fees ($)",
        "Accrued Interest ($)",
        "Settlement Date",
    ];
    const FOOTER_KEYWORDS: [&'static str; 2] = ["Fidelity Brokerage Services", "Date downloaded"];
    const ACTION_PATTERNS: [&'static str; 6] = [
        "YOU SOLD OPENING TRANSACTION",
        "YOU BOUGHT",
        "EXPIRED",
        "ASSIGNED",
        "DIVIDEND RECEIVED",
        "JOURNALED",
    ];
}

struct RobinhoodSig();
impl RobinhoodSig {
    const HEADERS: [&'static str; 6] = [
        "Activity Date",
        "Process Date",
        "Settle Date",
        "Instrument",
        "Description",
        "Trans Code",
    ];
    const TRANS_CODES: [&'static str; 11] = [
        "STO", "BTC", "BTO", "STC", "OEXP", "OASGN", "CDIV", "ITRF", "ACH", "XENT_CC", "MINT",
    ];
    const FOOTER_KEYWORDS: [&'static str; 2] = ["Robinhood Crypto", "Robinhood Spending"];
}

struct SchwabSig();
impl SchwabSig {
    const HEADERS: [&'static str; 8] = [
        "Date",
        "Action",
        "Symbol",
        "Description",
        "Quantity",
        "Price",
        "Fees & Comm",
        "Amount",
    ];
    const ACTION_PATTERNS: [&'static str; 9] = [
        "Sell to Open",
        "Buy to Close",
        "Buy to Open",
        "Sell to Close",
        "Reinvest Shares",
        "Reinvest Dividend",
        "Cash Dividend",
        "Expired",
        "Assigned",
    ];
}

struct IbkrSig();
impl IbkrSig {
    const SECTIONS: [&'static str; 6] = [
        "Mark-to-Market Performance Summary",
        "Realized & Unrealized Performance Summary",
        "Open Positions",
        "Trades",
        "Financial Instrument Information",
        "Codes",
    ];
}

/// The head and tail of an export, as examined by the scorers.
struct Sample<'a> {
    lines: Vec<&'a str>,
    footer: Vec<&'a str>,
    rows: Vec<Vec<String>>,
}

impl<'a> Sample<'a> {
    fn new(text: &'a str) -> Sample<'a> {
        let text = text.trim_start_matches(BOM);
        let all_lines: Vec<&str> = text.lines().map(str::trim).collect();
        let lines: Vec<&str> = all_lines.iter().take(MAX_LINES).copied().collect();
        let footer =
            all_lines[all_lines.len().saturating_sub(FOOTER_LINES)..].to_vec();

        let head = lines.join("\n");
        let mut csv_r = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(head.as_bytes());
        // A record cut off by the line limit is just dropped.
        let rows = csv_r
            .records()
            .map_while(|r| r.ok())
            .map(|r| r.iter().map(String::from).collect())
            .collect();
        Sample { lines, footer, rows }
    }

    fn rows_range(&self, start: usize, end: usize) -> &[Vec<String>] {
        let end = end.min(self.rows.len());
        let start = start.min(end);
        &self.rows[start..end]
    }

    fn footer_contains_any(&self, keywords: &[&str]) -> bool {
        let footer_text = self.footer.join("\n");
        keywords.iter().any(|k| footer_text.contains(k))
    }

    /// How many of `rows` have a value in column `idx` matching `pred`
    fn count_matching<F>(rows: &[Vec<String>], idx: usize, pred: F) -> usize
    where
        F: Fn(&str) -> bool,
    {
        rows.iter()
            .filter(|row| row.get(idx).map(|v| pred(v)).unwrap_or(false))
            .count()
    }
}

fn count_header_matches(signatures: &[&str], header: &[String]) -> usize {
    signatures
        .iter()
        .filter(|sig| header.iter().any(|cell| cell.contains(*sig)))
        .count()
}

fn score_fidelity(sample: &Sample) -> u32 {
    let mut score = 0;

    // Fidelity exports may start with blank lines, or a shorter preamble
    let header = sample.rows_range(0, 5).iter().find(|row| row.len() > 5);
    if let Some(header) = header {
        if count_header_matches(&FidelitySig::HEADERS, header) >= 5 {
            score += 4;
        }
    }

    if sample.footer_contains_any(&FidelitySig::FOOTER_KEYWORDS) {
        score += 2;
    }

    let action_idx = header.and_then(|h| h.iter().position(|c| c.contains("Action")));
    if let Some(idx) = action_idx {
        let matches = Sample::count_matching(sample.rows_range(1, 20), idx, |action| {
            FidelitySig::ACTION_PATTERNS.iter().any(|p| action.contains(p))
        });
        if matches >= 2 {
            score += 3;
        }
    }

    // Option symbols, like "-MSTU250815P8", in the fifth column
    let has_option_symbol = sample
        .rows_range(1, 15)
        .iter()
        .filter_map(|row| row.get(4))
        .any(|sym| sym.starts_with('-') && sym.len() > 5);
    if has_option_symbol {
        score += 1;
    }

    score
}

fn score_robinhood(sample: &Sample) -> u32 {
    let mut score = 0;
    let header = sample.rows.first();

    if let Some(header) = header {
        if count_header_matches(&RobinhoodSig::HEADERS, header) >= 4 {
            score += 4;
        }
    }

    let code_idx = header.and_then(|h| h.iter().position(|c| c.contains("Trans Code")));
    if let Some(idx) = code_idx {
        let matches = Sample::count_matching(sample.rows_range(1, 20), idx, |code| {
            RobinhoodSig::TRANS_CODES.contains(&code)
        });
        if matches >= 2 {
            score += 3;
        }
    }

    if sample.lines.iter().skip(1).take(19).any(|l| l.contains("CUSIP:")) {
        score += 2;
    }

    if sample.footer_contains_any(&RobinhoodSig::FOOTER_KEYWORDS) {
        score += 1;
    }

    score
}

fn score_schwab(sample: &Sample) -> u32 {
    let mut score = 0;
    let header = sample.rows.first();

    if let Some(header) = header {
        let exact_matches = SchwabSig::HEADERS
            .iter()
            .filter(|sig| header.iter().any(|c| c == *sig))
            .count();
        if exact_matches >= 6 {
            score += 4;
        }
    }

    let action_idx = header.and_then(|h| h.iter().position(|c| c == "Action"));
    if let Some(idx) = action_idx {
        let matches = Sample::count_matching(sample.rows_range(1, 20), idx, |action| {
            SchwabSig::ACTION_PATTERNS.iter().any(|p| action.contains(p))
        });
        if matches >= 3 {
            score += 4;
        }
    }

    if header.map(|h| h.iter().any(|c| c == "Fees & Comm")).unwrap_or(false) {
        score += 2;
    }

    score
}

fn score_ibkr(sample: &Sample) -> u32 {
    let mut score = 0;

    let starts_with_statement = sample
        .rows
        .first()
        .and_then(|r| r.first())
        .map(|c| c == "Statement")
        .unwrap_or(false);
    if starts_with_statement {
        score += 3;
    }

    let section_lines = sample
        .lines
        .iter()
        .take(30)
        .filter(|l| IbkrSig::SECTIONS.iter().any(|s| l.contains(s)))
        .count();
    if section_lines >= 2 {
        score += 4;
    }

    let has_data_lines = sample
        .rows_range(0, 30)
        .iter()
        .any(|r| r.get(1).map(|c| c == "Data").unwrap_or(false));
    if has_data_lines {
        score += 2;
    }

    if sample.lines.iter().any(|l| l.contains("Codes,Header") || l.contains("Codes,Data")) {
        score += 1;
    }

    score
}

fn tenths_to_confidence(tenths: u32) -> f64 {
    f64::from(tenths) / 10.0
}

#[derive(PartialEq, Debug, Clone)]
pub struct Identification {
    /// None when no broker scored at least the minimum confidence.
    pub broker: Option<Broker>,
    /// Between 0.0 and 1.0
    pub confidence: f64,
    /// Every broker's score, in Broker::all() order.
    pub scores: Vec<(Broker, f64)>,
}

impl Display for Identification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let broker = match self.broker {
            Some(b) => b.to_string(),
            None => "unknown".to_string(),
        };
        let scores = self.scores.iter().map(|(b, s)| format!("{b}: {s:.1}")).join(", ");
        write!(
            f,
            "{} ({:.0}% confidence. {})",
            broker,
            self.confidence * 100.0,
            scores
        )
    }
}

/// Identifies the broker which produced `text`.
pub fn identify(text: &str) -> Identification {
    let sample = Sample::new(text);
    if sample.lines.iter().all(|l| l.is_empty()) {
        warn!("Empty export. Unable to identify the broker");
        return Identification {
            broker: None,
            confidence: 0.0,
            scores: Broker::all().iter().map(|b| (*b, 0.0)).collect(),
        };
    }

    let tenths: Vec<(Broker, u32)> = Broker::all()
        .into_iter()
        .map(|b| {
            let score = match b {
                Broker::Fidelity => score_fidelity(&sample),
                Broker::Robinhood => score_robinhood(&sample),
                Broker::Schwab => score_schwab(&sample),
                Broker::Ibkr => score_ibkr(&sample),
            };
            (b, score)
        })
        .collect();
    debug!("Broker scores (tenths): {:?}", tenths);

    // The first broker wins ties
    let (best, best_tenths) = tenths
        .iter()
        .copied()
        .fold((Broker::Fidelity, 0), |acc, cur| if cur.1 > acc.1 { cur } else { acc });

    let ident = Identification {
        broker: if best_tenths >= MIN_CONFIDENCE_TENTHS { Some(best) } else { None },
        confidence: tenths_to_confidence(best_tenths),
        scores: tenths.iter().map(|(b, t)| (*b, tenths_to_confidence(*t))).collect(),
    };
    match ident.broker {
        Some(_) => info!("Identified export as {}", ident),
        None => warn!("Unable to identify the broker: {}", ident),
    }
    ident
}

pub fn identify_file(path: &Path) -> Result<Identification, ImportError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        ImportError::Format(format!("Unable to read {}: {}", path.display(), e))
    })?;
    Ok(identify(&text))
}
