use std::path::Path;

use tracing::warn;

use super::error::ImportError;

/// The offset used when a section header cannot be found.
pub const FALLBACK_SECTION_OFFSET: usize = 1;

pub const BOM: char = '\u{feff}';

/// Finds the 0-based line index of the header of a data section, for exports
/// which bundle several statement sections in one file.
///
/// A line matches when it starts with `header_marker` and, if
/// `next_line_contains` is given, the line after it contains that text
/// (several sections can share a header layout, and only differ in their data).
pub fn locate_section(
    text: &str,
    header_marker: &str,
    next_line_contains: Option<&str>,
) -> Option<usize> {
    let lines: Vec<&str> = text.lines().collect();
    lines.iter().enumerate().find_map(|(i, line)| {
        if !line.trim_start_matches(BOM).starts_with(header_marker) {
            return None;
        }
        match next_line_contains {
            None => Some(i),
            Some(needle) => lines
                .get(i + 1)
                .filter(|next| next.contains(needle))
                .map(|_| i),
        }
    })
}

/// As locate_section, but never fails. When no section matches,
/// a warning is logged and FALLBACK_SECTION_OFFSET is returned.
pub fn find_section(
    text: &str,
    header_marker: &str,
    next_line_contains: Option<&str>,
) -> usize {
    match locate_section(text, header_marker, next_line_contains) {
        Some(offset) => {
            tracing::debug!("Found section '{header_marker}' at line {offset}");
            offset
        }
        None => {
            warn!(
                "Section '{}'{} not found. Assuming it starts at line {}",
                header_marker,
                next_line_contains
                    .map(|n| format!(" (followed by '{n}')"))
                    .unwrap_or_default(),
                FALLBACK_SECTION_OFFSET
            );
            FALLBACK_SECTION_OFFSET
        }
    }
}

pub fn find_section_in_file(
    path: &Path,
    header_marker: &str,
    next_line_contains: Option<&str>,
) -> Result<usize, ImportError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        ImportError::Format(format!("Unable to read {}: {}", path.display(), e))
    })?;
    Ok(find_section(&text, header_marker, next_line_contains))
}

#[cfg(test)]
mod tests {
    use super::{find_section, find_section_in_file, locate_section, FALLBACK_SECTION_OFFSET};

    const IBKR_LIKE: &str = "\u{feff}Statement,Header,Field Name,Field Value
Statement,Data,Title,Activity Statement
Trades,Header,DataDiscriminator,Asset Category,Currency,Symbol
Trades,Data,Order,Stocks,USD,AAPL
Trades,Header,DataDiscriminator,Asset Category,Currency,Symbol
Trades,Data,Order,Equity and Index Options,USD,AAPL 15AUG25 150 P
Dividends,Header,Currency,Date,Description,Amount
Dividends,Data,USD,2025-05-30,TSLY(US88636J4445) Cash Dividend,12.5
";

    const TRADES: &str = "Trades,Header,DataDiscriminator,Asset Category";

    #[test]
    fn test_locate_with_next_line() {
        assert_eq!(locate_section(IBKR_LIKE, TRADES, Some("Stocks")), Some(2));
        assert_eq!(
            locate_section(IBKR_LIKE, TRADES, Some("Equity and Index Options")),
            Some(4)
        );
        assert_eq!(locate_section(IBKR_LIKE, "Dividends,Header,Currency,Date", None), Some(6));
    }

    #[test]
    fn test_locate_ignores_bom() {
        assert_eq!(locate_section(IBKR_LIKE, "Statement,Header", None), Some(0));
    }

    #[test]
    fn test_missing_section_falls_back() {
        assert_eq!(locate_section(IBKR_LIKE, TRADES, Some("Bonds")), None);
        assert_eq!(find_section(IBKR_LIKE, TRADES, Some("Bonds")), FALLBACK_SECTION_OFFSET);
        assert_eq!(find_section("", "Anything", None), FALLBACK_SECTION_OFFSET);
        // A marker on the last line cannot satisfy a next-line requirement
        assert_eq!(locate_section("a\nTrades,Header,DataDiscriminator,Asset Category", TRADES, Some("")), None);
    }

    #[test]
    fn test_find_section_in_file() {
        let path = std::env::temp_dir()
            .join(format!("brokerage-import-section-{}.csv", std::process::id()));
        std::fs::write(&path, IBKR_LIKE).unwrap();
        let res = find_section_in_file(&path, TRADES, Some("Stocks"));
        let _ = std::fs::remove_file(&path);
        assert_eq!(res, Ok(2));

        assert!(find_section_in_file(&path, TRADES, None).is_err());
    }
}
