use chrono::Datelike;
pub use time::Date;
use time::{macros::format_description, Month, UtcOffset};

use super::basic::SError;

pub type StaticDateFormat<'a> =
    &'static [time::format_description::BorrowedFormatItem<'a>];

/// The canonical record date format (YYYY-MM-DD).
pub const STANDARD_DATE_FORMAT: StaticDateFormat =
    format_description!("[year]-[month]-[day]");

pub fn parse_standard_date(date_str: &str) -> Result<Date, time::error::Parse> {
    Date::parse(date_str, STANDARD_DATE_FORMAT)
}

fn date_naive_to_date(dn: &chrono::NaiveDate) -> Result<Date, SError> {
    Date::from_calendar_date(
        dn.year(),
        Month::December.nth_next(dn.month() as u8),
        dn.day() as u8,
    )
    .map_err(|e| format!("{dn} is out of range: {e}"))
}

/// Parses `value` with an explicit strftime-style `source_fmt`
/// (eg. "%m/%d/%Y", "%y%m%d", "%d%b%y").
///
/// Brokerages use these formats in their exports, so we take them verbatim,
/// rather than translating to time's format description language.
/// The whole value must be consumed by the format.
pub fn to_canonical_date(value: &str, source_fmt: &str) -> Result<Date, SError> {
    let naive = chrono::NaiveDate::parse_from_str(value.trim(), source_fmt)
        .map_err(|e| {
            format!("Unable to parse date \"{value}\" as {source_fmt}: {e}")
        })?;
    date_naive_to_date(&naive)
}

// Using UtcOffset::current_local_offset is apparently unsafe on Linux,
// and will return an error if used without enabling some "unsafe" feature,
// so go through chrono instead.
pub fn local_utc_offset() -> Result<UtcOffset, time::error::ComponentRange> {
    let now = chrono::offset::Local::now();
    let offset = now.offset();
    UtcOffset::from_whole_seconds(-1 * offset.utc_minus_local())
}

// Used by both unit and integration tests
pub mod pub_testlib {
    use time::Date;

    pub fn ymd(year: i32, month: u8, day: u8) -> Date {
        Date::from_calendar_date(
            year,
            time::Month::try_from(month).unwrap(),
            day,
        )
        .unwrap()
    }
}
