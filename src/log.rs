// Writes a line of user-facing diagnostics to a WriteHandle (or any io::Write).
// Write failures are dropped, since there is nowhere left to report them.
#[macro_export]
macro_rules! write_errln {
    ($w:expr, $($arg:tt)*) => {{
        let _ = ::std::io::Write::write_fmt(
            &mut $w, format_args!("{}\n", format_args!($($arg)*)));
    }};
}
