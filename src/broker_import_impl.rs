use std::{io::Write, path::PathBuf};

use clap::Parser;

use crate::{
    broker::{identify::identify_file, Broker},
    import::{import_file, ImportOptions},
    pipeline::{FileLayout, ProcessOptions},
    records::{
        render::{render_owned_records, write_csv, write_text},
        RecordOwner, TableKind,
    },
    store::{CsvRecordStore, InMemoryRecordStore, RecordStore},
    util::{basic::SError, rw::WriteHandle},
    write_errln,
};

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum BrokerArg {
    Fidelity,
    Robinhood,
    Schwab,
    Ibkr,
}

impl BrokerArg {
    fn broker(&self) -> Broker {
        match self {
            BrokerArg::Fidelity => Broker::Fidelity,
            BrokerArg::Robinhood => Broker::Robinhood,
            BrokerArg::Schwab => Broker::Schwab,
            BrokerArg::Ibkr => Broker::Ibkr,
        }
    }
}

impl std::fmt::Display for BrokerArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = format!("{self:?}").to_lowercase();
        write!(f, "{s}")
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum KindArg {
    Options,
    Shares,
    Dividends,
    Deposits,
}

impl KindArg {
    fn kind(&self) -> TableKind {
        match self {
            KindArg::Options => TableKind::Options,
            KindArg::Shares => TableKind::Shares,
            KindArg::Dividends => TableKind::Dividends,
            KindArg::Deposits => TableKind::Deposits,
        }
    }
}

/// Normalizes a brokerage account-history export (Fidelity, Robinhood,
/// Schwab or IBKR) into option trades, share trades, dividends and
/// deposits, and replaces the export's date range of each in a record store.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Args {
    /// Account history csv exported from your brokerage platform.
    #[arg(required = true)]
    export_file: PathBuf,

    /// Format of the export. Identified from its contents when omitted.
    #[arg(short = 'b', long, ignore_case = true)]
    broker: Option<BrokerArg>,

    /// Owner of the imported records
    #[arg(short = 'u', long, default_value = "default")]
    user: String,

    #[arg(short = 'a', long, default_value = "default")]
    account: String,

    #[arg(long)]
    guild_id: Option<u64>,

    /// Insert records without deleting the existing ones in the export's
    /// date range.
    #[arg(long, default_value_t = false)]
    append: bool,

    /// Only import these kinds of records. May be provided multiple times.
    #[arg(short = 'k', long, ignore_case = true)]
    kind: Vec<KindArg>,

    /// Directory of the record store csv files (one per kind).
    /// When omitted, records are only printed.
    #[arg(short = 's', long)]
    store_dir: Option<PathBuf>,

    /// Print records as text tables rather than csv
    #[arg(long, default_value_t = false)]
    pretty: bool,

    /// Write the intermediate table of each stage here, as csv.
    #[arg(long)]
    debug_dir: Option<PathBuf>,

    /// Lines before the header. Overrides the broker's own layout.
    #[arg(long)]
    skip_rows: Option<usize>,

    /// Trailing lines to ignore. Overrides the broker's own layout.
    #[arg(long)]
    skip_footer: Option<usize>,

    /// Fail when a sectioned export lacks an expected section,
    /// rather than assuming it starts at line 1.
    #[arg(long, default_value_t = false)]
    strict_sections: bool,

    /// Print verbose output
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

impl Args {
    fn owner(&self) -> RecordOwner {
        RecordOwner::new(&self.user)
            .with_account(&self.account)
            .with_guild(self.guild_id)
    }

    fn import_options(&self) -> ImportOptions {
        let layout_override = match (self.skip_rows, self.skip_footer) {
            (None, None) => None,
            (rows, footer) => Some(FileLayout::new(rows.unwrap_or(0), footer.unwrap_or(0))),
        };
        ImportOptions {
            append: self.append,
            kinds: self.kind.iter().map(|k| k.kind()).collect(),
            process: ProcessOptions {
                debug_dir: self.debug_dir.clone(),
                strict_sections: self.strict_sections,
                layout_override,
            },
        }
    }
}

fn resolve_broker(args: &Args, err_printer: &mut WriteHandle) -> Result<Broker, SError> {
    if let Some(b) = args.broker {
        return Ok(b.broker());
    }
    let ident = identify_file(&args.export_file).map_err(|e| e.to_string())?;
    match ident.broker {
        Some(b) => {
            if args.verbose {
                write_errln!(*err_printer, "Identified format: {}", ident);
            }
            Ok(b)
        }
        None => Err(format!(
            "Unable to identify the format of {}: {}. Provide --broker",
            args.export_file.display(),
            ident
        )),
    }
}

fn open_store(args: &Args) -> Result<Box<dyn RecordStore>, SError> {
    Ok(match &args.store_dir {
        Some(dir) => Box::new(CsvRecordStore::new(dir)?),
        None => Box::new(InMemoryRecordStore::new()),
    })
}

fn run_import(
    args: &Args,
    out_w: &mut WriteHandle,
    err_printer: &mut WriteHandle,
) -> Result<(), SError> {
    let broker = resolve_broker(args, err_printer)?;
    let owner = args.owner();
    let mut store = open_store(args)?;

    let summary = import_file(
        broker,
        &args.export_file,
        &owner,
        store.as_mut(),
        &args.import_options(),
    )
    .map_err(|e| e.to_string())?;

    for t in &summary.tables {
        let records = store.query(t.kind, &owner.username, &owner.account)?;
        let table = render_owned_records(t.kind, &records);
        if args.pretty {
            let title = format!("{}:", t.kind.name().to_uppercase());
            write_text(&title, &table, &mut *out_w)?;
            writeln!(out_w).map_err(|e| e.to_string())?;
        } else {
            write_csv(&table, &mut *out_w)?;
        }
    }

    write_errln!(*err_printer, "{}", summary);
    Ok(())
}

pub fn run_with_args(
    args: Args,
    mut out_w: WriteHandle,
    mut err_printer: WriteHandle,
) -> Result<(), ()> {
    if args.verbose {
        crate::tracing::enable_trace_env("brokerage_import=debug");
    }
    crate::tracing::setup_tracing();

    run_import(&args, &mut out_w, &mut err_printer).map_err(|e| {
        write_errln!(err_printer, "Error: {}", e);
    })
}

pub fn run() -> Result<(), ()> {
    let args = Args::parse();
    run_with_args(
        args,
        WriteHandle::stdout_write_handle(),
        WriteHandle::stderr_write_handle(),
    )
}
