//! Imports a broker export into a record store.
//!
//! Every cleaner of the broker is run over the export before anything is
//! written, so a bad row in one kind of record doesn't leave the other kinds
//! half imported. Each kind's date range then replaces what the store held
//! for that range.

use std::{fmt::Display, path::Path};

use time::Date;
use tracing::info;

use crate::{
    broker::Broker,
    pipeline::{process, ImportError, ProcessOptions, ProcessedTable},
    records::{OwnedRecord, RecordOwner, TableKind, TxRecord},
    store::RecordStore,
    util::rw::DescribedReader,
};

#[derive(Clone, Debug, Default)]
pub struct ImportOptions {
    /// Insert without first deleting the existing records in range.
    pub append: bool,
    /// Only import these kinds (all of them when empty).
    pub kinds: Vec<TableKind>,
    pub process: ProcessOptions,
}

#[derive(PartialEq, Eq, Debug)]
pub struct TableImportSummary {
    pub kind: TableKind,
    pub start_date: Option<Date>,
    pub end_date: Option<Date>,
    pub deleted: usize,
    pub inserted: usize,
    // Option trades imported despite a total of the wrong sign
    pub unexpected_signs: usize,
}

impl Display for TableImportSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.start_date, self.end_date) {
            (Some(start), Some(end)) => write!(
                f,
                "{}: processed {} ({} to {}). Deleted {} in range",
                self.kind, self.inserted, start, end, self.deleted
            )?,
            _ => write!(f, "{}: processed 0", self.kind)?,
        }
        if self.unexpected_signs > 0 {
            write!(f, ". {} with an unexpected total sign", self.unexpected_signs)?;
        }
        Ok(())
    }
}

#[derive(PartialEq, Eq, Debug)]
pub struct ImportSummary {
    pub broker: Broker,
    pub owner: RecordOwner,
    pub append: bool,
    pub tables: Vec<TableImportSummary>,
}

impl ImportSummary {
    pub fn total_inserted(&self) -> usize {
        self.tables.iter().map(|t| t.inserted).sum()
    }
}

impl Display for ImportSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Format: {}, user: {}, account: {}, append: {}",
            self.broker, self.owner.username, self.owner.account, self.append
        )?;
        for t in &self.tables {
            writeln!(f, "  {}", t)?;
        }
        write!(f, "Total records imported: {}", self.total_inserted())
    }
}

/// Runs the pipeline for every cleaner of `broker` (limited to
/// `options.kinds`), without touching any store.
pub fn process_export(
    broker: Broker,
    source: &DescribedReader,
    options: &ImportOptions,
) -> Result<Vec<ProcessedTable>, ImportError> {
    broker
        .cleaners()
        .iter()
        .filter(|c| options.kinds.is_empty() || options.kinds.contains(&c.kind()))
        .map(|c| process(c.as_ref(), source, &options.process))
        .collect()
}

fn store_table(
    table: &ProcessedTable,
    owner: &RecordOwner,
    store: &mut dyn RecordStore,
    append: bool,
) -> Result<TableImportSummary, ImportError> {
    let deleted = if append {
        0
    } else {
        store
            .delete_range(
                table.kind,
                &owner.username,
                &owner.account,
                table.start_date,
                table.end_date,
            )
            .map_err(ImportError::Store)?
    };

    // Exports are newest first. Store oldest first.
    for record in table.records.iter().rev() {
        let owned = OwnedRecord { owner: owner.clone(), record: record.clone() };
        store.insert(&owned).map_err(ImportError::Store)?;
    }

    let summary = TableImportSummary {
        kind: table.kind,
        start_date: table.start_date,
        end_date: table.end_date,
        deleted,
        inserted: table.records.len(),
        unexpected_signs: table
            .records
            .iter()
            .filter(|r| matches!(r, TxRecord::Option(o) if !o.total_matches_operation()))
            .count(),
    };
    info!("{}", summary);
    Ok(summary)
}

pub fn import(
    broker: Broker,
    source: &DescribedReader,
    owner: &RecordOwner,
    store: &mut dyn RecordStore,
    options: &ImportOptions,
) -> Result<ImportSummary, ImportError> {
    info!(
        "Importing {} as {} for {} (account {})",
        source.desc(),
        broker,
        owner.username,
        owner.account
    );
    let tables = process_export(broker, source, options)?;

    let mut summaries = Vec::with_capacity(tables.len());
    for table in &tables {
        summaries.push(store_table(table, owner, store, options.append)?);
    }

    Ok(ImportSummary {
        broker,
        owner: owner.clone(),
        append: options.append,
        tables: summaries,
    })
}

pub fn import_file(
    broker: Broker,
    path: &Path,
    owner: &RecordOwner,
    store: &mut dyn RecordStore,
    options: &ImportOptions,
) -> Result<ImportSummary, ImportError> {
    import(
        broker,
        &DescribedReader::from_file_path(path.to_path_buf()),
        owner,
        store,
        options,
    )
}
