use super::stores::Stores;
use super::{is_stdio, RestoreArgs, StoreArgs};
use crate::cli::observer::VerboseObserver;
use crate::exit_codes;
use anyhow::Context;
use gbp_archive::{tabulate, Archiver, TypeRegistry};
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use tracing::info;

pub fn run(args: RestoreArgs, store_args: &StoreArgs) -> anyhow::Result<i32> {
    let input: Box<dyn Read> = if is_stdio(&args.file) {
        Box::new(io::stdin().lock())
    } else {
        let file = File::open(&args.file)
            .with_context(|| format!("failed to open {}", args.file.display()))?;
        Box::new(BufReader::new(file))
    };

    if args.list {
        let builds = tabulate(input).context("failed to read archive manifest")?;
        let mut out = io::stdout().lock();
        for build in &builds {
            writeln!(out, "{}", build)?;
        }
        return Ok(exit_codes::SUCCESS);
    }

    let stores = Stores::open(store_args)?;
    let registry = TypeRegistry::standard();
    let mut observer = VerboseObserver::stderr(args.verbose);

    let summary = Archiver::new(&stores.records, &stores.storage, &registry)
        .restore(input, &mut observer)
        .context("restore failed")?;

    info!(
        records = summary.records.len(),
        artifacts = summary.artifacts.len(),
        created = %summary.metadata.created,
        "restore complete"
    );
    Ok(exit_codes::SUCCESS)
}
