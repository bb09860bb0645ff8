use super::stores::Stores;
use super::{is_stdio, DumpArgs, StoreArgs};
use crate::cli::observer::VerboseObserver;
use crate::exit_codes;
use anyhow::Context;
use gbp_archive::{
    filter_newer, select_records, ArchiveObserver, Archiver, Build, ResolveError, TypeRegistry,
};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tracing::info;

pub fn run(args: DumpArgs, store_args: &StoreArgs) -> anyhow::Result<i32> {
    let stores = Stores::open(store_args)?;

    let records = match select_records(&args.buildspecs, &stores.records, &stores.storage) {
        Ok(records) => records,
        Err(ResolveError::Lookup(e)) => {
            for spec in &e.specs {
                eprintln!("{} not found.", spec);
            }
            return Ok(exit_codes::LOOKUP_FAILED);
        }
        Err(e) => return Err(e).context("failed to resolve buildspecs"),
    };
    let records = match args.newer {
        Some(date) => filter_newer(records, date),
        None => records,
    };
    let builds: Vec<Build> = records.into_iter().map(|record| record.build).collect();

    if args.list {
        let mut out = io::stdout().lock();
        for build in &builds {
            writeln!(out, "{}", build)?;
        }
        return Ok(exit_codes::SUCCESS);
    }

    let registry = TypeRegistry::standard();
    let archiver = Archiver::new(&stores.records, &stores.storage, &registry)
        .with_spool_threshold(stores.config.spool_threshold);
    let mut observer = VerboseObserver::stderr(args.verbose);

    if is_stdio(&args.file) {
        archiver
            .dump(&builds, BufWriter::new(io::stdout().lock()), &mut observer)
            .context("dump failed")?;
    } else {
        dump_to_file(&archiver, &builds, &args.file, &mut observer)?;
    }

    info!(builds = builds.len(), "dump complete");
    Ok(exit_codes::SUCCESS)
}

/// Dump to `path`, removing the partial file if the dump fails.
fn dump_to_file(
    archiver: &Archiver<'_>,
    builds: &[Build],
    path: &Path,
    observer: &mut dyn ArchiveObserver,
) -> anyhow::Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;

    if let Err(e) = archiver.dump(builds, BufWriter::new(file), observer) {
        if let Err(rm) = fs::remove_file(path) {
            tracing::warn!(path = %path.display(), error = %rm, "could not remove partial dump");
        }
        return Err(e).with_context(|| format!("dump to {} failed", path.display()));
    }
    Ok(())
}
