use super::super::args::*;

pub fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Dump(args) => super::dump::run(args, &cli.store),
        Command::Restore(args) => super::restore::run(args, &cli.store),
    }
}
