use clap::Parser;
use training::util::{init_tracing, run_prepare, PrepareArgs};

fn main() -> anyhow::Result<()> {
    init_tracing();
    run_prepare(PrepareArgs::parse())
}
