use clap::Parser;

use tonearm::runtime::{self, Args};

fn main() -> anyhow::Result<()> {
    runtime::init_logging();
    runtime::run(Args::parse())
}
