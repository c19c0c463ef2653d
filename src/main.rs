use anyhow::{bail, Result};
use clap::Parser;
use rucrawl::cli::Cli;
use rucrawl::options::Options;
use rucrawl::{input, scheduler};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let opt = cli.into_options();
    match run(opt).await {
        Ok(false) => {}
        Ok(true) => std::process::exit(130),
        Err(e) => {
            eprintln!("rucrawl: {:#}", e);
            std::process::exit(1);
        }
    }
}

async fn run(mut opt: Options) -> Result<bool> {
    opt.check()?;
    let seeds = input::read_seeds(&opt.input)?;
    if seeds.is_empty() {
        bail!("no seed domains in {}", opt.input);
    }
    if !opt.silent {
        eprintln!(
            "[run] {} seed(s), {} workers, max depth {}, queue {}",
            seeds.len(),
            opt.workers,
            opt.max_depth,
            opt.queue_capacity()
        );
    }
    scheduler::run(opt, seeds).await
}
