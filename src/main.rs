use anyhow::Result;
use clap::Parser;
use dupfind::Opts;
use dupfind::cli::SubCommandExtend;
use dupfind::config::SubCommand;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::builder().filter_level(log::LevelFilter::Info).parse_default_env().init();

    let opts = Opts::parse();
    match &opts.subcmd {
        SubCommand::Create(config) => config.run(&opts).await,
        SubCommand::Duplicates(config) => config.run(&opts).await,
        SubCommand::Server(config) => config.run(&opts).await,
    }
}
