use clap::Parser;
use heartwatch_lib::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    heartwatch_lib::run(Cli::parse()).await
}
