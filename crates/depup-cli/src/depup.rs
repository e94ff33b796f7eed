#![forbid(unsafe_code)]

mod common;
mod logging;
mod options;

use clap::Parser;
use color_eyre::eyre;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let options = options::Options::parse();
    let code = common::run(options).await?;
    std::process::exit(code);
}
