mod app;
mod cli;
mod logging;
mod results;
mod simulate;

use anyhow::{Context, Result};
use app::App;
use clap::Parser;
use cli::Cli;
use stroop_experiment::Session;
use tracing::info;

fn main() -> Result<()> {
    logging::init_tracing();
    let cli = Cli::parse();
    let config = cli.build_config()?;

    let seed = config.seed.unwrap_or_else(rand::random);
    info!("Trial order seed {}", seed);

    if cli.simulate {
        let session = Session::start(&config.output_dir).context("preparing output directory")?;
        return simulate::run(config, seed, &session, cli.error_rate);
    }

    let font = stroop_render::find_font(cli.font.as_deref())?;
    let session = Session::start(&config.output_dir).context("preparing output directory")?;
    App::new(config, seed, session, font)?.run()
}
