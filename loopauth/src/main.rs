use std::process::ExitCode;

use clap::{Parser, Subcommand};
use loopauth::Opts;

#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    opts: Opts,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Log in through the browser and cache the issued tokens
    Login,
    /// Print a valid access token, renewing it if needed
    Token,
}

#[tokio::main]
async fn main() -> color_eyre::Result<ExitCode> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::filter::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = cli.opts.into_settings()?;

    match cli.command {
        Command::Login => loopauth::login(&settings).await?,
        Command::Token => match loopauth::get_auth_token(&settings).await? {
            Some(token) => println!("{}", token.as_str()),
            None => {
                eprintln!("Not authenticated, please login first.");
                return Ok(ExitCode::FAILURE);
            }
        },
    }

    Ok(ExitCode::SUCCESS)
}
