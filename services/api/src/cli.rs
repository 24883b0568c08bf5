use crate::demo::{run_demo, DemoArgs};
use crate::infra::SimulatedOutcome;
use crate::server;
use clap::{Args, Parser, Subcommand};
use rental_intake::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Rental Intake",
    about = "Run or demonstrate the rental application lifecycle service",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Walk one application from draft to a countersigned lease and print its history
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Outcome reported by the simulated payment gateway
    #[arg(long, value_enum, default_value_t = SimulatedOutcome::Decline)]
    pub(crate) payment_outcome: SimulatedOutcome,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Demo(args) => run_demo(args),
    }
}
