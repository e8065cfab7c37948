//! CLI argument parsing and command dispatch.

pub mod args;
pub mod catalog;
pub mod config;
pub mod context;
pub mod ledger;
pub mod output;
pub mod render;
pub mod route;

pub use args::{Cli, Commands, OutputFormat};
pub use context::AppContext;

use crate::error::Result;

/// Run the parsed command.
///
/// # Errors
/// Returns whatever the command handler returns.
pub fn run(cli: &Cli) -> Result<()> {
    let Some(command) = &cli.command else {
        print_quickstart();
        return Ok(());
    };

    let ctx = AppContext::load(cli)?;
    match command {
        Commands::Catalog(args) => catalog::execute(&ctx, args),
        Commands::Route(args) => route::execute(&ctx, args),
        Commands::Ledger(cmd) => ledger::execute(&ctx, cmd),
        Commands::Config => config::execute(&ctx),
    }
}

/// Print quickstart help when no command is given.
fn print_quickstart() {
    println!(
        r"llmroute - LLM provider routing and credit ledger

USAGE:
    llmroute [OPTIONS] <COMMAND>

COMMANDS:
    catalog   List providers and models in the active catalog
    route     Pick a provider and model for a request
    ledger    Inspect and mutate the credit ledger
    config    Show the resolved configuration

QUICK START:
    llmroute catalog --tier starter
    llmroute ledger credit alice 10
    llmroute route --account alice --tier pro --task code
    llmroute ledger history alice

ROBOT MODE:
    llmroute route --account alice --json

For more help: llmroute --help"
    );
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
}
