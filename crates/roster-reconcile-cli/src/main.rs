use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = roster_reconcile_cli::Cli::parse();
    roster_reconcile_cli::init_logging(cli.log_format());
    roster_reconcile_cli::run_cli(cli)
}
