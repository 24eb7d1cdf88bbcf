use std::path::PathBuf;

use clap::{arg, Command};

fn cli() -> Command {
    Command::new("duel-server")
        .about("HTTP and WebSocket server for the duel trading-duel engine.")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(Command::new("run").arg(arg!([config] "The path to config file")))
}

#[tokio::main]
pub async fn main() {
    tracing_subscriber::fmt::init();
    let matches = cli().get_matches();
    match matches.subcommand() {
        Some(("run", subcommand_matches)) => {
            let path = subcommand_matches.get_one::<PathBuf>("config");
            duel_server::run(&path.cloned().unwrap_or_else(|| "config.toml".into())).await;
        }
        _ => unreachable!(),
    }
}
