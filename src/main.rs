use clap::Parser;
use vbitext::app;
use vbitext::cli::Cli;

fn main() {
    let cli = Cli::parse();

    if let Err(error) = app::run(cli) {
        eprintln!("vbitext: {error}");
        std::process::exit(error.exit_code());
    }
}
