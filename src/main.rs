use clap::Parser;

use growthsim::api::{Cli, Command, init_tracing, run_command, run_http_server};

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => {
            if let Err(e) = run_http_server(args).await {
                eprintln!("Server error: {e}");
                std::process::exit(1);
            }
        }
        command => match run_command(command) {
            Ok(json) => println!("{json}"),
            Err(msg) => {
                eprintln!("{msg}");
                std::process::exit(1);
            }
        },
    }
}
