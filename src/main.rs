use clap::Parser;
use claudette::cli::{self, Cli};

#[tokio::main]
async fn main() {
    let args = Cli::parse();
    cli::init_tracing(args.debug, args.quiet);
    let code = cli::run(args).await;
    std::process::exit(code);
}
