use clap::Parser;
use colour::{green_ln, red_ln};
use human_panic::setup_panic;

use tilerelay::{run, Arguments};

#[tokio::main]
async fn main() {
    setup_panic!();
    let args = Arguments::parse();
    env_logger::Builder::new()
        .parse_filters(&args.logging)
        .init();
    if let Err(err) = run(&args).await {
        red_ln!("ERROR {}", err);
        std::process::exit(1);
    }
    green_ln!("Done!");
}
