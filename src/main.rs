use clap::Parser;

use ropscan::config::ServiceConfig;

#[tokio::main]
async fn main() {
    ropscan::init_tracing();

    let config = ServiceConfig::parse();
    if let Err(e) = ropscan::run(config).await {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}
