use celadon_relay::cli::Args;
use clap::Parser;
use dotenv::dotenv;
use log::{ info, warn };
use std::error::Error;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    info!("--- Relay Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("Chat Base URL: {}", args.chat_base_url);
    info!("Image Base URL: {}", args.image_base_url);
    info!("Chat Model: {}", args.chat_model);
    info!("Static Dir: {}", args.static_dir);
    info!("Chat Rate Limit: {}/s", args.chat_rate_limit);
    if args.upstream_api_key.trim().is_empty() {
        warn!("No upstream API key configured. Upstream calls will be rejected.");
    }
    info!("---------------------------");

    celadon_relay::run(args).await?;

    Ok(())
}
