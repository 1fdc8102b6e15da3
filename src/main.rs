use std::error::Error;
use mdchat::{cli::run_cli, config::load_config};

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let config = load_config();
    log::debug!("Using chat server at {}", config.api_addr);
    run_cli(config)
}
