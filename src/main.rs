use dotenvy::dotenv;
use log::error;

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    if let Err(e) = baterias::main_module::run(args).await {
        error!("{e:#}");
        std::process::exit(1);
    }
}
