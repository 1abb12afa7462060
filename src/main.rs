mod app;
mod downloader;
mod executor;
mod isolation;
mod scheduler;
mod settings;
mod tray;
mod types;

use app::App;
use settings::AppConfig;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let config = AppConfig::load()?;
    let root = std::env::current_dir()?;

    let (app, event_loop) = App::new(config, root)?;
    app.run(event_loop)
}
