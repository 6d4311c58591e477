use anyhow::Result;

mod api;
mod app;
mod config;
mod handler;
mod stream;
mod tui;
mod ui;

use app::App;
use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().unwrap_or_else(|_| Config::new());
    let mut app = App::new(config);

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = tui::EventHandler::new();
    let tx = events.sender();

    // Initial health probe; a healthy response triggers the models fetch.
    handler::spawn_health_probe(&mut app, &tx);

    while !app.should_quit {
        terminal.draw(|frame| ui::render(&mut app, frame))?;

        if let Some(event) = events.next().await {
            handler::handle_event(&mut app, event, &tx);
        } else {
            break;
        }
    }

    tui::restore()?;
    Ok(())
}
