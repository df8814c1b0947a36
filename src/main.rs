mod api;
mod app;
mod backend;
mod flow;
mod presence;
mod storage;
mod store;
mod ui;
mod utils;

use adw::prelude::*;
use adw::Application;

fn main() -> glib::ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let app = Application::builder()
        .application_id("com.example.FirechatGtk")
        .build();
    app.connect_activate(|app| {
        if let Err(e) = crate::storage::init() {
            log::warn!("Conversation cache disabled: {}", e);
        }
        crate::app::build_ui(app);
    });
    app.run()
}
