pub mod app_bar;
pub mod dialogs;
pub mod login;
pub mod main_window;
pub mod sidebar;
