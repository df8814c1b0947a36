use adw::prelude::*;
use adw::Application;
use gtk4 as gtk;
use std::rc::Rc;

use crate::app::AppState;

pub fn show_login_window(app: &Application) {
    let window = adw::ApplicationWindow::builder()
        .application(app)
        .title("Firechat Sign In")
        .default_width(420)
        .default_height(260)
        .resizable(false)
        .build();

    let toast_overlay = adw::ToastOverlay::new();

    let root = gtk::Box::new(gtk::Orientation::Vertical, 12);
    root.set_margin_top(24);
    root.set_margin_bottom(24);
    root.set_margin_start(24);
    root.set_margin_end(24);

    let title = gtk::Label::new(Some("Sign in to Firechat"));
    title.add_css_class("title-2");
    title.set_halign(gtk::Align::Start);
    root.append(&title);

    let email_entry = gtk::Entry::new();
    email_entry.set_placeholder_text(Some("Email"));
    email_entry.set_input_purpose(gtk::InputPurpose::Email);
    email_entry.set_hexpand(true);

    let pass_entry = gtk::PasswordEntry::new();
    pass_entry.set_placeholder_text(Some("Password"));
    pass_entry.set_hexpand(true);

    let form = gtk::Box::new(gtk::Orientation::Vertical, 8);
    form.append(&email_entry);
    form.append(&pass_entry);
    root.append(&form);

    let status = gtk::Label::new(None);
    status.add_css_class("dim-label");
    status.set_halign(gtk::Align::Start);
    status.set_wrap(true);
    root.append(&status);

    let login_btn = gtk::Button::with_label("Sign In");
    login_btn.add_css_class("suggested-action");
    login_btn.set_halign(gtk::Align::End);
    root.append(&login_btn);

    toast_overlay.set_child(Some(&root));
    let container = gtk::Box::new(gtk::Orientation::Vertical, 0);
    let header = adw::HeaderBar::new();
    let header_title = gtk::Label::new(Some("Firechat"));
    header.set_title_widget(Some(&header_title));
    container.append(&header);
    container.append(&toast_overlay);
    window.set_content(Some(&container));

    let on_connect = {
        let app = app.clone();
        let window = window.clone();
        let overlay = toast_overlay.clone();
        let email_entry = email_entry.clone();
        let pass_entry = pass_entry.clone();
        let login_btn = login_btn.clone();
        move || {
            let email = email_entry.text().trim().to_string();
            let password = pass_entry.text().to_string();
            if email.is_empty() || password.is_empty() {
                overlay.add_toast(adw::Toast::new("Please enter your email and password."));
                return;
            }

            let state = AppState::load();
            let backend = match crate::backend::init(&state.backend) {
                Ok(backend) => backend,
                Err(e) => {
                    let path = AppState::toml_path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| "firechat.toml".into());
                    log::warn!("Cannot sign in: {}", e);
                    status.set_label(&format!("Set api_key and project_id under [backend] in {}", path));
                    return;
                }
            };

            status.set_label("Signing in…");
            login_btn.set_sensitive(false);
            let auth = backend.auth.clone();

            let status_label = status.clone();
            let app2 = app.clone();
            let window2 = window.clone();
            let overlay2 = overlay.clone();
            let login_btn2 = login_btn.clone();
            crate::utils::run_async_to_main(
                async move { auth.sign_in(&email, &password).await },
                move |res| {
                    login_btn2.set_sensitive(true);
                    match res {
                        Ok(session) => {
                            log::info!("Signed in as {}", session.email);
                            let mut st = AppState::load();
                            st.session = Some(session.clone());
                            if let Err(e) = st.save() {
                                overlay2.add_toast(adw::Toast::new(&format!("Failed to save settings: {}", e)));
                            }
                            crate::ui::main_window::show_main_window(&app2, session);
                            window2.close();
                        }
                        Err(err) => {
                            log::warn!("Sign-in failed: {}", err);
                            status_label.set_label("Sign-in failed");
                            overlay2.add_toast(adw::Toast::new(&format!("Could not sign in: {}", err)));
                        }
                    }
                },
            );
        }
    };

    let on_connect: Rc<dyn Fn()> = Rc::new(on_connect);
    {
        let on_connect = on_connect.clone();
        login_btn.connect_clicked(move |_| (on_connect)());
    }
    {
        let on_connect = on_connect.clone();
        email_entry.connect_activate(move |_| (on_connect)());
    }
    {
        let on_connect = on_connect.clone();
        pass_entry.connect_activate(move |_| (on_connect)());
    }

    window.present();
}
