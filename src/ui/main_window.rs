use adw::prelude::*;
use adw::Application;
use std::rc::Rc;

use crate::api::models::Conversation;
use crate::app::{AppState, Session};
use crate::flow::{Notifier, Variant};
use crate::presence::HeaderContent;
use crate::store::{ConversationStore, LiveConversations};
use crate::ui::app_bar::{AppBar, ToastNotifier};

pub fn show_main_window(app: &Application, session: Session) {
    let Some(backend) = crate::backend::get() else {
        log::error!("Main window requested before the backend was initialized");
        crate::ui::login::show_login_window(app);
        return;
    };

    let window = adw::ApplicationWindow::builder()
        .application(app)
        .title("Firechat")
        .default_width(960)
        .default_height(640)
        .build();

    let overlay = adw::ToastOverlay::new();

    let split = adw::Flap::builder()
        .reveal_flap(true)
        .locked(true)
        .modal(false)
        .build();

    let sidebar = Rc::new(crate::ui::sidebar::Sidebar::new(&session.email));
    split.set_flap(Some(&sidebar.widget()));

    let placeholder = adw::StatusPage::builder()
        .icon_name("mail-send-symbolic")
        .title("No conversation selected")
        .description("Pick a conversation, or use the search button to start one.")
        .build();
    split.set_content(Some(&placeholder));
    overlay.set_child(Some(&split));

    let (live, updates) = LiveConversations::new(backend.db.clone(), session.id_token.clone());
    let live = Rc::new(live);
    let store: Rc<dyn ConversationStore> = live.clone();
    let notifier: Rc<dyn Notifier> = Rc::new(ToastNotifier(overlay.clone()));

    let on_drawer = {
        let split = split.clone();
        move || split.set_reveal_flap(!split.reveals_flap())
    };
    let on_sign_out = {
        let app = app.clone();
        let window = window.clone();
        let overlay = overlay.clone();
        let live = Rc::downgrade(&live);
        move || {
            let mut state = AppState::load();
            if let Err(e) = state.sign_out() {
                overlay.add_toast(adw::Toast::new(&format!("Failed to sign out: {}", e)));
                return;
            }
            // The signed-out token must not keep querying.
            if let Some(live) = live.upgrade() {
                live.stop();
            }
            crate::ui::login::show_login_window(&app);
            window.close();
        }
    };
    let app_bar = AppBar::new(&window, session.clone(), store.clone(), notifier, on_drawer, on_sign_out);

    let container = gtk4::Box::new(gtk4::Orientation::Vertical, 0);
    container.append(&app_bar.widget());
    container.append(&overlay);
    window.set_content(Some(&container));

    observe_viewport(&window, &app_bar);
    {
        let app_bar = app_bar.clone();
        let live = live.clone();
        window.connect_close_request(move |_| {
            live.stop();
            app_bar.teardown();
            glib::Propagation::Proceed
        });
    }

    // The flow already subscribed to this query; seed the list from the cache.
    sidebar.set_items(store.query_by_participant(&session.email).conversations);
    {
        let sidebar = sidebar.clone();
        let me = session.email.clone();
        crate::utils::attach_to_main(updates, move |update| {
            if update.participant == me {
                sidebar.set_items(update.snapshot.conversations);
            }
        });
    }

    {
        let app_bar = Rc::downgrade(&app_bar);
        let me = session.email.clone();
        let token = session.id_token.clone();
        let overlay = overlay.clone();
        sidebar.connect_selected(move |conv| {
            if let Some(app_bar) = app_bar.upgrade() {
                open_conversation(&app_bar, &overlay, &conv, &me, token.clone());
            }
        });
    }

    window.present();
}

/// Feed the header the window's allocated width after every painted frame.
/// `default-width` alone misses maximize, fullscreen and tiling, which keep
/// the unmaximized size there. The bar ignores widths within the same tier.
fn observe_viewport(window: &adw::ApplicationWindow, app_bar: &Rc<AppBar>) {
    let bar = Rc::downgrade(app_bar);
    window.connect_realize(move |w| {
        let Some(clock) = w.frame_clock() else {
            log::warn!("Window has no frame clock; header width stays fixed");
            return;
        };
        let window = w.downgrade();
        let bar = bar.clone();
        clock.connect_after_paint(move |_| {
            if let (Some(window), Some(bar)) = (window.upgrade(), bar.upgrade()) {
                bar.set_viewport_width(window.width());
            }
        });
    });
}

fn open_conversation(app_bar: &Rc<AppBar>, overlay: &adw::ToastOverlay, conv: &Conversation, me: &str, token: Option<String>) {
    if conv.is_group() {
        app_bar.set_variant(Variant::Group);
        app_bar.show(HeaderContent::group(conv, me));
        return;
    }
    app_bar.set_variant(Variant::Direct);
    let (Some(friend), Some(backend)) = (conv.counterpart(me), crate::backend::get()) else {
        app_bar.show(HeaderContent::direct(None, false, chrono::Utc::now()));
        return;
    };
    app_bar.show(HeaderContent::Loading);

    let friend = friend.to_string();
    let db = backend.db.clone();
    let app_bar = app_bar.clone();
    let overlay = overlay.clone();
    crate::utils::run_async_to_main(
        async move { db.friend_profile(&friend, token.as_deref()).await },
        move |res| match res {
            Ok(profile) => app_bar.show(HeaderContent::direct(profile.as_ref(), false, chrono::Utc::now())),
            Err(e) => {
                log::warn!("Presence lookup failed: {}", e);
                overlay.add_toast(adw::Toast::new("Could not load contact details"));
                app_bar.show(HeaderContent::direct(None, false, chrono::Utc::now()));
            }
        },
    );
}
