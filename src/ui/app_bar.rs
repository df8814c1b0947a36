use adw::prelude::*;
use gtk4 as gtk;
use std::cell::RefCell;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::rc::Rc;

use crate::app::Session;
use crate::flow::{Anchor, ConversationFlow, FlowState, Notifier, Variant};
use crate::presence::{ColumnWidth, HeaderContent};
use crate::store::ConversationStore;
use crate::ui::dialogs::{self, GroupDialog, TextEntryDialog};

/// Routes flow notices to the window's toast overlay.
pub struct ToastNotifier(pub adw::ToastOverlay);

impl Notifier for ToastNotifier {
    fn notify(&self, message: &str) {
        let toast = adw::Toast::builder().title(message).timeout(6).build();
        self.0.add_toast(toast);
    }
}

fn avatar_cache_path(url: &str) -> Option<PathBuf> {
    let proj = directories::ProjectDirs::from("com", "example", "FirechatGtk")?;
    let mut hasher = DefaultHasher::new();
    url.hash(&mut hasher);
    Some(proj.cache_dir().join("avatars").join(format!("{:016x}", hasher.finish())))
}

/// Show the image at `url` in `avatar`, or its initials when there is none
/// or the download fails.
pub fn load_avatar(avatar: &adw::Avatar, url: Option<&str>) {
    avatar.set_custom_image(None::<&gtk::gdk::Paintable>);
    let (Some(url), Some(backend)) = (url, crate::backend::get()) else {
        return;
    };
    let Some(path) = avatar_cache_path(url) else {
        return;
    };
    let url = url.to_string();
    let db = backend.db.clone();
    let avatar = avatar.clone();
    crate::utils::run_async_to_main(
        async move {
            if !path.exists() {
                let bytes = db.download(&url).await.map_err(|e| e.to_string())?;
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
                }
                std::fs::write(&path, bytes).map_err(|e| e.to_string())?;
            }
            Ok::<PathBuf, String>(path)
        },
        move |res| match res {
            Ok(path) => match gtk::gdk::Texture::from_file(&gtk::gio::File::for_path(&path)) {
                Ok(texture) => avatar.set_custom_image(Some(&texture)),
                Err(e) => log::warn!("Avatar at {} is not an image: {}", path.display(), e),
            },
            Err(e) => log::warn!("Avatar download failed: {}", e),
        },
    );
}

/// Header bar shared by direct and group conversations: drawer toggle,
/// "new conversation" menu, counterpart summary and the user's avatar.
pub struct AppBar {
    header: adw::HeaderBar,
    avatar: adw::Avatar,
    primary: gtk::Label,
    secondary: gtk::Label,
    spinner: gtk::Spinner,
    search_btn: gtk::Button,
    popover: gtk::Popover,
    friend_dialog: Rc<TextEntryDialog>,
    group_dialog: Rc<GroupDialog>,
    flow: RefCell<ConversationFlow>,
    column: RefCell<ColumnWidth>,
}

impl AppBar {
    pub fn new(
        window: &adw::ApplicationWindow,
        session: Session,
        store: Rc<dyn ConversationStore>,
        notifier: Rc<dyn Notifier>,
        on_drawer: impl Fn() + 'static,
        on_sign_out: impl Fn() + 'static,
    ) -> Rc<Self> {
        let header = adw::HeaderBar::new();

        let drawer_btn = gtk::Button::from_icon_name("open-menu-symbolic");
        drawer_btn.set_tooltip_text(Some("Conversations"));
        drawer_btn.connect_clicked(move |_| on_drawer());
        header.pack_start(&drawer_btn);

        let search_btn = gtk::Button::from_icon_name("system-search-symbolic");
        search_btn.set_tooltip_text(Some("Start a conversation"));
        header.pack_start(&search_btn);

        let popover = gtk::Popover::new();
        popover.set_parent(&search_btn);
        let menu = gtk::Box::new(gtk::Orientation::Vertical, 4);
        let new_chat = gtk::Button::with_label("Start new chat");
        let new_group = gtk::Button::with_label("Start new group");
        new_chat.add_css_class("flat");
        new_group.add_css_class("flat");
        menu.append(&new_chat);
        menu.append(&new_group);
        popover.set_child(Some(&menu));

        // Counterpart summary
        let title = gtk::Box::new(gtk::Orientation::Horizontal, 8);
        let avatar = adw::Avatar::new(32, None, true);
        let spinner = gtk::Spinner::new();
        let labels = gtk::Box::new(gtk::Orientation::Vertical, 0);
        let primary = gtk::Label::new(None);
        let secondary = gtk::Label::new(None);
        for label in [&primary, &secondary] {
            label.set_halign(gtk::Align::Start);
            label.set_xalign(0.0);
            label.set_ellipsize(gtk::pango::EllipsizeMode::End);
            label.set_single_line_mode(true);
        }
        primary.add_css_class("heading");
        secondary.add_css_class("dim-label");
        secondary.add_css_class("caption");
        labels.append(&primary);
        labels.append(&secondary);
        title.append(&avatar);
        title.append(&spinner);
        title.append(&labels);
        header.set_title_widget(Some(&title));

        let me_avatar = adw::Avatar::new(24, Some(&session.display_name), true);
        load_avatar(&me_avatar, session.photo_url.as_deref());
        let me_btn = gtk::Button::new();
        me_btn.set_child(Some(&me_avatar));
        me_btn.add_css_class("flat");
        me_btn.set_tooltip_text(Some(&session.display_name));
        header.pack_end(&me_btn);

        let variant = Variant::Direct;
        let friend_dialog = TextEntryDialog::new(window, variant.dialog_title(), variant.dialog_body(), "Add", "Cancel");
        let group_dialog = GroupDialog::new(window);

        let sign_out_body = format!("Do you want to sign out of {}?", session.display_name);
        let flow = ConversationFlow::new(variant, session, store, notifier);

        let bar = Rc::new(Self {
            header,
            avatar,
            primary,
            secondary,
            spinner,
            search_btn: search_btn.clone(),
            popover: popover.clone(),
            friend_dialog,
            group_dialog,
            flow: RefCell::new(flow),
            column: RefCell::new(ColumnWidth::default()),
        });
        bar.set_viewport_width(window.default_width());
        bar.show(HeaderContent::direct(None, false, chrono::Utc::now()));

        // Handlers hold the bar weakly: the popover and dialogs they hang off
        // are owned by the bar itself.
        let weak = Rc::downgrade(&bar);
        {
            let weak = weak.clone();
            search_btn.connect_clicked(move |btn| {
                let Some(bar) = weak.upgrade() else { return };
                let anchor = Anchor {
                    x: f64::from(btn.width()) / 2.0,
                    y: f64::from(btn.height()),
                };
                bar.flow.borrow_mut().open_menu(anchor);
                bar.render();
            });
        }
        {
            let weak = weak.clone();
            popover.connect_closed(move |_| {
                let Some(bar) = weak.upgrade() else { return };
                bar.flow.borrow_mut().close_menu();
                bar.render();
            });
        }
        {
            let weak = weak.clone();
            new_chat.connect_clicked(move |_| {
                let Some(bar) = weak.upgrade() else { return };
                bar.flow.borrow_mut().start_new_chat();
                bar.render();
            });
        }
        {
            let weak = weak.clone();
            new_group.connect_clicked(move |_| {
                let Some(bar) = weak.upgrade() else { return };
                bar.flow.borrow_mut().start_new_group();
                bar.render();
            });
        }
        {
            let on_edit = weak.clone();
            bar.friend_dialog.connect_changed(move |text| {
                let Some(bar) = on_edit.upgrade() else { return };
                bar.flow.borrow_mut().edit(&text);
                bar.render();
            });
            let on_ok = weak.clone();
            let on_cancel = weak.clone();
            bar.friend_dialog.connect_responses(
                move || {
                    let Some(bar) = on_ok.upgrade() else { return };
                    // Rejections are shown by render() through the draft.
                    let _ = bar.flow.borrow_mut().submit();
                    bar.render();
                },
                move || {
                    let Some(bar) = on_cancel.upgrade() else { return };
                    bar.flow.borrow_mut().cancel();
                    bar.render();
                },
            );
        }
        {
            let on_ok = weak.clone();
            let on_cancel = weak;
            bar.group_dialog.connect_responses(
                move || {
                    let Some(bar) = on_ok.upgrade() else { return };
                    let (name, members) = bar.group_dialog.values();
                    {
                        let mut flow = bar.flow.borrow_mut();
                        flow.edit_group(&name, &members);
                        let _ = flow.submit_group();
                    }
                    bar.render();
                },
                move || {
                    let Some(bar) = on_cancel.upgrade() else { return };
                    bar.flow.borrow_mut().cancel();
                    bar.render();
                },
            );
        }
        {
            let window = window.clone();
            let on_sign_out = Rc::new(on_sign_out);
            me_btn.connect_clicked(move |_| {
                let on_sign_out = on_sign_out.clone();
                let dialog = dialogs::confirm(&window, "Sign out", &sign_out_body, "Yes", "No", move || on_sign_out(), || {});
                dialog.present();
            });
        }

        bar
    }

    /// Release what the window does not own: the dialogs are separate
    /// toplevels and the popover is parented by hand.
    pub fn teardown(&self) {
        self.friend_dialog.destroy();
        self.group_dialog.destroy();
        self.popover.unparent();
    }

    pub fn widget(&self) -> gtk::Widget {
        self.header.clone().upcast()
    }

    /// Sync popover and dialogs with the flow state.
    fn render(&self) {
        let flow = self.flow.borrow();
        let state = flow.state();

        match state {
            FlowState::MenuOpen { anchor } => {
                let rect = gtk::gdk::Rectangle::new(anchor.x as i32, anchor.y as i32, 1, 1);
                self.popover.set_pointing_to(Some(&rect));
                if !self.popover.is_visible() {
                    self.popover.popup();
                }
            }
            _ => {
                if self.popover.is_visible() {
                    // Popdown emits `closed`; the flow ignores it outside MenuOpen.
                    drop(flow);
                    self.popover.popdown();
                    return self.render();
                }
            }
        }

        let draft = flow.draft();
        self.friend_dialog.set_title(flow.variant().dialog_title());
        self.friend_dialog.set_value(&draft.value);
        let error = draft.error_text();
        self.friend_dialog.set_error(draft.has_error().then_some(error.as_str()));
        self.friend_dialog.set_open(state == FlowState::FriendDialogOpen);

        let group = flow.group_draft();
        let group_error = group.error.map(|e| e.to_string());
        self.group_dialog.set_error(group_error.as_deref());
        if state != FlowState::GroupDialogOpen && group.name.is_empty() && group.members.is_empty() {
            self.group_dialog.clear();
        }
        self.group_dialog.set_open(state == FlowState::GroupDialogOpen);
        self.search_btn.set_sensitive(state == FlowState::Idle || matches!(state, FlowState::MenuOpen { .. }));
    }

    pub fn set_variant(&self, variant: Variant) {
        self.flow.borrow_mut().set_variant(variant);
    }

    /// Re-derive the name/status column from the viewport width. Repeated
    /// widths within one tier are ignored.
    pub fn set_viewport_width(&self, width: i32) {
        let Some(column) = self.column.borrow_mut().observe(width) else { return };
        self.primary.set_width_request(column);
        self.secondary.set_width_request(column);
        // Keep the labels from pushing the header wider than the column.
        self.primary.set_max_width_chars(column / 8);
        self.secondary.set_max_width_chars(column / 8);
    }

    pub fn show(&self, content: HeaderContent) {
        match content {
            HeaderContent::Loading => {
                self.spinner.set_visible(true);
                self.spinner.start();
                self.avatar.set_visible(false);
                self.primary.set_label("");
                self.secondary.set_label("");
            }
            HeaderContent::Direct { avatar_url, primary, secondary } => {
                self.stop_loading();
                self.avatar.set_text(Some(&primary));
                load_avatar(&self.avatar, avatar_url.as_deref());
                self.primary.set_label(&primary);
                self.secondary.set_label(&secondary);
            }
            HeaderContent::Group { photo_url, name, members } => {
                self.stop_loading();
                self.avatar.set_text(Some(&name));
                load_avatar(&self.avatar, photo_url.as_deref());
                self.primary.set_label(&name);
                self.secondary.set_label(&members);
            }
        }
    }

    fn stop_loading(&self) {
        self.spinner.stop();
        self.spinner.set_visible(false);
        self.avatar.set_visible(true);
    }
}
