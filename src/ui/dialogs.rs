use gtk4 as gtk;
use gtk4::prelude::*;
use std::cell::RefCell;
use std::rc::Rc;

fn padded_box() -> gtk::Box {
    let content = gtk::Box::new(gtk::Orientation::Vertical, 12);
    content.set_margin_top(12);
    content.set_margin_bottom(12);
    content.set_margin_start(12);
    content.set_margin_end(12);
    content
}

fn modal(parent: &impl IsA<gtk::Window>, title: &str) -> gtk::Dialog {
    gtk::Dialog::builder()
        .title(title)
        .transient_for(parent)
        .modal(true)
        .hide_on_close(true)
        .build()
}

fn error_label() -> gtk::Label {
    let label = gtk::Label::new(None);
    label.add_css_class("error");
    label.set_halign(gtk::Align::Start);
    label.set_wrap(true);
    label.set_visible(false);
    label
}

/// Two-button confirmation. Either button closes the dialog.
pub fn confirm(
    parent: &impl IsA<gtk::Window>,
    title: &str,
    body: &str,
    primary: &str,
    secondary: &str,
    on_primary: impl Fn() + 'static,
    on_secondary: impl Fn() + 'static,
) -> gtk::Dialog {
    let dialog = modal(parent, title);
    // One-shot: destroyed when answered.
    dialog.set_hide_on_close(false);
    let content = padded_box();
    let label = gtk::Label::new(Some(body));
    label.set_halign(gtk::Align::Start);
    label.set_wrap(true);
    content.append(&label);
    dialog.content_area().append(&content);

    let _ = dialog.add_button(secondary, gtk::ResponseType::Cancel);
    let ok_btn = dialog.add_button(primary, gtk::ResponseType::Ok);
    ok_btn.add_css_class("suggested-action");
    dialog.set_default_response(gtk::ResponseType::Ok);

    dialog.connect_response(move |dlg, resp| {
        if resp == gtk::ResponseType::Ok {
            on_primary();
        } else {
            on_secondary();
        }
        dlg.close();
    });
    dialog
}

/// Text-entry dialog with an inline error. Stays open on the primary
/// response; the owner decides when to hide it.
pub struct TextEntryDialog {
    dialog: gtk::Dialog,
    title: gtk::Label,
    entry: gtk::Entry,
    error: gtk::Label,
    changed: RefCell<Option<glib::SignalHandlerId>>,
}

impl TextEntryDialog {
    pub fn new(parent: &impl IsA<gtk::Window>, title: &str, body: &str, primary: &str, secondary: &str) -> Rc<Self> {
        let dialog = modal(parent, title);
        let content = padded_box();

        let heading = gtk::Label::new(Some(title));
        heading.add_css_class("title-4");
        heading.set_halign(gtk::Align::Start);
        content.append(&heading);

        let info = gtk::Label::new(Some(body));
        info.set_halign(gtk::Align::Start);
        content.append(&info);

        let entry = gtk::Entry::new();
        entry.set_placeholder_text(Some("Email address"));
        entry.set_input_purpose(gtk::InputPurpose::Email);
        entry.set_hexpand(true);
        entry.set_activates_default(true);
        content.append(&entry);

        let error = error_label();
        content.append(&error);
        dialog.content_area().append(&content);

        let _ = dialog.add_button(secondary, gtk::ResponseType::Cancel);
        let ok_btn = dialog.add_button(primary, gtk::ResponseType::Ok);
        ok_btn.add_css_class("suggested-action");
        dialog.set_default_response(gtk::ResponseType::Ok);

        Rc::new(Self { dialog, title: heading, entry, error, changed: RefCell::new(None) })
    }

    pub fn set_title(&self, title: &str) {
        self.dialog.set_title(Some(title));
        self.title.set_label(title);
    }

    /// Replace the entry text without reporting it as user input.
    pub fn set_value(&self, value: &str) {
        if self.entry.text().as_str() == value {
            return;
        }
        let handler = self.changed.borrow();
        if let Some(id) = handler.as_ref() {
            self.entry.block_signal(id);
        }
        self.entry.set_text(value);
        if let Some(id) = handler.as_ref() {
            self.entry.unblock_signal(id);
        }
    }

    pub fn set_error(&self, message: Option<&str>) {
        match message {
            Some(text) => {
                self.error.set_label(text);
                self.error.set_visible(true);
                self.entry.add_css_class("error");
            }
            None => {
                self.error.set_visible(false);
                self.entry.remove_css_class("error");
            }
        }
    }

    pub fn connect_changed(&self, f: impl Fn(String) + 'static) {
        let id = self.entry.connect_changed(move |e| f(e.text().to_string()));
        self.changed.replace(Some(id));
    }

    /// `on_primary` for the primary button, `on_secondary` for the other
    /// button and for closing the window.
    pub fn connect_responses(&self, on_primary: impl Fn() + 'static, on_secondary: impl Fn() + 'static) {
        self.dialog.connect_response(move |_, resp| {
            if resp == gtk::ResponseType::Ok {
                on_primary();
            } else {
                on_secondary();
            }
        });
    }

    pub fn set_open(&self, open: bool) {
        if open {
            if !self.dialog.is_visible() {
                self.dialog.present();
                self.entry.grab_focus();
            }
        } else {
            self.dialog.set_visible(false);
        }
    }

    /// The dialog is its own toplevel; it does not go away with the parent.
    pub fn destroy(&self) {
        self.dialog.destroy();
    }
}

/// Name + member list dialog for creating a group.
pub struct GroupDialog {
    dialog: gtk::Dialog,
    name: gtk::Entry,
    members: gtk::Entry,
    error: gtk::Label,
}

impl GroupDialog {
    pub fn new(parent: &impl IsA<gtk::Window>) -> Rc<Self> {
        let dialog = modal(parent, "Create a group");
        let content = padded_box();

        let info = gtk::Label::new(Some("Name the group and list the members' emails, separated by commas:"));
        info.set_halign(gtk::Align::Start);
        info.set_wrap(true);
        content.append(&info);

        let name = gtk::Entry::new();
        name.set_placeholder_text(Some("Group name"));
        content.append(&name);

        let members = gtk::Entry::new();
        members.set_placeholder_text(Some("friend@example.com, other@example.com"));
        members.set_activates_default(true);
        content.append(&members);

        let error = error_label();
        content.append(&error);
        dialog.content_area().append(&content);

        let _ = dialog.add_button("Cancel", gtk::ResponseType::Cancel);
        let ok_btn = dialog.add_button("Create", gtk::ResponseType::Ok);
        ok_btn.add_css_class("suggested-action");
        dialog.set_default_response(gtk::ResponseType::Ok);

        Rc::new(Self { dialog, name, members, error })
    }

    pub fn values(&self) -> (String, String) {
        (self.name.text().to_string(), self.members.text().to_string())
    }

    pub fn clear(&self) {
        self.name.set_text("");
        self.members.set_text("");
    }

    pub fn set_error(&self, message: Option<&str>) {
        match message {
            Some(text) => {
                self.error.set_label(text);
                self.error.set_visible(true);
            }
            None => self.error.set_visible(false),
        }
    }

    pub fn connect_responses(&self, on_primary: impl Fn() + 'static, on_secondary: impl Fn() + 'static) {
        self.dialog.connect_response(move |_, resp| {
            if resp == gtk::ResponseType::Ok {
                on_primary();
            } else {
                on_secondary();
            }
        });
    }

    pub fn set_open(&self, open: bool) {
        if open {
            if !self.dialog.is_visible() {
                self.dialog.present();
                self.name.grab_focus();
            }
        } else {
            self.dialog.set_visible(false);
        }
    }

    pub fn destroy(&self) {
        self.dialog.destroy();
    }
}
