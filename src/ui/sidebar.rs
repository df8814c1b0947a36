use gtk4::prelude::*;
use gtk4 as gtk;
use std::cell::RefCell;
use std::rc::Rc;

use crate::api::models::Conversation;

pub struct Sidebar {
    root: gtk::Box,
    list: gtk::ListBox,
    me: String,
    items: Rc<RefCell<Vec<Conversation>>>,
}

impl Sidebar {
    pub fn new(me: &str) -> Self {
        let root = gtk::Box::new(gtk::Orientation::Vertical, 6);
        root.set_margin_top(8);
        root.set_margin_bottom(8);
        root.set_margin_start(8);
        root.set_margin_end(8);
        root.set_width_request(220);

        let title = gtk::Label::new(Some("Conversations"));
        title.add_css_class("heading");
        title.set_halign(gtk::Align::Start);
        root.append(&title);

        let list = gtk::ListBox::new();
        list.add_css_class("navigation-sidebar");
        let scroller = gtk::ScrolledWindow::builder()
            .vexpand(true)
            .hscrollbar_policy(gtk::PolicyType::Never)
            .child(&list)
            .build();
        root.append(&scroller);

        Self { root, list, me: me.to_string(), items: Rc::new(RefCell::new(Vec::new())) }
    }

    pub fn widget(&self) -> gtk::Widget {
        self.root.clone().upcast()
    }

    pub fn set_items(&self, items: Vec<Conversation>) {
        while let Some(child) = self.list.first_child() {
            self.list.remove(&child);
        }
        for conv in &items {
            let row = gtk::ListBoxRow::new();
            let label = gtk::Label::new(Some(&conv.title(&self.me)));
            label.set_margin_top(8);
            label.set_margin_bottom(8);
            label.set_margin_start(8);
            label.set_margin_end(8);
            label.set_halign(gtk::Align::Start);
            label.set_ellipsize(gtk::pango::EllipsizeMode::End);
            row.set_child(Some(&label));
            self.list.append(&row);
        }
        self.items.replace(items);
    }

    pub fn connect_selected(&self, f: impl Fn(Conversation) + 'static) {
        let items = self.items.clone();
        self.list.connect_row_activated(move |_, row| {
            let Ok(idx) = usize::try_from(row.index()) else {
                return;
            };
            let picked = items.borrow().get(idx).cloned();
            if let Some(conv) = picked {
                f(conv);
            }
        });
    }
}
