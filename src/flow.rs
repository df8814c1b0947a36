//! "Start a new conversation" flow driven by the header bar.
//!
//! The flow owns no widgets. The header forwards UI events to it and
//! re-renders from [`ConversationFlow::state`] and the drafts afterwards.

use std::rc::Rc;

use thiserror::Error;

use crate::api::models::NewConversation;
use crate::app::Session;
use crate::store::{ConversationStore, Snapshot};

pub const INVALID_RECIPIENT: &str = "Invalid email or there is already a conversation with this email!";

/// Why a recipient was refused. Every recipient problem shows the same text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvalidRecipient {
    #[error("{}", INVALID_RECIPIENT)]
    MissingAt,
    #[error("{}", INVALID_RECIPIENT)]
    AlreadyExists,
    #[error("{}", INVALID_RECIPIENT)]
    SelfAddressed,
    #[error("Add at least one member to the group.")]
    NoMembers,
    #[error("Give the group a name.")]
    MissingGroupName,
}

/// Non-blocking acknowledgment shown after a conversation is created.
pub trait Notifier {
    fn notify(&self, message: &str);
}

/// Which header the flow belongs to. Only the copy differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Direct,
    Group,
}

impl Variant {
    pub fn dialog_title(self) -> &'static str {
        match self {
            Variant::Direct => "Look for new friends!",
            Variant::Group => "Look for new friend circle",
        }
    }

    pub fn dialog_body(self) -> &'static str {
        "Enter your friend's gmail and add it to your list"
    }

    pub fn added_notice(self) -> &'static str {
        match self {
            Variant::Direct => {
                "The user has been added to your conversation list. However, it is possible that this user is not registered yet. If so, they will appear as unavailable when you open the conversation."
            }
            Variant::Group => {
                "The Group has been added to your conversation list. However, it is possible that this user is not registered yet. If so, they will appear as unavailable when you open the conversation."
            }
        }
    }
}

pub const GROUP_CREATED_NOTICE: &str = "The group has been added to your conversation list.";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FlowState {
    Idle,
    MenuOpen { anchor: Anchor },
    FriendDialogOpen,
    GroupDialogOpen,
}

/// Recipient being typed into the friend dialog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    pub value: String,
    pub error: Option<InvalidRecipient>,
}

impl Draft {
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn error_text(&self) -> String {
        self.error.map(|e| e.to_string()).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupDraft {
    pub name: String,
    pub members: String,
    pub error: Option<InvalidRecipient>,
}

/// Checks run on submit, first failure wins: the identifier must contain
/// `@`, must not already share a conversation with `me`, and must not be
/// `me`.
pub fn validate_recipient(candidate: &str, me: &str, snapshot: &Snapshot) -> Result<(), InvalidRecipient> {
    if !candidate.contains('@') {
        return Err(InvalidRecipient::MissingAt);
    }
    if snapshot.contains_participant(candidate) {
        return Err(InvalidRecipient::AlreadyExists);
    }
    if candidate == me {
        return Err(InvalidRecipient::SelfAddressed);
    }
    Ok(())
}

/// Parse a comma or whitespace separated member list.
pub fn validate_group(name: &str, members: &str, me: &str) -> Result<Vec<String>, InvalidRecipient> {
    if name.trim().is_empty() {
        return Err(InvalidRecipient::MissingGroupName);
    }
    let mut out: Vec<String> = Vec::new();
    for member in members.split(|c: char| c == ',' || c.is_whitespace()).filter(|m| !m.is_empty()) {
        if !member.contains('@') {
            return Err(InvalidRecipient::MissingAt);
        }
        if member == me {
            return Err(InvalidRecipient::SelfAddressed);
        }
        if !out.iter().any(|m| m == member) {
            out.push(member.to_string());
        }
    }
    if out.is_empty() {
        return Err(InvalidRecipient::NoMembers);
    }
    Ok(out)
}

pub struct ConversationFlow {
    variant: Variant,
    session: Session,
    store: Rc<dyn ConversationStore>,
    notifier: Rc<dyn Notifier>,
    state: FlowState,
    draft: Draft,
    group: GroupDraft,
}

impl ConversationFlow {
    /// Starts keeping the current user's membership query live so the
    /// duplicate check has data by the time a dialog is submitted.
    pub fn new(variant: Variant, session: Session, store: Rc<dyn ConversationStore>, notifier: Rc<dyn Notifier>) -> Self {
        let _ = store.query_by_participant(&session.email);
        Self {
            variant,
            session,
            store,
            notifier,
            state: FlowState::Idle,
            draft: Draft::default(),
            group: GroupDraft::default(),
        }
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    pub fn draft(&self) -> &Draft {
        &self.draft
    }

    pub fn group_draft(&self) -> &GroupDraft {
        &self.group
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn set_variant(&mut self, variant: Variant) {
        self.variant = variant;
    }

    fn ignored(&self, event: &str) {
        log::debug!("Ignoring {} in state {:?}", event, self.state);
    }

    pub fn open_menu(&mut self, anchor: Anchor) {
        match self.state {
            FlowState::Idle => self.state = FlowState::MenuOpen { anchor },
            _ => self.ignored("open_menu"),
        }
    }

    pub fn close_menu(&mut self) {
        match self.state {
            FlowState::MenuOpen { .. } => self.state = FlowState::Idle,
            _ => self.ignored("close_menu"),
        }
    }

    pub fn start_new_chat(&mut self) {
        match self.state {
            FlowState::MenuOpen { .. } => self.state = FlowState::FriendDialogOpen,
            _ => self.ignored("start_new_chat"),
        }
    }

    pub fn start_new_group(&mut self) {
        match self.state {
            FlowState::MenuOpen { .. } => self.state = FlowState::GroupDialogOpen,
            _ => self.ignored("start_new_group"),
        }
    }

    /// Typing clears a previous error.
    pub fn edit(&mut self, value: &str) {
        if self.state != FlowState::FriendDialogOpen {
            return self.ignored("edit");
        }
        self.draft.error = None;
        self.draft.value = value.to_string();
    }

    /// Submit the friend dialog. Returns `Ok(true)` when a conversation was
    /// requested and `Ok(false)` when no friend dialog is open. The typed
    /// value is cleared either way.
    pub fn submit(&mut self) -> Result<bool, InvalidRecipient> {
        if self.state != FlowState::FriendDialogOpen {
            self.ignored("submit");
            return Ok(false);
        }
        let candidate = std::mem::take(&mut self.draft.value);
        let me = self.session.email.clone();
        let snapshot = self.store.query_by_participant(&me);
        if !snapshot.loaded {
            log::debug!("Checking {} against a snapshot that has not loaded yet", candidate);
        }
        match validate_recipient(&candidate, &me, &snapshot) {
            Ok(()) => {
                log::info!("Starting conversation between {} and {}", me, candidate);
                self.store.insert(NewConversation::new([me, candidate]));
                self.notifier.notify(self.variant.added_notice());
                self.draft = Draft::default();
                self.state = FlowState::Idle;
                Ok(true)
            }
            Err(e) => {
                log::debug!("Rejected recipient {:?}: {:?}", candidate, e);
                self.draft.error = Some(e);
                Err(e)
            }
        }
    }

    pub fn edit_group(&mut self, name: &str, members: &str) {
        if self.state != FlowState::GroupDialogOpen {
            return self.ignored("edit_group");
        }
        self.group.error = None;
        self.group.name = name.to_string();
        self.group.members = members.to_string();
    }

    /// Submit the group dialog. The drafts survive a failed submit so the
    /// user can fix a single bad member.
    pub fn submit_group(&mut self) -> Result<bool, InvalidRecipient> {
        if self.state != FlowState::GroupDialogOpen {
            self.ignored("submit_group");
            return Ok(false);
        }
        let me = self.session.email.clone();
        match validate_group(&self.group.name, &self.group.members, &me) {
            Ok(members) => {
                let name = self.group.name.trim().to_string();
                log::info!("Creating group {:?} with {:?}", name, members);
                let participants = std::iter::once(me).chain(members);
                self.store.insert(NewConversation::new(participants).with_name(name));
                self.notifier.notify(GROUP_CREATED_NOTICE);
                self.group = GroupDraft::default();
                self.state = FlowState::Idle;
                Ok(true)
            }
            Err(e) => {
                self.group.error = Some(e);
                Err(e)
            }
        }
    }

    /// Dismiss whichever dialog is open.
    pub fn cancel(&mut self) {
        match self.state {
            FlowState::FriendDialogOpen | FlowState::GroupDialogOpen => {
                self.draft = Draft::default();
                self.group = GroupDraft::default();
                self.state = FlowState::Idle;
            }
            _ => self.ignored("cancel"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::Conversation;
    use std::cell::RefCell;

    #[derive(Default)]
    struct FakeStore {
        snapshot: RefCell<Snapshot>,
        queries: RefCell<Vec<String>>,
        inserts: RefCell<Vec<NewConversation>>,
    }

    impl ConversationStore for FakeStore {
        fn query_by_participant(&self, participant: &str) -> Snapshot {
            self.queries.borrow_mut().push(participant.to_string());
            self.snapshot.borrow().clone()
        }

        fn insert(&self, conversation: NewConversation) {
            self.inserts.borrow_mut().push(conversation);
        }
    }

    #[derive(Default)]
    struct FakeNotifier {
        messages: RefCell<Vec<String>>,
    }

    impl Notifier for FakeNotifier {
        fn notify(&self, message: &str) {
            self.messages.borrow_mut().push(message.to_string());
        }
    }

    const ME: &str = "me@x.com";

    fn setup(variant: Variant) -> (ConversationFlow, Rc<FakeStore>, Rc<FakeNotifier>) {
        let store = Rc::new(FakeStore::default());
        let notifier = Rc::new(FakeNotifier::default());
        let session = Session { email: ME.into(), display_name: "Me".into(), ..Session::default() };
        let flow = ConversationFlow::new(variant, session, store.clone(), notifier.clone());
        (flow, store, notifier)
    }

    fn with_existing(store: &FakeStore, other: &str) {
        *store.snapshot.borrow_mut() = Snapshot {
            conversations: vec![Conversation {
                id: "c1".into(),
                participants: vec![ME.into(), other.into()],
                name: None,
                photo_url: None,
            }],
            loaded: true,
        };
    }

    fn open_friend_dialog(flow: &mut ConversationFlow) {
        flow.open_menu(Anchor { x: 10.0, y: 4.0 });
        flow.start_new_chat();
        assert_eq!(flow.state(), FlowState::FriendDialogOpen);
    }

    #[test]
    fn menu_captures_anchor_and_closes() {
        let (mut flow, _, _) = setup(Variant::Direct);
        flow.open_menu(Anchor { x: 3.0, y: 7.5 });
        assert_eq!(flow.state(), FlowState::MenuOpen { anchor: Anchor { x: 3.0, y: 7.5 } });
        flow.close_menu();
        assert_eq!(flow.state(), FlowState::Idle);
    }

    #[test]
    fn dialogs_only_open_from_menu() {
        let (mut flow, _, _) = setup(Variant::Direct);
        flow.start_new_chat();
        assert_eq!(flow.state(), FlowState::Idle);
        flow.open_menu(Anchor { x: 0.0, y: 0.0 });
        flow.start_new_group();
        assert_eq!(flow.state(), FlowState::GroupDialogOpen);
        flow.open_menu(Anchor { x: 0.0, y: 0.0 });
        assert_eq!(flow.state(), FlowState::GroupDialogOpen);
    }

    #[test]
    fn valid_recipient_creates_one_conversation() {
        let (mut flow, store, notifier) = setup(Variant::Direct);
        open_friend_dialog(&mut flow);
        flow.edit("a@b.com");
        assert_eq!(flow.submit(), Ok(true));

        let inserts = store.inserts.borrow();
        assert_eq!(inserts.len(), 1);
        assert_eq!(inserts[0].participants, vec![ME.to_string(), "a@b.com".to_string()]);
        assert!(inserts[0].name.is_none());
        assert_eq!(flow.state(), FlowState::Idle);
        assert_eq!(flow.draft(), &Draft::default());
        assert_eq!(notifier.messages.borrow().as_slice(), [Variant::Direct.added_notice()]);
    }

    #[test]
    fn identifiers_without_at_are_rejected() {
        for bad in ["", "plainname", "a.b.com", "  "] {
            let (mut flow, store, notifier) = setup(Variant::Direct);
            open_friend_dialog(&mut flow);
            flow.edit(bad);
            assert_eq!(flow.submit(), Err(InvalidRecipient::MissingAt));
            assert_eq!(flow.state(), FlowState::FriendDialogOpen);
            assert!(flow.draft().value.is_empty());
            assert!(flow.draft().has_error());
            assert_eq!(flow.draft().error_text(), INVALID_RECIPIENT);
            assert!(store.inserts.borrow().is_empty());
            assert!(notifier.messages.borrow().is_empty());
        }
    }

    #[test]
    fn own_identifier_is_rejected() {
        let (mut flow, store, _) = setup(Variant::Direct);
        open_friend_dialog(&mut flow);
        flow.edit(ME);
        assert_eq!(flow.submit(), Err(InvalidRecipient::SelfAddressed));
        assert!(store.inserts.borrow().is_empty());
    }

    #[test]
    fn existing_conversation_is_rejected() {
        let (mut flow, store, _) = setup(Variant::Direct);
        with_existing(&store, "a@b.com");
        open_friend_dialog(&mut flow);
        flow.edit("a@b.com");
        assert_eq!(flow.submit(), Err(InvalidRecipient::AlreadyExists));
        assert_eq!(flow.state(), FlowState::FriendDialogOpen);
        assert!(store.inserts.borrow().is_empty());
    }

    #[test]
    fn checks_run_in_order() {
        let mut snapshot = Snapshot::default();
        snapshot.conversations.push(Conversation {
            id: "c".into(),
            participants: vec![ME.into()],
            name: None,
            photo_url: None,
        });
        // Own identifier is in every conversation, so the duplicate check fires first.
        assert_eq!(validate_recipient(ME, ME, &snapshot), Err(InvalidRecipient::AlreadyExists));
        assert_eq!(validate_recipient(ME, ME, &Snapshot::default()), Err(InvalidRecipient::SelfAddressed));
        assert_eq!(validate_recipient("nobody", ME, &snapshot), Err(InvalidRecipient::MissingAt));
        assert_eq!(validate_recipient("a@b.com", ME, &snapshot), Ok(()));
    }

    #[test]
    fn cancel_clears_draft_without_store_calls() {
        let (mut flow, store, _) = setup(Variant::Direct);
        open_friend_dialog(&mut flow);
        flow.edit("nope");
        let _ = flow.submit();
        flow.edit("half@typed");
        flow.cancel();
        assert_eq!(flow.state(), FlowState::Idle);
        assert_eq!(flow.draft(), &Draft::default());
        assert!(store.inserts.borrow().is_empty());

        flow.open_menu(Anchor { x: 0.0, y: 0.0 });
        flow.start_new_group();
        flow.edit_group("Pals", "a@b.com");
        flow.cancel();
        assert_eq!(flow.state(), FlowState::Idle);
        assert_eq!(flow.group_draft(), &GroupDraft::default());
        assert!(store.inserts.borrow().is_empty());
    }

    #[test]
    fn reopening_after_failed_submit_starts_clean() {
        let (mut flow, _, _) = setup(Variant::Direct);
        open_friend_dialog(&mut flow);
        flow.edit("broken");
        assert!(flow.submit().is_err());
        flow.cancel();
        open_friend_dialog(&mut flow);
        assert!(flow.draft().value.is_empty());
        assert!(!flow.draft().has_error());
    }

    #[test]
    fn typing_clears_error() {
        let (mut flow, _, _) = setup(Variant::Direct);
        open_friend_dialog(&mut flow);
        flow.edit("broken");
        let _ = flow.submit();
        assert!(flow.draft().has_error());
        flow.edit("b");
        assert!(!flow.draft().has_error());
        assert_eq!(flow.draft().value, "b");
    }

    #[test]
    fn group_variant_checks_duplicates_too() {
        let (mut flow, store, notifier) = setup(Variant::Group);
        with_existing(&store, "a@b.com");
        open_friend_dialog(&mut flow);
        flow.edit("a@b.com");
        assert_eq!(flow.submit(), Err(InvalidRecipient::AlreadyExists));

        flow.edit("c@d.com");
        assert_eq!(flow.submit(), Ok(true));
        assert_eq!(notifier.messages.borrow().as_slice(), [Variant::Group.added_notice()]);
        assert!(store.queries.borrow().iter().all(|q| q == ME));
    }

    #[test]
    fn group_dialog_creates_named_conversation() {
        let (mut flow, store, notifier) = setup(Variant::Direct);
        flow.open_menu(Anchor { x: 0.0, y: 0.0 });
        flow.start_new_group();
        flow.edit_group("  Climbing ", "a@b.com, c@d.com a@b.com");
        assert_eq!(flow.submit_group(), Ok(true));

        let inserts = store.inserts.borrow();
        assert_eq!(inserts[0].participants, vec![ME, "a@b.com", "c@d.com"]);
        assert_eq!(inserts[0].name.as_deref(), Some("Climbing"));
        assert_eq!(flow.state(), FlowState::Idle);
        assert_eq!(notifier.messages.borrow().as_slice(), [GROUP_CREATED_NOTICE]);
    }

    #[test]
    fn group_dialog_keeps_draft_on_error() {
        let (mut flow, store, _) = setup(Variant::Direct);
        flow.open_menu(Anchor { x: 0.0, y: 0.0 });
        flow.start_new_group();
        flow.edit_group("Pals", "a@b.com nope");
        assert_eq!(flow.submit_group(), Err(InvalidRecipient::MissingAt));
        assert_eq!(flow.state(), FlowState::GroupDialogOpen);
        assert_eq!(flow.group_draft().members, "a@b.com nope");
        assert!(store.inserts.borrow().is_empty());
    }

    #[test]
    fn group_validation_rules() {
        assert_eq!(validate_group("", "a@b.com", ME), Err(InvalidRecipient::MissingGroupName));
        assert_eq!(validate_group("Pals", " , ", ME), Err(InvalidRecipient::NoMembers));
        assert_eq!(validate_group("Pals", "a@b.com me@x.com", ME), Err(InvalidRecipient::SelfAddressed));
        assert_eq!(validate_group("Pals", "a@b.com", ME), Ok(vec!["a@b.com".to_string()]));
    }

    #[test]
    fn submit_outside_dialog_is_ignored() {
        let (mut flow, store, _) = setup(Variant::Direct);
        assert_eq!(flow.submit(), Ok(false));
        assert_eq!(flow.submit_group(), Ok(false));
        assert!(store.inserts.borrow().is_empty());
    }
}
