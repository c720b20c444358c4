use uuid::Uuid;

use gigdesk_hub::ChannelEvent;
use gigdesk_types::models::Chat;

/// The user's chat list, most recently active first.
///
/// Fed by the hub's `UpdateChats` pushes on an inbox channel; new messages
/// bump their chat to the top in between full refreshes.
#[derive(Debug, Default)]
pub struct ChatList {
    chats: Vec<Chat>,
}

impl ChatList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, chats: Vec<Chat>) {
        self.chats = chats;
        self.sort();
    }

    /// Returns true if the list changed.
    pub fn apply(&mut self, event: &ChannelEvent) -> bool {
        match event {
            ChannelEvent::ChatsUpdated(chats) => {
                self.replace(chats.clone());
                true
            }
            ChannelEvent::MessageCreated(message) => {
                let Some(chat) = self.chats.iter_mut().find(|c| c.id == message.chat_id) else {
                    return false;
                };
                chat.last_message = Some(message.clone());
                self.sort();
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, id: Uuid) -> Option<&Chat> {
        self.chats.iter().find(|c| c.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Chat> {
        self.chats.iter()
    }

    pub fn len(&self) -> usize {
        self.chats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chats.is_empty()
    }

    /// Chats with a participant whose name contains `query`, ignoring case.
    pub fn search<'a>(&'a self, query: &str) -> impl Iterator<Item = &'a Chat> {
        let query = query.trim().to_lowercase();
        self.chats.iter().filter(move |chat| {
            query.is_empty()
                || chat.participants.iter().any(|p| {
                    p.name
                        .as_deref()
                        .is_some_and(|name| name.to_lowercase().contains(&query))
                })
        })
    }

    fn sort(&mut self) {
        self.chats
            .sort_by_key(|c| std::cmp::Reverse(c.last_activity()));
    }
}
