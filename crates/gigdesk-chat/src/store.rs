use std::collections::HashSet;

use uuid::Uuid;

use gigdesk_types::models::Message;

/// Chronologically ordered, id-unique message list for one conversation.
///
/// The same message can arrive twice (REST response and hub echo, or two
/// overlapping history pages); every insertion is keyed by id so it is kept once.
#[derive(Debug, Default)]
pub struct MessageStore {
    messages: Vec<Message>,
    ids: HashSet<Uuid>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a message at the tail. Returns false if the id is already present.
    pub fn append(&mut self, message: Message) -> bool {
        if !self.ids.insert(message.id) {
            return false;
        }
        self.messages.push(message);
        true
    }

    /// Insert an older chronological page before the head. Returns how many
    /// messages were new.
    pub fn prepend(&mut self, older: Vec<Message>) -> usize {
        let fresh: Vec<Message> = older
            .into_iter()
            .filter(|m| self.ids.insert(m.id))
            .collect();
        let inserted = fresh.len();
        if inserted > 0 {
            self.messages.splice(0..0, fresh);
        }
        inserted
    }

    /// Replace the content of a message in place and flag it as edited.
    pub fn update(&mut self, id: Uuid, content: Option<String>) -> bool {
        match self.messages.iter_mut().find(|m| m.id == id) {
            Some(message) => {
                message.content = content;
                message.is_edited = true;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: Uuid) -> bool {
        if !self.ids.remove(&id) {
            return false;
        }
        self.messages.retain(|m| m.id != id);
        true
    }

    pub fn get(&self, id: Uuid) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn first_id(&self) -> Option<Uuid> {
        self.messages.first().map(|m| m.id)
    }

    pub fn last_id(&self) -> Option<Uuid> {
        self.messages.last().map(|m| m.id)
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.ids.clear();
    }
}
