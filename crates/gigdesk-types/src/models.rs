use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// -- Messages --

/// A chat message as delivered by the REST history endpoint and the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub sender_id: Uuid,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub attachment_url: Option<String>,
    #[serde(default)]
    pub is_voice: bool,
    pub sent_at: DateTime<Utc>,
    #[serde(default)]
    pub is_edited: bool,
}

impl Message {
    /// Attachment reference with its media kind inferred from the URL.
    pub fn attachment(&self) -> Option<Attachment> {
        let url = self.attachment_url.as_deref().filter(|u| !u.is_empty())?;
        Some(Attachment {
            url: url.to_string(),
            kind: MediaKind::infer(url, self.is_voice),
        })
    }

    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub url: String,
    pub kind: MediaKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Audio,
    Video,
    Pdf,
    Other,
}

impl MediaKind {
    /// Infer the media kind from the attachment URL extension.
    /// Voice notes are audio whatever their container extension, unless the
    /// file is an image.
    pub fn infer(url: &str, is_voice: bool) -> Self {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let file_name = path.rsplit('/').next().unwrap_or(path);
        let extension = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "jpg" | "jpeg" | "png" => Self::Image,
            "mp3" => Self::Audio,
            _ if is_voice => Self::Audio,
            "mp4" | "mov" => Self::Video,
            "pdf" => Self::Pdf,
            _ => Self::Other,
        }
    }
}

// -- Chats --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatParticipant {
    pub id: Uuid,
    #[serde(default)]
    pub name: Option<String>,
}

/// A conversation. Every chat in this domain is bound to one order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: Uuid,
    #[serde(default)]
    pub order_id: Option<Uuid>,
    #[serde(default)]
    pub participants: Vec<ChatParticipant>,
    #[serde(default)]
    pub last_message: Option<Message>,
    pub created_at: DateTime<Utc>,
}

impl Chat {
    /// Timestamp used to order chat lists: the last message, else creation time.
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_message
            .as_ref()
            .map(|m| m.sent_at)
            .unwrap_or(self.created_at)
    }
}

// -- Orders --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Open,
    InProgress,
    CompletedByFreelancer,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InvoiceStatus {
    #[default]
    Pending,
    Paid,
}

/// Payment state of an order as shown to participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: Uuid,
    pub amount: f64,
    #[serde(default)]
    pub status: InvoiceStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub client_id: Uuid,
    #[serde(default)]
    pub freelancer_id: Option<Uuid>,
    #[serde(default)]
    pub team_id: Option<Uuid>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub budget: f64,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_anonymous: bool,
    #[serde(default)]
    pub is_turbo: bool,
    pub status: OrderStatus,
    #[serde(default)]
    pub invoices: Vec<Invoice>,
}

impl Order {
    /// The invoice currently driving payment: the most recently issued one.
    pub fn active_invoice(&self) -> Option<&Invoice> {
        self.invoices.last()
    }

    pub fn pending_invoice(&self) -> Option<&Invoice> {
        self.invoices
            .iter()
            .find(|i| i.status == InvoiceStatus::Pending)
    }

    pub fn has_paid_invoice(&self) -> bool {
        self.invoices.iter().any(|i| i.status == InvoiceStatus::Paid)
    }

    pub fn payment_status(&self) -> PaymentStatus {
        match self.active_invoice().map(|i| i.status) {
            Some(InvoiceStatus::Paid) => PaymentStatus::Paid,
            _ => PaymentStatus::Pending,
        }
    }
}

// -- Users --

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Freelancer,
}

impl Role {
    /// Profiles report the role as free text; anything but "freelancer" acts as a client.
    pub fn from_profile(role: &str) -> Self {
        if role.eq_ignore_ascii_case("freelancer") {
            Self::Freelancer
        } else {
            Self::Client
        }
    }
}
