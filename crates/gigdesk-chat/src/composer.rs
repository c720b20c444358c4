use thiserror::Error;
use uuid::Uuid;

use gigdesk_types::api::{AttachmentUpload, SendMessageRequest, UpdateMessageRequest};
use gigdesk_types::models::Message;

/// Largest accepted attachment: 10 MiB.
pub const MAX_ATTACHMENT_BYTES: usize = 10 * 1024 * 1024;

/// Accepted attachment types: JPG, PNG, PDF, MP3, MP4 and MOV.
pub const ALLOWED_MIME_TYPES: [&str; 6] = [
    "image/jpeg",
    "image/png",
    "application/pdf",
    "audio/mpeg",
    "video/mp4",
    "video/quicktime",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComposeError {
    #[error("message has neither text nor attachment")]
    Empty,

    #[error("unsupported attachment type {0}")]
    UnsupportedType(String),

    #[error("attachment is {0} bytes, limit is 10 MiB")]
    TooLarge(usize),

    #[error("only your own messages can be edited")]
    NotOwnMessage,

    #[error("attachments cannot be changed while editing")]
    AttachmentOnEdit,
}

/// A file picked for the next message. Voice notes come from the recorder
/// and accept any audio container.
#[derive(Debug, Clone)]
pub struct OutgoingAttachment {
    pub upload: AttachmentUpload,
    pub is_voice: bool,
}

impl OutgoingAttachment {
    pub fn file(upload: AttachmentUpload) -> Self {
        Self {
            upload,
            is_voice: false,
        }
    }

    pub fn voice(upload: AttachmentUpload) -> Self {
        Self {
            upload,
            is_voice: true,
        }
    }

    pub fn validate(&self) -> Result<(), ComposeError> {
        let mime = self.upload.mime_type.to_ascii_lowercase();
        let allowed = if self.is_voice {
            mime.starts_with("audio/")
        } else {
            ALLOWED_MIME_TYPES.contains(&mime.as_str())
        };
        if !allowed {
            return Err(ComposeError::UnsupportedType(self.upload.mime_type.clone()));
        }
        if self.upload.bytes.len() > MAX_ATTACHMENT_BYTES {
            return Err(ComposeError::TooLarge(self.upload.bytes.len()));
        }
        Ok(())
    }
}

/// A validated request, ready to be sent.
#[derive(Debug, Clone)]
pub enum Submission {
    Send(SendMessageRequest),
    Edit {
        message_id: Uuid,
        req: UpdateMessageRequest,
    },
}

/// Draft text plus the message being edited, if any.
#[derive(Debug, Default)]
pub struct Composer {
    draft: String,
    editing: Option<Uuid>,
}

impl Composer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn editing(&self) -> Option<Uuid> {
        self.editing
    }

    /// Returns true when the draft is non-empty, i.e. a typing notice is due.
    pub fn set_draft(&mut self, text: impl Into<String>) -> bool {
        self.draft = text.into();
        !self.draft.trim().is_empty()
    }

    pub fn begin_edit(&mut self, message: &Message, local_user: Uuid) -> Result<(), ComposeError> {
        if message.sender_id != local_user {
            return Err(ComposeError::NotOwnMessage);
        }
        self.editing = Some(message.id);
        self.draft = message.text().to_string();
        Ok(())
    }

    pub fn cancel_edit(&mut self) {
        self.editing = None;
        self.draft.clear();
    }

    /// Validate the draft and build the request. Nothing is cleared here;
    /// call [`reset`](Self::reset) once the request succeeded.
    pub fn prepare(&self, attachment: Option<OutgoingAttachment>) -> Result<Submission, ComposeError> {
        let content = self.draft.trim().to_string();

        if let Some(message_id) = self.editing {
            if attachment.is_some() {
                return Err(ComposeError::AttachmentOnEdit);
            }
            if content.is_empty() {
                return Err(ComposeError::Empty);
            }
            return Ok(Submission::Edit {
                message_id,
                req: UpdateMessageRequest { content },
            });
        }

        if let Some(attachment) = &attachment {
            attachment.validate()?;
        } else if content.is_empty() {
            return Err(ComposeError::Empty);
        }

        let is_voice = attachment.as_ref().is_some_and(|a| a.is_voice);
        Ok(Submission::Send(SendMessageRequest {
            content,
            attachment: attachment.map(|a| a.upload),
            is_voice,
        }))
    }

    pub fn reset(&mut self) {
        self.cancel_edit();
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn upload(mime: &str, len: usize) -> AttachmentUpload {
        AttachmentUpload {
            file_name: "file".into(),
            mime_type: mime.into(),
            bytes: vec![0; len],
        }
    }

    fn message(sender: u128) -> Message {
        Message {
            id: Uuid::from_u128(50),
            chat_id: Uuid::from_u128(9),
            sender_id: Uuid::from_u128(sender),
            content: Some("draft me".into()),
            attachment_url: None,
            is_voice: false,
            sent_at: Utc::now(),
            is_edited: false,
        }
    }

    #[test]
    fn test_empty_message_is_rejected() {
        let mut c = Composer::new();
        assert!(!c.set_draft("   "));
        assert_eq!(c.prepare(None).unwrap_err(), ComposeError::Empty);
    }

    #[test]
    fn test_attachment_alone_is_enough() {
        let c = Composer::new();
        let sub = c
            .prepare(Some(OutgoingAttachment::file(upload("image/png", 10))))
            .unwrap();
        match sub {
            Submission::Send(req) => {
                assert!(req.content.is_empty());
                assert!(req.attachment.is_some());
                assert!(!req.is_voice);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_attachment_type_and_size() {
        let c = Composer::new();
        assert!(matches!(
            c.prepare(Some(OutgoingAttachment::file(upload("application/zip", 10)))),
            Err(ComposeError::UnsupportedType(_))
        ));
        assert!(matches!(
            c.prepare(Some(OutgoingAttachment::file(upload("video/mp4", MAX_ATTACHMENT_BYTES + 1)))),
            Err(ComposeError::TooLarge(_))
        ));
        assert!(c
            .prepare(Some(OutgoingAttachment::file(upload("video/mp4", MAX_ATTACHMENT_BYTES))))
            .is_ok());
    }

    #[test]
    fn test_voice_note_accepts_any_audio() {
        let c = Composer::new();
        assert!(c.prepare(Some(OutgoingAttachment::voice(upload("audio/webm", 10)))).is_ok());
        assert!(c.prepare(Some(OutgoingAttachment::file(upload("audio/webm", 10)))).is_err());
        assert!(c.prepare(Some(OutgoingAttachment::voice(upload("image/png", 10)))).is_err());
    }

    #[test]
    fn test_edit_only_own_messages() {
        let mut c = Composer::new();
        assert_eq!(
            c.begin_edit(&message(8), Uuid::from_u128(7)).unwrap_err(),
            ComposeError::NotOwnMessage
        );
        c.begin_edit(&message(7), Uuid::from_u128(7)).unwrap();
        assert_eq!(c.draft(), "draft me");
        assert_eq!(c.editing(), Some(Uuid::from_u128(50)));

        c.set_draft("fixed");
        match c.prepare(None).unwrap() {
            Submission::Edit { message_id, req } => {
                assert_eq!(message_id, Uuid::from_u128(50));
                assert_eq!(req.content, "fixed");
            }
            other => panic!("unexpected {:?}", other),
        }

        c.cancel_edit();
        assert!(c.editing().is_none());
        assert!(c.draft().is_empty());
    }
}
