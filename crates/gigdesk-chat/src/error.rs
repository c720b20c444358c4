use thiserror::Error;

use gigdesk_api::ApiError;
use gigdesk_api::error::NOT_OPEN_FOR_ACCEPTANCE;

use crate::composer::{ComposeError, MAX_ATTACHMENT_BYTES};
use crate::order::{OrderAction, OrderError};

/// A failure surfaced to the user. `Display` is the text shown in the UI.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Сессия истекла, войдите снова")]
    Unauthorized,

    #[error("Этот чат не привязан к заказу")]
    ChatWithoutOrder,

    /// Rejected locally, nothing was sent.
    #[error("{0}")]
    Invalid(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{message}")]
    Request { message: String, retryable: bool },

    #[error("{0}")]
    Connection(String),

    /// The conversation was closed before the request settled.
    #[error("Чат закрыт")]
    Closed,
}

impl SessionError {
    /// Map a REST failure, falling back to `fallback` when the server gave no
    /// message of its own.
    pub fn from_api(err: &ApiError, fallback: &str) -> Self {
        match err {
            ApiError::Unauthorized => Self::Unauthorized,
            ApiError::Conflict(message) => Self::Conflict(message.clone()),
            other => Self::Request {
                message: other
                    .server_message()
                    .unwrap_or(fallback)
                    .to_string(),
                retryable: other.is_retryable(),
            },
        }
    }

    pub fn from_order(action: &OrderAction, err: &OrderError) -> Self {
        let invalid = |text: &str| Self::Invalid(text.to_string());
        match err {
            OrderError::WrongRole { .. } => invalid("Действие недоступно для вашей роли"),
            OrderError::InvalidState { .. } => invalid("Действие недоступно в текущем статусе заказа"),
            OrderError::InvalidAmount { budget, .. } => Self::Invalid(format!(
                "Сумма счёта должна быть больше 0 и не больше бюджета ({}$)",
                budget
            )),
            OrderError::PendingInvoice => invalid("По заказу уже есть неоплаченный счёт"),
            OrderError::NoPendingInvoice => invalid("Нет счёта для оплаты"),
            OrderError::Unpaid => invalid("Заказ ещё не оплачен"),
            OrderError::InvalidRating(_) => invalid("Оценка должна быть от 1 до 5"),
            OrderError::Busy => invalid("Действие уже выполняется"),
            OrderError::Closed => Self::Closed,
            OrderError::Conflict(message) if message == NOT_OPEN_FOR_ACCEPTANCE => Self::Conflict(
                "Заказ не открыт для принятия. Пожалуйста, уточните у клиента.".to_string(),
            ),
            OrderError::Conflict(message) => Self::Conflict(message.clone()),
            OrderError::Api(e) => Self::from_api(e, failure_text(action)),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Request { retryable, .. } => *retryable,
            Self::Connection(_) => true,
            _ => false,
        }
    }
}

impl From<ComposeError> for SessionError {
    fn from(e: ComposeError) -> Self {
        let text = match e {
            ComposeError::Empty => "Введите сообщение или прикрепите файл".to_string(),
            ComposeError::UnsupportedType(_) => {
                "Недопустимый тип файла. Поддерживаются: JPG, PNG, PDF, MP3, MP4, MOV".to_string()
            }
            ComposeError::TooLarge(_) => format!(
                "Файл превышает лимит в {} МБ",
                MAX_ATTACHMENT_BYTES / (1024 * 1024)
            ),
            ComposeError::NotOwnMessage => "Можно редактировать только свои сообщения".to_string(),
            ComposeError::AttachmentOnEdit => "При редактировании нельзя менять вложение".to_string(),
        };
        Self::Invalid(text)
    }
}

/// Generic failure text per order action.
pub fn failure_text(action: &OrderAction) -> &'static str {
    match action {
        OrderAction::Accept => "Ошибка при принятии заказа",
        OrderAction::Decline => "Ошибка при отклонении заказа",
        OrderAction::Cancel => "Ошибка при отмене заказа",
        OrderAction::CreateInvoice { .. } => "Ошибка при выставлении счёта",
        OrderAction::PayInvoice => "Ошибка при создании платежа",
        OrderAction::Complete | OrderAction::Confirm(_) => "Ошибка при завершении заказа",
    }
}
