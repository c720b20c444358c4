use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{InvoiceStatus, PaymentStatus};

// -- Users --

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub id: Uuid,
    pub role: String,
}

// -- Messages --

/// File attached to an outgoing message. Sent as a multipart part.
#[derive(Debug, Clone)]
pub struct AttachmentUpload {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct SendMessageRequest {
    pub content: String,
    pub attachment: Option<AttachmentUpload>,
    pub is_voice: bool,
}

impl SendMessageRequest {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            attachment: None,
            is_voice: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateMessageRequest {
    pub content: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    pub page: u32,
    pub page_size: u32,
}

// -- Orders --

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptOrderRequest {
    pub freelancer_id: Uuid,
    pub accept: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateInvoiceRequest {
    pub amount: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInvoiceResponse {
    pub id: Uuid,
    #[serde(default)]
    pub status: Option<InvoiceStatus>,
}

// -- Payments --

/// Amounts are sent in minor currency units.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    pub order_id: Uuid,
    pub amount: i64,
    pub invoice_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentResponse {
    #[serde(default)]
    pub client_secret: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusResponse {
    #[serde(default)]
    pub status: Option<PaymentStatus>,
}

// -- Reviews --

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReviewRequest {
    pub order_id: Uuid,
    pub rating: u8,
    pub comment: String,
    pub is_anonymous: bool,
}

// -- Errors --

/// Error body returned by the backend alongside non-2xx statuses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
}
