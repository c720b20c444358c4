use async_trait::async_trait;
use uuid::Uuid;

use gigdesk_types::api::{
    AcceptOrderRequest, CreateInvoiceRequest, CreateInvoiceResponse, CreatePaymentRequest,
    CreatePaymentResponse, CreateReviewRequest, PaymentStatusResponse, ProfileResponse,
    SendMessageRequest, UpdateMessageRequest,
};
use gigdesk_types::models::{Chat, Message, Order};

use crate::error::ApiError;

/// Chat and message endpoints.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// `GET /users/profile`
    async fn profile(&self) -> Result<ProfileResponse, ApiError>;

    /// `GET /chats/{chatId}`
    async fn chat(&self, chat_id: Uuid) -> Result<Chat, ApiError>;

    /// `GET /chats/{chatId}/messages?page&pageSize`, newest first.
    async fn messages(&self, chat_id: Uuid, page: u32, page_size: u32) -> Result<Vec<Message>, ApiError>;

    /// `POST /chats/{chatId}/messages` (multipart)
    async fn send_message(&self, chat_id: Uuid, req: SendMessageRequest) -> Result<Message, ApiError>;

    /// `PUT /chats/{chatId}/messages/{id}`
    async fn update_message(
        &self,
        chat_id: Uuid,
        message_id: Uuid,
        req: UpdateMessageRequest,
    ) -> Result<(), ApiError>;

    /// `DELETE /chats/{chatId}/messages/{id}`
    async fn delete_message(&self, chat_id: Uuid, message_id: Uuid) -> Result<(), ApiError>;
}

/// Order lifecycle, invoice, payment and review endpoints.
#[async_trait]
pub trait OrderApi: Send + Sync {
    /// `GET /orders/{orderId}`
    async fn order(&self, order_id: Uuid) -> Result<Order, ApiError>;

    /// `POST /orders/{id}/accept`, both for accepting and declining.
    async fn accept_order(&self, order_id: Uuid, req: AcceptOrderRequest) -> Result<(), ApiError>;

    /// `PUT /orders/{id}/cancel`
    async fn cancel_order(&self, order_id: Uuid) -> Result<(), ApiError>;

    /// `POST /orders/{id}/complete`, freelancer side.
    async fn complete_order(&self, order_id: Uuid) -> Result<(), ApiError>;

    /// `POST /orders/{id}/confirm`, client side.
    async fn confirm_order(&self, order_id: Uuid) -> Result<(), ApiError>;

    /// `POST /orders/{id}/invoice`
    async fn create_invoice(
        &self,
        order_id: Uuid,
        req: CreateInvoiceRequest,
    ) -> Result<CreateInvoiceResponse, ApiError>;

    /// `POST /payments`
    async fn create_payment(&self, req: CreatePaymentRequest) -> Result<CreatePaymentResponse, ApiError>;

    /// `GET /payments/{orderId}/status`
    async fn payment_status(&self, order_id: Uuid) -> Result<PaymentStatusResponse, ApiError>;

    /// `POST /reviews`
    async fn create_review(&self, req: CreateReviewRequest) -> Result<(), ApiError>;
}

/// Everything a conversation screen talks to.
pub trait MarketApi: ChatApi + OrderApi {}

impl<T: ChatApi + OrderApi> MarketApi for T {}
