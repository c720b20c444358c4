use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use uuid::Uuid;

use gigdesk_types::api::{
    AcceptOrderRequest, CreateInvoiceRequest, CreateInvoiceResponse, CreatePaymentRequest,
    CreatePaymentResponse, CreateReviewRequest, PageQuery, PaymentStatusResponse,
    ProfileResponse, SendMessageRequest, UpdateMessageRequest,
};
use gigdesk_types::models::{Chat, Message, Order};

use crate::client::{ChatApi, OrderApi};
use crate::config::ApiConfig;
use crate::error::ApiError;

/// reqwest-backed implementation of the REST traits.
/// Every request carries the session token as a bearer header.
#[derive(Clone)]
pub struct HttpClient {
    http: Client,
    base_url: String,
    token: String,
}

impl HttpClient {
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send the request and return the raw body of a 2xx response.
    async fn execute(&self, req: RequestBuilder) -> Result<Vec<u8>, ApiError> {
        let resp = req.bearer_auth(&self.token).send().await?;
        let status = resp.status();
        let url = resp.url().path().to_string();
        let body = resp.bytes().await?.to_vec();

        if status.is_success() {
            debug!("{} -> {}", url, status.as_u16());
            Ok(body)
        } else {
            warn!("{} -> {} ({} bytes)", url, status.as_u16(), body.len());
            Err(ApiError::from_response(status.as_u16(), &body))
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ApiError> {
        let body = self.execute(req).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn send_empty(&self, req: RequestBuilder) -> Result<(), ApiError> {
        self.execute(req).await.map(|_| ())
    }
}

#[async_trait]
impl ChatApi for HttpClient {
    async fn profile(&self) -> Result<ProfileResponse, ApiError> {
        self.fetch(self.http.get(self.url("/users/profile"))).await
    }

    async fn chat(&self, chat_id: Uuid) -> Result<Chat, ApiError> {
        self.fetch(self.http.get(self.url(&format!("/chats/{}", chat_id))))
            .await
    }

    async fn messages(&self, chat_id: Uuid, page: u32, page_size: u32) -> Result<Vec<Message>, ApiError> {
        let req = self
            .http
            .get(self.url(&format!("/chats/{}/messages", chat_id)))
            .query(&PageQuery { page, page_size });
        self.fetch(req).await
    }

    async fn send_message(&self, chat_id: Uuid, req: SendMessageRequest) -> Result<Message, ApiError> {
        let mut form = Form::new()
            .text("content", req.content)
            .text("isVoice", req.is_voice.to_string());
        if let Some(file) = req.attachment {
            let part = Part::bytes(file.bytes)
                .file_name(file.file_name)
                .mime_str(&file.mime_type)?;
            form = form.part("attachment", part);
        }

        let req = self
            .http
            .post(self.url(&format!("/chats/{}/messages", chat_id)))
            .multipart(form);
        self.fetch(req).await
    }

    async fn update_message(
        &self,
        chat_id: Uuid,
        message_id: Uuid,
        req: UpdateMessageRequest,
    ) -> Result<(), ApiError> {
        let req = self
            .http
            .put(self.url(&format!("/chats/{}/messages/{}", chat_id, message_id)))
            .json(&req);
        self.send_empty(req).await
    }

    async fn delete_message(&self, chat_id: Uuid, message_id: Uuid) -> Result<(), ApiError> {
        let req = self
            .http
            .delete(self.url(&format!("/chats/{}/messages/{}", chat_id, message_id)));
        self.send_empty(req).await
    }
}

#[async_trait]
impl OrderApi for HttpClient {
    async fn order(&self, order_id: Uuid) -> Result<Order, ApiError> {
        self.fetch(self.http.get(self.url(&format!("/orders/{}", order_id))))
            .await
    }

    async fn accept_order(&self, order_id: Uuid, req: AcceptOrderRequest) -> Result<(), ApiError> {
        let req = self
            .http
            .post(self.url(&format!("/orders/{}/accept", order_id)))
            .json(&req);
        self.send_empty(req).await
    }

    async fn cancel_order(&self, order_id: Uuid) -> Result<(), ApiError> {
        let req = self
            .http
            .put(self.url(&format!("/orders/{}/cancel", order_id)))
            .json(&serde_json::json!({}));
        self.send_empty(req).await
    }

    async fn complete_order(&self, order_id: Uuid) -> Result<(), ApiError> {
        let req = self
            .http
            .post(self.url(&format!("/orders/{}/complete", order_id)));
        self.send_empty(req).await
    }

    async fn confirm_order(&self, order_id: Uuid) -> Result<(), ApiError> {
        let req = self
            .http
            .post(self.url(&format!("/orders/{}/confirm", order_id)))
            .json(&serde_json::json!({}));
        self.send_empty(req).await
    }

    async fn create_invoice(
        &self,
        order_id: Uuid,
        req: CreateInvoiceRequest,
    ) -> Result<CreateInvoiceResponse, ApiError> {
        let req = self
            .http
            .post(self.url(&format!("/orders/{}/invoice", order_id)))
            .json(&req);
        self.fetch(req).await
    }

    async fn create_payment(&self, req: CreatePaymentRequest) -> Result<CreatePaymentResponse, ApiError> {
        let req = self.http.post(self.url("/payments")).json(&req);
        self.fetch(req).await
    }

    async fn payment_status(&self, order_id: Uuid) -> Result<PaymentStatusResponse, ApiError> {
        self.fetch(self.http.get(self.url(&format!("/payments/{}/status", order_id))))
            .await
    }

    async fn create_review(&self, req: CreateReviewRequest) -> Result<(), ApiError> {
        let req = self.http.post(self.url("/reviews")).json(&req);
        self.send_empty(req).await
    }
}
