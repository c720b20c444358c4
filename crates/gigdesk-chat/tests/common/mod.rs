#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use uuid::Uuid;

use gigdesk_api::error::NOT_OPEN_FOR_ACCEPTANCE;
use gigdesk_api::{ApiError, ChatApi, OrderApi};
use gigdesk_chat::{ConversationSession, SessionContext};
use gigdesk_hub::protocol::RECORD_SEPARATOR;
use gigdesk_hub::{Connector, HubError, Link};
use gigdesk_types::api::{
    AcceptOrderRequest, CreateInvoiceRequest, CreateInvoiceResponse, CreatePaymentRequest,
    CreatePaymentResponse, CreateReviewRequest, PaymentStatusResponse, ProfileResponse,
    SendMessageRequest, UpdateMessageRequest,
};
use gigdesk_types::models::{
    Chat, ChatParticipant, Invoice, InvoiceStatus, Message, Order, OrderStatus, PaymentStatus,
};

pub const CHAT: Uuid = Uuid::from_u128(0x900);
pub const ORDER: Uuid = Uuid::from_u128(0x100);
pub const CLIENT: Uuid = Uuid::from_u128(0x2);
pub const FREELANCER: Uuid = Uuid::from_u128(0x7);

pub fn message(id: u128, sender: Uuid) -> Message {
    Message {
        id: Uuid::from_u128(id),
        chat_id: CHAT,
        sender_id: sender,
        content: Some(format!("message {}", id)),
        attachment_url: None,
        is_voice: false,
        sent_at: Utc.timestamp_opt(1_740_000_000 + id as i64 * 60, 0).unwrap(),
        is_edited: false,
    }
}

/// Page of ids `newest..=oldest`, newest first as the server sends it.
pub fn page(newest: u128, oldest: u128) -> Vec<Message> {
    (oldest..=newest).rev().map(|id| message(id, CLIENT)).collect()
}

pub fn order(status: OrderStatus, invoices: Vec<Invoice>) -> Order {
    Order {
        id: ORDER,
        client_id: CLIENT,
        freelancer_id: None,
        team_id: None,
        title: "Landing page".into(),
        description: "One page, two languages".into(),
        budget: 100.0,
        deadline: None,
        is_anonymous: false,
        is_turbo: false,
        status,
        invoices,
    }
}

pub fn paid_invoice() -> Invoice {
    Invoice {
        id: Uuid::from_u128(0x30),
        amount: 80.0,
        status: InvoiceStatus::Paid,
    }
}

/// In-memory backend. Every call yields once so concurrent calls interleave.
pub struct FakeApi {
    pub role: Mutex<String>,
    pub chat: Mutex<Chat>,
    pub order: Mutex<Order>,
    pub pages: Mutex<HashMap<u32, Vec<Message>>>,
    pub sent: Mutex<Vec<SendMessageRequest>>,
    pub calls: Mutex<Vec<&'static str>>,
    pub payments: Mutex<Vec<CreatePaymentRequest>>,
    pub payment_status: Mutex<Option<PaymentStatus>>,
    pub unauthorized: AtomicBool,
    pub fail_reviews: AtomicBool,
    pub fail_sends: AtomicBool,
    pub sender: Mutex<Uuid>,
    next_id: AtomicU64,
}

impl FakeApi {
    pub fn new(role: &str, order: Order) -> Arc<Self> {
        let sender = if role == "Freelancer" { FREELANCER } else { CLIENT };
        Arc::new(Self {
            role: Mutex::new(role.to_string()),
            chat: Mutex::new(Chat {
                id: CHAT,
                order_id: Some(order.id),
                participants: vec![
                    ChatParticipant {
                        id: CLIENT,
                        name: Some("Client".into()),
                    },
                    ChatParticipant {
                        id: FREELANCER,
                        name: Some("Freelancer".into()),
                    },
                ],
                last_message: None,
                created_at: Utc.timestamp_opt(1_740_000_000, 0).unwrap(),
            }),
            order: Mutex::new(order),
            pages: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            payments: Mutex::new(Vec::new()),
            payment_status: Mutex::new(None),
            unauthorized: AtomicBool::new(false),
            fail_reviews: AtomicBool::new(false),
            fail_sends: AtomicBool::new(false),
            sender: Mutex::new(sender),
            next_id: AtomicU64::new(0x1000),
        })
    }

    pub fn set_page(&self, number: u32, messages: Vec<Message>) {
        self.pages.lock().insert(number, messages);
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.lock().iter().filter(|c| **c == call).count()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent.lock().iter().map(|r| r.content.clone()).collect()
    }

    async fn enter(&self, call: &'static str) -> Result<(), ApiError> {
        self.calls.lock().push(call);
        tokio::task::yield_now().await;
        if self.unauthorized.load(Ordering::SeqCst) {
            return Err(ApiError::Unauthorized);
        }
        Ok(())
    }

    fn set_status(&self, status: OrderStatus) {
        self.order.lock().status = status;
    }
}

#[async_trait]
impl ChatApi for FakeApi {
    async fn profile(&self) -> Result<ProfileResponse, ApiError> {
        self.enter("profile").await?;
        Ok(ProfileResponse {
            id: *self.sender.lock(),
            role: self.role.lock().clone(),
        })
    }

    async fn chat(&self, _chat_id: Uuid) -> Result<Chat, ApiError> {
        self.enter("chat").await?;
        Ok(self.chat.lock().clone())
    }

    async fn messages(&self, _chat_id: Uuid, page: u32, _page_size: u32) -> Result<Vec<Message>, ApiError> {
        self.enter("messages").await?;
        Ok(self.pages.lock().get(&page).cloned().unwrap_or_default())
    }

    async fn send_message(&self, chat_id: Uuid, req: SendMessageRequest) -> Result<Message, ApiError> {
        self.enter("send_message").await?;
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ApiError::Status {
                status: 503,
                message: None,
            });
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let message = Message {
            id: Uuid::from_u128(id as u128),
            chat_id,
            sender_id: *self.sender.lock(),
            content: Some(req.content.clone()),
            attachment_url: req.attachment.as_ref().map(|a| format!("/files/{}", a.file_name)),
            is_voice: req.is_voice,
            sent_at: Utc::now(),
            is_edited: false,
        };
        self.sent.lock().push(req);
        Ok(message)
    }

    async fn update_message(&self, _chat_id: Uuid, _message_id: Uuid, _req: UpdateMessageRequest) -> Result<(), ApiError> {
        self.enter("update_message").await
    }

    async fn delete_message(&self, _chat_id: Uuid, _message_id: Uuid) -> Result<(), ApiError> {
        self.enter("delete_message").await
    }
}

#[async_trait]
impl OrderApi for FakeApi {
    async fn order(&self, _order_id: Uuid) -> Result<Order, ApiError> {
        self.enter("order").await?;
        Ok(self.order.lock().clone())
    }

    async fn accept_order(&self, _order_id: Uuid, req: AcceptOrderRequest) -> Result<(), ApiError> {
        self.enter("accept_order").await?;
        let mut order = self.order.lock();
        if req.accept {
            if order.status != OrderStatus::Open {
                return Err(ApiError::Conflict(NOT_OPEN_FOR_ACCEPTANCE.into()));
            }
            order.status = OrderStatus::InProgress;
            order.freelancer_id = Some(req.freelancer_id);
        } else {
            order.status = OrderStatus::Cancelled;
            order.freelancer_id = None;
        }
        Ok(())
    }

    async fn cancel_order(&self, _order_id: Uuid) -> Result<(), ApiError> {
        self.enter("cancel_order").await?;
        self.set_status(OrderStatus::Cancelled);
        Ok(())
    }

    async fn complete_order(&self, _order_id: Uuid) -> Result<(), ApiError> {
        self.enter("complete_order").await?;
        self.set_status(OrderStatus::CompletedByFreelancer);
        Ok(())
    }

    async fn confirm_order(&self, _order_id: Uuid) -> Result<(), ApiError> {
        self.enter("confirm_order").await?;
        self.set_status(OrderStatus::Completed);
        Ok(())
    }

    async fn create_invoice(&self, _order_id: Uuid, req: CreateInvoiceRequest) -> Result<CreateInvoiceResponse, ApiError> {
        self.enter("create_invoice").await?;
        let id = Uuid::from_u128(self.next_id.fetch_add(1, Ordering::SeqCst) as u128);
        self.order.lock().invoices.push(Invoice {
            id,
            amount: req.amount,
            status: InvoiceStatus::Pending,
        });
        Ok(CreateInvoiceResponse {
            id,
            status: Some(InvoiceStatus::Pending),
        })
    }

    async fn create_payment(&self, req: CreatePaymentRequest) -> Result<CreatePaymentResponse, ApiError> {
        self.enter("create_payment").await?;
        if let Some(invoice) = self.order.lock().invoices.iter_mut().find(|i| i.id == req.invoice_id) {
            invoice.status = InvoiceStatus::Paid;
        }
        self.payments.lock().push(req);
        Ok(CreatePaymentResponse {
            client_secret: Some("pi_secret".into()),
        })
    }

    async fn payment_status(&self, _order_id: Uuid) -> Result<PaymentStatusResponse, ApiError> {
        self.enter("payment_status").await?;
        Ok(PaymentStatusResponse {
            status: *self.payment_status.lock(),
        })
    }

    async fn create_review(&self, _req: CreateReviewRequest) -> Result<(), ApiError> {
        self.enter("create_review").await?;
        if self.fail_reviews.load(Ordering::SeqCst) {
            return Err(ApiError::Status {
                status: 500,
                message: None,
            });
        }
        Ok(())
    }
}

/// Hub side of a fake connection.
pub struct ServerEnd {
    pub to_client: mpsc::UnboundedSender<String>,
    pub from_client: mpsc::UnboundedReceiver<String>,
}

impl ServerEnd {
    pub fn push(&self, target: &str, argument: Value) {
        let mut raw = json!({ "type": 1, "target": target, "arguments": [argument] }).to_string();
        raw.push(RECORD_SEPARATOR);
        let _ = self.to_client.send(raw);
    }

    /// Next invocation the client sent, skipping keepalive pings.
    pub async fn next_invocation(&mut self) -> Value {
        loop {
            let raw = tokio::time::timeout(Duration::from_secs(60), self.from_client.recv())
                .await
                .expect("timed out waiting for client frame")
                .expect("client closed the link");
            let body: Value = serde_json::from_str(raw.trim_end_matches(RECORD_SEPARATOR)).unwrap();
            if body["type"] == 1 {
                return body;
            }
        }
    }
}

pub struct FakeConnector {
    attempts: AtomicUsize,
    servers: mpsc::UnboundedSender<ServerEnd>,
}

impl FakeConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
        let (servers, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                attempts: AtomicUsize::new(0),
                servers,
            }),
            rx,
        )
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self) -> Result<Link, HubError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let (to_client, inbound) = mpsc::unbounded_channel();
        let (outbound, from_client) = mpsc::unbounded_channel();
        let _ = self.servers.send(ServerEnd {
            to_client,
            from_client,
        });
        Ok(Link { outbound, inbound })
    }
}

pub struct Harness {
    pub session: ConversationSession,
    pub api: Arc<FakeApi>,
    pub connector: Arc<FakeConnector>,
    pub servers: mpsc::UnboundedReceiver<ServerEnd>,
}

pub async fn open(api: Arc<FakeApi>) -> Harness {
    let user_id = *api.sender.lock();
    let (connector, servers) = FakeConnector::new();
    let session = ConversationSession::open(SessionContext::new(CHAT, user_id), api.clone(), connector.clone())
        .await
        .expect("session should open");
    Harness {
        session,
        api,
        connector,
        servers,
    }
}
