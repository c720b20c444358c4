//! Order lifecycle as seen from inside a conversation.
//!
//! ```text
//! Open ──Accept──▶ InProgress ──Complete──▶ CompletedByFreelancer ──Confirm──▶ Completed
//!  │                │    │                                                      ▲
//!  │                │    └──────────────────────── Confirm ─────────────────────┘
//!  └─Decline/Cancel─┴──▶ Cancelled
//! ```
//!
//! Invoices are issued and paid while the order is InProgress without moving it.
//!
//! Every action is checked locally before the backend is called, persisted
//! through the REST API, applied to the local copy, and finally narrated in
//! the chat with a system message.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use gigdesk_api::{ApiError, ChatApi, MarketApi, OrderApi};
use gigdesk_types::api::{
    AcceptOrderRequest, CreateInvoiceRequest, CreatePaymentRequest, CreateReviewRequest,
    SendMessageRequest,
};
use gigdesk_types::models::{Invoice, InvoiceStatus, Message, Order, OrderStatus, Role};

/// Client-side review attached to a confirmation.
#[derive(Debug, Clone, PartialEq)]
pub struct Review {
    pub rating: u8,
    pub comment: String,
    pub is_anonymous: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderAction {
    Accept,
    Decline,
    Cancel,
    CreateInvoice { amount: f64 },
    PayInvoice,
    Complete,
    Confirm(Review),
}

impl OrderAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Decline => "decline",
            Self::Cancel => "cancel",
            Self::CreateInvoice { .. } => "create invoice",
            Self::PayInvoice => "pay invoice",
            Self::Complete => "complete",
            Self::Confirm(_) => "confirm",
        }
    }

    /// The only role allowed to trigger this action.
    pub fn role(&self) -> Role {
        match self {
            Self::Accept | Self::Decline | Self::CreateInvoice { .. } | Self::Complete => {
                Role::Freelancer
            }
            Self::Cancel | Self::PayInvoice | Self::Confirm(_) => Role::Client,
        }
    }
}

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("{action} is not available to a {role:?}")]
    WrongRole { action: &'static str, role: Role },

    #[error("{action} is not allowed while the order is {status:?}")]
    InvalidState {
        action: &'static str,
        status: OrderStatus,
    },

    #[error("invoice amount {amount} must be greater than 0 and at most the budget {budget}")]
    InvalidAmount { amount: f64, budget: f64 },

    #[error("the order already has a pending invoice")]
    PendingInvoice,

    #[error("the order has no pending invoice")]
    NoPendingInvoice,

    #[error("the order has no paid invoice")]
    Unpaid,

    #[error("rating must be between 1 and 5, got {0}")]
    InvalidRating(u8),

    #[error("another order action is in progress")]
    Busy,

    #[error("the conversation was closed")]
    Closed,

    #[error("order changed on the server: {0}")]
    Conflict(String),

    #[error("request failed: {0}")]
    Api(ApiError),
}

impl From<ApiError> for OrderError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::Conflict(message) => Self::Conflict(message),
            other => Self::Api(other),
        }
    }
}

/// Local precondition check. Runs before any request is made.
pub fn check(order: &Order, role: Role, action: &OrderAction) -> Result<(), OrderError> {
    if action.role() != role {
        return Err(OrderError::WrongRole {
            action: action.name(),
            role,
        });
    }

    let status = order.status;
    let invalid = || OrderError::InvalidState {
        action: action.name(),
        status,
    };

    match action {
        OrderAction::Accept => {
            if status != OrderStatus::Open {
                return Err(invalid());
            }
        }
        OrderAction::Decline | OrderAction::Cancel => {
            if !matches!(status, OrderStatus::Open | OrderStatus::InProgress) {
                return Err(invalid());
            }
        }
        OrderAction::CreateInvoice { amount } => {
            if status != OrderStatus::InProgress {
                return Err(invalid());
            }
            if order.pending_invoice().is_some() {
                return Err(OrderError::PendingInvoice);
            }
            if !amount.is_finite() || *amount <= 0.0 || *amount > order.budget {
                return Err(OrderError::InvalidAmount {
                    amount: *amount,
                    budget: order.budget,
                });
            }
        }
        OrderAction::PayInvoice => {
            if order.pending_invoice().is_none() {
                return Err(OrderError::NoPendingInvoice);
            }
        }
        OrderAction::Complete => {
            if status != OrderStatus::InProgress {
                return Err(invalid());
            }
            if !order.has_paid_invoice() {
                return Err(OrderError::Unpaid);
            }
        }
        OrderAction::Confirm(review) => {
            if !matches!(
                status,
                OrderStatus::InProgress | OrderStatus::CompletedByFreelancer
            ) {
                return Err(invalid());
            }
            if !order.has_paid_invoice() {
                return Err(OrderError::Unpaid);
            }
            if !(1..=5).contains(&review.rating) {
                return Err(OrderError::InvalidRating(review.rating));
            }
        }
    }
    Ok(())
}

/// Chat line narrating a persisted transition. `order` is the state before it.
pub fn system_message(order: &Order, action: &OrderAction) -> String {
    match action {
        OrderAction::Accept => "Фрилансер принял заказ.".to_string(),
        OrderAction::Decline => "Фрилансер отклонил заказ.".to_string(),
        OrderAction::Cancel => "Заказ был отменён.".to_string(),
        OrderAction::CreateInvoice { amount } => format!("Счёт на {}$ выставлен.", amount),
        OrderAction::PayInvoice => {
            let amount = order.pending_invoice().map(|i| i.amount).unwrap_or_default();
            format!("Оплата за заказ ({}$) выполнена.", amount)
        }
        OrderAction::Complete | OrderAction::Confirm(_) => "Заказ завершён.".to_string(),
    }
}

/// What a persisted action changes locally.
#[derive(Debug, Clone, PartialEq)]
enum Effect {
    Status {
        status: OrderStatus,
        freelancer_id: Option<Option<Uuid>>,
    },
    InvoiceIssued(Invoice),
    InvoicePaid(Uuid),
}

fn apply(order: &mut Order, effect: Effect) {
    match effect {
        Effect::Status {
            status,
            freelancer_id,
        } => {
            order.status = status;
            if let Some(freelancer_id) = freelancer_id {
                order.freelancer_id = freelancer_id;
            }
        }
        Effect::InvoiceIssued(invoice) => order.invoices.push(invoice),
        Effect::InvoicePaid(id) => {
            if let Some(invoice) = order.invoices.iter_mut().find(|i| i.id == id) {
                invoice.status = InvoiceStatus::Paid;
            }
        }
    }
}

/// Result of a persisted action.
#[derive(Debug)]
pub struct ActionOutcome {
    pub order: Order,
    /// The narrating message as stored by the backend, if it could be sent.
    pub system_message: Option<Message>,
    /// Set when a confirmation went through but its review was rejected.
    pub review_error: Option<ApiError>,
}

/// Sends at most one system message per action.
struct SystemMessenger<'a> {
    api: &'a dyn MarketApi,
    chat_id: Uuid,
    sent: bool,
}

impl SystemMessenger<'_> {
    async fn send(&mut self, content: String) -> Option<Message> {
        if self.sent {
            return None;
        }
        self.sent = true;
        match self
            .api
            .send_message(self.chat_id, SendMessageRequest::text(content))
            .await
        {
            Ok(message) => Some(message),
            Err(e) => {
                warn!("system message for chat {} failed: {}", self.chat_id, e);
                None
            }
        }
    }
}

/// Owns the local copy of the conversation's order and runs actions on it,
/// one at a time.
pub struct OrderController {
    api: Arc<dyn MarketApi>,
    chat_id: Uuid,
    user_id: Uuid,
    role: Role,
    order: Mutex<Order>,
    busy: AtomicBool,
    closed: AtomicBool,
}

struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl OrderController {
    pub fn new(api: Arc<dyn MarketApi>, chat_id: Uuid, user_id: Uuid, role: Role, order: Order) -> Self {
        Self {
            api,
            chat_id,
            user_id,
            role,
            order: Mutex::new(order),
            busy: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    pub fn order(&self) -> Order {
        self.order.lock().clone()
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Results of actions still in flight are dropped from now on.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Replace the local copy with a fresh server copy.
    pub fn reconcile(&self, order: Order) {
        let mut local = self.order.lock();
        if local.status != order.status {
            info!(
                "order {} reconciled: {:?} -> {:?}",
                order.id, local.status, order.status
            );
        }
        *local = order;
    }

    pub async fn perform(&self, action: OrderAction) -> Result<ActionOutcome, OrderError> {
        let _busy = BusyGuard::acquire(&self.busy).ok_or(OrderError::Busy)?;
        let before = self.order();
        check(&before, self.role, &action)?;

        let mut messenger = SystemMessenger {
            api: self.api.as_ref(),
            chat_id: self.chat_id,
            sent: false,
        };

        let (effect, review_error) = self.persist(&before, &action).await?;
        if self.closed.load(Ordering::Acquire) {
            info!("order {} {} settled after close, dropped", before.id, action.name());
            return Err(OrderError::Closed);
        }
        let order = {
            let mut order = self.order.lock();
            apply(&mut order, effect);
            order.clone()
        };
        info!(
            "order {} {} persisted, status {:?}",
            order.id,
            action.name(),
            order.status
        );

        let system_message = messenger.send(system_message(&before, &action)).await;
        Ok(ActionOutcome {
            order,
            system_message,
            review_error,
        })
    }

    async fn persist(
        &self,
        order: &Order,
        action: &OrderAction,
    ) -> Result<(Effect, Option<ApiError>), OrderError> {
        let status = |status| Effect::Status {
            status,
            freelancer_id: None,
        };

        let effect = match action {
            OrderAction::Accept => {
                let req = AcceptOrderRequest {
                    freelancer_id: self.user_id,
                    accept: true,
                };
                self.api.accept_order(order.id, req).await?;
                Effect::Status {
                    status: OrderStatus::InProgress,
                    freelancer_id: Some(Some(self.user_id)),
                }
            }
            OrderAction::Decline => {
                let req = AcceptOrderRequest {
                    freelancer_id: self.user_id,
                    accept: false,
                };
                self.api.accept_order(order.id, req).await?;
                Effect::Status {
                    status: OrderStatus::Cancelled,
                    freelancer_id: Some(None),
                }
            }
            OrderAction::Cancel => {
                self.api.cancel_order(order.id).await?;
                status(OrderStatus::Cancelled)
            }
            OrderAction::CreateInvoice { amount } => {
                let created = self
                    .api
                    .create_invoice(order.id, CreateInvoiceRequest { amount: *amount })
                    .await?;
                Effect::InvoiceIssued(Invoice {
                    id: created.id,
                    amount: *amount,
                    status: created.status.unwrap_or_default(),
                })
            }
            OrderAction::PayInvoice => {
                let invoice = order.pending_invoice().ok_or(OrderError::NoPendingInvoice)?;
                let req = CreatePaymentRequest {
                    order_id: order.id,
                    amount: (invoice.amount * 100.0).round() as i64,
                    invoice_id: invoice.id,
                };
                self.api.create_payment(req).await?;
                Effect::InvoicePaid(invoice.id)
            }
            OrderAction::Complete => {
                self.api.complete_order(order.id).await?;
                status(OrderStatus::CompletedByFreelancer)
            }
            OrderAction::Confirm(review) => {
                self.api.confirm_order(order.id).await?;
                let req = CreateReviewRequest {
                    order_id: order.id,
                    rating: review.rating,
                    comment: review.comment.clone(),
                    is_anonymous: review.is_anonymous,
                };
                let review_error = match self.api.create_review(req).await {
                    Ok(()) => None,
                    Err(e) => {
                        warn!("review for order {} failed after confirmation: {}", order.id, e);
                        Some(e)
                    }
                };
                return Ok((status(OrderStatus::Completed), review_error));
            }
        };
        Ok((effect, None))
    }
}
