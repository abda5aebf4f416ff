use super::order::OrderSnapshot;
use super::remote::{
    CreatePaymentLinkRequest, CreatePaymentLinkResponse, InitiateTerminalRequest,
    InitiateTerminalResponse, PaymentLink, PollResponse, PosTerminal,
};
use crate::error::{Result, TransportError};
use async_trait::async_trait;
use std::sync::Arc;

/// The remote operations a payment attempt drives.
#[async_trait]
pub trait PaymentTransport: Send + Sync {
    async fn initiate_terminal(
        &self,
        request: &InitiateTerminalRequest,
    ) -> std::result::Result<InitiateTerminalResponse, TransportError>;

    async fn initiate_link(
        &self,
        request: &CreatePaymentLinkRequest,
    ) -> std::result::Result<CreatePaymentLinkResponse, TransportError>;

    async fn poll_status(
        &self,
        transaction_id: &str,
    ) -> std::result::Result<PollResponse, TransportError>;

    /// Best-effort; callers swallow failures.
    async fn cancel_terminal(&self, transaction_id: &str)
    -> std::result::Result<(), TransportError>;
}

/// Terminals available to the company, optionally filtered by location.
#[async_trait]
pub trait TerminalDirectory: Send + Sync {
    async fn list_terminals(
        &self,
        location_id: Option<&str>,
    ) -> std::result::Result<Vec<PosTerminal>, TransportError>;
}

/// Management of payment links after they have been issued.
#[async_trait]
pub trait PaymentLinkAdmin: Send + Sync {
    async fn list_links(&self, order_id: &str)
    -> std::result::Result<Vec<PaymentLink>, TransportError>;
    async fn cancel_link(&self, link_id: &str) -> std::result::Result<(), TransportError>;
    async fn resend_link_email(&self, link_id: &str) -> std::result::Result<(), TransportError>;
}

/// Source of order state; asked to refresh once a payment has landed.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn get(&self, order_id: &str) -> Result<Option<OrderSnapshot>>;
    async fn refresh(&self, order_id: &str) -> Result<()>;
}

pub type PaymentTransportRef = Arc<dyn PaymentTransport>;
pub type OrderStoreRef = Arc<dyn OrderStore>;
pub type PaymentLinkAdminRef = Arc<dyn PaymentLinkAdmin>;
