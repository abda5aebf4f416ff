//! Wire types exchanged with the payment backend.
//!
//! The backend speaks snake_case JSON; amounts are integers in minor units.

use super::money::MinorUnits;
use serde::{Deserialize, Serialize};

/// Status of a terminal transaction as reported by the poll endpoint.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum RemoteStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
    Timeout,
}

impl RemoteStatus {
    pub fn is_terminal(&self) -> bool {
        match self {
            RemoteStatus::Completed
            | RemoteStatus::Failed
            | RemoteStatus::Cancelled
            | RemoteStatus::Timeout => true,
            RemoteStatus::Pending | RemoteStatus::Processing => false,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RemoteStatus::Pending => "Waiting for card...",
            RemoteStatus::Processing => "Processing...",
            RemoteStatus::Completed => "Payment Successful",
            RemoteStatus::Failed => "Payment Failed",
            RemoteStatus::Cancelled => "Payment Cancelled",
            RemoteStatus::Timeout => "Payment Timed Out",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct InitiateTerminalRequest {
    pub order_id: String,
    pub terminal_id: String,
    pub amount: MinorUnits,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_ids: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct InitiateTerminalResponse {
    pub transaction_id: String,
    #[serde(default)]
    pub provider_order_id: Option<String>,
    #[serde(default)]
    pub payment_intent_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct CreatePaymentLinkRequest {
    pub order_id: String,
    pub amount: MinorUnits,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_ids: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct CreatePaymentLinkResponse {
    pub payment_link_id: String,
    pub checkout_url: String,
    pub amount: MinorUnits,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub provider_order_id: Option<String>,
    #[serde(default)]
    pub email_sent: Option<bool>,
    #[serde(default)]
    pub ticket_message_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct PollResponse {
    pub transaction_id: String,
    pub status: RemoteStatus,
    #[serde(default)]
    pub provider_transaction_id: Option<String>,
    #[serde(default)]
    pub card_brand: Option<String>,
    #[serde(default)]
    pub card_last_four: Option<String>,
    #[serde(default)]
    pub auth_code: Option<String>,
    #[serde(default)]
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
}

impl PollResponse {
    /// A bare status response with no receipt fields.
    pub fn with_status(transaction_id: impl Into<String>, status: RemoteStatus) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            status,
            provider_transaction_id: None,
            card_brand: None,
            card_last_four: None,
            auth_code: None,
            failure_reason: None,
            completed_at: None,
        }
    }
}

/// A physical card terminal registered with the backend.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct PosTerminal {
    pub id: String,
    #[serde(default)]
    pub integration_id: Option<String>,
    #[serde(default)]
    pub provider_terminal_id: Option<String>,
    pub display_name: String,
    pub provider: String,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl PosTerminal {
    pub fn is_active(&self) -> bool {
        self.is_active == Some(true)
    }

    pub fn provider_label(&self) -> String {
        match self.provider.as_str() {
            "revolut" => "Revolut".to_string(),
            "square" => "Square".to_string(),
            "sumup" => "SumUp".to_string(),
            "dojo" => "Dojo".to_string(),
            other => {
                let mut chars = other.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => String::new(),
                }
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum PaymentLinkStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
    Expired,
}

/// A previously issued payment link for an order.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct PaymentLink {
    pub id: String,
    #[serde(default)]
    pub provider: Option<String>,
    pub checkout_url: String,
    pub amount: MinorUnits,
    #[serde(default)]
    pub currency: Option<String>,
    pub status: PaymentLinkStatus,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub cancelled_at: Option<String>,
    #[serde(default)]
    pub last_email_sent_at: Option<String>,
}

/// Sum of the amounts of links still awaiting payment.
pub fn pending_link_total(links: &[PaymentLink]) -> MinorUnits {
    links
        .iter()
        .filter(|link| link.status == PaymentLinkStatus::Pending)
        .map(|link| link.amount)
        .sum()
}
