use super::money::MinorUnits;
use super::remote::PollResponse;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use uuid::Uuid;

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMode {
    Terminal,
    Link,
}

/// Card details of a completed terminal payment.
#[derive(Debug, Serialize, PartialEq, Eq, Clone)]
pub struct Receipt {
    pub transaction_id: String,
    pub provider_transaction_id: Option<String>,
    pub card_brand: Option<String>,
    pub card_last_four: Option<String>,
    pub auth_code: Option<String>,
    pub completed_at: Option<String>,
}

impl From<PollResponse> for Receipt {
    fn from(response: PollResponse) -> Self {
        Self {
            transaction_id: response.transaction_id,
            provider_transaction_id: response.provider_transaction_id,
            card_brand: response.card_brand,
            card_last_four: response.card_last_four,
            auth_code: response.auth_code,
            completed_at: response.completed_at,
        }
    }
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone)]
pub struct IssuedLink {
    pub payment_link_id: String,
    pub checkout_url: String,
    pub amount: MinorUnits,
    pub email_sent: bool,
}

/// Final outcome of an attempt. Written once; never changes afterwards.
#[derive(Debug, Serialize, PartialEq, Eq, Clone)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Resolution {
    Succeeded(Receipt),
    Failed { reason: Option<String> },
    Cancelled,
    TimedOut,
    LinkIssued(IssuedLink),
}

impl Resolution {
    /// Maps a terminal poll response onto a resolution.
    ///
    /// Returns `None` for non-terminal statuses.
    pub fn from_poll(response: PollResponse) -> Option<Self> {
        use super::remote::RemoteStatus;

        match response.status {
            RemoteStatus::Completed => Some(Resolution::Succeeded(response.into())),
            RemoteStatus::Failed => Some(Resolution::Failed {
                reason: response.failure_reason,
            }),
            RemoteStatus::Cancelled => Some(Resolution::Cancelled),
            RemoteStatus::Timeout => Some(Resolution::TimedOut),
            RemoteStatus::Pending | RemoteStatus::Processing => None,
        }
    }

    /// Whether the order's balance may have changed and should be refreshed.
    pub fn requires_refresh(&self) -> bool {
        matches!(self, Resolution::Succeeded(_) | Resolution::LinkIssued(_))
    }

    pub fn can_retry(&self) -> bool {
        matches!(
            self,
            Resolution::Failed { .. } | Resolution::Cancelled | Resolution::TimedOut
        )
    }

    /// Caller-facing summary of the outcome.
    pub fn user_message(&self) -> String {
        match self {
            Resolution::Succeeded(receipt) => match (&receipt.card_brand, &receipt.card_last_four)
            {
                (Some(brand), Some(last_four)) => {
                    format!("Payment successful: {brand} ending in {last_four}")
                }
                _ => "Payment successful".to_string(),
            },
            Resolution::Failed { reason } => reason.clone().unwrap_or_else(|| {
                "The payment could not be processed. Please try again.".to_string()
            }),
            Resolution::Cancelled => "The payment was cancelled.".to_string(),
            Resolution::TimedOut => "No response from the terminal. Check the terminal before \
                                     retrying, the card may still have been charged."
                .to_string(),
            Resolution::LinkIssued(link) if link.email_sent => {
                format!("Payment link created and emailed: {}", link.checkout_url)
            }
            Resolution::LinkIssued(link) => format!("Payment link created: {}", link.checkout_url),
        }
    }
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AttemptState {
    Created,
    Initiating,
    Processing,
    Resolved(Resolution),
}

impl AttemptState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AttemptState::Resolved(_))
    }

    pub fn resolution(&self) -> Option<&Resolution> {
        match self {
            AttemptState::Resolved(resolution) => Some(resolution),
            _ => None,
        }
    }
}

/// A state transition published to attempt subscribers.
#[derive(Debug, Serialize, PartialEq, Eq, Clone)]
pub struct AttemptEvent {
    pub attempt_id: Uuid,
    pub state: AttemptState,
}

/// One charge lifecycle, from creation to a single resolution.
#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct PaymentAttempt {
    pub id: Uuid,
    pub order_id: String,
    pub mode: PaymentMode,
    pub amount: MinorUnits,
    pub currency: String,
    pub is_deposit: bool,
    /// Empty means the whole order balance.
    pub device_ids: BTreeSet<String>,
    pub terminal_id: Option<String>,
    pub customer_email: Option<String>,
    pub description: Option<String>,
    pub state: AttemptState,
    remote_transaction_id: Option<String>,
    remote_payment_link_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub deadline_at: Option<DateTime<Utc>>,
}

impl PaymentAttempt {
    pub fn new(
        order_id: impl Into<String>,
        mode: PaymentMode,
        amount: MinorUnits,
        currency: impl Into<String>,
        is_deposit: bool,
        device_ids: BTreeSet<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id: order_id.into(),
            mode,
            amount,
            currency: currency.into(),
            is_deposit,
            device_ids,
            terminal_id: None,
            customer_email: None,
            description: None,
            state: AttemptState::Created,
            remote_transaction_id: None,
            remote_payment_link_id: None,
            started_at: None,
            deadline_at: None,
        }
    }

    pub fn remote_transaction_id(&self) -> Option<&str> {
        self.remote_transaction_id.as_deref()
    }

    pub fn remote_payment_link_id(&self) -> Option<&str> {
        self.remote_payment_link_id.as_deref()
    }

    /// Records the backend transaction id. Returns `false` if one was already set.
    pub fn assign_transaction_id(&mut self, transaction_id: impl Into<String>) -> bool {
        if self.remote_transaction_id.is_some() {
            return false;
        }
        self.remote_transaction_id = Some(transaction_id.into());
        true
    }

    /// Records the backend payment link id. Returns `false` if one was already set.
    pub fn assign_payment_link_id(&mut self, link_id: impl Into<String>) -> bool {
        if self.remote_payment_link_id.is_some() {
            return false;
        }
        self.remote_payment_link_id = Some(link_id.into());
        true
    }

    /// Device ids as sent on the wire: `None` for a whole-order charge.
    pub fn wire_device_ids(&self) -> Option<Vec<String>> {
        if self.device_ids.is_empty() {
            None
        } else {
            Some(self.device_ids.iter().cloned().collect())
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.state.is_terminal()
    }
}
