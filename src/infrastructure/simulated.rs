use crate::domain::ports::{PaymentLinkAdmin, PaymentTransport, TerminalDirectory};
use crate::domain::remote::{
    CreatePaymentLinkRequest, CreatePaymentLinkResponse, InitiateTerminalRequest,
    InitiateTerminalResponse, PaymentLink, PaymentLinkStatus, PollResponse, PosTerminal,
    RemoteStatus,
};
use crate::error::TransportError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use uuid::Uuid;

/// One scripted answer from the poll endpoint.
#[derive(Debug, Clone)]
enum PollStep {
    Status(RemoteStatus),
    Response(PollResponse),
    Error(TransportError),
}

#[derive(Debug, Default)]
struct Script {
    polls: VecDeque<PollStep>,
    last: Option<PollStep>,
    initiate_error: Option<TransportError>,
    link_error: Option<TransportError>,
    cancel_error: Option<TransportError>,
    initiate_latency: Duration,
    poll_latency: Duration,
    terminals: Vec<PosTerminal>,
    links: Vec<PaymentLink>,
    terminal_requests: Vec<InitiateTerminalRequest>,
    link_requests: Vec<CreatePaymentLinkRequest>,
    cancelled_transactions: Vec<String>,
}

#[derive(Debug, Default)]
struct Counters {
    initiate: AtomicUsize,
    link: AtomicUsize,
    poll: AtomicUsize,
    cancel: AtomicUsize,
}

/// An in-process payment backend driven by a script.
///
/// Poll answers are consumed in order; once the script runs out the last
/// answer repeats (or `pending` if nothing was scripted). Cloning shares state,
/// so a test can keep a handle while the orchestrator owns another.
#[derive(Debug, Default, Clone)]
pub struct SimulatedTransport {
    script: Arc<Mutex<Script>>,
    counters: Arc<Counters>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SimulatedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A terminal that reports `processing` `polls` times and then approves a Visa card.
    pub fn approving_after(polls: usize) -> Self {
        let transport = Self::new();
        for _ in 0..polls {
            transport.push_status(RemoteStatus::Processing);
        }
        transport.push_response(PollResponse {
            card_brand: Some("Visa".to_string()),
            card_last_four: Some("4242".to_string()),
            auth_code: Some("A1B2C3".to_string()),
            ..PollResponse::with_status("", RemoteStatus::Completed)
        });
        transport
    }

    pub fn push_status(&self, status: RemoteStatus) {
        lock(&self.script).polls.push_back(PollStep::Status(status));
    }

    /// Queues a full poll response; its `transaction_id` is replaced with the polled one.
    pub fn push_response(&self, response: PollResponse) {
        lock(&self.script).polls.push_back(PollStep::Response(response));
    }

    pub fn push_poll_error(&self, error: TransportError) {
        lock(&self.script).polls.push_back(PollStep::Error(error));
    }

    pub fn fail_initiate(&self, error: TransportError) {
        lock(&self.script).initiate_error = Some(error);
    }

    pub fn fail_link(&self, error: TransportError) {
        lock(&self.script).link_error = Some(error);
    }

    pub fn fail_cancel(&self, error: TransportError) {
        lock(&self.script).cancel_error = Some(error);
    }

    pub fn set_initiate_latency(&self, latency: Duration) {
        lock(&self.script).initiate_latency = latency;
    }

    pub fn set_poll_latency(&self, latency: Duration) {
        lock(&self.script).poll_latency = latency;
    }

    pub fn add_terminal(&self, terminal: PosTerminal) {
        lock(&self.script).terminals.push(terminal);
    }

    pub fn initiate_calls(&self) -> usize {
        self.counters.initiate.load(Ordering::SeqCst)
    }

    pub fn link_calls(&self) -> usize {
        self.counters.link.load(Ordering::SeqCst)
    }

    pub fn poll_calls(&self) -> usize {
        self.counters.poll.load(Ordering::SeqCst)
    }

    pub fn cancel_calls(&self) -> usize {
        self.counters.cancel.load(Ordering::SeqCst)
    }

    pub fn terminal_requests(&self) -> Vec<InitiateTerminalRequest> {
        lock(&self.script).terminal_requests.clone()
    }

    pub fn link_requests(&self) -> Vec<CreatePaymentLinkRequest> {
        lock(&self.script).link_requests.clone()
    }

    pub fn cancelled_transactions(&self) -> Vec<String> {
        lock(&self.script).cancelled_transactions.clone()
    }

    pub fn links(&self) -> Vec<PaymentLink> {
        lock(&self.script).links.clone()
    }

    fn next_poll(&self) -> PollStep {
        let mut script = lock(&self.script);
        match script.polls.pop_front() {
            Some(step) => {
                script.last = Some(step.clone());
                step
            }
            None => script
                .last
                .clone()
                .unwrap_or(PollStep::Status(RemoteStatus::Pending)),
        }
    }
}

#[async_trait]
impl PaymentTransport for SimulatedTransport {
    async fn initiate_terminal(
        &self,
        request: &InitiateTerminalRequest,
    ) -> Result<InitiateTerminalResponse, TransportError> {
        self.counters.initiate.fetch_add(1, Ordering::SeqCst);
        let (latency, error) = {
            let mut script = lock(&self.script);
            script.terminal_requests.push(request.clone());
            (script.initiate_latency, script.initiate_error.clone())
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if let Some(error) = error {
            return Err(error);
        }

        Ok(InitiateTerminalResponse {
            transaction_id: format!("sim_txn_{}", Uuid::new_v4().simple()),
            provider_order_id: None,
            payment_intent_id: None,
            status: Some("pending".to_string()),
        })
    }

    async fn initiate_link(
        &self,
        request: &CreatePaymentLinkRequest,
    ) -> Result<CreatePaymentLinkResponse, TransportError> {
        self.counters.link.fetch_add(1, Ordering::SeqCst);
        let (latency, error) = {
            let mut script = lock(&self.script);
            script.link_requests.push(request.clone());
            (script.initiate_latency, script.link_error.clone())
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if let Some(error) = error {
            return Err(error);
        }

        let mut script = lock(&self.script);
        let id = format!("sim_link_{}", Uuid::new_v4().simple());
        let checkout_url = format!("https://pay.example.test/{id}");
        script.links.push(PaymentLink {
            id: id.clone(),
            provider: Some("simulated".to_string()),
            checkout_url: checkout_url.clone(),
            amount: request.amount,
            currency: Some(request.currency.clone()),
            status: PaymentLinkStatus::Pending,
            created_at: None,
            completed_at: None,
            cancelled_at: None,
            last_email_sent_at: None,
        });

        Ok(CreatePaymentLinkResponse {
            payment_link_id: id,
            checkout_url,
            amount: request.amount,
            currency: Some(request.currency.clone()),
            provider_order_id: None,
            email_sent: Some(request.customer_email.is_some()),
            ticket_message_id: None,
        })
    }

    async fn poll_status(&self, transaction_id: &str) -> Result<PollResponse, TransportError> {
        self.counters.poll.fetch_add(1, Ordering::SeqCst);
        let latency = lock(&self.script).poll_latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        match self.next_poll() {
            PollStep::Status(status) => Ok(PollResponse::with_status(transaction_id, status)),
            PollStep::Response(response) => Ok(PollResponse {
                transaction_id: transaction_id.to_string(),
                ..response
            }),
            PollStep::Error(error) => Err(error),
        }
    }

    async fn cancel_terminal(&self, transaction_id: &str) -> Result<(), TransportError> {
        self.counters.cancel.fetch_add(1, Ordering::SeqCst);
        let mut script = lock(&self.script);
        script.cancelled_transactions.push(transaction_id.to_string());
        match script.cancel_error.clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl TerminalDirectory for SimulatedTransport {
    async fn list_terminals(
        &self,
        _location_id: Option<&str>,
    ) -> Result<Vec<PosTerminal>, TransportError> {
        Ok(lock(&self.script).terminals.clone())
    }
}

#[async_trait]
impl PaymentLinkAdmin for SimulatedTransport {
    async fn list_links(&self, _order_id: &str) -> Result<Vec<PaymentLink>, TransportError> {
        Ok(lock(&self.script).links.clone())
    }

    async fn cancel_link(&self, link_id: &str) -> Result<(), TransportError> {
        let mut script = lock(&self.script);
        let link = script
            .links
            .iter_mut()
            .find(|link| link.id == link_id)
            .ok_or_else(|| TransportError::Status {
                status: 404,
                message: format!("Payment link {link_id} not found"),
            })?;
        if link.status != PaymentLinkStatus::Pending {
            return Err(TransportError::Rejected(format!(
                "Payment link {link_id} is no longer pending"
            )));
        }
        link.status = PaymentLinkStatus::Cancelled;
        Ok(())
    }

    async fn resend_link_email(&self, link_id: &str) -> Result<(), TransportError> {
        let mut script = lock(&self.script);
        let link = script
            .links
            .iter_mut()
            .find(|link| link.id == link_id)
            .ok_or_else(|| TransportError::Status {
                status: 404,
                message: format!("Payment link {link_id} not found"),
            })?;
        link.last_email_sent_at = Some(chrono::Utc::now().to_rfc3339());
        Ok(())
    }
}
