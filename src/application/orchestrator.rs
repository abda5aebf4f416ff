use crate::application::calculator::{ChargeQuote, ChargeSelection, compute_charge};
use crate::application::guard::{OrderLease, SessionGuard};
use crate::application::poll::PollLoop;
use crate::domain::attempt::{
    AttemptEvent, AttemptState, IssuedLink, PaymentAttempt, PaymentMode, Resolution,
};
use crate::domain::order::OrderSnapshot;
use crate::domain::ports::{OrderStoreRef, PaymentLinkAdminRef, PaymentTransportRef};
use crate::domain::remote::{CreatePaymentLinkRequest, InitiateTerminalRequest};
use crate::error::{PaymentError, Result};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_CURRENCY: &str = "GBP";

const EVENT_CHANNEL_CAPACITY: usize = 16;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Settings for a [`PaymentOrchestrator`].
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    pub poll_interval: Duration,
    /// Client-side deadline for a terminal attempt, measured from initiation.
    pub timeout: Duration,
    pub currency: String,
    /// Company setting allowing deposits on repairs that are not yet complete.
    pub deposits_enabled: bool,
    /// Terminal used most recently on this client, if any.
    pub last_terminal_id: Option<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            currency: DEFAULT_CURRENCY.to_string(),
            deposits_enabled: false,
            last_terminal_id: None,
        }
    }
}

impl OrchestratorConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn with_deposits_enabled(mut self, enabled: bool) -> Self {
        self.deposits_enabled = enabled;
        self
    }

    pub fn with_last_terminal(mut self, terminal_id: Option<String>) -> Self {
        self.last_terminal_id = terminal_id;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChargeMode {
    Terminal {
        terminal_id: Option<String>,
    },
    Link {
        customer_email: Option<String>,
        description: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChargeRequest {
    pub mode: ChargeMode,
    pub selection: ChargeSelection,
}

impl ChargeRequest {
    pub fn terminal(terminal_id: impl Into<String>, selection: ChargeSelection) -> Self {
        Self {
            mode: ChargeMode::Terminal {
                terminal_id: Some(terminal_id.into()),
            },
            selection,
        }
    }

    /// A payment link using the order's customer email and default description.
    pub fn link(selection: ChargeSelection) -> Self {
        Self {
            mode: ChargeMode::Link {
                customer_email: None,
                description: None,
            },
            selection,
        }
    }
}

/// Creates payment attempts and hands out [`AttemptHandle`]s to drive them.
///
/// All attempts created by one orchestrator share its [`SessionGuard`], so at
/// most one of them can be in flight per order. Pass the same guard to several
/// orchestrators with [`PaymentOrchestrator::with_guard`] to extend that across them.
pub struct PaymentOrchestrator {
    transport: PaymentTransportRef,
    orders: OrderStoreRef,
    links: Option<PaymentLinkAdminRef>,
    guard: SessionGuard,
    config: OrchestratorConfig,
    last_terminal: Mutex<Option<String>>,
}

impl PaymentOrchestrator {
    pub fn new(
        transport: PaymentTransportRef,
        orders: OrderStoreRef,
        config: OrchestratorConfig,
    ) -> Self {
        let last_terminal = Mutex::new(config.last_terminal_id.clone());
        Self {
            transport,
            orders,
            links: None,
            guard: SessionGuard::new(),
            config,
            last_terminal,
        }
    }

    pub fn with_guard(mut self, guard: SessionGuard) -> Self {
        self.guard = guard;
        self
    }

    /// Lets link attempts cancel a link that was issued after the attempt was cancelled.
    pub fn with_link_admin(mut self, links: PaymentLinkAdminRef) -> Self {
        self.links = Some(links);
        self
    }

    pub fn guard(&self) -> &SessionGuard {
        &self.guard
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// The terminal most recently chosen for a terminal-mode attempt.
    pub fn last_terminal_id(&self) -> Option<String> {
        lock(&self.last_terminal).clone()
    }

    pub fn quote(&self, order: &OrderSnapshot, selection: &ChargeSelection) -> Result<ChargeQuote> {
        compute_charge(order, selection, self.config.deposits_enabled)
    }

    /// Prices the request against `order` and returns an attempt in the `Created` state.
    pub fn create_attempt(
        &self,
        order: &OrderSnapshot,
        request: ChargeRequest,
    ) -> Result<AttemptHandle> {
        let quote = self.quote(order, &request.selection)?;
        if quote.exceeds_balance {
            warn!(
                order_id = %order.id,
                amount = %quote.amount,
                balance = %order.balance_due,
                "Charge exceeds the outstanding balance"
            );
        }

        let mode = match request.mode {
            ChargeMode::Terminal { .. } => PaymentMode::Terminal,
            ChargeMode::Link { .. } => PaymentMode::Link,
        };
        let mut attempt = PaymentAttempt::new(
            order.id.clone(),
            mode,
            quote.amount,
            self.config.currency.clone(),
            quote.is_deposit,
            quote.device_ids,
        );

        match request.mode {
            ChargeMode::Terminal { terminal_id } => {
                attempt.terminal_id = terminal_id.filter(|id| !id.trim().is_empty());
                if let Some(terminal_id) = &attempt.terminal_id {
                    *lock(&self.last_terminal) = Some(terminal_id.clone());
                }
            }
            ChargeMode::Link {
                customer_email,
                description,
            } => {
                attempt.customer_email = customer_email
                    .or_else(|| order.customer_email.clone())
                    .filter(|email| !email.trim().is_empty());
                attempt.description = Some(description.unwrap_or_else(|| order.description()));
            }
        }

        Ok(AttemptHandle::new(
            attempt,
            Arc::clone(&self.transport),
            Arc::clone(&self.orders),
            self.links.clone(),
            self.guard.clone(),
            self.config.poll_interval,
            self.config.timeout,
        ))
    }
}

struct AttemptInner {
    id: Uuid,
    order_id: String,
    attempt: Mutex<PaymentAttempt>,
    lease: Mutex<Option<OrderLease>>,
    transport: PaymentTransportRef,
    orders: OrderStoreRef,
    links: Option<PaymentLinkAdminRef>,
    guard: SessionGuard,
    poll_interval: Duration,
    timeout: Duration,
    /// Fired on resolution; stops the poll loop and deadline timer.
    cancel: CancellationToken,
    state: watch::Sender<AttemptState>,
    events: broadcast::Sender<AttemptEvent>,
}

impl AttemptInner {
    /// Must be called with the attempt lock held so events stay ordered.
    fn publish(&self, state: &AttemptState) {
        self.state.send_replace(state.clone());
        let _ = self.events.send(AttemptEvent {
            attempt_id: self.id,
            state: state.clone(),
        });
    }

    /// Writes the resolution if none exists yet.
    ///
    /// Returns the stored resolution, plus a snapshot of the attempt when this
    /// call was the one that resolved it.
    fn resolve(&self, candidate: Resolution) -> (Resolution, Option<PaymentAttempt>) {
        let (resolution, won, lease) = {
            let mut attempt = lock(&self.attempt);
            if let AttemptState::Resolved(existing) = &attempt.state {
                return (existing.clone(), None);
            }
            attempt.state = AttemptState::Resolved(candidate.clone());
            self.publish(&attempt.state);
            (candidate, attempt.clone(), lock(&self.lease).take())
        };

        self.cancel.cancel();
        drop(lease);
        info!(
            attempt_id = %self.id,
            order_id = %self.order_id,
            outcome = ?resolution,
            "Payment attempt resolved"
        );
        (resolution, Some(won))
    }

    /// Records the transaction id and enters `Processing`.
    ///
    /// Returns `false` if the attempt was resolved while the initiate call was in flight.
    fn begin_processing(&self, transaction_id: &str) -> bool {
        let mut attempt = lock(&self.attempt);
        attempt.assign_transaction_id(transaction_id);
        if attempt.state.is_terminal() {
            return false;
        }
        attempt.state = AttemptState::Processing;
        self.publish(&attempt.state);
        true
    }

    fn record_link(&self, link_id: &str) {
        lock(&self.attempt).assign_payment_link_id(link_id);
    }
}

/// Resolves the attempt as cancelled if the future driving it is dropped early.
struct AbandonGuard {
    inner: Option<Arc<AttemptInner>>,
}

impl AbandonGuard {
    fn disarm(mut self) {
        self.inner = None;
    }
}

impl Drop for AbandonGuard {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take()
            && inner.resolve(Resolution::Cancelled).1.is_some()
        {
            warn!(attempt_id = %inner.id, "Payment attempt abandoned before resolution");
        }
    }
}

fn validate(attempt: &PaymentAttempt) -> Result<()> {
    if !attempt.amount.is_positive() {
        return Err(PaymentError::ValidationError(
            "Amount must be positive".to_string(),
        ));
    }
    if attempt.currency.trim().is_empty() {
        return Err(PaymentError::ValidationError(
            "Currency is required".to_string(),
        ));
    }
    if attempt.mode == PaymentMode::Terminal && attempt.terminal_id.is_none() {
        return Err(PaymentError::ValidationError(
            "No terminal selected".to_string(),
        ));
    }
    Ok(())
}

/// Both clocks' view of the deadline, or `None` if `timeout` overflows either of them.
fn deadline_after(
    timeout: Duration,
    started_at: DateTime<Utc>,
) -> Option<(Instant, DateTime<Utc>)> {
    let deadline = Instant::now().checked_add(timeout)?;
    let deadline_at = chrono::Duration::from_std(timeout)
        .ok()
        .and_then(|timeout| started_at.checked_add_signed(timeout))?;
    Some((deadline, deadline_at))
}

/// Shared handle to a single payment attempt.
///
/// One task drives the attempt with [`initiate`](AttemptHandle::initiate) while
/// others may [`cancel`](AttemptHandle::cancel), [`wait`](AttemptHandle::wait)
/// or [`subscribe`](AttemptHandle::subscribe). The attempt resolves exactly once.
#[derive(Clone)]
pub struct AttemptHandle {
    inner: Arc<AttemptInner>,
}

impl fmt::Debug for AttemptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttemptHandle")
            .field("id", &self.inner.id)
            .field("order_id", &self.inner.order_id)
            .field("state", &self.state())
            .finish()
    }
}

impl AttemptHandle {
    fn new(
        attempt: PaymentAttempt,
        transport: PaymentTransportRef,
        orders: OrderStoreRef,
        links: Option<PaymentLinkAdminRef>,
        guard: SessionGuard,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Self {
        let (state, _) = watch::channel(attempt.state.clone());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(AttemptInner {
                id: attempt.id,
                order_id: attempt.order_id.clone(),
                attempt: Mutex::new(attempt),
                lease: Mutex::new(None),
                transport,
                orders,
                links,
                guard,
                poll_interval,
                timeout,
                cancel: CancellationToken::new(),
                state,
                events,
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn order_id(&self) -> &str {
        &self.inner.order_id
    }

    pub fn snapshot(&self) -> PaymentAttempt {
        lock(&self.inner.attempt).clone()
    }

    pub fn state(&self) -> AttemptState {
        lock(&self.inner.attempt).state.clone()
    }

    /// State transitions from now on, one event per transition.
    pub fn subscribe(&self) -> broadcast::Receiver<AttemptEvent> {
        self.inner.events.subscribe()
    }

    /// Waits until the attempt is resolved, by whichever party resolves it.
    pub async fn wait(&self) -> Resolution {
        let mut states = self.inner.state.subscribe();
        loop {
            let resolved = states.borrow_and_update().resolution().cloned();
            if let Some(resolution) = resolved {
                return resolution;
            }
            if states.changed().await.is_err() {
                // The sender lives in `inner`, which this handle keeps alive.
                return self.inner.resolve(Resolution::Cancelled).0;
            }
        }
    }

    /// Starts the attempt and drives it to its resolution.
    ///
    /// Payment outcomes, including failures, come back as `Ok(Resolution)`.
    /// `Err` means the attempt never started: invalid input, another attempt
    /// in flight for the order (`Busy`), or the attempt was already used.
    #[instrument(skip_all, fields(attempt_id = %self.inner.id, order_id = %self.inner.order_id))]
    pub async fn initiate(&self) -> Result<Resolution> {
        let inner = &self.inner;
        let (attempt, deadline) = {
            let mut attempt = lock(&inner.attempt);
            match &attempt.state {
                AttemptState::Created => {}
                AttemptState::Initiating | AttemptState::Processing => {
                    return Err(PaymentError::Busy {
                        order_id: attempt.order_id.clone(),
                    });
                }
                AttemptState::Resolved(_) => return Err(PaymentError::AlreadyResolved),
            }
            validate(&attempt)?;
            let started_at = Utc::now();
            let (deadline, deadline_at) =
                deadline_after(inner.timeout, started_at).ok_or_else(|| {
                    PaymentError::ValidationError("Timeout is out of range".to_string())
                })?;

            let lease = inner.guard.acquire(&attempt.order_id, attempt.id)?;
            *lock(&inner.lease) = Some(lease);

            attempt.started_at = Some(started_at);
            attempt.deadline_at = Some(deadline_at);
            attempt.state = AttemptState::Initiating;
            inner.publish(&attempt.state);
            (attempt.clone(), deadline)
        };
        let abandon = AbandonGuard {
            inner: Some(Arc::clone(inner)),
        };
        info!(
            mode = ?attempt.mode,
            amount = %attempt.amount,
            is_deposit = attempt.is_deposit,
            "Initiating payment"
        );
        let resolution = match attempt.mode {
            PaymentMode::Terminal => self.drive_terminal(&attempt, deadline).await,
            PaymentMode::Link => self.drive_link(&attempt).await,
        };
        abandon.disarm();

        if resolution.requires_refresh()
            && let Err(e) = inner.orders.refresh(&attempt.order_id).await
        {
            warn!("Order refresh after payment failed: {}", e);
        }

        Ok(resolution)
    }

    /// Cancels the attempt. A no-op once the attempt is resolved.
    ///
    /// The local resolution is always `Cancelled`; the remote cancel sent to the
    /// terminal is best-effort and its failure is only logged.
    #[instrument(skip_all, fields(attempt_id = %self.inner.id, order_id = %self.inner.order_id))]
    pub async fn cancel(&self) -> Resolution {
        let (resolution, won) = self.inner.resolve(Resolution::Cancelled);
        if let Some(attempt) = won
            && attempt.mode == PaymentMode::Terminal
            && let Some(transaction_id) = attempt.remote_transaction_id()
        {
            self.cancel_remote(transaction_id).await;
        }
        resolution
    }

    async fn drive_terminal(&self, attempt: &PaymentAttempt, deadline: Instant) -> Resolution {
        let inner = &self.inner;
        let request = InitiateTerminalRequest {
            order_id: attempt.order_id.clone(),
            terminal_id: attempt.terminal_id.clone().unwrap_or_default(),
            amount: attempt.amount,
            currency: attempt.currency.clone(),
            device_ids: attempt.wire_device_ids(),
        };

        let transaction_id = match inner.transport.initiate_terminal(&request).await {
            Ok(response) => response.transaction_id,
            Err(e) => {
                warn!("Terminal payment initiation failed: {}", e);
                return inner
                    .resolve(Resolution::Failed {
                        reason: Some(e.to_string()),
                    })
                    .0;
            }
        };

        if !inner.begin_processing(&transaction_id) {
            // Cancelled while initiating: the user's cancel had no transaction to target.
            self.cancel_remote(&transaction_id).await;
            return inner.resolve(Resolution::Cancelled).0;
        }
        info!(%transaction_id, "Waiting for card on terminal");

        let poll = PollLoop::new(
            Arc::clone(&inner.transport),
            transaction_id,
            inner.poll_interval,
        );
        let cancel = inner.cancel.clone();
        let candidate = tokio::select! {
            _ = cancel.cancelled() => None,
            response = poll.run(&cancel) => response.and_then(Resolution::from_poll),
            _ = tokio::time::sleep_until(deadline) => {
                warn!("No terminal status before the deadline");
                Some(Resolution::TimedOut)
            }
        };

        inner.resolve(candidate.unwrap_or(Resolution::Cancelled)).0
    }

    async fn drive_link(&self, attempt: &PaymentAttempt) -> Resolution {
        let inner = &self.inner;
        let request = CreatePaymentLinkRequest {
            order_id: attempt.order_id.clone(),
            amount: attempt.amount,
            currency: attempt.currency.clone(),
            customer_email: attempt.customer_email.clone(),
            description: attempt.description.clone(),
            device_ids: attempt.wire_device_ids(),
        };

        match inner.transport.initiate_link(&request).await {
            Ok(response) => {
                inner.record_link(&response.payment_link_id);
                let (resolution, won) = inner.resolve(Resolution::LinkIssued(IssuedLink {
                    payment_link_id: response.payment_link_id.clone(),
                    checkout_url: response.checkout_url,
                    amount: response.amount,
                    email_sent: response.email_sent == Some(true),
                }));
                if won.is_none() {
                    warn!(
                        payment_link_id = %response.payment_link_id,
                        "Payment link issued after the attempt was cancelled"
                    );
                    self.cancel_orphaned_link(&response.payment_link_id).await;
                }
                resolution
            }
            Err(e) => {
                warn!("Payment link creation failed: {}", e);
                inner
                    .resolve(Resolution::Failed {
                        reason: Some(e.to_string()),
                    })
                    .0
            }
        }
    }

    async fn cancel_orphaned_link(&self, link_id: &str) {
        let Some(links) = &self.inner.links else {
            return;
        };
        if let Err(e) = links.cancel_link(link_id).await {
            warn!(payment_link_id = link_id, "Orphaned payment link stays pending: {}", e);
        }
    }

    async fn cancel_remote(&self, transaction_id: &str) {
        if let Err(e) = self.inner.transport.cancel_terminal(transaction_id).await {
            warn!(
                transaction_id,
                "Remote cancel failed, attempt stays cancelled: {}", e
            );
        }
    }
}
