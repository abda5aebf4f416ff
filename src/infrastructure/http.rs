use crate::domain::ports::{PaymentLinkAdmin, PaymentTransport, TerminalDirectory};
use crate::domain::remote::{
    CreatePaymentLinkRequest, CreatePaymentLinkResponse, InitiateTerminalRequest,
    InitiateTerminalResponse, PaymentLink, PollResponse, PosTerminal,
};
use crate::error::TransportError;
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Envelope every backend endpoint wraps its payload in.
#[derive(Debug, serde::Deserialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl<T> ApiResponse<T> {
    fn failure_text(&self) -> String {
        self.error
            .clone()
            .or_else(|| self.message.clone())
            .unwrap_or_else(|| "request was not successful".to_string())
    }
}

/// Talks to the POS payment endpoints of the backend over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, TransportError> {
        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiResponse<Value>>(&body)
                .map(|envelope| envelope.failure_text())
                .unwrap_or(body);
            warn!(status = status.as_u16(), "Backend returned an error: {}", message);
            return Err(TransportError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let envelope: ApiResponse<T> =
            serde_json::from_str(&body).map_err(|e| TransportError::Decode(e.to_string()))?;
        if !envelope.success {
            return Err(TransportError::Rejected(envelope.failure_text()));
        }
        envelope
            .data
            .ok_or_else(|| TransportError::Decode("response has no data".to_string()))
    }

    /// For endpoints whose payload, if any, is ignored.
    async fn send_void(&self, builder: RequestBuilder) -> Result<(), TransportError> {
        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        let envelope = serde_json::from_str::<ApiResponse<Value>>(&body).ok();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                message: envelope.map(|e| e.failure_text()).unwrap_or(body),
            });
        }
        match envelope {
            Some(envelope) if !envelope.success => {
                Err(TransportError::Rejected(envelope.failure_text()))
            }
            _ => Ok(()),
        }
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, TransportError> {
        self.send(self.request(Method::POST, path).json(body)).await
    }
}

#[async_trait]
impl PaymentTransport for HttpTransport {
    #[instrument(
        skip_all,
        fields(order_id = %request.order_id, terminal_id = %request.terminal_id)
    )]
    async fn initiate_terminal(
        &self,
        request: &InitiateTerminalRequest,
    ) -> Result<InitiateTerminalResponse, TransportError> {
        let response: InitiateTerminalResponse =
            self.post("/api/pos/terminal-payments", request).await?;
        debug!(transaction_id = %response.transaction_id, "terminal payment created");
        Ok(response)
    }

    #[instrument(skip_all, fields(order_id = %request.order_id))]
    async fn initiate_link(
        &self,
        request: &CreatePaymentLinkRequest,
    ) -> Result<CreatePaymentLinkResponse, TransportError> {
        let response: CreatePaymentLinkResponse =
            self.post("/api/pos/payment-links", request).await?;
        debug!(payment_link_id = %response.payment_link_id, "payment link created");
        Ok(response)
    }

    async fn poll_status(&self, transaction_id: &str) -> Result<PollResponse, TransportError> {
        let path = format!("/api/pos/terminal-payments/{transaction_id}");
        self.send(self.request(Method::GET, &path)).await
    }

    async fn cancel_terminal(&self, transaction_id: &str) -> Result<(), TransportError> {
        let path = format!("/api/pos/terminal-payments/{transaction_id}/cancel");
        self.send_void(self.request(Method::POST, &path)).await
    }
}

#[async_trait]
impl TerminalDirectory for HttpTransport {
    async fn list_terminals(
        &self,
        location_id: Option<&str>,
    ) -> Result<Vec<PosTerminal>, TransportError> {
        let mut builder = self.request(Method::GET, "/api/pos/terminals");
        if let Some(location_id) = location_id {
            builder = builder.query(&[("location_id", location_id)]);
        }
        self.send(builder).await
    }
}

#[async_trait]
impl PaymentLinkAdmin for HttpTransport {
    async fn list_links(&self, order_id: &str) -> Result<Vec<PaymentLink>, TransportError> {
        let builder = self
            .request(Method::GET, "/api/pos/payment-links")
            .query(&[("order_id", order_id)]);
        self.send(builder).await
    }

    async fn cancel_link(&self, link_id: &str) -> Result<(), TransportError> {
        let path = format!("/api/pos/payment-links/{link_id}/cancel");
        self.send_void(self.request(Method::POST, &path)).await
    }

    async fn resend_link_email(&self, link_id: &str) -> Result<(), TransportError> {
        let path = format!("/api/pos/payment-links/{link_id}/resend-email");
        self.send_void(self.request(Method::POST, &path)).await
    }
}
