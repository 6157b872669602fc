//! Payment hook dispatchers.
//!
//! - [`NoHook`] approves everything, as when no hook consumer is registered.
//! - [`HttpHook`] posts `{"payment": {...}}` to an external service and
//!   returns its JSON reply. A `204 No Content` reply means the service has no
//!   opinion and is treated like an unregistered hook.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::instrument;
use url::Url;

use invoicer_types::collaborator::{
    HookError, HookReply, InvoicePayment, InvoicePaymentRequest, PaymentHook,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct NoHook;

#[async_trait]
impl PaymentHook for NoHook {
    async fn invoice_payment(&self, _payment: &InvoicePayment) -> Result<HookReply, HookError> {
        Ok(HookReply::Unregistered)
    }
}

/// A payment hook reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpHook {
    url: Url,
    client: Client,
    timeout: Option<Duration>,
}

impl HttpHook {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            client: Client::new(),
            timeout: None,
        }
    }

    /// Sets a timeout for every hook call.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let mut this = self.clone();
        this.timeout = Some(timeout);
        this
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl PaymentHook for HttpHook {
    #[instrument(
        name = "invoice_payment_hook",
        skip_all,
        fields(url = %self.url, label = %payment.label)
    )]
    async fn invoice_payment(&self, payment: &InvoicePayment) -> Result<HookReply, HookError> {
        let body = InvoicePaymentRequest {
            payment: payment.clone(),
        };
        let mut request = self.client.post(self.url.clone()).json(&body);
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }
        let response = request
            .send()
            .await
            .map_err(|e| HookError::Transport(e.to_string()))?;

        match response.status() {
            StatusCode::NO_CONTENT => Ok(HookReply::Unregistered),
            StatusCode::OK => response
                .json::<serde_json::Value>()
                .await
                .map(HookReply::Reply)
                .map_err(|e| HookError::Decode(e.to_string())),
            status => {
                let body = response
                    .text()
                    .await
                    .map_err(|e| HookError::Transport(e.to_string()))?;
                Err(HookError::Status {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }
}
