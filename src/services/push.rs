// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Push notification fan-out through the external gateway.
//!
//! Delivery is fire-and-collect: each recipient is attempted once through
//! the gateway's `send` contract, failures are logged and summarized, and
//! nothing here ever blocks or rolls back the state transition that
//! triggered the fan-out.

use crate::error::{AppError, Result};
use crate::models::{notification, NotificationKind};
use futures_util::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const MAX_CONCURRENT_PUSHES: usize = 100;

/// One delivery target: a participant and their (optional) device token.
#[derive(Debug, Clone)]
pub struct PushRecipient {
    pub user_id: String,
    pub push_token: Option<String>,
}

/// Result of one notification fan-out.
///
/// Provides detailed information about which recipients were reached and
/// which failed, allowing callers to log partial failures appropriately.
#[derive(Debug, Clone, Default)]
pub struct DispatchSummary {
    /// Number of notifications delivered to the gateway.
    pub sent: u32,
    /// Number of recipients that failed (gateway error or missing token).
    pub failed: u32,
    /// User IDs that were not reached.
    pub failed_recipients: Vec<String>,
}

impl DispatchSummary {
    /// Returns true if every recipient was reached.
    pub fn is_complete_success(&self) -> bool {
        self.failed == 0
    }

    /// Returns true if no recipient was reached.
    pub fn is_complete_failure(&self) -> bool {
        self.sent == 0 && self.failed > 0
    }

    /// Returns true if some recipients were reached and some failed.
    pub fn is_partial_failure(&self) -> bool {
        self.sent > 0 && self.failed > 0
    }
}

/// Wire payload for the gateway's `send` contract.
#[derive(Debug, Serialize)]
struct PushPayload<'a> {
    to: &'a str,
    title: &'a str,
    body: &'a str,
    data: PushData<'a>,
}

/// Data attached to every push so the client can deep-link.
#[derive(Debug, Serialize)]
struct PushData<'a> {
    kind: &'a str,
    plan_id: &'a str,
}

/// Gateway response: `{status: ok|error}`.
#[derive(Debug, Deserialize)]
struct GatewayResponse {
    status: String,
}

/// Push gateway client wrapper.
pub struct PushService {
    client: reqwest::Client,
    /// Empty disables delivery; every attempt then fails (offline mode).
    gateway_url: String,
    /// Mock: device tokens that should fail delivery (test builds only).
    #[cfg(test)]
    mock_fail_tokens: std::sync::Mutex<std::collections::HashSet<String>>,
}

impl PushService {
    pub fn new(gateway_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            gateway_url: gateway_url.to_string(),
            #[cfg(test)]
            mock_fail_tokens: std::sync::Mutex::new(std::collections::HashSet::new()),
        }
    }

    /// Set device tokens that should fail delivery (test builds only).
    ///
    /// This allows testing partial failure scenarios in fan-out operations.
    #[cfg(test)]
    pub fn set_mock_fail_tokens(&self, tokens: impl IntoIterator<Item = String>) {
        let mut guard = self.mock_fail_tokens.lock().unwrap();
        guard.clear();
        guard.extend(tokens);
    }

    /// Deliver one message to one device through the gateway.
    async fn send_one(
        &self,
        token: &str,
        kind: NotificationKind,
        plan_id: &str,
        message: &notification::PushMessage,
    ) -> Result<()> {
        if self.gateway_url.is_empty() {
            return Err(AppError::PushGateway(
                "Push gateway not configured".to_string(),
            ));
        }

        let payload = PushPayload {
            to: token,
            title: &message.title,
            body: &message.body,
            data: PushData {
                kind: kind.as_str(),
                plan_id,
            },
        };

        let response = self
            .client
            .post(&self.gateway_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::PushGateway(e.to_string()))?;

        let body: GatewayResponse = response
            .json()
            .await
            .map_err(|e| AppError::PushGateway(format!("Malformed gateway response: {}", e)))?;

        if body.status != "ok" {
            return Err(AppError::PushGateway(format!(
                "Gateway rejected push: {}",
                body.status
            )));
        }

        Ok(())
    }

    /// Fan out one notification kind to a set of recipients.
    ///
    /// Recipients without a device token count as failed with no delivery
    /// attempt. Failures are never retried.
    pub async fn notify(
        &self,
        kind: NotificationKind,
        plan_id: &str,
        group_name: &str,
        recipients: &[PushRecipient],
    ) -> DispatchSummary {
        let count = recipients.len();
        let message = notification::compose(kind, group_name);
        let sent = Arc::new(AtomicU64::new(0));
        let failed_recipients = Arc::new(tokio::sync::Mutex::new(Vec::new()));

        stream::iter(recipients.to_vec())
            .for_each_concurrent(MAX_CONCURRENT_PUSHES, |recipient| {
                let sent = Arc::clone(&sent);
                let failed_recipients = Arc::clone(&failed_recipients);
                let message = &message;
                async move {
                    let Some(token) = recipient.push_token.as_deref() else {
                        tracing::debug!(
                            user_id = %recipient.user_id,
                            "Recipient has no push token, skipping delivery"
                        );
                        failed_recipients.lock().await.push(recipient.user_id);
                        return;
                    };

                    // Check for mock failures in test builds
                    #[cfg(test)]
                    {
                        let should_fail = self.mock_fail_tokens.lock().unwrap().contains(token);
                        if should_fail {
                            tracing::warn!(user_id = %recipient.user_id, "Mock push failure");
                            failed_recipients.lock().await.push(recipient.user_id);
                            return;
                        }
                    }

                    match self.send_one(token, kind, plan_id, message).await {
                        Ok(()) => {
                            sent.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            tracing::warn!(
                                user_id = %recipient.user_id,
                                error = ?e,
                                "Failed to deliver push notification"
                            );
                            failed_recipients.lock().await.push(recipient.user_id);
                        }
                    }
                }
            })
            .await;

        let sent = sent.load(Ordering::Relaxed) as u32;
        let failed_recipients = Arc::try_unwrap(failed_recipients)
            .expect("All sends completed, should have sole ownership")
            .into_inner();
        let failed = failed_recipients.len() as u32;

        tracing::info!(
            plan_id,
            kind = kind.as_str(),
            requested = count,
            sent,
            failed,
            "Notification fan-out complete"
        );

        DispatchSummary {
            sent,
            failed,
            failed_recipients,
        }
    }
}
