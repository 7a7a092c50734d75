use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use uuid::Uuid;

use super::{Notification, Notifier, OutboundError, TrackingClient};

fn client(timeout: Duration) -> Result<Client, OutboundError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| OutboundError::Request(e.to_string()))
}

async fn post(client: &Client, url: &str, body: serde_json::Value) -> Result<(), OutboundError> {
    let response = client
        .post(url)
        .json(&body)
        .send()
        .await
        .map_err(|e| OutboundError::Request(e.to_string()))?;

    if !response.status().is_success() {
        return Err(OutboundError::Status(response.status().as_u16()));
    }
    Ok(())
}

/// Pushes notifications to `POST {base}/notify/event`.
pub struct HttpNotifier {
    client: Client,
    url: String,
}

impl HttpNotifier {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, OutboundError> {
        Ok(Self {
            client: client(timeout)?,
            url: format!("{}/notify/event", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), OutboundError> {
        let body = serde_json::to_value(notification)
            .map_err(|e| OutboundError::Request(e.to_string()))?;
        post(&self.client, &self.url, body).await
    }
}

/// Opens tracking sessions with `POST {base}/tracking/start`.
pub struct HttpTrackingClient {
    client: Client,
    url: String,
}

impl HttpTrackingClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, OutboundError> {
        Ok(Self {
            client: client(timeout)?,
            url: format!("{}/tracking/start", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl TrackingClient for HttpTrackingClient {
    async fn open_session(&self, order_id: Uuid, courier_id: Uuid) -> Result<(), OutboundError> {
        let body = json!({ "order_id": order_id, "courier_id": courier_id });
        post(&self.client, &self.url, body).await
    }
}
