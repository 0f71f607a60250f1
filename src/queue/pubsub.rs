use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{MessageQueue, QueueError, QueueMessage};
use crate::gcp::GcpAuth;

const PUBSUB_ENDPOINT: &str = "https://pubsub.googleapis.com/v1";

/// Google Cloud Pub/Sub over its REST API. Lets several consumer processes
/// share one queue. The topic carries the payloads; consumers pull from
/// the subscription.
pub struct PubSubQueue {
    client: Client,
    auth: GcpAuth,
    topic: String,
    subscription: String,
}

#[derive(Serialize)]
struct PublishRequest<'a> {
    messages: Vec<OutgoingMessage<'a>>,
}

#[derive(Serialize)]
struct OutgoingMessage<'a> {
    data: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PullRequest {
    max_messages: usize,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullResponse {
    #[serde(default)]
    received_messages: Vec<ReceivedMessage>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceivedMessage {
    ack_id: String,
    message: PubsubMessage,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PubsubMessage {
    #[serde(default)]
    data: String,
    message_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AcknowledgeRequest<'a> {
    ack_ids: [&'a str; 1],
}

impl PubSubQueue {
    pub async fn new(
        project: &str,
        topic: &str,
        subscription: &str,
        credentials_file: Option<&str>,
    ) -> Result<Self, anyhow::Error> {
        let client = Client::builder().build()?;
        let auth = GcpAuth::new(client.clone(), credentials_file).await?;

        Ok(Self {
            client,
            auth,
            topic: format!("projects/{project}/topics/{topic}"),
            subscription: format!("projects/{project}/subscriptions/{subscription}"),
        })
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        url: String,
        body: &T,
    ) -> Result<reqwest::Response, QueueError> {
        let token = self
            .auth
            .token()
            .await
            .map_err(|e| QueueError::Backend(format!("Pub/Sub auth failed: {e}")))?;

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .json(body)
            .send()
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(QueueError::Backend(format!(
                "Pub/Sub request to {url} failed ({status}): {text}"
            )));
        }

        Ok(resp)
    }
}

#[async_trait]
impl MessageQueue for PubSubQueue {
    async fn put(&self, payload: &str) -> Result<(), QueueError> {
        let data = base64::engine::general_purpose::STANDARD.encode(payload);
        let request = PublishRequest {
            messages: vec![OutgoingMessage { data: &data }],
        };
        self.post(format!("{PUBSUB_ENDPOINT}/{}:publish", self.topic), &request)
            .await?;
        Ok(())
    }

    async fn fetch(&self, max_messages: usize) -> Result<Vec<QueueMessage>, QueueError> {
        let request = PullRequest { max_messages };
        let resp: PullResponse = self
            .post(
                format!("{PUBSUB_ENDPOINT}/{}:pull", self.subscription),
                &request,
            )
            .await?
            .json()
            .await
            .map_err(|e| QueueError::Malformed(e.to_string()))?;

        let mut messages = Vec::with_capacity(resp.received_messages.len());
        for received in resp.received_messages {
            let payload = match base64::engine::general_purpose::STANDARD
                .decode(&received.message.data)
            {
                Ok(raw) => String::from_utf8_lossy(&raw).into_owned(),
                Err(e) => {
                    // Handed on with an empty payload so the consumer deletes it
                    tracing::warn!(
                        message_id = %received.message.message_id,
                        error = %e,
                        "Pub/Sub message data is not base64"
                    );
                    String::new()
                }
            };
            messages.push(QueueMessage {
                id: received.message.message_id,
                receipt: received.ack_id,
                payload,
            });
        }
        Ok(messages)
    }

    async fn delete(&self, message: &QueueMessage) -> Result<(), QueueError> {
        let request = AcknowledgeRequest {
            ack_ids: [message.receipt.as_str()],
        };
        self.post(
            format!("{PUBSUB_ENDPOINT}/{}:acknowledge", self.subscription),
            &request,
        )
        .await?;
        Ok(())
    }
}
