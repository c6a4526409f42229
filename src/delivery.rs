use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::messaging::MessagingClient;
use crate::recipients::{normalize_address, RecipientStore};

/// Result of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryOutcome {
    pub recipient: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliverySummary {
    pub success: bool,
    pub delivered: usize,
    pub failed: usize,
    pub results: Vec<DeliveryOutcome>,
}

impl From<Vec<DeliveryOutcome>> for DeliverySummary {
    fn from(results: Vec<DeliveryOutcome>) -> Self {
        let delivered = results.iter().filter(|r| r.success).count();
        let failed = results.len() - delivered;
        Self {
            success: failed == 0,
            delivered,
            failed,
            results,
        }
    }
}

/// Sends one message to every configured recipient, one at a time.
pub struct Delivery {
    client: Arc<dyn MessagingClient>,
    store: Arc<RecipientStore>,
    send_delay: Duration,
}

impl Delivery {
    pub fn new(
        client: Arc<dyn MessagingClient>,
        store: Arc<RecipientStore>,
        send_delay: Duration,
    ) -> Self {
        Self {
            client,
            store,
            send_delay,
        }
    }

    /// Deliver `message` to the recipient list as it stands right now.
    ///
    /// Failures are recorded per recipient and never stop the batch. The
    /// caller is expected to have checked readiness first.
    pub async fn send_to_all(&self, message: &str) -> Vec<DeliveryOutcome> {
        let targets = self.store.list();
        let mut results = Vec::with_capacity(targets.len());

        for (i, target) in targets.iter().enumerate() {
            if i > 0 && !self.send_delay.is_zero() {
                tokio::time::sleep(self.send_delay).await;
            }

            let recipient = normalize_address(target);
            match self.client.send_message(&recipient, message).await {
                Ok(receipt) => {
                    info!("Message sent to {} (id {})", recipient, receipt.id);
                    results.push(DeliveryOutcome {
                        recipient,
                        success: true,
                        error: None,
                    });
                }
                Err(e) => {
                    warn!("Failed to send to {}: {}", recipient, e);
                    results.push(DeliveryOutcome {
                        recipient,
                        success: false,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        let delivered = results.iter().filter(|r| r.success).count();
        info!(
            "Message delivery: {} succeeded, {} failed",
            delivered,
            results.len() - delivered
        );
        results
    }

    pub async fn deliver(&self, message: &str) -> DeliverySummary {
        self.send_to_all(message).await.into()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::messaging::{ChatSummary, MessageReceipt, SendError};
    use crate::session::ClientEvent;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use tokio::sync::Mutex;

    /// In-memory client: records every send and fails for listed addresses.
    #[derive(Default)]
    pub(crate) struct FakeClient {
        pub sent: Mutex<Vec<(String, String)>>,
        pub failing: HashSet<String>,
        pub chats: Vec<ChatSummary>,
    }

    impl FakeClient {
        pub fn failing(addresses: &[&str]) -> Self {
            Self {
                failing: addresses.iter().map(|a| a.to_string()).collect(),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl MessagingClient for FakeClient {
        async fn send_message(
            &self,
            address: &str,
            text: &str,
        ) -> Result<MessageReceipt, SendError> {
            let mut sent = self.sent.lock().await;
            sent.push((address.to_string(), text.to_string()));
            if self.failing.contains(address) {
                return Err(SendError::Rejected {
                    status: 400,
                    body: "invalid number".to_string(),
                });
            }
            Ok(MessageReceipt {
                id: format!("msg-{}", sent.len()),
            })
        }

        async fn list_chats(&self) -> Result<Vec<ChatSummary>, SendError> {
            Ok(self.chats.clone())
        }

        async fn connection_state(&self) -> Result<ClientEvent, SendError> {
            Ok(ClientEvent::Ready)
        }
    }

    pub(crate) fn store_with_targets(targets: &str) -> (tempfile::TempDir, Arc<RecipientStore>) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, format!("WHATSAPP_TARGETS={targets}\n")).unwrap();
        let store = Arc::new(RecipientStore::open(path, "WHATSAPP_TARGETS"));
        (dir, store)
    }

    fn delivery(client: Arc<FakeClient>, store: Arc<RecipientStore>) -> Delivery {
        Delivery::new(client, store, Duration::ZERO)
    }

    #[tokio::test]
    async fn test_all_succeed_in_order() {
        let (_dir, store) = store_with_targets("15551234567,some-group@g.us");
        let client = Arc::new(FakeClient::default());
        let summary = delivery(client.clone(), store).deliver("alarm").await;

        assert_eq!(
            summary.results,
            vec![
                DeliveryOutcome {
                    recipient: "15551234567@c.us".to_string(),
                    success: true,
                    error: None
                },
                DeliveryOutcome {
                    recipient: "some-group@g.us".to_string(),
                    success: true,
                    error: None
                },
            ]
        );
        assert_eq!((summary.delivered, summary.failed), (2, 0));
        assert!(summary.success);

        let sent = client.sent.lock().await;
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|(_, text)| text == "alarm"));
    }

    #[tokio::test]
    async fn test_partial_failure_continues() {
        let (_dir, store) = store_with_targets("111,222");
        let client = Arc::new(FakeClient::failing(&["111@c.us"]));
        let summary = delivery(client.clone(), store).deliver("alarm").await;

        assert_eq!(summary.results.len(), 2);
        assert!(!summary.results[0].success);
        assert_eq!(
            summary.results[0].error.as_deref(),
            Some("gateway rejected request (400): invalid number")
        );
        assert_eq!(summary.results[0].recipient, "111@c.us");
        assert!(summary.results[1].success);
        assert_eq!((summary.delivered, summary.failed), (1, 1));
        assert!(!summary.success);
        assert_eq!(client.sent.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn test_n_recipients_k_failures() {
        let (_dir, store) = store_with_targets("1,2,3,4,5,6");
        let client = Arc::new(FakeClient::failing(&["2@c.us", "5@c.us", "6@c.us"]));
        let results = delivery(client, store).send_to_all("m").await;

        let order: Vec<&str> = results.iter().map(|r| r.recipient.as_str()).collect();
        assert_eq!(
            order,
            vec!["1@c.us", "2@c.us", "3@c.us", "4@c.us", "5@c.us", "6@c.us"]
        );
        assert_eq!(results.iter().filter(|r| !r.success).count(), 3);
        assert_eq!(results.iter().filter(|r| r.success).count(), 3);
    }

    #[tokio::test]
    async fn test_empty_list_sends_nothing() {
        let (_dir, store) = store_with_targets("");
        let client = Arc::new(FakeClient::default());
        let d = Delivery::new(client.clone(), store, Duration::from_secs(3600));

        let summary = tokio::time::timeout(Duration::from_secs(1), d.deliver("m"))
            .await
            .unwrap();
        assert!(summary.results.is_empty());
        assert_eq!((summary.delivered, summary.failed), (0, 0));
        assert!(summary.success);
        assert!(client.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_reads_list_fresh_each_call() {
        let (_dir, store) = store_with_targets("1");
        let client = Arc::new(FakeClient::default());
        let d = delivery(client, store.clone());

        assert_eq!(d.send_to_all("m").await.len(), 1);
        store.add("2").unwrap();
        assert_eq!(d.send_to_all("m").await.len(), 2);
    }

    /// Edits the recipient list while the first send is in flight.
    struct EditingClient {
        store: Arc<RecipientStore>,
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MessagingClient for EditingClient {
        async fn send_message(
            &self,
            address: &str,
            _text: &str,
        ) -> Result<MessageReceipt, SendError> {
            let mut sent = self.sent.lock().await;
            if sent.is_empty() {
                self.store.remove("3").unwrap();
                self.store.add("4").unwrap();
            }
            sent.push(address.to_string());
            Ok(MessageReceipt {
                id: format!("msg-{}", sent.len()),
            })
        }

        async fn list_chats(&self) -> Result<Vec<ChatSummary>, SendError> {
            Ok(Vec::new())
        }

        async fn connection_state(&self) -> Result<ClientEvent, SendError> {
            Ok(ClientEvent::Ready)
        }
    }

    #[tokio::test]
    async fn test_mid_batch_edits_do_not_affect_current_call() {
        let (_dir, store) = store_with_targets("1,2,3");
        let client = Arc::new(EditingClient {
            store: store.clone(),
            sent: Mutex::new(Vec::new()),
        });
        let d = Delivery::new(client.clone(), store.clone(), Duration::ZERO);

        let results = d.send_to_all("m").await;
        let recipients: Vec<&str> = results.iter().map(|r| r.recipient.as_str()).collect();
        assert_eq!(recipients, vec!["1@c.us", "2@c.us", "3@c.us"]);
        assert!(results.iter().all(|r| r.success));
        assert_eq!(*client.sent.lock().await, vec!["1@c.us", "2@c.us", "3@c.us"]);

        // The edit is visible to the next call.
        assert_eq!(store.list(), vec!["1", "2", "4"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_between_sends() {
        let (_dir, store) = store_with_targets("1,2,3");
        let client = Arc::new(FakeClient::failing(&["2@c.us"]));
        let d = Delivery::new(client, store, Duration::from_millis(500));

        let started = tokio::time::Instant::now();
        let results = d.send_to_all("m").await;
        assert_eq!(results.len(), 3);
        // Two gaps for three recipients, failures included.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(1000));
        assert!(elapsed < Duration::from_millis(1500));
    }

    #[test]
    fn test_outcome_serialization_omits_missing_error() {
        let ok = serde_json::to_value(DeliveryOutcome {
            recipient: "1@c.us".to_string(),
            success: true,
            error: None,
        })
        .unwrap();
        assert_eq!(ok, serde_json::json!({ "recipient": "1@c.us", "success": true }));
    }
}
