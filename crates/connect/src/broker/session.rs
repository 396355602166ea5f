//! Saved broker credentials and the login handshake.

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};

use super::models::ConnectChallenge;
use super::traits::{BrokerClient, BrokerSessionServiceTrait};
use patrimoine_core::brokers::{BrokerLink, BrokerLinkRepositoryTrait, BrokerLinkView, NewBrokerLink};
use patrimoine_core::errors::{Error, Result, ValidationError};
use patrimoine_core::secrets::SecretCipher;

/// Name under which links to the broker are stored.
pub const BROKER_NAME: &str = "Trade Republic";

pub struct BrokerSessionService {
    links: Arc<dyn BrokerLinkRepositoryTrait>,
    client: Arc<dyn BrokerClient>,
    /// Absent when no encryption key is configured; PINs are then never stored.
    cipher: Option<Arc<dyn SecretCipher>>,
}

impl BrokerSessionService {
    pub fn new(
        links: Arc<dyn BrokerLinkRepositoryTrait>,
        client: Arc<dyn BrokerClient>,
        cipher: Option<Arc<dyn SecretCipher>>,
    ) -> Self {
        Self {
            links,
            client,
            cipher,
        }
    }

    fn cipher(&self) -> Result<&dyn SecretCipher> {
        self.cipher
            .as_deref()
            .ok_or_else(|| Error::Secret("No secret key configured".to_string()))
    }

    /// Saved PIN in clear, or `None` when there is none or it cannot be read.
    fn saved_pin(&self, link: &BrokerLink) -> Option<String> {
        let token = link.pin_enc.as_deref()?;
        let cipher = self.cipher.as_deref()?;
        match cipher.decrypt(token) {
            Ok(pin) => Some(pin),
            Err(e) => {
                warn!(
                    "Saved PIN of user {} could not be decrypted, asking for it again: {}",
                    link.user_id, e
                );
                None
            }
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[async_trait]
impl BrokerSessionServiceTrait for BrokerSessionService {
    fn get_link(&self, user_id: i64) -> Result<Option<BrokerLinkView>> {
        Ok(self
            .links
            .get_link(user_id, BROKER_NAME)?
            .as_ref()
            .map(BrokerLinkView::from))
    }

    async fn save_link(
        &self,
        user_id: i64,
        phone: String,
        pin: Option<String>,
        remember_pin: bool,
    ) -> Result<BrokerLinkView> {
        let phone = non_blank(Some(phone))
            .ok_or_else(|| ValidationError::MissingField("phone".to_string()))?;
        let pin = non_blank(pin);

        let (pin_enc, remember_pin) = match (remember_pin, pin) {
            (true, Some(pin)) => (Some(self.cipher()?.encrypt(&pin)?), true),
            // Remembering without a new PIN keeps the one already saved.
            (true, None) => {
                let existing = self.links.get_link(user_id, BROKER_NAME)?;
                match existing.and_then(|l| l.pin_enc) {
                    Some(token) => (Some(token), true),
                    None => (None, false),
                }
            }
            (false, _) => (None, false),
        };

        let link = self
            .links
            .upsert_link(NewBrokerLink {
                user_id,
                broker: BROKER_NAME.to_string(),
                phone,
                pin_enc,
                remember_pin,
            })
            .await?;
        debug!("Saved broker link for user {}", user_id);
        Ok(BrokerLinkView::from(&link))
    }

    async fn delete_link(&self, user_id: i64) -> Result<bool> {
        self.links.delete_link(user_id, BROKER_NAME).await
    }

    async fn connect(
        &self,
        user_id: i64,
        phone: Option<String>,
        pin: Option<String>,
    ) -> Result<ConnectChallenge> {
        let mut phone = non_blank(phone);
        let mut pin = non_blank(pin);

        if phone.is_none() || pin.is_none() {
            let link = self.links.get_link(user_id, BROKER_NAME)?;
            match link {
                Some(link) => {
                    if pin.is_none() {
                        pin = self.saved_pin(&link);
                    }
                    phone.get_or_insert(link.phone);
                }
                None if phone.is_none() => {
                    return Err(Error::invalid("No saved phone, send phone and PIN"));
                }
                None => {}
            }
        }

        let (Some(phone), Some(pin)) = (phone, pin) else {
            return Err(Error::invalid("phone and PIN required"));
        };
        self.client.connect(&phone, &pin).await
    }

    async fn validate_2fa(&self, process_id: &str, code: &str) -> Result<String> {
        if process_id.trim().is_empty() || code.trim().is_empty() {
            return Err(Error::invalid("processId and code required"));
        }
        self.client.validate_2fa(process_id.trim(), code.trim()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::models::BrokerPayload;
    use patrimoine_core::errors::ExternalError;
    use patrimoine_core::testing::{InMemoryBrokerLinkRepository, ReversingCipher};
    use std::sync::Mutex;

    /// Records the credentials it was called with.
    #[derive(Default)]
    struct RecordingClient {
        calls: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl BrokerClient for RecordingClient {
        async fn connect(&self, phone: &str, pin: &str) -> Result<ConnectChallenge> {
            self.calls
                .lock()
                .unwrap()
                .push((phone.to_string(), pin.to_string()));
            Ok(ConnectChallenge {
                process_id: "proc-1".to_string(),
                countdown_seconds: 30,
            })
        }

        async fn validate_2fa(&self, process_id: &str, code: &str) -> Result<String> {
            Ok(format!("session-{}-{}", process_id, code))
        }

        async fn fetch(&self, _session_token: &str) -> Result<BrokerPayload> {
            Err(ExternalError::BrokerUnavailable("offline".to_string()).into())
        }
    }

    fn service(
        links: Arc<InMemoryBrokerLinkRepository>,
        client: Arc<RecordingClient>,
    ) -> BrokerSessionService {
        BrokerSessionService::new(links, client, Some(Arc::new(ReversingCipher)))
    }

    #[tokio::test]
    async fn connect_uses_saved_phone_and_pin() {
        let links = Arc::new(InMemoryBrokerLinkRepository::new());
        let client = Arc::new(RecordingClient::default());
        let svc = service(links.clone(), client.clone());

        let view = svc
            .save_link(1, "+33612345678".to_string(), Some("1234".to_string()), true)
            .await
            .unwrap();
        assert_eq!(view.phone_masked, "+336******78");
        assert!(view.has_pin);

        let stored = links.get_link(1, BROKER_NAME).unwrap().unwrap();
        assert_ne!(stored.pin_enc.as_deref(), Some("1234"));

        let challenge = svc.connect(1, None, None).await.unwrap();
        assert_eq!(challenge.process_id, "proc-1");
        assert_eq!(
            client.calls.lock().unwrap().as_slice(),
            &[("+33612345678".to_string(), "1234".to_string())]
        );
    }

    #[tokio::test]
    async fn undecryptable_pin_counts_as_missing() {
        let links = Arc::new(InMemoryBrokerLinkRepository::new());
        let client = Arc::new(RecordingClient::default());
        links
            .upsert_link(NewBrokerLink {
                user_id: 1,
                broker: BROKER_NAME.to_string(),
                phone: "+33612345678".to_string(),
                pin_enc: Some("garbage".to_string()),
                remember_pin: true,
            })
            .await
            .unwrap();
        let svc = service(links, client.clone());

        let err = svc.connect(1, None, None).await.unwrap_err();
        assert!(err.is_validation());

        svc.connect(1, None, Some("9999".to_string())).await.unwrap();
        assert_eq!(client.calls.lock().unwrap()[0].1, "9999");
    }

    #[tokio::test]
    async fn connect_without_link_needs_phone() {
        let svc = service(
            Arc::new(InMemoryBrokerLinkRepository::new()),
            Arc::new(RecordingClient::default()),
        );
        assert!(svc.connect(1, None, Some("1234".to_string())).await.unwrap_err().is_validation());
        svc.connect(1, Some("+33600000000".to_string()), Some("1234".to_string()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn forgetting_the_pin_clears_it_and_remembering_without_pin_keeps_it() {
        let links = Arc::new(InMemoryBrokerLinkRepository::new());
        let svc = service(links.clone(), Arc::new(RecordingClient::default()));

        svc.save_link(1, "+33612345678".to_string(), Some("1234".to_string()), true)
            .await
            .unwrap();
        let kept = svc
            .save_link(1, "+33687654321".to_string(), None, true)
            .await
            .unwrap();
        assert!(kept.has_pin);

        let cleared = svc
            .save_link(1, "+33687654321".to_string(), Some("1234".to_string()), false)
            .await
            .unwrap();
        assert!(!cleared.has_pin);
        assert!(!cleared.remember_pin);
        assert!(svc.delete_link(1).await.unwrap());
        assert_eq!(svc.get_link(1).unwrap(), None);
    }

    #[tokio::test]
    async fn remembering_a_pin_requires_a_key() {
        let svc = BrokerSessionService::new(
            Arc::new(InMemoryBrokerLinkRepository::new()),
            Arc::new(RecordingClient::default()),
            None,
        );
        let err = svc
            .save_link(1, "+33612345678".to_string(), Some("1234".to_string()), true)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Secret(_)));
        assert!(svc.validate_2fa("", "123").await.unwrap_err().is_validation());
    }
}
