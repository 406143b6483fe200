//! Awaiting the reply to a request
//!
//! Every request subscribes to its session's event sink before writing, so
//! the reply cannot slip past between the write and the wait. Each waiter
//! holds its own receiver; messages it skips stay visible to other waiters.

use std::fmt;
use std::time::Duration;

use keepkey_transport::{DeviceId, Message, MessageType};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use crate::error::ClientError;
use crate::session::DeviceEvent;

type Predicate = Box<dyn Fn(&Message) -> bool + Send + Sync>;

/// What a waiter is looking for: a message type plus an optional payload check
pub struct Expect {
    kind: MessageType,
    predicate: Option<Predicate>,
}

impl Expect {
    /// Any message of `kind`
    pub fn message(kind: MessageType) -> Self {
        Self {
            kind,
            predicate: None,
        }
    }

    /// A message of `kind` that also satisfies `predicate`
    pub fn matching<F>(kind: MessageType, predicate: F) -> Self
    where
        F: Fn(&Message) -> bool + Send + Sync + 'static,
    {
        Self {
            kind,
            predicate: Some(Box::new(predicate)),
        }
    }

    /// `Success` carrying exactly `text`
    pub fn success_message(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::matching(MessageType::Success, move |m| {
            matches!(m, Message::Success(s) if s.message.as_deref() == Some(text.as_str()))
        })
    }

    pub fn kind(&self) -> MessageType {
        self.kind
    }

    pub fn matches(&self, message: &Message) -> bool {
        message.message_type() == self.kind && self.predicate.as_ref().map_or(true, |p| p(message))
    }
}

impl From<MessageType> for Expect {
    fn from(kind: MessageType) -> Self {
        Self::message(kind)
    }
}

impl fmt::Debug for Expect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expect")
            .field("kind", &self.kind)
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}

/// Handle to the messages a device sends after a request was written
pub struct PendingResponse {
    device_id: DeviceId,
    rx: broadcast::Receiver<DeviceEvent>,
}

impl PendingResponse {
    pub(crate) fn new(device_id: DeviceId, rx: broadcast::Receiver<DeviceEvent>) -> Self {
        Self { device_id, rx }
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    /// Wait until the device sends a message matching `expect`
    ///
    /// A `Failure` ends the wait with `ClientError::DeviceFailure` unless the
    /// caller asked for `Failure` itself. Falling behind the event sink ends
    /// it with `ClientError::Lagged`. There is no implicit timeout.
    pub async fn wait_for(mut self, expect: impl Into<Expect>) -> Result<Message, ClientError> {
        let expect = expect.into();
        loop {
            let event = match self.rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(n)) => {
                    warn!("{}: waiter lagged, {} messages skipped", self.device_id, n);
                    return Err(ClientError::Lagged(n));
                }
                Err(RecvError::Closed) => return Err(ClientError::SessionClosed),
            };

            if expect.matches(&event.message) {
                return Ok(event.message);
            }

            if let Message::Failure(failure) = event.message {
                return Err(ClientError::DeviceFailure {
                    code: failure.code,
                    message: failure.message.unwrap_or_default(),
                });
            }

            debug!(
                "{}: waiting for {}, skipped {}",
                self.device_id,
                expect.kind(),
                event.message.type_name()
            );
        }
    }

    /// [`wait_for`](Self::wait_for) bounded by `timeout`
    pub async fn wait_for_timeout(
        self,
        expect: impl Into<Expect>,
        timeout: Duration,
    ) -> Result<Message, ClientError> {
        tokio::time::timeout(timeout, self.wait_for(expect))
            .await
            .map_err(|_| ClientError::Timeout)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keepkey_transport::messages::{ButtonRequest, Failure, Features, Success};

    fn event(message: impl Into<Message>) -> DeviceEvent {
        DeviceEvent {
            device_id: DeviceId::from("dev"),
            message: message.into(),
        }
    }

    fn pending() -> (broadcast::Sender<DeviceEvent>, PendingResponse) {
        let (tx, rx) = broadcast::channel(16);
        (tx, PendingResponse::new(DeviceId::from("dev"), rx))
    }

    #[test]
    fn test_success_message_predicate() {
        let expect = Expect::success_message("Device wiped");
        assert!(expect.matches(&Message::from(Success {
            message: Some("Device wiped".into())
        })));
        assert!(!expect.matches(&Message::from(Success {
            message: Some("Settings applied".into())
        })));
        assert!(!expect.matches(&Message::from(Features::default())));
    }

    #[tokio::test]
    async fn test_skips_non_matching() {
        let (tx, pending) = pending();
        tx.send(event(ButtonRequest::default())).unwrap();
        tx.send(event(Features::default())).unwrap();
        tx.send(event(Success {
            message: Some("Device wiped".into()),
        }))
        .unwrap();

        let msg = pending
            .wait_for(Expect::success_message("Device wiped"))
            .await
            .unwrap();
        assert_eq!(msg.message_type(), MessageType::Success);
    }

    #[tokio::test]
    async fn test_failure_rejects() {
        let (tx, pending) = pending();
        tx.send(event(Failure {
            code: Some(4),
            message: Some("Action cancelled by user".into()),
        }))
        .unwrap();

        match pending.wait_for(MessageType::Success).await {
            Err(ClientError::DeviceFailure { code, message }) => {
                assert_eq!(code, Some(4));
                assert_eq!(message, "Action cancelled by user");
            }
            other => panic!("expected DeviceFailure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failure_can_be_expected() {
        let (tx, pending) = pending();
        tx.send(event(Failure::default())).unwrap();
        assert!(pending.wait_for(MessageType::Failure).await.is_ok());
    }

    #[tokio::test]
    async fn test_closed_sink() {
        let (tx, pending) = pending();
        drop(tx);
        assert!(matches!(
            pending.wait_for(MessageType::Success).await,
            Err(ClientError::SessionClosed)
        ));
    }

    #[tokio::test]
    async fn test_lagged_waiter_gives_up() {
        let (tx, rx) = broadcast::channel(2);
        let pending = PendingResponse::new(DeviceId::from("dev"), rx);
        tx.send(event(Success {
            message: Some("Device wiped".into()),
        }))
        .unwrap();
        for _ in 0..3 {
            tx.send(event(ButtonRequest::default())).unwrap();
        }

        assert!(matches!(
            pending.wait_for(Expect::success_message("Device wiped")).await,
            Err(ClientError::Lagged(2))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_wait() {
        let (_tx, pending) = pending();
        assert!(matches!(
            pending
                .wait_for_timeout(MessageType::Success, Duration::from_secs(5))
                .await,
            Err(ClientError::Timeout)
        ));
    }
}
