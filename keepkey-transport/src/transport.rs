//! Message transport over a [`HidLink`]
//!
//! `Transport` turns typed [`Message`]s into framed segments and back,
//! using the schema of the device family it was created for.
//!
//! ```text
//! [ClientSession]                 ← dispatch, requests
//!        |
//!   [Transport]                   ← framing + schema, one exchange at a time
//!        |
//!  [HidLink: HidapiLink / mock]   ← raw reports
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use crate::error::TransportError;
use crate::frame::{self, FrameAssembler, REPORT_ID};
use crate::link::HidLink;
use crate::schema::{DeviceFamily, Message};
use crate::types::{DeviceDescriptor, DeviceId};

/// Default wait for the first report of a message
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(50);

/// Default wait for each continuation report once a message has started
pub const DEFAULT_SEGMENT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Framed message transport for one device
pub struct Transport {
    link: Arc<dyn HidLink>,
    family: DeviceFamily,
    /// Serializes whole-message reads and writes so segments never interleave
    exchange: tokio::sync::Mutex<()>,
    read_timeout: Duration,
    segment_timeout: Duration,
}

impl Transport {
    /// Create a transport speaking `family`'s schema over `link`
    pub fn new(link: Arc<dyn HidLink>, family: DeviceFamily) -> Self {
        Self {
            link,
            family,
            exchange: tokio::sync::Mutex::new(()),
            read_timeout: DEFAULT_READ_TIMEOUT,
            segment_timeout: DEFAULT_SEGMENT_TIMEOUT,
        }
    }

    /// Override the first-report and continuation-report timeouts
    pub fn with_timeouts(mut self, read_timeout: Duration, segment_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self.segment_timeout = segment_timeout;
        self
    }

    pub fn device_id(&self) -> &DeviceId {
        self.link.id()
    }

    pub fn family(&self) -> DeviceFamily {
        self.family
    }

    /// Vendor/product pair of the underlying device
    pub fn device_info(&self) -> DeviceDescriptor {
        self.link.descriptor()
    }

    /// Send one message, segment by segment
    ///
    /// Each segment send completes before the next is issued. A failure
    /// aborts the message; callers resend it whole.
    pub async fn write(&self, message: &Message) -> Result<(), TransportError> {
        let (type_id, payload) = self.family.encode(message)?;
        let segments = frame::encode(type_id, &payload)?;

        let _exchange = self.exchange.lock().await;
        debug!(
            "{}: -> {} (id={}, {} bytes, {} segments)",
            self.device_id(),
            message.type_name(),
            type_id,
            payload.len(),
            segments.len()
        );

        for (i, segment) in segments.iter().enumerate() {
            self.link
                .send_report(REPORT_ID, segment)
                .await
                .map_err(|e| match e {
                    TransportError::LinkWrite(_) => e,
                    other => TransportError::LinkWrite(other.to_string()),
                })?;
            trace!("{}: segment {}/{} sent", self.device_id(), i + 1, segments.len());
        }

        Ok(())
    }

    /// Receive one complete message
    ///
    /// Fails with `Timeout` when no report is pending. Any error drops the
    /// partially assembled frame; the next call starts fresh.
    pub async fn read(&self) -> Result<Message, TransportError> {
        let _exchange = self.exchange.lock().await;

        let first = self.receive_segment(self.read_timeout).await?;
        let mut assembler = FrameAssembler::start(&first)?;
        while !assembler.is_complete() {
            let segment = self.receive_segment(self.segment_timeout).await?;
            assembler.push(&segment);
        }

        let (type_id, payload) = assembler.finish();
        let message = self.family.decode(type_id, &payload)?;
        debug!(
            "{}: <- {} (id={}, {} bytes)",
            self.device_id(),
            message.type_name(),
            type_id,
            payload.len()
        );
        Ok(message)
    }

    async fn receive_segment(&self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let (report_id, data) = self.link.receive_report(timeout).await?;
        if report_id != REPORT_ID {
            return Err(TransportError::UnexpectedReport {
                expected: REPORT_ID,
                actual: report_id,
            });
        }
        Ok(data)
    }

    /// Close the underlying link
    pub async fn close(&self) -> Result<(), TransportError> {
        self.link.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{Features, Ping, Success};
    use crate::mock::MockLink;

    fn transport(link: &Arc<MockLink>) -> Transport {
        Transport::new(link.clone(), DeviceFamily::KeepKey)
    }

    #[tokio::test]
    async fn test_write_segments_in_order() {
        let link = MockLink::keepkey("dev-1");
        let t = transport(&link);

        let long = "x".repeat(200);
        let msg = Message::from(Ping {
            message: Some(long.clone()),
            ..Default::default()
        });
        t.write(&msg).await.unwrap();

        let sent = link.sent_reports();
        assert!(sent.len() > 1);
        assert!(sent.iter().all(|(id, seg)| *id == REPORT_ID && seg.len() == 63));
        assert_eq!(link.sent_messages(DeviceFamily::KeepKey), vec![msg]);
    }

    #[tokio::test]
    async fn test_read_multi_segment_message() {
        let link = MockLink::keepkey("dev-1");
        let t = transport(&link);

        let features = Message::from(Features {
            vendor: Some("keepkey.com".into()),
            label: Some("a fairly long label that will not fit in one segment".into()),
            major_version: Some(7),
            ..Default::default()
        });
        link.inject(DeviceFamily::KeepKey, &features).unwrap();

        assert_eq!(t.read().await.unwrap(), features);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_nothing_pending_times_out() {
        let link = MockLink::keepkey("dev-1");
        let t = transport(&link);
        assert!(t.read().await.unwrap_err().is_timeout());
    }

    #[tokio::test]
    async fn test_unexpected_report_id() {
        let link = MockLink::keepkey("dev-1");
        let t = transport(&link);
        link.push_report(0x01, vec![0u8; 63]);

        assert!(matches!(
            t.read().await,
            Err(TransportError::UnexpectedReport {
                expected: REPORT_ID,
                actual: 0x01
            })
        ));
    }

    #[tokio::test]
    async fn test_bad_magic_then_recovers() {
        let link = MockLink::keepkey("dev-1");
        let t = transport(&link);
        link.push_report(REPORT_ID, vec![0xFF; 63]);
        let ok = Message::from(Success {
            message: Some("ok".into()),
        });
        link.inject(DeviceFamily::KeepKey, &ok).unwrap();

        assert!(matches!(t.read().await, Err(TransportError::Framing(_))));
        assert_eq!(t.read().await.unwrap(), ok);
    }

    #[tokio::test]
    async fn test_write_failure_is_link_write() {
        let link = MockLink::keepkey("dev-1");
        let t = transport(&link);
        link.set_fail_writes(true);

        let err = t
            .write(&Message::from(Success::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::LinkWrite(_)));
    }

    #[tokio::test]
    async fn test_device_info_passthrough() {
        let link = MockLink::keepkey("dev-1");
        let t = transport(&link);
        assert_eq!(t.device_info(), link.descriptor());
        assert_eq!(t.device_id().as_str(), "dev-1");
    }
}
