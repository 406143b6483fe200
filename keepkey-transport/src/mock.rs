//! In-memory HID link and discovery
//!
//! `MockLink` stands in for a wallet: tests push reports (or whole messages)
//! for the host to read and inspect what the host wrote. `MockDiscovery`
//! serves a mutable list of such links.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::device_registry::{KEEPKEY_PRODUCT_ID, KEEPKEY_VENDOR_ID};
use crate::discovery::DeviceDiscovery;
use crate::error::TransportError;
use crate::frame::{self, FrameAssembler, REPORT_ID};
use crate::link::HidLink;
use crate::schema::{DeviceFamily, Message};
use crate::types::{DeviceDescriptor, DeviceId, DiscoveredDevice};

type Report = (u8, Vec<u8>);

/// Scripted HID link
pub struct MockLink {
    id: DeviceId,
    descriptor: DeviceDescriptor,
    incoming_tx: mpsc::UnboundedSender<Report>,
    incoming_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Report>>,
    sent: Mutex<Vec<Report>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    receive_calls: AtomicUsize,
    fail_writes: AtomicBool,
    closed: AtomicBool,
}

/// Decrements the in-flight counter on drop
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockLink {
    pub fn new(id: impl Into<DeviceId>, descriptor: DeviceDescriptor) -> Arc<Self> {
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            id: id.into(),
            descriptor,
            incoming_tx,
            incoming_rx: tokio::sync::Mutex::new(incoming_rx),
            sent: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            receive_calls: AtomicUsize::new(0),
            fail_writes: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    /// A link that enumerates as a KeepKey
    pub fn keepkey(id: &str) -> Arc<Self> {
        Self::new(
            id,
            DeviceDescriptor::new(KEEPKEY_VENDOR_ID, KEEPKEY_PRODUCT_ID),
        )
    }

    /// Queue one raw report for the host to read
    pub fn push_report(&self, report_id: u8, data: Vec<u8>) {
        let _ = self.incoming_tx.send((report_id, data));
    }

    /// Queue a whole message, framed the way a device would send it
    pub fn inject(&self, family: DeviceFamily, message: &Message) -> Result<(), TransportError> {
        let (type_id, payload) = family.encode(message)?;
        for segment in frame::encode(type_id, &payload)? {
            self.push_report(REPORT_ID, segment.to_vec());
        }
        Ok(())
    }

    /// Every report written by the host so far
    pub fn sent_reports(&self) -> Vec<Report> {
        self.sent.lock().clone()
    }

    /// Reassemble everything the host wrote into messages
    pub fn sent_messages(&self, family: DeviceFamily) -> Vec<Message> {
        let sent = self.sent.lock();
        let mut messages = Vec::new();
        let mut segments = sent.iter().map(|(_, data)| data.as_slice());

        while let Some(first) = segments.next() {
            let Ok(mut assembler) = FrameAssembler::start(first) else {
                continue;
            };
            while !assembler.is_complete() {
                match segments.next() {
                    Some(segment) => {
                        assembler.push(segment);
                    }
                    None => return messages,
                }
            }
            let (type_id, payload) = assembler.finish();
            if let Ok(message) = family.decode(type_id, &payload) {
                messages.push(message);
            }
        }
        messages
    }

    /// Types of every message the host wrote, in order
    pub fn sent_types(&self, family: DeviceFamily) -> Vec<&'static str> {
        self.sent_messages(family)
            .iter()
            .map(|m| m.type_name())
            .collect()
    }

    /// Make subsequent `send_report` calls fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        InFlight(&self.in_flight)
    }

    /// Highest number of concurrent send/receive calls observed
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Number of `receive_report` calls so far
    pub fn receive_calls(&self) -> usize {
        self.receive_calls.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HidLink for MockLink {
    fn id(&self) -> &DeviceId {
        &self.id
    }

    fn descriptor(&self) -> DeviceDescriptor {
        self.descriptor
    }

    async fn send_report(&self, report_id: u8, data: &[u8]) -> Result<(), TransportError> {
        let _in_flight = self.enter();
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TransportError::LinkWrite("mock write failure".into()));
        }
        tokio::task::yield_now().await;
        self.sent.lock().push((report_id, data.to_vec()));
        Ok(())
    }

    async fn receive_report(&self, timeout: Duration) -> Result<Report, TransportError> {
        self.receive_calls.fetch_add(1, Ordering::SeqCst);
        let _in_flight = self.enter();

        let mut rx = self.incoming_rx.lock().await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(report)) => Ok(report),
            Ok(None) => Err(TransportError::Disconnected),
            Err(_) => Err(TransportError::Timeout),
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Discovery over a mutable set of mock links
#[derive(Default)]
pub struct MockDiscovery {
    devices: Mutex<Vec<(DiscoveredDevice, Arc<MockLink>)>>,
    fail_list: AtomicBool,
    list_calls: AtomicUsize,
}

impl MockDiscovery {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make a link visible to enumeration
    pub fn attach(&self, link: Arc<MockLink>) {
        let device = DiscoveredDevice {
            id: link.id().clone(),
            descriptor: link.descriptor(),
            serial: None,
            product_name: None,
        };
        let mut devices = self.devices.lock();
        devices.retain(|(d, _)| d.id != device.id);
        devices.push((device, link));
    }

    /// Remove a link from enumeration
    pub fn detach(&self, id: &DeviceId) {
        self.devices.lock().retain(|(d, _)| &d.id != id);
    }

    pub fn link(&self, id: &DeviceId) -> Option<Arc<MockLink>> {
        self.devices
            .lock()
            .iter()
            .find(|(d, _)| &d.id == id)
            .map(|(_, l)| l.clone())
    }

    /// Make `list_devices` fail
    pub fn set_fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    /// Number of `list_devices` calls so far
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceDiscovery for MockDiscovery {
    async fn list_devices(&self) -> Result<Vec<DiscoveredDevice>, TransportError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(TransportError::HidError("mock enumeration failure".into()));
        }
        Ok(self.devices.lock().iter().map(|(d, _)| d.clone()).collect())
    }

    async fn open_device(
        &self,
        device: &DiscoveredDevice,
    ) -> Result<Arc<dyn HidLink>, TransportError> {
        self.link(&device.id)
            .map(|link| link as Arc<dyn HidLink>)
            .ok_or_else(|| TransportError::DeviceNotFound(device.id.to_string()))
    }
}
