//! Doubles shared by unit tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::cache::ProxyListener;
use crate::errors::CacheError;
use crate::proxy::SonarObject;
use crate::request::{Request, RequestSink};
use crate::sync::lock;
use crate::value::ValueKind;

crate::sonar_object! {
    /// Field device used throughout the tests.
    pub(crate) struct Widget = "widget" {
        read_write "size": ValueKind::Int,
        read_only "serial": ValueKind::Text,
        write_only "command": ValueKind::Text,
        read_write "tags": ValueKind::Array(&ValueKind::Text),
    }
}

impl Widget {
    pub(crate) fn size(&self) -> Result<Option<i32>, CacheError> {
        self.0.get_as("size")
    }

    pub(crate) fn set_size(&self, size: i32) -> Result<(), CacheError> {
        self.0.set("size", size)
    }

    pub(crate) fn set_command(&self, command: &str) -> Result<(), CacheError> {
        self.0.set("command", command)
    }
}

/// Records every submitted request.
#[derive(Default)]
pub(crate) struct RecordingSink {
    requests: Mutex<Vec<Request>>,
    closed: AtomicBool,
}

impl RecordingSink {
    pub(crate) fn requests(&self) -> Vec<Request> {
        lock(&self.requests).clone()
    }

    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl RequestSink for RecordingSink {
    fn submit(&self, request: Request) -> Result<(), CacheError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CacheError::Disconnected);
        }
        lock(&self.requests).push(request);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Event {
    Added(String),
    Removed(String),
    Changed(String, String),
    EnumerationComplete,
}

/// Records listener callbacks in arrival order.
#[derive(Default)]
pub(crate) struct RecordingListener {
    events: Mutex<Vec<Event>>,
}

impl RecordingListener {
    pub(crate) fn events(&self) -> Vec<Event> {
        lock(&self.events).clone()
    }
}

impl<T: SonarObject> ProxyListener<T> for RecordingListener {
    fn proxy_added(&self, proxy: &T) {
        lock(&self.events).push(Event::Added(proxy.name().to_owned()));
    }

    fn enumeration_complete(&self) {
        lock(&self.events).push(Event::EnumerationComplete);
    }

    fn proxy_removed(&self, proxy: &T) {
        lock(&self.events).push(Event::Removed(proxy.name().to_owned()));
    }

    fn proxy_changed(&self, proxy: &T, attribute: &str) {
        lock(&self.events).push(Event::Changed(
            proxy.name().to_owned(),
            attribute.to_owned(),
        ));
    }
}
