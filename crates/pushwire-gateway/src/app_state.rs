//! Shared application state for the pushwire gateway.
//!
//! Owns the event bus and control hub for the lifetime of the server. Both
//! are constructed here and handed to handlers through axum state rather
//! than living in globals.

use std::sync::Arc;

use tokio::sync::watch;

use pushwire_core::error::Result;

use crate::bus::EventBus;
use crate::config::GatewayConfig;
use crate::control::ControlHub;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
    bus: Arc<EventBus>,
    control: Arc<ControlHub>,
}

struct AppStateInner {
    cfg: GatewayConfig,
    shutdown: watch::Sender<bool>,
}

impl AppState {
    /// Build application state.
    /// Returns Result so main can handle errors gracefully (no panic).
    pub fn new(cfg: GatewayConfig) -> Result<Self> {
        cfg.validate()?;

        let bus = Arc::new(EventBus::new(cfg.bus.subscriber_queue));
        let control = Arc::new(ControlHub::new(
            cfg.control.poll_timeout(),
            cfg.control.response_timeout(),
        ));
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            inner: Arc::new(AppStateInner { cfg, shutdown }),
            bus,
            control,
        })
    }

    pub fn cfg(&self) -> &GatewayConfig {
        &self.inner.cfg
    }

    pub fn bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.bus)
    }

    pub fn control(&self) -> Arc<ControlHub> {
        Arc::clone(&self.control)
    }

    /// Flips to `true` once shutdown starts.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.inner.shutdown.subscribe()
    }

    pub fn is_draining(&self) -> bool {
        *self.inner.shutdown.borrow()
    }

    /// Stop accepting work and end every open stream and long-poll.
    pub fn begin_shutdown(&self) {
        if self.inner.shutdown.send_replace(true) {
            return;
        }
        let closed = self.bus.close_all();
        tracing::info!(streams = closed, "gateway draining");
    }
}
