//! Shared request-scoped state, threaded through every handler instead of
//! relying on process-wide globals.

use std::sync::Arc;

use prometheus::{IntCounterVec, Opts, Registry, TextEncoder};

use crate::config::Args;
use crate::objectstore::ObjectStore;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub objects: Arc<dyn ObjectStore>,
    pub config: Arc<Args>,
    pub metrics: Arc<Metrics>,
}

pub struct Metrics {
    registry: Registry,
    pub requests_total: IntCounterVec,
    pub dispatch_kind_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("coordinator_requests_total", "Requests handled per endpoint and outcome"),
            &["endpoint", "outcome"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let dispatch_kind_total = IntCounterVec::new(
            Opts::new("coordinator_dispatch_kind_total", "Batches dispatched by selection kind"),
            &["kind"],
        )?;
        registry.register(Box::new(dispatch_kind_total.clone()))?;

        Ok(Metrics {
            registry,
            requests_total,
            dispatch_kind_total,
        })
    }

    pub fn encode(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buf = Vec::new();
        encoder.encode(&families, &mut buf)?;
        Ok(String::from_utf8(buf)?)
    }
}
