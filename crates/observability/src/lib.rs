use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceCell<()> = OnceCell::new();

#[derive(Debug, Default)]
pub struct BotMetrics {
    messages_total: AtomicU64,
    quotes_total: AtomicU64,
    leads_confirmed_total: AtomicU64,
    send_failures_total: AtomicU64,
    exports_failed_total: AtomicU64,
    total_latency_millis: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub messages_total: u64,
    pub quotes_total: u64,
    pub leads_confirmed_total: u64,
    pub send_failures_total: u64,
    pub exports_failed_total: u64,
    pub avg_latency_millis: f64,
}

impl BotMetrics {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_message(&self) {
        self.messages_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_quote(&self) {
        self.quotes_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_lead_confirmed(&self) {
        self.leads_confirmed_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_send_failure(&self) {
        self.send_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_export_failure(&self) {
        self.exports_failed_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn observe_latency(&self, duration: Duration) {
        self.total_latency_millis
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let messages = self.messages_total.load(Ordering::Relaxed);
        let latency = self.total_latency_millis.load(Ordering::Relaxed);

        MetricsSnapshot {
            messages_total: messages,
            quotes_total: self.quotes_total.load(Ordering::Relaxed),
            leads_confirmed_total: self.leads_confirmed_total.load(Ordering::Relaxed),
            send_failures_total: self.send_failures_total.load(Ordering::Relaxed),
            exports_failed_total: self.exports_failed_total.load(Ordering::Relaxed),
            avg_latency_millis: if messages == 0 {
                0.0
            } else {
                latency as f64 / messages as f64
            },
        }
    }
}

pub fn init_tracing(service_name: &str) {
    TRACING_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}=info,vista_api=info,vista_bot=info",
                service_name
            ))
        });

        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .with_span_list(true)
            .init();
    });
}
