use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use vista_core::Lead;

pub const LEAD_TTL_HOURS: i64 = 24;

pub trait LeadRepository: Send + Sync {
    async fn load(&self, phone: &str) -> Result<Option<Lead>>;
    async fn upsert(&self, lead: &Lead) -> Result<()>;
    async fn remove(&self, phone: &str) -> Result<bool>;
    async fn list(&self) -> Result<Vec<Lead>>;
    async fn purge_stale(&self, now: DateTime<Utc>) -> Result<u64>;
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    leads: Arc<RwLock<HashMap<String, Lead>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LeadRepository for MemoryStore {
    async fn load(&self, phone: &str) -> Result<Option<Lead>> {
        Ok(self.leads.read().get(phone).cloned())
    }

    async fn upsert(&self, lead: &Lead) -> Result<()> {
        self.leads.write().insert(lead.phone.clone(), lead.clone());
        Ok(())
    }

    async fn remove(&self, phone: &str) -> Result<bool> {
        Ok(self.leads.write().remove(phone).is_some())
    }

    async fn list(&self) -> Result<Vec<Lead>> {
        let mut leads: Vec<Lead> = self.leads.read().values().cloned().collect();
        leads.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
        Ok(leads)
    }

    async fn purge_stale(&self, now: DateTime<Utc>) -> Result<u64> {
        let cutoff = now - Duration::hours(LEAD_TTL_HOURS);
        let mut removed = 0_u64;
        self.leads.write().retain(|_, lead| {
            let keep = lead.last_updated > cutoff;
            if !keep {
                removed += 1;
            }
            keep
        });

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_then_load_round_trips() {
        let store = MemoryStore::new();
        let lead = Lead::new("+56911111111");
        store.upsert(&lead).await.unwrap();
        let loaded = store.load("+56911111111").await.unwrap().unwrap();
        assert_eq!(loaded.phone, "+56911111111");
        assert!(store.load("+56900000000").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn remove_reports_whether_the_lead_existed() {
        let store = MemoryStore::new();
        store.upsert(&Lead::new("+56922222222")).await.unwrap();
        assert!(store.remove("+56922222222").await.unwrap());
        assert!(!store.remove("+56922222222").await.unwrap());
    }

    #[tokio::test]
    async fn purge_drops_leads_older_than_the_ttl() {
        let store = MemoryStore::new();
        let now = Utc::now();

        let mut stale = Lead::new("+56900000001");
        stale.last_updated = now - Duration::hours(25);
        store.upsert(&stale).await.unwrap();

        let mut fresh = Lead::new("+56900000002");
        fresh.last_updated = now - Duration::hours(1);
        store.upsert(&fresh).await.unwrap();

        let removed = store.purge_stale(now).await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.load("+56900000001").await.unwrap().is_none());
        assert!(store.load("+56900000002").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn list_orders_by_most_recent_activity() {
        let store = MemoryStore::new();
        let now = Utc::now();

        let mut older = Lead::new("+56900000003");
        older.last_updated = now - Duration::hours(2);
        store.upsert(&older).await.unwrap();

        let mut newer = Lead::new("+56900000004");
        newer.last_updated = now;
        store.upsert(&newer).await.unwrap();

        let leads = store.list().await.unwrap();
        assert_eq!(leads[0].phone, "+56900000004");
        assert_eq!(leads[1].phone, "+56900000003");
    }
}
