//! Testing utilities for usertint workspace
//!
//! Shared fakes, fixtures, and a loopback HTTP stub.

#![allow(missing_docs)]

mod document;
mod http;

pub use document::{Element, InMemoryDocument};
pub use http::{HttpStub, StubResponse};

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tint_cache::{
    AttributeCache, AttributeResolver, AttributeSource, FetchCoordinator, SourceError,
    SourceResult,
};
use tint_core::{AttributeRecord, ColorTable, EntityId, RankingTable, TintScheme};

#[derive(Debug, Clone)]
struct Scripted {
    categories: Vec<String>,
    color: Option<String>,
}

/// Attribute source answering from a script, counting every call
#[derive(Debug, Default)]
pub struct ScriptedSource {
    remote: bool,
    delay: Duration,
    records: Mutex<HashMap<String, Scripted>>,
    failures: Mutex<HashMap<String, usize>>,
    calls: Mutex<HashMap<String, usize>>,
    total: AtomicUsize,
}

impl ScriptedSource {
    pub fn remote() -> Self {
        Self {
            remote: true,
            ..Self::default()
        }
    }

    pub fn local() -> Self {
        Self::default()
    }

    /// Sleep this long inside every fetch
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_record(self, id: &str, categories: &[&str], color: Option<&str>) -> Self {
        self.set_record(id, categories, color);
        self
    }

    pub fn set_record(&self, id: &str, categories: &[&str], color: Option<&str>) {
        self.records.lock().insert(
            id.to_lowercase(),
            Scripted {
                categories: categories.iter().map(ToString::to_string).collect(),
                color: color.map(ToString::to_string),
            },
        );
    }

    /// Fail the next `times` fetches for `id` with a 503
    pub fn fail_next(&self, id: &str, times: usize) {
        self.failures.lock().insert(id.to_lowercase(), times);
    }

    pub fn calls_for(&self, id: &str) -> usize {
        self.calls.lock().get(&id.to_lowercase()).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AttributeSource for ScriptedSource {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn is_remote(&self) -> bool {
        self.remote
    }

    async fn fetch(&self, entity_id: &EntityId) -> SourceResult<Option<AttributeRecord>> {
        let key = entity_id.cache_key();
        self.total.fetch_add(1, Ordering::SeqCst);
        *self.calls.lock().entry(key.clone()).or_default() += 1;

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let failing = {
            let mut failures = self.failures.lock();
            match failures.get_mut(&key) {
                Some(left) if *left > 0 => {
                    *left -= 1;
                    true
                }
                _ => false,
            }
        };
        if failing {
            return Err(SourceError::status(entity_id.as_str(), 503));
        }

        let scripted = self.records.lock().get(&key).cloned();
        Ok(scripted.map(|s| {
            AttributeRecord::new(entity_id.clone(), &s.categories).with_color(s.color)
        }))
    }
}

/// Resolver over a fresh cache and a single source, without start spacing
pub fn resolver_with(source: Arc<dyn AttributeSource>) -> AttributeResolver {
    let coordinator = FetchCoordinator::new(3, Duration::ZERO).with_source(source);
    AttributeResolver::new(Arc::new(AttributeCache::new()), Arc::new(coordinator))
}

/// Built-in ranking with only `admin` colored
pub fn admin_scheme() -> TintScheme {
    TintScheme::new(RankingTable::builtin(), ColorTable::new([("admin", "#e74c3c")]))
}

/// Members export used by builder tests
pub const MEMBERS_JSON: &str = r#"[
    {"username": "Alice", "active": true, "trust_level": 4, "groups": ["admins", "staff"]},
    {"username": "bob", "active": true, "trust_level": 2, "groups": ["Moderators"]},
    {"username": "carol", "trust_level": 1, "groups": []},
    {"username": "dave", "active": true, "trust_level": null, "groups": []},
    {"username": "ghost", "active": false, "trust_level": 0, "groups": ["admins"]}
]"#;
