//! Reference resolution.
//!
//! # Design
//! A `ReferenceResolver` lives for exactly one decode pass over one envelope.
//! It borrows the envelope's table read-only and memoises every `(kind, id)`
//! it has looked at, hits and misses alike, so twenty stops served by the
//! same route decode that route once and hand out clones.
//!
//! Interior mutability (`RefCell`/`Cell`) keeps the public API `&self`, which
//! lets models resolve nested references through the same resolver while
//! they decode. The resolver is deliberately `!Sync`; a decode pass never
//! crosses threads.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use serde_json::Value;
use tracing::warn;

use crate::envelope::{DateStrategy, DecodeConfig, EntityKind, ReferencePolicy, ReferenceTable};
use crate::model::Referenced;

/// Counters for one decode pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveStats {
    /// Table lookups actually performed.
    pub lookups: usize,
    /// Resolutions answered from the per-pass cache.
    pub cache_hits: usize,
    /// References that could not be hydrated.
    pub missing: usize,
}

pub struct ReferenceResolver<'a> {
    table: &'a ReferenceTable,
    config: DecodeConfig,
    cache: RefCell<HashMap<(EntityKind, String), Box<dyn Any>>>,
    stats: Cell<ResolveStats>,
}

impl std::fmt::Debug for ReferenceResolver<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceResolver")
            .field("references", &self.table.len())
            .field("config", &self.config)
            .field("stats", &self.stats.get())
            .finish()
    }
}

impl<'a> ReferenceResolver<'a> {
    pub fn new(table: &'a ReferenceTable, config: &DecodeConfig) -> Self {
        Self {
            table,
            config: *config,
            cache: RefCell::new(HashMap::new()),
            stats: Cell::new(ResolveStats::default()),
        }
    }

    pub fn dates(&self) -> DateStrategy {
        self.config.dates
    }

    pub fn stats(&self) -> ResolveStats {
        self.stats.get()
    }

    /// Hydrate the entity `T` with the given id.
    ///
    /// A missing or undecodable reference yields `None` and a warning; it
    /// never fails the record that holds it.
    pub fn resolve<T: Referenced>(&self, id: &str) -> Option<T> {
        if self.config.references == ReferencePolicy::Ignore {
            return None;
        }

        let key = (T::KIND, id.to_string());
        let cached = self
            .cache
            .borrow()
            .get(&key)
            .and_then(|entry| entry.downcast_ref::<Option<T>>())
            .cloned();
        if let Some(resolved) = cached {
            self.bump(|s| s.cache_hits += 1);
            if resolved.is_none() {
                self.report_missing(T::KIND, id);
            }
            return resolved;
        }

        self.bump(|s| s.lookups += 1);
        let resolved = self.table.get(T::KIND, id).and_then(|record| {
            match T::decode(&with_id(record, id), self) {
                Ok(model) => Some(model),
                Err(error) => {
                    warn!(kind = %T::KIND, id, %error, "referenced record failed to decode");
                    None
                }
            }
        });
        if resolved.is_none() {
            self.report_missing(T::KIND, id);
        }

        self.cache.borrow_mut().insert(key, Box::new(resolved.clone()));
        resolved
    }

    /// Resolve every id, keeping order and skipping the ones that miss.
    pub fn resolve_all<T: Referenced>(&self, ids: &[String]) -> Vec<T> {
        ids.iter().filter_map(|id| self.resolve(id)).collect()
    }

    fn report_missing(&self, kind: EntityKind, id: &str) {
        self.bump(|s| s.missing += 1);
        warn!(%kind, id, "reference missing from envelope");
    }

    fn bump(&self, f: impl FnOnce(&mut ResolveStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }
}

/// Reference tables key records by id; the record body may omit it.
fn with_id(record: &Value, id: &str) -> Value {
    let mut record = record.clone();
    if let Value::Object(fields) = &mut record {
        fields
            .entry("id")
            .or_insert_with(|| Value::String(id.to_string()));
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::PayloadShape;
    use crate::model::{Agency, Route};
    use serde_json::json;

    fn table() -> ReferenceTable {
        let mut table = ReferenceTable::new();
        table.insert(EntityKind::Agency, "A1", json!({"name": "Metro"}));
        table.insert(EntityKind::Agency, "BAD", json!({"name": 42}));
        table.insert(
            EntityKind::Route,
            "R1",
            json!({"id": "R1", "shortName": "10", "agencyId": "A1"}),
        );
        table
    }

    const CONFIG: DecodeConfig = DecodeConfig::primary(PayloadShape::List);

    #[test]
    fn resolves_and_fills_id_from_key() {
        let table = table();
        let resolver = ReferenceResolver::new(&table, &CONFIG);
        let agency: Agency = resolver.resolve("A1").unwrap();
        assert_eq!(agency.id, "A1");
        assert_eq!(agency.name, "Metro");
    }

    #[test]
    fn repeated_resolution_hits_cache_and_is_equal() {
        let table = table();
        let resolver = ReferenceResolver::new(&table, &CONFIG);
        let first: Agency = resolver.resolve("A1").unwrap();
        let second: Agency = resolver.resolve("A1").unwrap();
        assert_eq!(first, second);
        assert_eq!(
            resolver.stats(),
            ResolveStats {
                lookups: 1,
                cache_hits: 1,
                missing: 0
            }
        );
    }

    #[test]
    fn nested_references_resolve_transitively() {
        let table = table();
        let resolver = ReferenceResolver::new(&table, &CONFIG);
        let route: Route = resolver.resolve("R1").unwrap();
        assert_eq!(route.agency.unwrap().name, "Metro");
        assert_eq!(resolver.stats().lookups, 2);
    }

    #[test]
    fn missing_reference_is_none_and_counted() {
        let table = table();
        let resolver = ReferenceResolver::new(&table, &CONFIG);
        assert!(resolver.resolve::<Agency>("NOPE").is_none());
        assert!(resolver.resolve::<Agency>("NOPE").is_none());
        let stats = resolver.stats();
        assert_eq!(stats.missing, 2);
        assert_eq!(stats.lookups, 1);
    }

    #[test]
    fn undecodable_reference_counts_as_missing() {
        let table = table();
        let resolver = ReferenceResolver::new(&table, &CONFIG);
        assert!(resolver.resolve::<Agency>("BAD").is_none());
        assert_eq!(resolver.stats().missing, 1);
    }

    #[test]
    fn kinds_do_not_collide() {
        let mut table = ReferenceTable::new();
        table.insert(EntityKind::Agency, "1", json!({"name": "Agency One"}));
        let resolver = ReferenceResolver::new(&table, &CONFIG);
        assert!(resolver.resolve::<Route>("1").is_none());
        assert!(resolver.resolve::<Agency>("1").is_some());
    }

    #[test]
    fn resolve_all_skips_misses_in_order() {
        let mut table = table();
        table.insert(EntityKind::Agency, "A2", json!({"name": "Sound Transit"}));
        let resolver = ReferenceResolver::new(&table, &CONFIG);
        let ids = ["A2".to_string(), "X".to_string(), "A1".to_string()];
        let names: Vec<_> = resolver
            .resolve_all::<Agency>(&ids)
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(names, ["Sound Transit", "Metro"]);
    }

    #[test]
    fn ignore_policy_never_looks_up() {
        let table = table();
        let config = DecodeConfig {
            references: ReferencePolicy::Ignore,
            ..CONFIG
        };
        let resolver = ReferenceResolver::new(&table, &config);
        assert!(resolver.resolve::<Agency>("A1").is_none());
        assert_eq!(resolver.stats(), ResolveStats::default());
    }
}
