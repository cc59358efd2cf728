//! Routing of records to sinks by logger name

use super::RecordSink;
use crate::types::{LogLevel, LogRecord};
use crate::Result;
use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::trace;

/// Name of the logger every hierarchy ends at
pub const ROOT_LOGGER: &str = "root";

/// One destination registered for a logger name
#[derive(Clone)]
pub struct Route {
    /// Records below this level are not delivered through this route
    pub min_level: LogLevel,
    /// Whether records continue to the parent logger's routes afterwards
    pub propagate: bool,
    /// Destination
    pub sink: Arc<dyn RecordSink>,
}

impl Route {
    /// Route accepting every level and propagating to parents
    pub fn new(sink: Arc<dyn RecordSink>) -> Self {
        Self {
            min_level: LogLevel::Debug,
            propagate: true,
            sink,
        }
    }

    /// Set the minimum level
    pub fn with_min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Stop records from reaching parent routes
    pub fn no_propagate(mut self) -> Self {
        self.propagate = false;
        self
    }
}

/// Re-dispatches records to the routes of their logger hierarchy.
///
/// The record's own logger name (or the configured override) is looked up
/// first, then each dotted parent (`a.b.c`, `a.b`, `a`) and finally
/// [`ROOT_LOGGER`]. Every route found receives the record if its level allows,
/// until a route with `propagate = false` is reached. Records are not filtered
/// by any logger-level threshold before this point; filtering belongs to the
/// producer.
#[derive(Default)]
pub struct DispatchSink {
    routes: DashMap<String, Vec<Route>>,
    override_name: ArcSwapOption<String>,
}

impl DispatchSink {
    /// Create a dispatcher with no routes
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route for `logger`; a logger may have several
    pub fn route(&self, logger: impl Into<String>, route: Route) {
        self.routes.entry(logger.into()).or_default().push(route);
    }

    /// Number of loggers with at least one route
    pub fn logger_count(&self) -> usize {
        self.routes.len()
    }

    /// Route every record as if it came from `name`, or restore per-record names with `None`
    pub fn set_override(&self, name: Option<String>) {
        self.override_name.store(name.map(Arc::new));
    }

    /// Currently configured override name
    pub fn override_name(&self) -> Option<String> {
        self.override_name.load_full().map(|name| (*name).clone())
    }

    /// Logger names consulted for `name`, most specific first
    pub fn lookup_chain(name: &str) -> Vec<String> {
        let mut chain = Vec::new();
        let mut current = name;
        while !current.is_empty() && current != ROOT_LOGGER {
            chain.push(current.to_string());
            current = match current.rfind('.') {
                Some(idx) => &current[..idx],
                None => "",
            };
        }
        chain.push(ROOT_LOGGER.to_string());
        chain
    }

    fn routes_for(&self, name: &str) -> Vec<Route> {
        let mut selected = Vec::new();
        for logger in Self::lookup_chain(name) {
            if let Some(routes) = self.routes.get(&logger) {
                selected.extend(routes.iter().cloned());
                if routes.iter().any(|r| !r.propagate) {
                    break;
                }
            }
        }
        selected
    }
}

#[async_trait]
impl RecordSink for DispatchSink {
    async fn accept(&self, record: &LogRecord) -> Result<()> {
        let name = match self.override_name.load_full() {
            Some(name) => (*name).clone(),
            None => record.name.clone(),
        };

        let routes = self.routes_for(&name);
        if routes.is_empty() {
            trace!(logger = %name, "No route for record, dropping");
            return Ok(());
        }

        let mut first_error = None;
        for route in routes {
            if record.level < route.min_level {
                continue;
            }
            if let Err(e) = route.sink.accept(record).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn close(&self) -> Result<()> {
        let sinks: Vec<Arc<dyn RecordSink>> = self
            .routes
            .iter()
            .flat_map(|entry| entry.value().iter().map(|r| Arc::clone(&r.sink)).collect::<Vec<_>>())
            .collect();
        let mut first_error = None;
        for sink in sinks {
            if let Err(e) = sink.close().await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
