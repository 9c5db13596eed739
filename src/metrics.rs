//! In-process request counters, served as JSON from `/api/metrics`.
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

static REQUESTS_TOTAL: AtomicU64 = AtomicU64::new(0);
static LATENCY_SUM_MS: AtomicU64 = AtomicU64::new(0);
static GOLD_SPENT: AtomicU64 = AtomicU64::new(0);
static TURNS_SETTLED: AtomicU64 = AtomicU64::new(0);

static ROUTE_COUNTERS: OnceLock<Mutex<HashMap<String, RouteCounter>>> = OnceLock::new();

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RouteCounter {
    pub success: u64,
    pub client_error: u64,
    pub server_error: u64,
    pub max_latency_ms: u64,
}

fn route_counter_lock() -> &'static Mutex<HashMap<String, RouteCounter>> {
    ROUTE_COUNTERS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Record one finished request. `route` is the matched route template
/// (`/api/armies/{id}`), not the concrete path.
pub fn record_request(method: &str, route: &str, status: u16, elapsed: Duration) -> RouteCounter {
    let ms = elapsed.as_millis() as u64;
    REQUESTS_TOTAL.fetch_add(1, Ordering::Relaxed);
    LATENCY_SUM_MS.fetch_add(ms, Ordering::Relaxed);

    let mut guard = match route_counter_lock().lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    let counter = guard.entry(format!("{} {}", method, route)).or_default();
    match status {
        500..=599 => counter.server_error = counter.server_error.saturating_add(1),
        400..=499 => counter.client_error = counter.client_error.saturating_add(1),
        _ => counter.success = counter.success.saturating_add(1),
    }
    if ms > counter.max_latency_ms {
        counter.max_latency_ms = ms;
    }
    *counter
}

pub fn add_gold_spent(amount: i64) {
    if amount > 0 {
        GOLD_SPENT.fetch_add(amount as u64, Ordering::Relaxed);
    }
}

pub fn inc_turns_settled() {
    TURNS_SETTLED.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub requests_total: u64,
    pub latency_avg_ms: Option<u64>,
    pub gold_spent: u64,
    pub turns_settled: u64,
    pub routes: BTreeMap<String, RouteCounter>,
}

pub fn snapshot() -> Snapshot {
    let total = REQUESTS_TOTAL.load(Ordering::Relaxed);
    let sum = LATENCY_SUM_MS.load(Ordering::Relaxed);
    let routes = match route_counter_lock().lock() {
        Ok(guard) => guard.iter().map(|(k, v)| (k.clone(), *v)).collect(),
        Err(poisoned) => poisoned
            .into_inner()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect(),
    };
    Snapshot {
        requests_total: total,
        latency_avg_ms: if total > 0 { Some(sum / total) } else { None },
        gold_spent: GOLD_SPENT.load(Ordering::Relaxed),
        turns_settled: TURNS_SETTLED.load(Ordering::Relaxed),
        routes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classes_are_counted_per_route() {
        let route = "/test/metrics/status-classes";
        record_request("GET", route, 200, Duration::from_millis(3));
        record_request("GET", route, 404, Duration::from_millis(1));
        let counter = record_request("GET", route, 500, Duration::from_millis(9));
        assert_eq!(counter.success, 1);
        assert_eq!(counter.client_error, 1);
        assert_eq!(counter.server_error, 1);
        assert_eq!(counter.max_latency_ms, 9);

        let snap = snapshot();
        assert!(snap.requests_total >= 3);
        let key = format!("GET {}", route);
        assert_eq!(snap.routes.get(&key).map(|c| c.server_error), Some(1));
    }

    #[test]
    fn negative_gold_is_not_counted() {
        let before = snapshot().gold_spent;
        add_gold_spent(-50);
        assert!(snapshot().gold_spent >= before);
    }
}
