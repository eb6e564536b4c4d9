//! In-memory channel for testing purposes.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use super::{RpcChannel, RpcError};

/// A channel that returns predefined responses.
///
/// Responses are keyed by method, optionally narrowed by the first string
/// parameter (e.g. the citation key of `item.attachments`). GET bodies are
/// keyed by path. Every call is recorded, along with the peak number of
/// calls of each method that were in flight at once.
#[derive(Debug, Default)]
pub struct MockChannel {
    calls: Mutex<HashMap<String, Result<Value, RpcError>>>,
    fetches: Mutex<HashMap<String, Result<String, RpcError>>>,
    latencies: Mutex<HashMap<String, VecDeque<Duration>>>,
    /// (current, peak) concurrent calls per method
    in_flight: Mutex<HashMap<String, (usize, usize)>>,
    log: Mutex<Vec<(String, Value)>>,
    fallback: Mutex<Option<RpcError>>,
}

impl MockChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Respond to every call of `method`
    pub fn on_call(&self, method: &str, response: Result<Value, RpcError>) {
        self.calls
            .lock()
            .unwrap()
            .insert(method.to_string(), response);
    }

    /// Respond to `method` when its first parameter equals `first_param`
    pub fn on_call_with(&self, method: &str, first_param: &str, response: Result<Value, RpcError>) {
        self.calls
            .lock()
            .unwrap()
            .insert(format!("{}|{}", method, first_param), response);
    }

    /// Respond to a GET of `path`
    pub fn on_fetch(&self, path: &str, response: Result<String, RpcError>) {
        self.fetches
            .lock()
            .unwrap()
            .insert(path.to_string(), response);
    }

    /// Delay the next call of `method` (queued, one per call)
    pub fn push_latency(&self, method: &str, delay: Duration) {
        self.latencies
            .lock()
            .unwrap()
            .entry(method.to_string())
            .or_default()
            .push_back(delay);
    }

    /// Fail every unconfigured call or fetch with `error`
    pub fn fail_all(&self, error: RpcError) {
        *self.fallback.lock().unwrap() = Some(error);
    }

    /// Clear every configured response
    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
        self.fetches.lock().unwrap().clear();
        *self.fallback.lock().unwrap() = None;
    }

    /// Number of recorded calls to `method` (GETs are logged as `GET`)
    pub fn call_count(&self, method: &str) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .count()
    }

    /// Highest number of `method` calls that were in flight at the same time
    pub fn max_in_flight(&self, method: &str) -> usize {
        self.in_flight
            .lock()
            .unwrap()
            .get(method)
            .map_or(0, |&(_, peak)| peak)
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.log.lock().unwrap().clone()
    }

    fn missing(&self, what: &str) -> RpcError {
        self.fallback
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| RpcError::Malformed(format!("no mock response for {}", what)))
    }

    async fn delay(&self, method: &str) {
        let delay = self
            .latencies
            .lock()
            .unwrap()
            .get_mut(method)
            .and_then(VecDeque::pop_front);

        {
            let mut in_flight = self.in_flight.lock().unwrap();
            let (current, peak) = in_flight.entry(method.to_string()).or_default();
            *current += 1;
            *peak = (*peak).max(*current);
        }
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some((current, _)) = self.in_flight.lock().unwrap().get_mut(method) {
            *current -= 1;
        }
    }
}

#[async_trait]
impl RpcChannel for MockChannel {
    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        self.log
            .lock()
            .unwrap()
            .push((method.to_string(), params.clone()));
        self.delay(method).await;

        let first = params
            .get(0)
            .and_then(Value::as_str)
            .map(|p| format!("{}|{}", method, p));

        let calls = self.calls.lock().unwrap();
        let response = first
            .and_then(|key| calls.get(&key))
            .or_else(|| calls.get(method))
            .cloned();
        drop(calls);

        response.unwrap_or_else(|| Err(self.missing(method)))
    }

    async fn fetch(&self, path: &str) -> Result<String, RpcError> {
        self.log
            .lock()
            .unwrap()
            .push(("GET".to_string(), Value::String(path.to_string())));
        self.delay("GET").await;

        let response = self.fetches.lock().unwrap().get(path).cloned();
        response.unwrap_or_else(|| Err(self.missing(path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_specific_response_wins() {
        let mock = MockChannel::new();
        mock.on_call("item.attachments", Ok(json!([])));
        mock.on_call_with("item.attachments", "k1", Ok(json!([{"open": "x"}])));

        let specific = mock.call("item.attachments", json!(["k1"])).await.unwrap();
        let general = mock.call("item.attachments", json!(["k2"])).await.unwrap();

        assert_eq!(specific, json!([{"open": "x"}]));
        assert_eq!(general, json!([]));
        assert_eq!(mock.call_count("item.attachments"), 2);
    }

    #[tokio::test]
    async fn test_in_flight_peak() {
        let mock = MockChannel::new();
        mock.on_call("user.groups", Ok(json!([])));
        mock.push_latency("user.groups", Duration::from_millis(20));
        mock.push_latency("user.groups", Duration::from_millis(20));

        let (a, b) = tokio::join!(
            mock.call("user.groups", json!([true])),
            mock.call("user.groups", json!([true]))
        );
        assert!(a.is_ok() && b.is_ok());
        mock.call("user.groups", json!([true])).await.unwrap();

        assert_eq!(mock.max_in_flight("user.groups"), 2);
        assert_eq!(mock.max_in_flight("item.attachments"), 0);
    }

    #[tokio::test]
    async fn test_fallback_error() {
        let mock = MockChannel::new();
        mock.fail_all(RpcError::Unreachable("refused".to_string()));

        let err = mock.fetch("/anything").await.unwrap_err();
        assert_eq!(err, RpcError::Unreachable("refused".to_string()));
    }
}
