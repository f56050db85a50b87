use axum::{
    debug_handler,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
#[allow(unused)]
use metrics::{counter, gauge, histogram};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::{
    atomic::{AtomicU16, AtomicU64, Ordering},
    Arc, Mutex, PoisonError,
};
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

/// Deliveries above which a domain without bounces is reported as catch-all.
pub const CATCH_ALL_THRESHOLD: u64 = 1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Delivered,
    Bounced,
    GetDomain,
}

impl Endpoint {
    pub const ALL: [Endpoint; 3] = [Endpoint::Delivered, Endpoint::Bounced, Endpoint::GetDomain];

    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Delivered => "delivered",
            Endpoint::Bounced => "bounced",
            Endpoint::GetDomain => "get-domain",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ParseFaultError {
    #[error("Unknown endpoint `{0}`, expected delivered, bounced or get-domain")]
    Endpoint(String),
    #[error("Expected <endpoint>=<status>, got `{0}`")]
    Format(String),
    #[error("Invalid status code `{0}`")]
    Status(String),
}

impl FromStr for Endpoint {
    type Err = ParseFaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Endpoint::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| ParseFaultError::Endpoint(s.to_string()))
    }
}

/// Fixed status an endpoint answers with instead of doing its work.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Fault {
    pub endpoint: Endpoint,
    pub status: StatusCode,
}

impl FromStr for Fault {
    type Err = ParseFaultError;

    /// Parses `bounced=500`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (endpoint, status) = s
            .split_once('=')
            .ok_or_else(|| ParseFaultError::Format(s.to_string()))?;

        let status = status
            .parse::<u16>()
            .ok()
            .and_then(|code| StatusCode::from_u16(code).ok())
            .ok_or_else(|| ParseFaultError::Status(status.to_string()))?;

        Ok(Fault {
            endpoint: endpoint.parse()?,
            status,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CatchAllStatus {
    #[serde(rename = "unknown")]
    Unknown,
    #[serde(rename = "catch-all")]
    CatchAll,
    #[serde(rename = "not catch-all")]
    NotCatchAll,
}

/// Body of `GET /domains/{domain}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DomainRecord {
    /// 0 for a domain that was never stored.
    pub id: u64,
    pub domain_name: String,
    pub delivered: u64,
    pub bounced: u64,
    pub is_catch_all: CatchAllStatus,
}

impl DomainRecord {
    fn new(domain_name: &str, counts: Counts) -> Self {
        let is_catch_all = if counts.id == 0 {
            CatchAllStatus::Unknown
        } else if counts.bounced > 0 {
            CatchAllStatus::NotCatchAll
        } else if counts.delivered > CATCH_ALL_THRESHOLD {
            CatchAllStatus::CatchAll
        } else {
            CatchAllStatus::Unknown
        };

        Self {
            id: counts.id,
            domain_name: domain_name.to_string(),
            delivered: counts.delivered,
            bounced: counts.bounced,
            is_catch_all,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Counts {
    id: u64,
    delivered: u64,
    bounced: u64,
}

struct Inner {
    domains: Mutex<HashMap<String, Counts>>,
    next_id: AtomicU64,
    // 0 means no fault
    faults: [AtomicU16; 3],
    hits: [AtomicU64; 3],
    served: AtomicU64,
    delay_ms: AtomicU64,
}

/// In-memory domain events service.
///
/// Cloning shares the same store, so a test can keep a handle to inject faults and inspect
/// counters while the router serves requests.
#[derive(Clone)]
pub struct MockService {
    inner: Arc<Inner>,
}

impl Default for MockService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockService {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                domains: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                faults: Default::default(),
                hits: Default::default(),
                served: AtomicU64::new(0),
                delay_ms: AtomicU64::new(0),
            }),
        }
    }

    /// Delay every response by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        self.inner
            .delay_ms
            .store(delay.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn fail(&self, fault: Fault) {
        self.inner.faults[fault.endpoint.index()]
            .store(fault.status.as_u16(), Ordering::Relaxed);
    }

    pub fn clear_faults(&self) {
        for fault in &self.inner.faults {
            fault.store(0, Ordering::Relaxed);
        }
    }

    /// Requests received by `endpoint`, including rejected ones.
    pub fn hits(&self, endpoint: Endpoint) -> u64 {
        self.inner.hits[endpoint.index()].load(Ordering::Relaxed)
    }

    /// Requests received by every endpoint.
    pub fn served(&self) -> u64 {
        self.inner.served.load(Ordering::Relaxed)
    }

    pub fn domain(&self, domain_name: &str) -> DomainRecord {
        let counts = self
            .inner
            .domains
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(domain_name)
            .copied()
            .unwrap_or_default();
        DomainRecord::new(domain_name, counts)
    }

    fn record(&self, domain_name: &str, endpoint: Endpoint) {
        let mut domains = self
            .inner
            .domains
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let counts = domains.entry(domain_name.to_string()).or_insert_with(|| Counts {
            id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
            ..Default::default()
        });

        match endpoint {
            Endpoint::Delivered => counts.delivered += 1,
            Endpoint::Bounced => counts.bounced += 1,
            Endpoint::GetDomain => {}
        }
    }

    /// Common request handling: counters, delay, injected faults and domain validation.
    async fn enter(&self, endpoint: Endpoint, domain_name: &str) -> Result<(), StatusCode> {
        self.inner.hits[endpoint.index()].fetch_add(1, Ordering::Relaxed);
        self.inner.served.fetch_add(1, Ordering::Relaxed);
        counter!("mock-service.requests", "endpoint" => endpoint.as_str()).increment(1);

        let delay_ms = self.inner.delay_ms.load(Ordering::Relaxed);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        let fault = self.inner.faults[endpoint.index()].load(Ordering::Relaxed);
        if fault != 0 {
            debug!("Injected fault {fault} for {}", endpoint.as_str());
            return Err(StatusCode::from_u16(fault).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR));
        }

        if !is_fqdn(domain_name) {
            info!("Bad domain name {domain_name:?}");
            return Err(StatusCode::BAD_REQUEST);
        }

        Ok(())
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/events/:domain/delivered", put(delivered))
            .route("/events/:domain/bounced", put(bounced))
            .route("/domains/:domain", get(get_domain))
            .layer(TraceLayer::new_for_http())
            .with_state(self.clone())
    }

    pub async fn serve(&self, listener: TcpListener) -> std::io::Result<()> {
        axum::serve(listener, self.router()).await
    }

    pub async fn run(&self, addr: SocketAddr) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!("Listening on {}", listener.local_addr()?);
        self.serve(listener).await
    }

    /// Serves on an ephemeral localhost port in the background.
    pub async fn spawn(&self) -> std::io::Result<SocketAddr> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let service = self.clone();
        tokio::spawn(async move {
            if let Err(err) = service.serve(listener).await {
                tracing::error!("Mock service stopped: {err}");
            }
        });

        Ok(addr)
    }
}

#[debug_handler]
async fn delivered(
    State(service): State<MockService>,
    Path(domain): Path<String>,
) -> Result<(), StatusCode> {
    service.enter(Endpoint::Delivered, &domain).await?;
    service.record(&domain, Endpoint::Delivered);
    Ok(())
}

#[debug_handler]
async fn bounced(
    State(service): State<MockService>,
    Path(domain): Path<String>,
) -> Result<(), StatusCode> {
    service.enter(Endpoint::Bounced, &domain).await?;
    service.record(&domain, Endpoint::Bounced);
    Ok(())
}

#[debug_handler]
async fn get_domain(
    State(service): State<MockService>,
    Path(domain): Path<String>,
) -> Result<Json<DomainRecord>, StatusCode> {
    service.enter(Endpoint::GetDomain, &domain).await?;
    Ok(Json(service.domain(&domain)))
}

/// Fully qualified domain name check: at least two dot separated labels of up to 63
/// alphanumerics or hyphens, each starting alphanumeric, with an alphabetic top-level label.
/// One trailing dot is allowed.
pub fn is_fqdn(name: &str) -> bool {
    let name = name.strip_suffix('.').unwrap_or(name);
    if name.is_empty() || name.len() > 253 {
        return false;
    }

    let labels: Vec<&str> = name.split('.').collect();
    let Some((tld, rest)) = labels.split_last() else {
        return false;
    };
    if rest.is_empty() {
        return false;
    }

    let label_ok = |label: &str| {
        let mut chars = label.chars();
        label.len() <= 63
            && chars.next().is_some_and(|c| c.is_ascii_alphanumeric())
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '-')
    };

    rest.iter().all(|&label| label_ok(label))
        && tld.len() <= 63
        && tld.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
        && tld.chars().all(|c| c.is_ascii_alphanumeric())
}

/** TPS Printer **/

pub async fn tps_measure_task(service: MockService) {
    let mut last = service.served();
    loop {
        tokio::time::sleep(Duration::from_millis(1000)).await;
        let served = service.served();
        let transactions = served - last;
        last = served;
        if transactions > 0 {
            info!("{transactions} TPS");
        }
        gauge!("mock-service.tps").set(transactions as f64);
    }
}
