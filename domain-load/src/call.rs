//! The three calls of an iteration and the failure rates they record into.
use crate::domain::random_domain;
use crate::error::LoadError;
use reqwest::{Client, Method, StatusCode};
use std::time::Duration;
use tracing::{info, trace};
use url::Url;
use volley::{transaction, Metrics, Rate};

pub const FAILED_DELIVERED: &str = "failed delivered calls";
pub const FAILED_BOUNCED: &str = "failed bounced calls";
pub const FAILED_GET_DOMAIN: &str = "failed get domain calls";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Call {
    /// `PUT /events/{domain}/delivered`
    Delivered,
    /// `PUT /events/{domain}/bounced`
    Bounced,
    /// `GET /domains/{domain}`
    GetDomain,
}

impl Call {
    /// In the order an iteration issues them.
    pub const ALL: [Call; 3] = [Call::Delivered, Call::Bounced, Call::GetDomain];

    pub fn method(&self) -> Method {
        match self {
            Call::Delivered | Call::Bounced => Method::PUT,
            Call::GetDomain => Method::GET,
        }
    }

    /// Request tag, also the `name` of the tagged `http_req_duration` sub-metric.
    pub fn tag(&self) -> &'static str {
        match self {
            Call::Delivered => "Delivered",
            Call::Bounced => "Bounced",
            Call::GetDomain => "GetDomain",
        }
    }

    /// Name of the rate metric the call's failures go into.
    pub fn metric(&self) -> &'static str {
        match self {
            Call::Delivered => FAILED_DELIVERED,
            Call::Bounced => FAILED_BOUNCED,
            Call::GetDomain => FAILED_GET_DOMAIN,
        }
    }

    pub fn url(&self, base: &str, domain: &str) -> String {
        match self {
            Call::Delivered => format!("{base}/events/{domain}/delivered"),
            Call::Bounced => format!("{base}/events/{domain}/bounced"),
            Call::GetDomain => format!("{base}/domains/{domain}"),
        }
    }

    /// Issues the call against a fresh random domain and records whether it failed.
    ///
    /// Anything but a 200 counts as a failure, including transport errors and timeouts.
    pub async fn issue(self, target: &Target, rates: &FailureRates) -> bool {
        let domain = random_domain(&mut rand::thread_rng());
        let url = self.url(&target.base, &domain);
        if self == Call::GetDomain {
            info!("{url}");
        }

        let mut request = target.client.request(self.method(), &url);
        if self.method() == Method::PUT {
            request = request.body("");
        }

        let res = transaction(self.tag(), request.send()).await;
        let failed = !matches!(&res, Ok(r) if r.status() == StatusCode::OK);
        match &res {
            Ok(r) if failed => trace!("{} {url} returned {}", self.method(), r.status()),
            Err(err) => trace!("{} {url} failed: {err}", self.method()),
            Ok(_) => {}
        }

        rates.get(self).add(failed);
        failed
    }
}

/// One rate metric per call, `true` samples being failures.
#[derive(Clone)]
pub struct FailureRates {
    delivered: Rate,
    bounced: Rate,
    get_domain: Rate,
}

impl FailureRates {
    pub fn register(metrics: &Metrics) -> Result<Self, LoadError> {
        Ok(Self {
            delivered: metrics.rate(FAILED_DELIVERED)?,
            bounced: metrics.rate(FAILED_BOUNCED)?,
            get_domain: metrics.rate(FAILED_GET_DOMAIN)?,
        })
    }

    pub fn get(&self, call: Call) -> &Rate {
        match call {
            Call::Delivered => &self.delivered,
            Call::Bounced => &self.bounced,
            Call::GetDomain => &self.get_domain,
        }
    }
}

/// Service under test and the client shared by every VU.
#[derive(Clone, Debug)]
pub struct Target {
    client: Client,
    base: String,
}

impl Target {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, LoadError> {
        let invalid = |reason: String| LoadError::BaseUrl {
            url: base_url.to_string(),
            reason,
        };

        let url = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme {}", url.scheme())));
        }
        if url.query().is_some() || url.fragment().is_some() {
            return Err(invalid("query and fragment are not allowed".to_string()));
        }

        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }
}
