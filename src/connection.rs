use std::thread;
use std::time::Duration;

use reqwest::Method;
use reqwest::blocking::Client as HttpClient;
use reqwest::header::{ACCEPT, FROM, HeaderMap, HeaderName, HeaderValue, LOCATION, RETRY_AFTER, USER_AGENT};
use reqwest::redirect::Policy;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{ClientOptions, Credentials};
use crate::error::{Error, Result};

const X_ECMWF_KEY: &str = "x-ecmwf-key";

pub(crate) const USER_AGENT_VALUE: &str = concat!("ecmwf-webapi-rs/", env!("CARGO_PKG_VERSION"));

/// Outcome of a single HTTP exchange.
enum Attempt {
    Done(Option<Value>),
    /// Transient failure; the error is reported if retries run out.
    Retry(Error),
}

/// Stateful conversation with one Web API request: submit, poll, fetch result, delete.
#[derive(Debug)]
pub(crate) struct Connection {
    http: HttpClient,
    opts: ClientOptions,
    location: Option<Url>,
    retry: Duration,
    status: Option<String>,
    offset: u64,
    done: bool,
    last: Option<Value>,
    value: Option<Value>,
}

impl Connection {
    pub(crate) fn new(credentials: &Credentials, opts: ClientOptions) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        headers.insert(FROM, header_value("email", &credentials.email)?);
        headers.insert(HeaderName::from_static(X_ECMWF_KEY), header_value("key", &credentials.key)?);

        // 303 carries the final result in its body, so redirects are handled here.
        let mut builder = HttpClient::builder()
            .default_headers(headers)
            .redirect(Policy::none());
        if !opts.verify_tls {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let http = builder.build()?;

        Ok(Self {
            http,
            retry: opts.poll_interval,
            opts,
            location: None,
            status: None,
            offset: 0,
            done: false,
            last: None,
            value: None,
        })
    }

    pub(crate) fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub(crate) fn last(&self) -> Option<&Value> {
        self.last.as_ref()
    }

    pub(crate) fn ready(&self) -> bool {
        self.done
    }

    pub(crate) fn result(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub(crate) fn get(&mut self, url: &Url) -> Result<Option<Value>> {
        self.call(url, None, Method::GET)
    }

    pub(crate) fn submit(&mut self, url: &Url, payload: &Value) -> Result<Option<Value>> {
        self.call(url, Some(payload), Method::POST)
    }

    /// Sleep for the server-advertised interval, then poll the request location.
    pub(crate) fn wait(&mut self) -> Result<()> {
        let location = self
            .location
            .clone()
            .ok_or_else(|| Error::Api("no request location to poll".into()))?;
        debug!("sleeping {:?}", self.retry);
        thread::sleep(self.retry);
        self.call(&location, None, Method::GET)?;
        Ok(())
    }

    /// Delete the server-side request. Failures are logged and ignored.
    pub(crate) fn cleanup(&mut self) {
        let Some(location) = self.location.clone() else {
            return;
        };
        if let Err(e) = self.call(&location, None, Method::DELETE) {
            debug!("cleanup of {location} failed: {e}");
        }
    }

    fn call(&mut self, url: &Url, payload: Option<&Value>, method: Method) -> Result<Option<Value>> {
        let mut tries = 0;
        loop {
            match self.call_once(url, payload, method.clone())? {
                Attempt::Done(v) => return Ok(v),
                Attempt::Retry(e) => {
                    tries += 1;
                    if tries > self.opts.transient_retries {
                        return Err(e);
                    }
                    warn!(
                        "{method} {url} failed ({e}), retrying in {:?} ({tries}/{})",
                        self.opts.transient_backoff, self.opts.transient_retries
                    );
                    thread::sleep(self.opts.transient_backoff);
                }
            }
        }
    }

    fn call_once(&mut self, url: &Url, payload: Option<&Value>, method: Method) -> Result<Attempt> {
        let mut call_url = url.clone();
        call_url
            .query_pairs_mut()
            .append_pair("offset", &self.offset.to_string())
            .append_pair("limit", &self.opts.page_limit.to_string());

        debug!("{method} {call_url}");
        let mut req = self.http.request(method, call_url.clone());
        if let Some(p) = payload {
            req = req.json(p);
        }

        let resp = match req.send() {
            Ok(r) => r,
            Err(e) if e.is_connect() || e.is_timeout() => return Ok(Attempt::Retry(Error::Http(e))),
            Err(e) => return Err(e.into()),
        };

        let code = resp.status().as_u16();
        if is_transient_status(code) {
            let body = resp.text().unwrap_or_default();
            return Ok(Attempt::Retry(Error::Api(format!("HTTP {code}: {}", body.trim()))));
        }

        if let Some(secs) = resp
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            self.retry = Duration::from_secs(secs);
        }

        if code == 201 || code == 202 {
            if let Some(loc) = resp.headers().get(LOCATION).and_then(|v| v.to_str().ok()) {
                self.location = Some(call_url.join(loc)?);
            }
        }

        let body = resp.text()?;
        self.absorb(code, &body).map(Attempt::Done)
    }

    /// Update the conversation state from a response.
    fn absorb(&mut self, code: u16, body: &str) -> Result<Option<Value>> {
        debug!("HTTP {code}");
        if code == 204 {
            self.last = None;
            return Ok(None);
        }

        let last: Value = serde_json::from_str(body)
            .map_err(|e| Error::Api(format!("HTTP {code}, invalid JSON ({e}): {}", body.trim())))?;

        if let Some(status) = last.get("status").and_then(Value::as_str) {
            self.status = Some(status.to_string());
        }

        if let Some(messages) = last.get("messages").and_then(Value::as_array) {
            for m in messages {
                match m {
                    Value::String(s) => info!("{s}"),
                    other => info!("{other}"),
                }
                self.offset += 1;
            }
        }

        if code == 200 && self.status.as_deref() == Some("complete") {
            self.value = Some(last.get("result").cloned().unwrap_or_else(|| last.clone()));
            self.done = true;
        }
        if code == 303 {
            self.value = Some(last.clone());
            self.done = true;
        }

        self.last = Some(last.clone());

        if let Some(err) = last.get("error") {
            let msg = match err {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            return Err(Error::Api(msg));
        }
        if code >= 300 && code != 303 {
            return Err(Error::Api(format!("HTTP {code}: {}", body.trim())));
        }
        if let Some(status @ ("aborted" | "rejected")) = self.status.as_deref() {
            return Err(Error::Api(format!("request {status}")));
        }

        Ok(Some(last))
    }
}

/// 429 and server errors other than 501 are worth another attempt.
pub(crate) fn is_transient_status(code: u16) -> bool {
    code == 429 || (code >= 500 && code != 501)
}

fn header_value(what: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| Error::InvalidRequest(format!("{what} is not a valid HTTP header value")))
}
