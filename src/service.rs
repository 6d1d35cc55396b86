use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Instant;

use reqwest::blocking::Client as HttpClient;
use reqwest::header::{HeaderMap, HeaderValue, RANGE, USER_AGENT};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{ClientOptions, Credentials};
use crate::connection::{Connection, USER_AGENT_VALUE, is_transient_status};
use crate::error::{Error, Result};
use crate::request::Request;

/// Endpoint family a request is submitted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Service {
    /// Public datasets, e.g. `interim`: `<url>/datasets/<name>`.
    Dataset(String),
    /// Named services, e.g. `mars`: `<url>/services/<name>`.
    Named(String),
}

impl Service {
    pub fn url(&self, base: &str) -> Result<Url> {
        let base = base.trim_end_matches('/');
        let s = match self {
            Service::Dataset(name) => format!("{base}/datasets/{name}"),
            Service::Named(name) => format!("{base}/services/{name}"),
        };
        Ok(Url::parse(&s)?)
    }
}

/// Outcome of a completed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retrieval {
    pub name: Option<String>,
    pub href: Option<String>,
    pub size: Option<u64>,
    pub content_type: Option<String>,
    pub target: Option<PathBuf>,
    pub transferred: u64,
}

#[derive(Debug, Deserialize)]
struct ResultPayload {
    href: Option<String>,
    size: Option<u64>,
    #[serde(rename = "type")]
    content_type: Option<String>,
}

/// Outcome of one download attempt.
enum Transfer {
    /// Bytes now on disk in the target.
    Received(u64),
    /// Transient failure; the error is reported if retries run out.
    Failed(Error),
}

#[derive(Debug, Deserialize)]
struct WhoAmI {
    uid: Option<String>,
    full_name: Option<String>,
}

/// One request against a Web API service.
#[derive(Debug)]
pub struct ApiRequest {
    base_url: String,
    service_url: Url,
    opts: ClientOptions,
    connection: Connection,
    transfer: HttpClient,
}

impl ApiRequest {
    /// Opens the conversation with a `who-am-i` call, which also validates the key.
    pub fn new(credentials: &Credentials, service: Service, opts: ClientOptions) -> Result<Self> {
        let base_url = credentials.url.trim_end_matches('/').to_string();
        let service_url = service.url(&base_url)?;
        let connection = Connection::new(credentials, opts.clone())?;

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        let mut builder = HttpClient::builder().default_headers(headers);
        if !opts.verify_tls {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let transfer = builder.build()?;

        let mut req = Self {
            base_url,
            service_url,
            opts,
            connection,
            transfer,
        };
        req.welcome()?;
        if req.opts.show_news {
            req.news();
        }
        Ok(req)
    }

    fn welcome(&mut self) -> Result<()> {
        let url = Url::parse(&format!("{}/who-am-i", self.base_url))?;
        let user: WhoAmI = match self.connection.get(&url)? {
            Some(v) => serde_json::from_value(v)?,
            None => return Ok(()),
        };
        match (user.full_name.filter(|n| !n.is_empty()), user.uid) {
            (Some(name), _) => info!("Welcome {name}"),
            (None, Some(uid)) => info!("Welcome user '{uid}'"),
            (None, None) => info!("Welcome"),
        }
        Ok(())
    }

    fn news(&mut self) {
        let url = match Url::parse(&format!("{}/news", self.service_url)) {
            Ok(u) => u,
            Err(e) => {
                debug!("bad news url: {e}");
                return;
            }
        };
        match self.connection.get(&url) {
            Ok(Some(v)) => {
                if let Some(news) = v.get("news").and_then(Value::as_str) {
                    for line in news.lines() {
                        info!("{line}");
                    }
                }
            }
            Ok(None) => {}
            Err(e) => debug!("no news: {e}"),
        }
    }

    /// Submit `request`, block until the service finishes, then download the
    /// result into `target` when one is given. The server-side request is
    /// deleted afterwards whether or not this succeeded.
    pub fn execute(&mut self, request: &Request, target: Option<&Path>) -> Result<Retrieval> {
        let outcome = self.follow(request, target);
        self.connection.cleanup();
        outcome
    }

    fn follow(&mut self, request: &Request, target: Option<&Path>) -> Result<Retrieval> {
        let url = Url::parse(&format!("{}/requests", self.service_url))?;
        self.connection.submit(&url, &request.to_json())?;
        info!("Request submitted");

        let name = self
            .connection
            .last()
            .and_then(|v| v.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string);
        if let Some(n) = &name {
            info!("Request id: {n}");
        }

        let mut status = self.log_status(None);
        while !self.connection.ready() {
            self.connection.wait()?;
            status = self.log_status(status);
        }

        let value = self
            .connection
            .result()
            .cloned()
            .ok_or_else(|| Error::Api("request finished without a result".into()))?;
        let payload: ResultPayload = serde_json::from_value(value)?;

        let mut out = Retrieval {
            name,
            href: payload.href,
            size: payload.size,
            content_type: payload.content_type,
            target: target.map(Path::to_path_buf),
            transferred: 0,
        };

        if let Some(target) = target {
            let href = out
                .href
                .clone()
                .ok_or_else(|| Error::Api("result has no href".into()))?;
            let size = out
                .size
                .ok_or_else(|| Error::Api("result has no size".into()))?;
            out.transferred = self.download(&href, target, size)?;
            info!("Done");
        }

        Ok(out)
    }

    fn log_status(&self, previous: Option<String>) -> Option<String> {
        let current = self.connection.status().map(str::to_string);
        if current.is_some() && current != previous {
            info!("Request is {}", current.as_deref().unwrap_or_default());
        }
        current.or(previous)
    }

    /// Fetch `href` into `target`, resuming short or transiently failed transfers.
    fn download(&self, href: &str, target: &Path, size: u64) -> Result<u64> {
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        // A stale file would look like a partial transfer to resume.
        if target.exists() {
            File::create(target)?;
        }

        let mut attempt = self.transfer_once(href, target, size)?;
        let mut tries = 0;
        while tries < self.opts.transfer_retries {
            match &attempt {
                Transfer::Received(got) if *got == size => break,
                Transfer::Received(got) => warn!(
                    "Transfer interrupted ({got} of {size} bytes), resuming in {:?}...",
                    self.opts.transfer_backoff
                ),
                Transfer::Failed(e) => warn!(
                    "Transfer failed ({e}), resuming in {:?}...",
                    self.opts.transfer_backoff
                ),
            }
            tries += 1;
            thread::sleep(self.opts.transfer_backoff);
            attempt = self.transfer_once(href, target, size)?;
        }

        match attempt {
            Transfer::Received(got) if got == size => Ok(got),
            Transfer::Received(got) => Err(Error::SizeMismatch {
                expected: size,
                actual: got,
            }),
            Transfer::Failed(e) => Err(e),
        }
    }

    fn transfer_once(&self, href: &str, target: &Path, size: u64) -> Result<Transfer> {
        let existing = match fs::metadata(target) {
            Ok(m) => m.len(),
            Err(_) => 0,
        };

        info!("Transferring {} into {}", bytename(size), target.display());
        info!("From {href}");

        let mut req = self.transfer.get(href);
        if existing > 0 {
            req = req.header(RANGE, format!("bytes={existing}-"));
        }
        let resp = match req.send() {
            Ok(r) => r,
            Err(e) if e.is_connect() || e.is_timeout() => return Ok(Transfer::Failed(Error::Http(e))),
            Err(e) => return Err(e.into()),
        };
        let code = resp.status().as_u16();
        if is_transient_status(code) {
            return Ok(Transfer::Failed(Error::Api(format!("HTTP {code} from {href}"))));
        }
        let mut resp = resp.error_for_status()?;

        let mut file = if existing > 0 && resp.status() == StatusCode::PARTIAL_CONTENT {
            OpenOptions::new().append(true).open(target)?
        } else {
            if existing > 0 {
                debug!("server ignored range request, restarting transfer");
            }
            File::create(target)?
        };

        let start = Instant::now();
        if let Err(e) = resp.copy_to(&mut file) {
            warn!("transfer of {href} cut short: {e}");
        }
        file.flush()?;
        drop(file);

        let total = fs::metadata(target)?.len();
        let elapsed = start.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            let moved = total.saturating_sub(existing) as f64;
            info!("Transfer rate {}/s", bytename((moved / elapsed) as u64));
        }
        Ok(Transfer::Received(total))
    }
}

/// Human-readable byte count, e.g. `1.5 Mbytes`.
pub fn bytename(size: u64) -> String {
    const PREFIXES: [&str; 7] = ["", "K", "M", "G", "T", "P", "E"];
    let mut value = size as f64;
    let mut i = 0;
    while value > 1024.0 && i + 1 < PREFIXES.len() {
        value /= 1024.0;
        i += 1;
    }
    let plural = if size == 1 { "" } else { "s" };
    if i == 0 {
        format!("{size} byte{plural}")
    } else {
        format!("{value:.1} {}byte{plural}", PREFIXES[i])
    }
}
