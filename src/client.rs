use std::path::Path;

use tracing::info;

use crate::config::{ClientOptions, Credentials};
use crate::error::{Error, Result};
use crate::request::Request;
use crate::service::{ApiRequest, Retrieval, Service};

/// Something that can turn a request into a file on disk.
pub trait Retrieve {
    fn retrieve(&mut self, request: &Request) -> Result<Retrieval>;
}

/// Client for the public datasets (`ERA-Interim`, ...) of the Web API.
#[derive(Debug, Clone)]
pub struct DataServer {
    credentials: Credentials,
    opts: ClientOptions,
}

impl DataServer {
    pub fn new(credentials: Credentials, opts: ClientOptions) -> Self {
        Self { credentials, opts }
    }

    /// Credentials from the environment or `~/.ecmwfapirc`, default options.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(Credentials::from_env()?, ClientOptions::default()))
    }
}

impl Retrieve for DataServer {
    /// The request must name its `dataset`; `target`, when present, receives the file.
    fn retrieve(&mut self, request: &Request) -> Result<Retrieval> {
        let dataset = request
            .dataset_name()
            .ok_or_else(|| Error::InvalidRequest("dataset keyword is required".into()))?;
        let target = request.target_path();
        info!(dataset = %dataset, target = ?target, "retrieving");

        let mut api = ApiRequest::new(&self.credentials, Service::Dataset(dataset), self.opts.clone())?;
        api.execute(request, target.as_deref().map(Path::new))
    }
}

/// Client for a named service such as MARS (`services/mars`).
#[derive(Debug, Clone)]
pub struct MarsService {
    name: String,
    credentials: Credentials,
    opts: ClientOptions,
}

impl MarsService {
    pub fn new(name: impl Into<String>, credentials: Credentials, opts: ClientOptions) -> Self {
        Self {
            name: name.into(),
            credentials,
            opts,
        }
    }

    pub fn execute(&self, request: &Request, target: impl AsRef<Path>) -> Result<Retrieval> {
        let mut api = ApiRequest::new(
            &self.credentials,
            Service::Named(self.name.clone()),
            self.opts.clone(),
        )?;
        api.execute(request, Some(target.as_ref()))
    }
}

impl Retrieve for MarsService {
    fn retrieve(&mut self, request: &Request) -> Result<Retrieval> {
        let target = request
            .target_path()
            .ok_or_else(|| Error::InvalidRequest("target keyword is required".into()))?;
        self.execute(request, target)
    }
}
