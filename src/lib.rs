#![forbid(unsafe_code)]

//! Rust client for the ECMWF Web API.
//!
//! Requests are MARS-like keyword/value mappings. The client submits them to a
//! dataset (`datasets/<name>`) or service (`services/<name>`) endpoint, polls
//! until the job completes, downloads the result to the request's `target`,
//! and deletes the job on the server.
//!
//! Credentials come from `ECMWF_API_KEY`/`ECMWF_API_URL`/`ECMWF_API_EMAIL` or
//! from the JSON file `~/.ecmwfapirc`.
//!
//! **Quick start**
//! ```no_run
//! use ecmwf_webapi::{DataServer, Request, Retrieve};
//!
//! let mut server = DataServer::from_env()?;
//! let req = Request::new()
//!     .class("ei")
//!     .dataset("interim")
//!     .date("2015-01-01/to/2015-01-31")
//!     .expver("1")
//!     .grid("0.75/0.75")
//!     .levtype("sfc")
//!     .param("167.128")
//!     .step("0")
//!     .stream("oper")
//!     .time("12:00:00")
//!     .r#type("an")
//!     .target("t2m.grib");
//! let result = server.retrieve(&req)?;
//! println!("{} bytes", result.transferred);
//! # Ok::<(), ecmwf_webapi::Error>(())
//! ```
//!
//! Access to the archive is governed by ECMWF's licence for the dataset in use.

mod client;
mod config;
mod connection;
mod date;
mod error;
mod request;
mod service;

pub mod era_interim;
pub mod logging;

pub use crate::client::{DataServer, MarsService, Retrieve};
pub use crate::config::{ClientOptions, Credentials, DEFAULT_API_URL};
pub use crate::date::DateSpec;
pub use crate::error::{Error, Result};
pub use crate::request::{Request, RequestValue};
pub use crate::service::{ApiRequest, Retrieval, Service, bytename};
