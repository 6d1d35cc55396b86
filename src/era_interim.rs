//! The two ERA-Interim surface retrievals and the order they run in.

use std::env;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::info;

use crate::client::Retrieve;
use crate::date::DateSpec;
use crate::error::Result;
use crate::request::Request;
use crate::service::Retrieval;

pub const DEFAULT_WORKDIR: &str = "~/Projects/2017-agresults";

/// Surface analysis fields 165.128 and 41.128 at 00 UTC for September 2013.
pub fn surface_analysis_request() -> Request {
    Request::new()
        .stream("oper")
        .levtype("sfc")
        .param("165.128/41.128")
        .dataset("interim")
        .step("0")
        .grid("0.75/0.75")
        .time("00")
        .date("2013-09-01/to/2013-09-30")
        .r#type("an")
        .class("ei")
        .target("data/interim_2013-09-01-to-2013-09-30_00.grib")
}

/// 2-metre temperature (167.128) at 06 UTC.
pub fn two_metre_temperature_request() -> Request {
    Request::new()
        .class("ei")
        .dataset("interim")
        .date("2015-01-01/to/2017-03-31")
        .expver("1")
        .grid("0.75/0.75")
        .levtype("sfc")
        .param("167.128")
        .step("0")
        .stream("oper")
        .time("06:00:00")
        .r#type("an")
        .target("interim_2mtemp_2015-01-01-to-2017-03-31.grib")
}

/// Both requests in issue order.
pub fn requests() -> [Request; 2] {
    [surface_analysis_request(), two_metre_temperature_request()]
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest.trim_start_matches('/'),
        _ => return PathBuf::from(path),
    };
    match dirs::home_dir() {
        Some(home) if rest.is_empty() => home,
        Some(home) => home.join(rest),
        None => PathBuf::from(path),
    }
}

/// Switch to `workdir`, then retrieve the built-in requests one after the other.
pub fn run(workdir: &Path, retriever: &mut impl Retrieve) -> Result<Vec<Retrieval>> {
    run_requests(workdir, &requests(), retriever)
}

/// Switch to `workdir`, then retrieve `requests` in order, stopping at the first failure.
pub fn run_requests(
    workdir: &Path,
    requests: &[Request],
    retriever: &mut impl Retrieve,
) -> Result<Vec<Retrieval>> {
    enter_workdir(workdir)?;
    retrieve_all(requests, retriever)
}

/// Like [`run_requests`], but the client is built only after the directory
/// change, so relative credential paths resolve inside `workdir`.
pub fn run_with<R: Retrieve>(
    workdir: &Path,
    requests: &[Request],
    connect: impl FnOnce() -> Result<R>,
) -> Result<Vec<Retrieval>> {
    enter_workdir(workdir)?;
    let mut retriever = connect()?;
    retrieve_all(requests, &mut retriever)
}

pub fn enter_workdir(workdir: &Path) -> Result<()> {
    env::set_current_dir(workdir)?;
    info!("working directory is {}", workdir.display());
    Ok(())
}

pub fn retrieve_all(requests: &[Request], retriever: &mut impl Retrieve) -> Result<Vec<Retrieval>> {
    let mut out = Vec::with_capacity(requests.len());
    for (i, request) in requests.iter().enumerate() {
        info!(
            "request {}/{}: {}",
            i + 1,
            requests.len(),
            request.target_path().unwrap_or_default()
        );
        out.push(retriever.retrieve(request)?);
    }
    Ok(out)
}

/// Describe `requests` without touching the network or the working directory:
/// a comment line with the date coverage, then the JSON body, per request.
pub fn write_plan(out: &mut impl Write, requests: &[Request], now: DateTime<Utc>) -> Result<()> {
    for (i, r) in requests.iter().enumerate() {
        writeln!(out, "# request {}", i + 1)?;
        if let Some(date) = r.get_str("date") {
            let spec = DateSpec::parse(&date, now)?;
            writeln!(out, "# {spec} ({} day(s))", spec.days())?;
        }
        writeln!(out, "{}", serde_json::to_string_pretty(&r.to_json())?)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn pairs(r: &Request) -> Vec<(String, String)> {
        r.iter().map(|(k, v)| (k.clone(), v.to_wire())).collect()
    }

    fn expected(items: &[(&str, &str)]) -> Vec<(String, String)> {
        let mut v: Vec<(String, String)> = items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        v.sort();
        v
    }

    #[test]
    fn surface_analysis_literals() {
        let r = surface_analysis_request();
        assert_eq!(
            pairs(&r),
            expected(&[
                ("stream", "oper"),
                ("levtype", "sfc"),
                ("param", "165.128/41.128"),
                ("dataset", "interim"),
                ("step", "0"),
                ("grid", "0.75/0.75"),
                ("time", "00"),
                ("date", "2013-09-01/to/2013-09-30"),
                ("type", "an"),
                ("class", "ei"),
                ("target", "data/interim_2013-09-01-to-2013-09-30_00.grib"),
            ])
        );
    }

    #[test]
    fn two_metre_temperature_literals() {
        let r = two_metre_temperature_request();
        assert_eq!(
            pairs(&r),
            expected(&[
                ("class", "ei"),
                ("dataset", "interim"),
                ("date", "2015-01-01/to/2017-03-31"),
                ("expver", "1"),
                ("grid", "0.75/0.75"),
                ("levtype", "sfc"),
                ("param", "167.128"),
                ("step", "0"),
                ("stream", "oper"),
                ("time", "06:00:00"),
                ("type", "an"),
                ("target", "interim_2mtemp_2015-01-01-to-2017-03-31.grib"),
            ])
        );
    }

    #[test]
    fn temperature_request_is_second() {
        let [first, second] = requests();
        assert_eq!(first, surface_analysis_request());
        assert_eq!(second.get_str("param").as_deref(), Some("167.128"));
    }

    #[test]
    fn home_expansion() {
        assert_eq!(expand_home("/tmp/x"), PathBuf::from("/tmp/x"));
        assert_eq!(expand_home("~user/x"), PathBuf::from("~user/x"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/Projects/a"), home.join("Projects/a"));
            assert_eq!(expand_home("~"), home);
        }
    }

    /// Records the working directory seen at each call.
    struct Recorder {
        calls: Vec<(PathBuf, Request)>,
        fail_at: Option<usize>,
    }

    impl Retrieve for Recorder {
        fn retrieve(&mut self, request: &Request) -> Result<Retrieval> {
            if self.fail_at == Some(self.calls.len()) {
                return Err(Error::Api("boom".into()));
            }
            self.calls.push((env::current_dir()?, request.clone()));
            Ok(Retrieval {
                name: None,
                href: None,
                size: None,
                content_type: None,
                target: request.target_path().map(PathBuf::from),
                transferred: 0,
            })
        }
    }

    // Both scenarios live in one test: the working directory is process-wide.
    #[test]
    fn run_changes_directory_before_connecting_and_stops_on_failure() {
        let original = env::current_dir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let workdir = dir.path().canonicalize().unwrap();

        let mut rec = Recorder {
            calls: Vec::new(),
            fail_at: None,
        };
        let out = run(&workdir, &mut rec).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(rec.calls.len(), 2);
        for (cwd, _) in &rec.calls {
            assert_eq!(cwd.canonicalize().unwrap(), workdir);
        }
        assert_eq!(rec.calls[0].1, surface_analysis_request());
        assert_eq!(rec.calls[1].1, two_metre_temperature_request());

        let mut failing = Recorder {
            calls: Vec::new(),
            fail_at: Some(0),
        };
        assert!(run(&workdir, &mut failing).is_err());
        assert!(failing.calls.is_empty());

        let missing = workdir.join("does-not-exist");
        let mut untouched = Recorder {
            calls: Vec::new(),
            fail_at: None,
        };
        assert!(matches!(run(&missing, &mut untouched), Err(Error::Io(_))));
        assert!(untouched.calls.is_empty());

        // The client is built inside the new directory, never before the change.
        env::set_current_dir(&original).unwrap();
        let out = run_with(&workdir, &requests(), || {
            assert_eq!(env::current_dir()?.canonicalize()?, workdir);
            Ok(Recorder {
                calls: Vec::new(),
                fail_at: None,
            })
        })
        .unwrap();
        assert_eq!(out.len(), 2);

        let mut connected = false;
        let result = run_with(&missing, &requests(), || {
            connected = true;
            Ok(Recorder {
                calls: Vec::new(),
                fail_at: None,
            })
        });
        assert!(matches!(result, Err(Error::Io(_))));
        assert!(!connected);

        env::set_current_dir(original).unwrap();
    }

    #[test]
    fn plan_lists_both_requests_with_day_counts() {
        use chrono::TimeZone;

        let now = Utc.with_ymd_and_hms(2017, 4, 1, 0, 0, 0).unwrap();
        let mut buf = Vec::new();
        write_plan(&mut buf, &requests(), now).unwrap();
        let text = String::from_utf8(buf).unwrap();

        let first = text.find("# request 1").unwrap();
        let second = text.find("# request 2").unwrap();
        assert!(first < second);
        assert!(text.contains("# 2013-09-01 to 2013-09-30 (30 day(s))"));
        assert!(text.contains("# 2015-01-01 to 2017-03-31 (821 day(s))"));
        assert!(text[first..second].contains("data/interim_2013-09-01-to-2013-09-30_00.grib"));
        assert!(text[second..].contains("interim_2mtemp_2015-01-01-to-2017-03-31.grib"));
    }

    #[test]
    fn plan_rejects_unparseable_dates() {
        let now = Utc::now();
        let bad = Request::new().date("-100000000");
        let mut buf = Vec::new();
        assert!(matches!(
            write_plan(&mut buf, &[bad], now),
            Err(Error::InvalidRequest(_))
        ));
    }
}
