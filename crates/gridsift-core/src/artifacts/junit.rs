//! JUnit XML report parsing
//!
//! Accepts a `<testsuites>` or a bare `<testsuite>` root; nested suites are
//! flattened. Each `<testcase>` becomes one `TestResult`.

use super::{ArtifactClient, ArtifactError, ArtifactResult};
use crate::{BuildMeta, TestResult, TestStatus, sanitize_text_checked};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use rayon::prelude::*;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Upper bound for a message used as test output
pub const MAX_MESSAGE_LEN: usize = 1 << 20;

/// Prefix of captured output that contained invalid UTF-8
pub const INVALID_UTF8_PREFIX: &str = "invalid utf8: ";

#[derive(Error, Debug)]
pub enum JunitError {
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("{0}")]
    Structure(String),
}

/// Which part of a test case the reader is currently inside
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Failure,
    Error,
    Skipped,
    SystemOut,
    SystemErr,
}

/// A `<failure>`, `<error>` or `<skipped>` marker
#[derive(Debug, Default)]
struct Marker {
    message: String,
    body: String,
}

impl Marker {
    fn text(&self) -> &str {
        if self.message.is_empty() {
            &self.body
        } else {
            &self.message
        }
    }
}

#[derive(Debug, Default)]
struct CaseBuilder {
    name: String,
    failure: Option<Marker>,
    error: Option<Marker>,
    skipped: Option<Marker>,
    system_out: Option<String>,
    system_out_repaired: bool,
    system_err: Option<String>,
    field: Option<Field>,
}

impl CaseBuilder {
    fn start(e: &BytesStart<'_>) -> Result<Self, JunitError> {
        Ok(Self {
            name: attribute(e, b"name")?.unwrap_or_default(),
            ..Default::default()
        })
    }

    fn open(&mut self, e: &BytesStart<'_>) -> Result<Option<Field>, JunitError> {
        let field = match e.local_name().as_ref() {
            b"failure" => Field::Failure,
            b"error" => Field::Error,
            b"skipped" => Field::Skipped,
            b"system-out" => Field::SystemOut,
            b"system-err" => Field::SystemErr,
            _ => return Ok(None),
        };

        match field {
            Field::Failure | Field::Error | Field::Skipped => {
                let marker = Marker {
                    message: attribute(e, b"message")?.unwrap_or_default(),
                    body: String::new(),
                };
                *self.marker_slot(field) = Some(marker);
            }
            Field::SystemOut => {
                self.system_out.get_or_insert_with(String::new);
            }
            Field::SystemErr => {
                self.system_err.get_or_insert_with(String::new);
            }
        }
        Ok(Some(field))
    }

    fn marker_slot(&mut self, field: Field) -> &mut Option<Marker> {
        match field {
            Field::Failure => &mut self.failure,
            Field::Error => &mut self.error,
            _ => &mut self.skipped,
        }
    }

    fn push_text(&mut self, text: &str, repaired: bool) {
        let Some(field) = self.field else {
            return;
        };
        if field == Field::SystemOut {
            self.system_out_repaired |= repaired;
        }
        let target = match field {
            Field::SystemOut => self.system_out.as_mut(),
            Field::SystemErr => self.system_err.as_mut(),
            marker => self.marker_slot(marker).as_mut().map(|m| &mut m.body),
        };
        if let Some(target) = target {
            target.push_str(text);
        }
    }

    fn finish(mut self) -> TestResult {
        let status = if self.failure.is_some() {
            TestStatus::Failure
        } else if self.error.is_some() {
            TestStatus::Error
        } else if self.skipped.is_some() {
            TestStatus::Skipped
        } else {
            TestStatus::Success
        };

        let output = match self.system_out.take() {
            Some(out) if self.system_out_repaired => format!("{}{}", INVALID_UTF8_PREFIX, out),
            Some(out) => out,
            None => truncate(self.message(), MAX_MESSAGE_LEN),
        };

        TestResult {
            test: self.name,
            status,
            output,
        }
    }

    /// Most relevant diagnostic text when no output was captured
    fn message(&self) -> &str {
        let markers = [&self.error, &self.failure, &self.skipped];
        for marker in markers.into_iter().flatten() {
            if !marker.text().is_empty() {
                return marker.text();
            }
        }
        self.system_err.as_deref().unwrap_or_default()
    }
}

fn attribute(e: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>, JunitError> {
    for attr in e.attributes().flatten() {
        if attr.key.local_name().as_ref() == name {
            let (value, _) = decode_text(&attr.value)?;
            return Ok(Some(value));
        }
    }
    Ok(None)
}

/// Decode raw escaped text, replacing invalid UTF-8 and NUL bytes
fn decode_text(raw: &[u8]) -> Result<(String, bool), JunitError> {
    let (text, repaired) = sanitize_text_checked(raw);
    let text = quick_xml::escape::unescape(&text)
        .map_err(|err| JunitError::Structure(format!("bad text content: {}", err)))?
        .into_owned();
    Ok((text, repaired))
}

/// Keep the head and tail of an over-long message around a `...` marker
pub fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let half = max / 2;

    let mut head = half;
    while !s.is_char_boundary(head) {
        head -= 1;
    }
    let mut tail = s.len() - half;
    while !s.is_char_boundary(tail) {
        tail += 1;
    }
    format!("{}...{}", &s[..head], &s[tail..])
}

/// Parse one JUnit document
///
/// Invalid UTF-8 and NUL bytes in text and attribute values are replaced
/// with `?`. Captured output that needed such a repair is prefixed with
/// `invalid utf8: `.
pub fn parse_report(data: &[u8]) -> Result<Vec<TestResult>, JunitError> {
    let mut reader = Reader::from_reader(data);

    let mut results = Vec::new();
    let mut depth = 0usize;
    let mut seen_root = false;
    let mut case: Option<CaseBuilder> = None;

    loop {
        match reader.read_event()? {
            Event::Start(ref e) => {
                if !seen_root {
                    check_root(e)?;
                    seen_root = true;
                }
                depth += 1;

                match case.as_mut() {
                    Some(builder) => {
                        if e.local_name().as_ref() == b"testcase" {
                            return Err(JunitError::Structure("nested <testcase>".to_string()));
                        }
                        if builder.field.is_none() {
                            builder.field = builder.open(e)?;
                        }
                    }
                    None if e.local_name().as_ref() == b"testcase" => {
                        case = Some(CaseBuilder::start(e)?);
                    }
                    None => {}
                }
            }
            Event::Empty(ref e) => {
                if !seen_root {
                    check_root(e)?;
                    seen_root = true;
                }

                match case.as_mut() {
                    Some(builder) => {
                        if e.local_name().as_ref() == b"testcase" {
                            return Err(JunitError::Structure("nested <testcase>".to_string()));
                        }
                        if builder.field.is_none() {
                            builder.open(e)?;
                        }
                    }
                    None if e.local_name().as_ref() == b"testcase" => {
                        results.push(CaseBuilder::start(e)?.finish());
                    }
                    None => {}
                }
            }
            Event::End(ref e) => {
                depth = depth.saturating_sub(1);
                let name = e.local_name();

                if name.as_ref() == b"testcase" {
                    if let Some(builder) = case.take() {
                        results.push(builder.finish());
                    }
                } else if let Some(builder) = case.as_mut() {
                    let closes_field = matches!(
                        (builder.field, name.as_ref()),
                        (Some(Field::Failure), b"failure")
                            | (Some(Field::Error), b"error")
                            | (Some(Field::Skipped), b"skipped")
                            | (Some(Field::SystemOut), b"system-out")
                            | (Some(Field::SystemErr), b"system-err")
                    );
                    if closes_field {
                        builder.field = None;
                    }
                }
            }
            Event::Text(ref e) => {
                if let Some(builder) = case.as_mut() {
                    let (text, repaired) = decode_text(e)?;
                    builder.push_text(&text, repaired);
                }
            }
            Event::CData(ref e) => {
                if let Some(builder) = case.as_mut() {
                    let (text, repaired) = sanitize_text_checked(e);
                    builder.push_text(&text, repaired);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !seen_root {
        return Err(JunitError::Structure("document has no root element".to_string()));
    }
    if depth != 0 || case.is_some() {
        return Err(JunitError::Structure("unexpected end of document".to_string()));
    }
    Ok(results)
}

fn check_root(e: &BytesStart<'_>) -> Result<(), JunitError> {
    match e.local_name().as_ref() {
        b"testsuites" | b"testsuite" => Ok(()),
        other => Err(JunitError::Structure(format!(
            "unexpected root element <{}>",
            String::from_utf8_lossy(other)
        ))),
    }
}

impl ArtifactClient {
    /// Collect the results of every JUnit report of a build
    ///
    /// Reports are visited in path order and decoded on the parser pool. Any
    /// report that fails to parse fails the whole build.
    pub async fn test_results(&self, meta: &BuildMeta) -> ArtifactResult<Vec<TestResult>> {
        let build = &meta.build;
        let mut reports = Vec::new();
        for object in meta.files.iter().filter(|f| self.patterns().report.is_match(f)) {
            let data = self.cache().fetch(&build.bucket, object).await?;
            reports.push((object.clone(), data));
        }
        if reports.is_empty() {
            return Ok(Vec::new());
        }
        debug!("Parsing {} reports of {}", reports.len(), build);

        let pool = Arc::clone(&self.pool);
        let parsed = tokio::task::spawn_blocking(move || {
            pool.install(|| {
                reports
                    .par_iter()
                    .map(|(object, data)| {
                        parse_report(data).map_err(|e| (object.clone(), e.to_string()))
                    })
                    .collect::<Vec<_>>()
            })
        })
        .await
        .map_err(|e| ArtifactError::Pool(e.to_string()))?;

        let mut results = Vec::new();
        for report in parsed {
            match report {
                Ok(cases) => results.extend(cases),
                Err((object, reason)) => {
                    return Err(ArtifactError::MalformedReport {
                        bucket: build.bucket.clone(),
                        object,
                        reason,
                    });
                }
            }
        }
        Ok(results)
    }
}
