//! Translation of structured (JUnit-style XML) test reports into the
//! client's task forest.
//!
//! Each suite becomes a task nested under the caller-supplied parent, each
//! test case a task nested under its suite, all reported as start/finish
//! notification pairs. The report's own suite counters decide the suite
//! outcome; they are not recomputed from the children.

use std::collections::HashMap;
use std::path::Path;

use buildbridge_core::{
    Error, Result, TaskId, TestFinishData, TestNotifier, TestOutcome,
};
use quick_xml::events::{BytesStart, Event as XmlEvent};
use quick_xml::Reader;
use tracing::debug;

#[derive(Debug, Default)]
struct TestSuite {
    name: String,
    package: Option<String>,
    failures: u64,
    errors: u64,
    time_seconds: Option<f64>,
    cases: Vec<TestCase>,
}

#[derive(Debug, Default)]
struct TestCase {
    name: String,
    class_name: Option<String>,
    time_seconds: Option<f64>,
    detail: Option<CaseDetail>,
}

#[derive(Debug)]
struct CaseDetail {
    kind: DetailKind,
    message: Option<String>,
    error_type: Option<String>,
    content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DetailKind {
    Error,
    Failure,
    Skipped,
}

impl DetailKind {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "error" => Some(DetailKind::Error),
            "failure" => Some(DetailKind::Failure),
            "skipped" => Some(DetailKind::Skipped),
            _ => None,
        }
    }
}

fn parse_attrs(e: &BytesStart) -> HashMap<String, String> {
    e.attributes()
        .filter_map(|attr| attr.ok())
        .map(|attr| {
            let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
            let value = attr
                .unescape_value()
                .map(|v| v.to_string())
                .unwrap_or_default();
            (key, value)
        })
        .collect()
}

fn parse_report(content: &str, uri: &str) -> Result<Vec<TestSuite>> {
    let mut reader = Reader::from_str(content);
    reader.trim_text(true);

    let mut suites = Vec::new();
    let mut current_suite: Option<TestSuite> = None;
    let mut current_case: Option<TestCase> = None;
    let mut buf = Vec::new();
    // Truncated input surfaces as a bare Eof, not a parse error, so the
    // element balance has to be checked by hand
    let mut saw_root = false;
    let mut depth = 0usize;

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|e| {
            Error::resource_unavailable_with_source(uri, "malformed test report", e)
        })?;
        match event {
            XmlEvent::Start(ref e) | XmlEvent::Empty(ref e) => {
                if matches!(event, XmlEvent::Start(_)) {
                    depth += 1;
                }
                let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                let attrs = parse_attrs(e);
                match tag.as_str() {
                    "testsuites" => saw_root = true,
                    "testsuite" => {
                        saw_root = true;
                        current_suite = Some(TestSuite {
                            name: attrs.get("name").cloned().unwrap_or_default(),
                            package: attrs.get("package").cloned(),
                            failures: attrs
                                .get("failures")
                                .and_then(|v| v.parse().ok())
                                .unwrap_or(0),
                            errors: attrs
                                .get("errors")
                                .and_then(|v| v.parse().ok())
                                .unwrap_or(0),
                            time_seconds: attrs.get("time").and_then(|v| v.parse().ok()),
                            cases: Vec::new(),
                        });
                    }
                    "testcase" => {
                        current_case = Some(TestCase {
                            name: attrs.get("name").cloned().unwrap_or_default(),
                            class_name: attrs.get("classname").cloned(),
                            time_seconds: attrs.get("time").and_then(|v| v.parse().ok()),
                            detail: None,
                        });
                    }
                    other => {
                        if let (Some(kind), Some(case)) =
                            (DetailKind::from_tag(other), current_case.as_mut())
                        {
                            case.detail = Some(CaseDetail {
                                kind,
                                message: attrs.get("message").cloned(),
                                error_type: attrs.get("type").cloned(),
                                content: String::new(),
                            });
                        }
                    }
                }
                // Empty elements close immediately
                if matches!(event, XmlEvent::Empty(_)) {
                    match tag.as_str() {
                        "testsuite" => {
                            if let Some(suite) = current_suite.take() {
                                suites.push(suite);
                            }
                        }
                        "testcase" => {
                            if let (Some(case), Some(suite)) =
                                (current_case.take(), current_suite.as_mut())
                            {
                                suite.cases.push(case);
                            }
                        }
                        _ => {}
                    }
                }
            }
            XmlEvent::Text(ref e) => {
                if let Some(detail) = current_case.as_mut().and_then(|c| c.detail.as_mut()) {
                    let text = e.unescape().map_err(|err| {
                        Error::resource_unavailable_with_source(uri, "malformed test report", err)
                    })?;
                    detail.content.push_str(&text);
                }
            }
            XmlEvent::CData(ref e) => {
                if let Some(detail) = current_case.as_mut().and_then(|c| c.detail.as_mut()) {
                    detail
                        .content
                        .push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            XmlEvent::End(ref e) => {
                depth = depth.saturating_sub(1);
                match e.name().as_ref() {
                    b"testcase" => {
                        if let (Some(case), Some(suite)) =
                            (current_case.take(), current_suite.as_mut())
                        {
                            suite.cases.push(case);
                        }
                    }
                    b"testsuite" => {
                        if let Some(suite) = current_suite.take() {
                            suites.push(suite);
                        }
                    }
                    _ => {}
                }
            }
            XmlEvent::Eof => {
                if depth != 0 || !saw_root {
                    return Err(Error::resource_unavailable(uri, "malformed test report"));
                }
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(suites)
}

/// Reports the suites and cases of one structured test report as task
/// start/finish pairs under a caller-supplied parent task.
pub struct TestReportTranslator {
    parent: TaskId,
    notifier: TestNotifier,
}

impl TestReportTranslator {
    #[must_use]
    pub fn new(parent: TaskId, notifier: TestNotifier) -> Self {
        Self { parent, notifier }
    }

    /// Read, parse, and report the test report at `path`.
    ///
    /// An unreadable or unparsable report is a [`Error::ResourceUnavailable`];
    /// the caller decides how far to degrade.
    pub async fn parse_and_report(&self, path: &Path) -> Result<()> {
        let uri = path.display().to_string();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::resource_unavailable_with_source(&uri, "unreadable test report", e)
        })?;
        let suites = parse_report(&content, &uri)?;
        debug!(report = %uri, suites = suites.len(), "translating test report");

        for suite in suites {
            self.report_suite(suite).await;
        }
        Ok(())
    }

    async fn report_suite(&self, suite: TestSuite) {
        let suite_task = TaskId::child_of(&self.parent);
        self.notifier.start_test(&suite.name, &suite_task).await;

        for case in suite.cases {
            self.report_case(&suite_task, suite.package.clone(), case).await;
        }

        // The suite's own accounting decides, not the children
        let outcome = if suite.failures > 0 || suite.errors > 0 {
            TestOutcome::Failed
        } else {
            TestOutcome::Passed
        };
        let mut data = TestFinishData::bare(suite.name, outcome);
        data.duration_seconds = suite.time_seconds;
        data.package = suite.package;
        self.notifier.finish_test(&suite_task, data).await;
    }

    async fn report_case(&self, suite_task: &TaskId, package: Option<String>, case: TestCase) {
        let case_task = TaskId::child_of(suite_task);
        self.notifier.start_test(&case.name, &case_task).await;

        let outcome = match case.detail.as_ref().map(|d| d.kind) {
            Some(DetailKind::Error) | Some(DetailKind::Failure) => TestOutcome::Failed,
            Some(DetailKind::Skipped) => TestOutcome::Skipped,
            None => TestOutcome::Passed,
        };

        let mut data = TestFinishData::bare(case.name, outcome);
        data.duration_seconds = case.time_seconds;
        data.class_name = case.class_name;
        data.package = package;
        if let Some(detail) = case.detail {
            data.message = detail.message;
            data.full_output = Some(detail.content);
            // `skipped` carries no error type
            if detail.kind != DetailKind::Skipped {
                data.error_type = detail.error_type;
            }
        }
        self.notifier.finish_test(&case_task, data).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildbridge_core::notifier::{TaskFinishData, TaskStartData};
    use buildbridge_core::testing::RecordingNotifier;
    use std::io::Write;
    use std::sync::Arc;

    fn write_report(content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("test.xml");
        let mut file = std::fs::File::create(&path).expect("create report");
        file.write_all(content.as_bytes()).expect("write report");
        (dir, path)
    }

    fn finish_details(notifier: &RecordingNotifier) -> Vec<TestFinishData> {
        notifier
            .finishes()
            .into_iter()
            .filter_map(|p| match p.data {
                Some(TaskFinishData::TestFinish(data)) => Some(data),
                _ => None,
            })
            .collect()
    }

    const MIXED_REPORT: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<testsuites>
    <testsuite name="S" errors="0" failures="1" tests="3" time="0.080"
               timestamp="2024-05-17T19:23:31" hostname="host" package="com.example">
        <testcase classname="com.example.TestClass" name="t1" time="0.015" />
        <testcase classname="com.example.TestClass" name="t2" time="0.013">
            <failure message="boom" type="AssertionError">stack trace here</failure>
        </testcase>
        <testcase classname="com.example.TestClass" name="t3" time="0.001">
            <skipped />
        </testcase>
    </testsuite>
</testsuites>
"#;

    #[tokio::test]
    async fn reports_one_start_and_finish_per_suite_and_case() {
        let (_dir, path) = write_report(MIXED_REPORT);
        let notifier = Arc::new(RecordingNotifier::new());
        let translator = TestReportTranslator::new(
            TaskId::new("parent"),
            TestNotifier::new(notifier.clone(), Some("origin-1".to_string())),
        );

        translator.parse_and_report(&path).await.expect("translate");

        // 1 suite + 3 cases
        assert_eq!(notifier.starts().len(), 4);
        assert_eq!(notifier.finishes().len(), 4);

        let details = finish_details(&notifier);
        let t1 = details.iter().find(|d| d.display_name == "t1").unwrap();
        assert_eq!(t1.outcome, TestOutcome::Passed);

        let t2 = details.iter().find(|d| d.display_name == "t2").unwrap();
        assert_eq!(t2.outcome, TestOutcome::Failed);
        assert_eq!(t2.message.as_deref(), Some("boom"));
        assert_eq!(t2.error_type.as_deref(), Some("AssertionError"));
        assert_eq!(t2.full_output.as_deref(), Some("stack trace here"));
        assert_eq!(t2.class_name.as_deref(), Some("com.example.TestClass"));

        let t3 = details.iter().find(|d| d.display_name == "t3").unwrap();
        assert_eq!(t3.outcome, TestOutcome::Skipped);

        // Suite failed because it contains a failing case
        let suite = details.iter().find(|d| d.display_name == "S").unwrap();
        assert_eq!(suite.outcome, TestOutcome::Failed);
        assert_eq!(suite.package.as_deref(), Some("com.example"));
    }

    #[tokio::test]
    async fn task_ids_form_a_forest_under_the_parent() {
        let (_dir, path) = write_report(MIXED_REPORT);
        let notifier = Arc::new(RecordingNotifier::new());
        let translator = TestReportTranslator::new(
            TaskId::new("parent"),
            TestNotifier::new(notifier.clone(), None),
        );
        translator.parse_and_report(&path).await.expect("translate");

        let starts = notifier.starts();
        let suite_start = starts
            .iter()
            .find(|p| {
                matches!(&p.data, Some(TaskStartData::TestStart(d)) if d.display_name == "S")
            })
            .unwrap();
        assert_eq!(suite_start.task_id.parents, vec!["parent".to_string()]);

        for case_name in ["t1", "t2", "t3"] {
            let case_start = starts
                .iter()
                .find(|p| {
                    matches!(&p.data, Some(TaskStartData::TestStart(d)) if d.display_name == case_name)
                })
                .unwrap();
            assert_eq!(case_start.task_id.parents, vec![suite_start.task_id.id.clone()]);
        }
    }

    #[tokio::test]
    async fn suite_outcome_follows_the_reported_counters() {
        // The suite says zero failures even though a case carries a failure
        // tag; the suite's own accounting wins.
        let report = r#"<testsuites>
            <testsuite name="S" errors="0" failures="0" tests="1">
                <testcase name="t1" classname="C">
                    <failure message="late flake"></failure>
                </testcase>
            </testsuite>
        </testsuites>"#;
        let (_dir, path) = write_report(report);
        let notifier = Arc::new(RecordingNotifier::new());
        TestReportTranslator::new(TaskId::new("parent"), TestNotifier::new(notifier.clone(), None))
            .parse_and_report(&path)
            .await
            .expect("translate");

        let details = finish_details(&notifier);
        let suite = details.iter().find(|d| d.display_name == "S").unwrap();
        assert_eq!(suite.outcome, TestOutcome::Passed);
        let case = details.iter().find(|d| d.display_name == "t1").unwrap();
        assert_eq!(case.outcome, TestOutcome::Failed);
    }

    #[tokio::test]
    async fn missing_report_is_resource_unavailable() {
        let notifier = Arc::new(RecordingNotifier::new());
        let translator = TestReportTranslator::new(
            TaskId::new("parent"),
            TestNotifier::new(notifier.clone(), None),
        );
        let err = translator
            .parse_and_report(Path::new("/nonexistent/test.xml"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ResourceUnavailable { .. }));
        assert!(notifier.starts().is_empty());
    }

    #[tokio::test]
    async fn malformed_report_is_resource_unavailable() {
        // Truncated mid-tag: the parser reaches end of input with the root
        // element still open
        let (_dir, path) = write_report("<testsuites><testsuite name=");
        let notifier = Arc::new(RecordingNotifier::new());
        let translator = TestReportTranslator::new(
            TaskId::new("parent"),
            TestNotifier::new(notifier.clone(), None),
        );
        let err = translator.parse_and_report(&path).await.unwrap_err();
        assert!(matches!(err, Error::ResourceUnavailable { .. }));
    }

    #[tokio::test]
    async fn non_xml_content_is_resource_unavailable() {
        let (_dir, path) = write_report("definitely not a test report");
        let notifier = Arc::new(RecordingNotifier::new());
        let translator = TestReportTranslator::new(
            TaskId::new("parent"),
            TestNotifier::new(notifier.clone(), None),
        );
        let err = translator.parse_and_report(&path).await.unwrap_err();
        assert!(matches!(err, Error::ResourceUnavailable { .. }));
        assert!(notifier.starts().is_empty());
    }

    #[tokio::test]
    async fn empty_but_well_formed_report_is_ok() {
        let (_dir, path) = write_report("<testsuites></testsuites>");
        let notifier = Arc::new(RecordingNotifier::new());
        TestReportTranslator::new(TaskId::new("parent"), TestNotifier::new(notifier.clone(), None))
            .parse_and_report(&path)
            .await
            .expect("translate");
        assert!(notifier.starts().is_empty());
    }
}
