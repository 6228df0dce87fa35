//! Report rendering: the JSON envelope and the console summary.

use chrono::{DateTime, SecondsFormat, Utc};
use policydrift_kernel::{Change, ChangeOperation, ComparisonResult, ComparisonStatus};
use serde_json::{Value, json};
use uuid::Uuid;

pub const REPORT_SCHEMA: u32 = 1;
pub const REPORT_KIND: &str = "policydrift.comparison.v1";

/// Identity of one report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStamp {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
}

impl RunStamp {
    pub fn now() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
        }
    }
}

pub fn report_json(result: &ComparisonResult, stamp: &RunStamp) -> Value {
    json!({
        "schema": REPORT_SCHEMA,
        "kind": REPORT_KIND,
        "runId": stamp.run_id.to_string(),
        "generatedAt": stamp.generated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        "verdict": {
            "code": result.verdict.exit_code(),
            "label": result.verdict.label(),
        },
        "summary": result.summary,
        "comparisons": result.comparisons,
    })
}

pub fn render_console(result: &ComparisonResult) -> String {
    let summary = &result.summary;
    let mut lines = vec![
        format!(
            "policydrift: {} (exit {})",
            result.verdict.label(),
            result.verdict.exit_code()
        ),
        format!(
            "  policies: {} total, {} identical, {} different, {} only in live, {} only in reference, {} failed",
            summary.total,
            summary.identical,
            summary.different,
            summary.only_in_live,
            summary.only_in_reference,
            summary.failed
        ),
        format!(
            "  changes: {} critical, {} non-critical",
            summary.critical_changes, summary.non_critical_changes
        ),
    ];

    let listed: Vec<_> = result
        .comparisons
        .iter()
        .filter(|c| c.status != ComparisonStatus::Identical || !c.warnings.is_empty())
        .collect();
    if !listed.is_empty() {
        lines.push(String::new());
    }
    for comparison in listed {
        let marker = match comparison.status {
            ComparisonStatus::Identical => '=',
            ComparisonStatus::Different => '~',
            ComparisonStatus::OnlyInLive => '+',
            ComparisonStatus::OnlyInReference => '-',
            ComparisonStatus::Failed => '!',
        };
        let mut heading = format!("{marker} {} [{}]", comparison.name, comparison.status);
        if let Some(source) = &comparison.reference_source {
            heading.push_str(&format!(" ({source})"));
        }
        lines.push(heading);
        if let Some(error) = &comparison.error {
            lines.push(format!("    error: {error}"));
        }
        for change in &comparison.changes {
            lines.push(format!(
                "    {:<12} {:<6} {}: {}",
                change.severity.to_string(),
                change.operation.to_string(),
                change.path,
                change_detail(change)
            ));
        }
        for warning in &comparison.warnings {
            lines.push(format!("    warning: {warning}"));
        }
    }
    lines.join("\n")
}

fn change_detail(change: &Change) -> String {
    let show = |value: &Option<Value>| {
        value
            .as_ref()
            .map(Value::to_string)
            .unwrap_or_else(|| "null".to_string())
    };
    if !change.elements.is_empty() {
        let sign = match change.operation {
            ChangeOperation::Remove => '-',
            ChangeOperation::Add | ChangeOperation::Modify => '+',
        };
        return change
            .elements
            .iter()
            .map(|element| format!("{sign} {element}"))
            .collect::<Vec<_>>()
            .join(", ");
    }
    match change.operation {
        ChangeOperation::Add => format!("+ {}", show(&change.new_value)),
        ChangeOperation::Remove => format!("- {}", show(&change.old_value)),
        ChangeOperation::Modify => {
            format!("{} -> {}", show(&change.old_value), show(&change.new_value))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use policydrift_kernel::{
        CancellationFlag, ClassificationRules, MatchingOptions, NormalizationTables, Orchestrator,
        PolicyDocument, RunOutcome, RunSettings, ValueNormalizer,
    };

    fn sample_result() -> ComparisonResult {
        let live = vec![
            PolicyDocument::new(
                "1",
                "MFA Policy",
                json!({
                    "displayName": "MFA Policy",
                    "state": "disabled",
                    "conditions": {"users": {"excludeUsers": ["alice", "carol"]}}
                }),
            ),
            PolicyDocument::new("3", "New policy", json!({"state": "enabled"})),
        ];
        let reference = vec![
            PolicyDocument::new(
                "1",
                "MFA Policy",
                json!({
                    "displayName": "MFA Policy",
                    "state": "enabled",
                    "conditions": {"users": {"excludeUsers": ["alice", "bob"]}}
                }),
            )
            .with_source("mfa.json"),
            PolicyDocument::new("2", "Old policy", json!({"state": "enabled"}))
                .with_source("old.json"),
        ];

        let tables = NormalizationTables::builtin().expect("builtin tables");
        let orchestrator = Orchestrator::new(
            ValueNormalizer::new(&tables),
            ClassificationRules::default(),
            RunSettings::default(),
        );
        match orchestrator
            .run(
                &live,
                &reference,
                &MatchingOptions::default(),
                &CancellationFlag::new(),
            )
            .expect("run should succeed")
        {
            RunOutcome::Completed(result) => result,
            RunOutcome::Cancelled => panic!("not cancelled"),
        }
    }

    #[test]
    fn console_report_lists_every_non_identical_policy() {
        insta::assert_snapshot!(render_console(&sample_result()), @r#"
policydrift: blocking (exit 2)
  policies: 3 total, 0 identical, 1 different, 1 only in live, 1 only in reference, 0 failed
  changes: 3 critical, 0 non-critical

~ MFA Policy [different] (mfa.json)
    critical     add    conditions.users.excludeUsers: + "carol"
    critical     remove conditions.users.excludeUsers: - "bob"
    critical     modify state: "enabled" -> "disabled"
+ New policy [only in live]
- Old policy [only in reference] (old.json)
"#);
    }

    #[test]
    fn json_report_carries_envelope_fields() {
        let stamp = RunStamp {
            run_id: Uuid::nil(),
            generated_at: Utc
                .with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
                .single()
                .expect("valid timestamp"),
        };
        let report = report_json(&sample_result(), &stamp);

        assert_eq!(report["schema"], 1);
        assert_eq!(report["kind"], REPORT_KIND);
        assert_eq!(report["runId"], "00000000-0000-0000-0000-000000000000");
        assert_eq!(report["generatedAt"], "2024-05-01T12:00:00Z");
        assert_eq!(report["verdict"], json!({"code": 2, "label": "blocking"}));
        assert_eq!(report["summary"]["differingPolicies"], 3);
        assert_eq!(report["comparisons"][0]["status"], "different");
        assert_eq!(
            report["comparisons"][0]["changes"][0]["elements"],
            json!(["carol"])
        );
    }

    #[test]
    fn clean_run_has_only_the_summary_block() {
        let result = ComparisonResult {
            summary: Default::default(),
            verdict: policydrift_kernel::Verdict::Clean,
            comparisons: Vec::new(),
        };
        assert_eq!(render_console(&result).lines().count(), 3);
    }
}
