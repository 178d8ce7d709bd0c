//! Report generation
//!
//! Renders the outcome of a host run as a TXT table or as JSON.

use crate::host::OperationOutcome;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use completion_trampoline::FaultPolicy;
use serde::Serialize;
use std::fmt;

/// Everything one host run produced
#[derive(Debug, Clone, Serialize)]
pub struct HostReport {
    pub generated_at: DateTime<Utc>,
    pub trampoline: String,
    pub fault_policy: FaultPolicy,
    pub workers: usize,
    pub summary: Summary,
    pub operations: Vec<OperationOutcome>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub operations: usize,
    pub delivered: usize,
    pub invoked: usize,
    pub rejected: usize,
}

impl HostReport {
    pub fn new(
        trampoline: &str,
        fault_policy: FaultPolicy,
        workers: usize,
        operations: Vec<OperationOutcome>,
    ) -> Self {
        let summary = Summary {
            operations: operations.len(),
            delivered: operations.iter().map(|op| op.delivered as usize).sum(),
            invoked: operations.iter().map(|op| op.invoked).sum(),
            rejected: operations.iter().map(|op| op.rejected()).sum(),
        };
        Self {
            generated_at: Utc::now(),
            trampoline: trampoline.to_string(),
            fault_policy,
            workers,
            summary,
            operations,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize report")
    }

    pub fn to_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for HostReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "═══════════════════════════════════════════════")?;
        writeln!(f, "  Completion Host Report")?;
        writeln!(f, "═══════════════════════════════════════════════")?;
        writeln!(f, "Generated:    {}", self.generated_at.format("%Y-%m-%d %H:%M:%S%.3f UTC"))?;
        writeln!(f, "Trampoline:   {}", self.trampoline)?;
        writeln!(f, "Fault policy: {}", self.fault_policy)?;
        writeln!(f, "Workers:      {}", self.workers)?;
        writeln!(f)?;

        writeln!(
            f,
            "{:<24} {:>9} {:>8} {:>9}  {}",
            "OPERATION", "DELIVERED", "INVOKED", "REJECTED", "RESULT"
        )?;
        writeln!(f, "{}", "-".repeat(72))?;
        for op in &self.operations {
            let result = match op.invocations.first() {
                Some(inv) => format!(
                    "code={} result={} on {}",
                    inv.code,
                    inv.result.map_or_else(|| "null".to_string(), |v| v.to_string()),
                    inv.thread
                ),
                None => "not invoked".to_string(),
            };
            writeln!(
                f,
                "{:<24} {:>9} {:>8} {:>9}  {}",
                op.name,
                op.delivered,
                op.invoked,
                op.rejected(),
                result
            )?;
        }

        writeln!(f, "{}", "-".repeat(72))?;
        writeln!(
            f,
            "{} operations, {} delivered, {} invoked, {} rejected",
            self.summary.operations, self.summary.delivered, self.summary.invoked, self.summary.rejected
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Invocation;

    fn outcome(name: &str, delivered: u32, invoked: usize) -> OperationOutcome {
        let invocations = (0..invoked)
            .map(|_| Invocation {
                operation: name.to_string(),
                code: -3,
                result: None,
                thread: "host-worker-0".to_string(),
                completed_at: Utc::now(),
            })
            .collect();
        OperationOutcome {
            name: name.to_string(),
            delivered,
            invoked,
            consumed: true,
            invocations,
        }
    }

    #[test]
    fn test_summary_totals() {
        let report = HostReport::new(
            "in-process",
            FaultPolicy::Log,
            2,
            vec![outcome("a", 1, 1), outcome("b", 3, 1)],
        );
        assert_eq!(
            report.summary,
            Summary {
                operations: 2,
                delivered: 4,
                invoked: 2,
                rejected: 2,
            }
        );
    }

    #[test]
    fn test_text_report_lists_operations() {
        let report = HostReport::new("in-process", FaultPolicy::Log, 1, vec![outcome("lookup", 2, 1)]);
        let text = report.to_text();
        assert!(text.contains("lookup"));
        assert!(text.contains("code=-3 result=null on host-worker-0"));
        assert!(text.contains("1 operations, 2 delivered, 1 invoked, 1 rejected"));
        assert_eq!(text, report.to_string());
    }

    #[test]
    fn test_json_report() {
        let report = HostReport::new("in-process", FaultPolicy::Abort, 1, vec![outcome("x", 1, 1)]);
        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(value["fault_policy"], "abort");
        assert_eq!(value["summary"]["invoked"], 1);
        assert_eq!(value["operations"][0]["invocations"][0]["code"], -3);
    }
}
