//! Fleet run report generation.

use crate::catalog::Catalog;
use crate::stats::LatencyStats;
use fleetsim_core::DeviceKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// What a simulator invocation does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    /// Build the device catalog only
    Provision,
    /// Build the catalog, then send telemetry
    Run,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Provision => write!(f, "provision"),
            RunMode::Run => write!(f, "run"),
        }
    }
}

/// A device that dropped out, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFailure {
    pub device_id: String,
    pub reason: String,
}

/// Complete fleet run report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetReport {
    // Configuration
    pub mode: RunMode,
    pub devices_requested: usize,
    pub interval: Duration,

    // Provisioning
    pub devices_provisioned: usize,
    pub by_kind: BTreeMap<DeviceKind, usize>,
    pub provisioning_failures: Vec<DeviceFailure>,

    // Dispatch
    pub devices_connected: u64,
    pub connection_failures: Vec<DeviceFailure>,
    /// Devices whose loop panicked
    pub panicked_devices: Vec<String>,
    pub messages_sent: u64,
    pub send_failures: u64,
    pub bytes_sent: u64,
    pub send_latency: LatencyStats,
    pub duration: Duration,
}

impl FleetReport {
    /// Starts a report from the provisioning result; dispatch fields are zero.
    pub fn from_catalog(
        mode: RunMode,
        devices_requested: usize,
        interval: Duration,
        catalog: &Catalog,
    ) -> Self {
        Self {
            mode,
            devices_requested,
            interval,
            devices_provisioned: catalog.len(),
            by_kind: catalog.count_by_kind(),
            provisioning_failures: catalog
                .failures
                .iter()
                .map(|f| DeviceFailure {
                    device_id: f.device_id.clone(),
                    reason: f.error.to_string(),
                })
                .collect(),
            devices_connected: 0,
            connection_failures: Vec::new(),
            panicked_devices: Vec::new(),
            messages_sent: 0,
            send_failures: 0,
            bytes_sent: 0,
            send_latency: LatencyStats::default(),
            duration: Duration::ZERO,
        }
    }

    pub fn messages_per_second(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.messages_sent as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.provisioning_failures.is_empty()
            || !self.connection_failures.is_empty()
            || !self.panicked_devices.is_empty()
            || self.send_failures > 0
    }

    /// Generates a markdown report.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str("# Fleet Simulator Report\n\n");

        md.push_str("## Configuration\n\n");
        md.push_str("| Setting | Value |\n");
        md.push_str("|---------|-------|\n");
        md.push_str(&format!("| Mode | {} |\n", self.mode));
        md.push_str(&format!("| Devices Requested | {} |\n", self.devices_requested));
        md.push_str(&format!(
            "| Send Interval | {:.1}s |\n",
            self.interval.as_secs_f64()
        ));
        md.push('\n');

        md.push_str("## Provisioning\n\n");
        md.push_str("| Kind | Devices |\n");
        md.push_str("|------|---------|\n");
        for (kind, count) in &self.by_kind {
            md.push_str(&format!("| {} | {} |\n", kind, format_number(*count as u64)));
        }
        md.push_str(&format!(
            "| **Total** | {} |\n",
            format_number(self.devices_provisioned as u64)
        ));
        md.push('\n');
        push_failures(&mut md, "Provisioning Failures", &self.provisioning_failures);

        if self.mode == RunMode::Run {
            md.push_str("## Telemetry\n\n");
            md.push_str("| Metric | Value |\n");
            md.push_str("|--------|-------|\n");
            md.push_str(&format!("| Devices Connected | {} |\n", self.devices_connected));
            md.push_str(&format!(
                "| Messages Sent | {} |\n",
                format_number(self.messages_sent)
            ));
            md.push_str(&format!("| Bytes | {} |\n", format_bytes(self.bytes_sent)));
            md.push_str(&format!(
                "| Throughput | {:.1} messages/s |\n",
                self.messages_per_second()
            ));
            md.push_str(&format!("| Send Failures | {} |\n", self.send_failures));
            md.push('\n');

            md.push_str("### Send Latency\n\n");
            md.push_str("| Percentile | Latency |\n");
            md.push_str("|------------|--------|\n");
            if self.send_latency.count > 0 {
                for (name, us) in [
                    ("p50", self.send_latency.p50_us),
                    ("p95", self.send_latency.p95_us),
                    ("p99", self.send_latency.p99_us),
                    ("max", self.send_latency.max_us),
                ] {
                    md.push_str(&format!("| {} | {:.2}ms |\n", name, us as f64 / 1000.0));
                }
            } else {
                md.push_str("| N/A | No data |\n");
            }
            md.push('\n');
            push_failures(&mut md, "Connection Failures", &self.connection_failures);
            if !self.panicked_devices.is_empty() {
                md.push_str("### Panicked Devices\n\n");
                for device_id in &self.panicked_devices {
                    md.push_str(&format!("- {}\n", device_id));
                }
                md.push('\n');
            }
        }

        md.push_str("## Summary\n\n");
        md.push_str(&format!(
            "Total runtime: {:.1}s\n\n",
            self.duration.as_secs_f64()
        ));
        if self.has_errors() {
            md.push_str("**Errors detected during the run**\n");
        } else {
            md.push_str("**Run completed without errors**\n");
        }

        md
    }

    /// Generates a JSON report.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Prints a summary to stdout.
    pub fn print_summary(&self) {
        println!("\n{}", "=".repeat(60));
        println!("FLEET RESULTS");
        println!("{}", "=".repeat(60));

        println!(
            "\nMode: {} | Devices: {}/{} | Duration: {:.1}s",
            self.mode,
            self.devices_provisioned,
            self.devices_requested,
            self.duration.as_secs_f64()
        );
        for (kind, count) in &self.by_kind {
            println!("   {}: {}", kind, count);
        }
        if !self.provisioning_failures.is_empty() {
            println!(
                "   Provisioning failures: {}",
                self.provisioning_failures.len()
            );
        }

        if self.mode == RunMode::Run {
            println!("\nTELEMETRY:");
            println!(
                "   Connected: {} (failed: {})",
                self.devices_connected,
                self.connection_failures.len()
            );
            println!(
                "   Messages: {} ({:.1}/s)",
                format_number(self.messages_sent),
                self.messages_per_second()
            );
            println!("   Bytes: {}", format_bytes(self.bytes_sent));
            println!("   Latency: {}", self.send_latency.format_ms());
            if self.send_failures > 0 {
                println!("   Send failures: {}", self.send_failures);
            }
            if !self.panicked_devices.is_empty() {
                println!("   Panicked: {}", self.panicked_devices.join(", "));
            }
        }

        println!("\n{}", "=".repeat(60));
    }
}

fn push_failures(md: &mut String, title: &str, failures: &[DeviceFailure]) {
    if failures.is_empty() {
        return;
    }
    md.push_str(&format!("### {}\n\n", title));
    md.push_str("| Device | Reason |\n");
    md.push_str("|--------|--------|\n");
    for failure in failures {
        md.push_str(&format!("| {} | {} |\n", failure.device_id, failure.reason));
    }
    md.push('\n');
}

/// Formats a number with thousand separators.
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Formats bytes in human-readable form.
fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
