use anyhow::Result;
use serde_json::json;

use crate::agent::AgentResponse;
use crate::bridge_config::OutputFormat;
use crate::ledger::{PhaseStatus, RecordReceipt};

/// Confirmation of a ledger append, optionally with the planning agent's
/// acknowledgement.
pub fn format_receipt(
    receipt: &RecordReceipt,
    acknowledgement: Option<&AgentResponse>,
    format: OutputFormat,
) -> Result<String> {
    let record = &receipt.record;

    if format == OutputFormat::Json {
        let value = json!({
            "status": "recorded",
            "record": record,
            "warnings": receipt.warnings,
            "acknowledgement": acknowledgement.map(|a| a.payload.as_str()),
        });
        return Ok(serde_json::to_string_pretty(&value)?);
    }

    let mut lines = vec![
        "[PROGRESS RECORDED]".to_string(),
        format!("Phase: {}", record.phase),
        format!("Status: {}", record.status),
        format!("Milestone: {}", record.milestone),
    ];
    if let Some(message) = &record.message {
        lines.push(format!("Message: {}", message));
    }
    for warning in &receipt.warnings {
        lines.push(format!("Warning: {}", warning));
    }
    if record.status == PhaseStatus::Blocked {
        lines.push("Action Required: planning-agent intervention".to_string());
    }
    lines.push(format!("Timestamp: {}", record.timestamp.to_rfc3339()));
    lines.push("[END REPORT]".to_string());

    if let Some(ack) = acknowledgement {
        lines.push(String::new());
        lines.push("[PLANNING AGENT ACKNOWLEDGMENT]".to_string());
        lines.push(ack.payload.trim_end().to_string());
        lines.push("[END ACKNOWLEDGMENT]".to_string());
    }

    let text = lines.join("\n");
    if format == OutputFormat::Markdown {
        return Ok(to_markdown(&text));
    }
    Ok(text)
}

/// Frame lines become headings, `Key: value` lines become bullets.
fn to_markdown(text: &str) -> String {
    text.lines()
        .filter(|l| !l.starts_with("[END"))
        .map(|l| {
            if let Some(title) = l.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                return format!("## {}", title);
            }
            match l.split_once(": ") {
                Some((key, value)) if !key.contains(' ') || key == "Action Required" => {
                    format!("- **{}:** {}", key, value)
                }
                _ => l.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
