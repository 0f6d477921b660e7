use anyhow::Result;
use chrono::Utc;
use serde_json::json;

use crate::agent::AgentResponse;
use crate::bridge_config::OutputFormat;

pub fn format_response(response: &AgentResponse, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Text => format!(
            "[PLANNING AGENT RESPONSE]\n{}\n[END RESPONSE]",
            response.payload.trim_end()
        ),
        OutputFormat::Json => serde_json::to_string_pretty(response)?,
        OutputFormat::Markdown => {
            let context = if response.context_used.is_empty() {
                "minimal".to_string()
            } else {
                response.context_used.join(", ")
            };
            format!(
                "## Planning Agent Response\n\n{}\n\n---\n*Context: {}*",
                response.payload.trim_end(),
                context
            )
        }
    })
}

/// Failure record for machine-readable output. Text formats print the
/// error through [`super::print_error`] instead.
pub fn format_failure(message: &str) -> String {
    let value = json!({
        "status": "failure",
        "error": message,
        "timestamp": Utc::now().to_rfc3339(),
    });
    serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string())
}
