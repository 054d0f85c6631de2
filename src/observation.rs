//! Renders the user-visible text appended after a tool call, parse
//! failure, or iteration-budget exhaustion.

use crate::config::IterationStrategy;

pub fn format_observation(content: &str) -> String {
    format!("Observation: {content}")
}

pub fn format_tool_error_observation(err: &str) -> String {
    format!("Observation: Error executing tool: {err}")
}

pub fn format_unknown_tool_error(name: &str, reason: &str, available_tools: &[String]) -> String {
    let list = if available_tools.is_empty() {
        "(no tools available)".to_string()
    } else {
        available_tools.join(", ")
    };
    format!(
        "Observation: Error: tool \"{name}\" could not be used ({reason}). Available tools: {list}."
    )
}

pub fn format_error_observation(err: &str) -> String {
    format!("Observation: Error: {err}")
}

pub fn format_malformed_response_hint() -> String {
    "Your last reply did not contain \"Action:\"/\"Action Input:\" or \"Final Answer:\". \
     Respond using exactly one of those two formats."
        .to_string()
}

/// The user message appended when the iteration budget is exhausted,
/// asking the model for a best-effort final answer.
pub fn build_forced_conclusion_prompt(iteration: u32, strategy: IterationStrategy) -> String {
    let base = format!(
        "You have reached the iteration limit ({iteration} iterations). \
         Based on everything gathered so far, provide your best final analysis now."
    );
    if strategy.is_native_tool_calling() {
        base
    } else {
        format!(
            "{base} Your response MUST contain \"Final Answer:\" and the word \"CRITICAL\" \
             to indicate this conclusion was reached under a forced iteration limit."
        )
    }
}
