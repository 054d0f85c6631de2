//! Parses ReAct-formatted model text into structured fields.
//!
//! Markers recognised: `Thought:`, `Action:`, `Action Input:`, `Final
//! Answer:`. If both a final answer and an action marker are present, the
//! final answer wins.

/// The result of parsing one model response in ReAct mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedReAct {
    pub thought: String,
    pub action: String,
    pub action_input: String,
    pub final_answer: String,
    pub is_final_answer: bool,
    pub has_action: bool,
    pub is_unknown_tool: bool,
    pub error_message: String,
}

const THOUGHT_MARKER: &str = "Thought:";
const ACTION_MARKER: &str = "Action:";
const ACTION_INPUT_MARKER: &str = "Action Input:";
const FINAL_ANSWER_MARKER: &str = "Final Answer:";

/// Finds the byte offset of the first marker in `haystack`, searching from
/// `start`, paired with which marker matched.
fn find_first_marker(haystack: &str, start: usize, markers: &[&'static str]) -> Option<(usize, &'static str)> {
    markers
        .iter()
        .filter_map(|m| haystack[start..].find(m).map(|pos| (start + pos, *m)))
        .min_by_key(|(pos, _)| *pos)
}

/// Extracts the text between `marker`'s end and the next recognised marker
/// (or the end of the string), trimmed.
fn extract_section<'a>(text: &'a str, marker_pos: usize, marker: &str, all_markers: &[&'static str]) -> &'a str {
    let content_start = marker_pos + marker.len();
    let next = all_markers
        .iter()
        .filter_map(|m| text[content_start..].find(m))
        .min()
        .map(|offset| content_start + offset)
        .unwrap_or(text.len());
    text[content_start..next].trim()
}

/// Validates that an action name has the `server.tool` shape: exactly two
/// non-empty, dot-separated segments.
fn is_well_formed_tool_name(action: &str) -> bool {
    let mut parts = action.splitn(3, '.');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(server), Some(tool), None) => !server.is_empty() && !tool.is_empty(),
        _ => false,
    }
}

/// Parses a model response into a [`ParsedReAct`].
pub fn parse(text: &str) -> ParsedReAct {
    let all_markers = [THOUGHT_MARKER, ACTION_MARKER, ACTION_INPUT_MARKER, FINAL_ANSWER_MARKER];

    let final_answer_pos = text.find(FINAL_ANSWER_MARKER);
    let action_pos = find_first_marker(text, 0, &[ACTION_MARKER]);

    let first_marker_pos = [
        text.find(THOUGHT_MARKER),
        action_pos.map(|(p, _)| p),
        final_answer_pos,
    ]
    .into_iter()
    .flatten()
    .min();

    let thought = match text.find(THOUGHT_MARKER) {
        Some(pos) => extract_section(text, pos, THOUGHT_MARKER, &all_markers).to_string(),
        None => match first_marker_pos {
            Some(pos) => text[..pos].trim().to_string(),
            None => text.trim().to_string(),
        },
    };

    if let Some(pos) = final_answer_pos {
        let final_answer = extract_section(text, pos, FINAL_ANSWER_MARKER, &all_markers).to_string();
        return ParsedReAct {
            thought,
            final_answer,
            is_final_answer: true,
            ..Default::default()
        };
    }

    if let Some((pos, _)) = action_pos {
        let action = extract_section(text, pos, ACTION_MARKER, &all_markers).to_string();
        let action_input = text
            .find(ACTION_INPUT_MARKER)
            .map(|p| extract_section(text, p, ACTION_INPUT_MARKER, &all_markers).to_string())
            .unwrap_or_default();

        if action.is_empty() || !is_well_formed_tool_name(&action) {
            return ParsedReAct {
                thought,
                action: action.clone(),
                action_input,
                is_unknown_tool: true,
                error_message: format!(
                    "action \"{action}\" is not in the required \"server.tool\" format"
                ),
                ..Default::default()
            };
        }

        return ParsedReAct {
            thought,
            action,
            action_input,
            has_action: true,
            ..Default::default()
        };
    }

    // Malformed: neither marker present.
    ParsedReAct { thought, ..Default::default() }
}
