//! Response parsing for LLM outputs.
//!
//! Extracts the candidate SQL from generation responses that may wrap it in
//! markdown code blocks.

/// Extracts the SQL query from a generation response.
///
/// Looks for SQL in the following order:
/// - the first ```sql ... ``` block
/// - the first ``` ... ``` block without a language
/// - the whole response, with stray fences removed
///
/// The result is trimmed and trailing semicolons are removed. An empty string
/// means the response held no query.
pub fn extract_sql(response: &str) -> String {
    let body = extract_code_block(response, "sql")
        .or_else(|| extract_code_block(response, ""))
        .unwrap_or_else(|| strip_fences(response));

    body.trim()
        .trim_end_matches(|c: char| c == ';' || c.is_whitespace())
        .to_string()
}

/// Extracts content from a markdown code block with the specified language.
///
/// Pass an empty string for `lang` to match blocks without a language specifier.
/// The language tag is matched case-insensitively.
fn extract_code_block(text: &str, lang: &str) -> Option<String> {
    // ASCII lowercasing keeps byte offsets aligned with `text`.
    let lowered = text.to_ascii_lowercase();
    let start_pattern = format!("```{}", lang);

    let start_idx = lowered.find(&start_pattern)?;
    let fence_end = start_idx + start_pattern.len();
    let content_start = text[fence_end..].find('\n').map(|i| fence_end + i + 1)?;

    // Anything between a bare fence and the newline is a language tag.
    if lang.is_empty() && !text[fence_end..content_start - 1].trim().is_empty() {
        return None;
    }

    let end_idx = text[content_start..].find("```")?;
    Some(text[content_start..content_start + end_idx].to_string())
}

/// Removes fence markers from a response that has no well-formed code block.
fn strip_fences(text: &str) -> String {
    let trimmed = text.trim();
    let without_open = if trimmed
        .get(..6)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("```sql"))
    {
        &trimmed[6..]
    } else {
        trimmed.strip_prefix("```").unwrap_or(trimmed)
    };
    without_open.replace("```", "")
}
