use crate::errors::PlanParseError;
use jsonschema::Validator;
use serde_json::Value;

/// Creates a JSON Schema validator from a schema string
///
/// # Arguments
/// * `schema_content` - The JSON Schema as a string
///
/// # Returns
/// * `Result<Validator, PlanParseError>` - The compiled validator on success, or an error
pub fn build_validator(schema_content: &str) -> Result<Validator, PlanParseError> {
    let schema: Value = serde_json::from_str(schema_content)?;
    jsonschema::validator_for(&schema).map_err(|e| PlanParseError::Schema(e.to_string()))
}

/// Validates a JSON string against a schema validator
///
/// # Arguments
/// * `schema` - The compiled JSON Schema validator
/// * `response` - The JSON string to validate
///
/// # Returns
/// * `Result<bool, PlanParseError>` - True if valid, false if invalid, or an error
pub fn validate_response(schema: &Validator, response: &str) -> Result<bool, PlanParseError> {
    let val: Value = serde_json::from_str(response)?;
    Ok(schema.is_valid(&val))
}

/// Returns the first balanced `{...}` substring of `text`, ignoring braces
/// that appear inside JSON string literals.
pub fn extract_json_object(text: &str) -> Option<&str> {
    text.char_indices()
        .filter(|(_, c)| *c == '{')
        .find_map(|(start, _)| balanced_end(&text[start..]).map(|end| &text[start..start + end]))
}

fn balanced_end(candidate: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in candidate.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}
