//! Parameter interpolation for script templates.
//!
//! Script bodies and task arguments may reference committed parameter
//! values using `${name}` syntax.
//!
//! # Syntax
//!
//! - `${parameter_name}` - replaced with the committed value
//! - `$${escaped}` - produces literal `${escaped}` in output

use std::collections::HashSet;

use crate::error::{Result, SwitchbackError};
use crate::form::FormData;

/// A segment of an interpolated string.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// Literal text
    Literal(String),
    /// Parameter reference: ${name}
    Variable(String),
}

/// Parse a string containing `${name}` interpolations.
pub fn parse_interpolation(input: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut chars = input.chars().peekable();
    let mut current_literal = String::new();

    while let Some(c) = chars.next() {
        if c == '$' {
            match chars.peek() {
                Some('$') => {
                    // Escaped: $${...} -> literal ${...}
                    chars.next();
                    if chars.peek() == Some(&'{') {
                        chars.next();
                        current_literal.push('$');
                        current_literal.push('{');
                        while let Some(&c) = chars.peek() {
                            chars.next();
                            current_literal.push(c);
                            if c == '}' {
                                break;
                            }
                        }
                    } else {
                        current_literal.push('$');
                    }
                }
                Some('{') => {
                    chars.next();
                    if !current_literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut current_literal)));
                    }
                    let mut var_name = String::new();
                    while let Some(&c) = chars.peek() {
                        if c == '}' {
                            chars.next();
                            break;
                        }
                        var_name.push(chars.next().unwrap());
                    }
                    segments.push(Segment::Variable(var_name));
                }
                _ => {
                    current_literal.push(c);
                }
            }
        } else {
            current_literal.push(c);
        }
    }

    if !current_literal.is_empty() {
        segments.push(Segment::Literal(current_literal));
    }

    segments
}

/// Extract all unique parameter names referenced by a template.
pub fn extract_variables(input: &str) -> HashSet<String> {
    parse_interpolation(input)
        .into_iter()
        .filter_map(|seg| match seg {
            Segment::Variable(name) => Some(name),
            _ => None,
        })
        .collect()
}

/// Check if a string contains any interpolation.
pub fn has_interpolation(input: &str) -> bool {
    parse_interpolation(input)
        .iter()
        .any(|seg| matches!(seg, Segment::Variable(_)))
}

/// Substitute committed parameter values into a template.
///
/// A reference to a parameter with no committed value is a configuration
/// error: the template named something the wizard never collected.
pub fn resolve_template(input: &str, form: &FormData) -> Result<String> {
    let mut result = String::with_capacity(input.len());
    for segment in parse_interpolation(input) {
        match segment {
            Segment::Literal(text) => result.push_str(&text),
            Segment::Variable(name) => match form.get(&name) {
                Some(value) => result.push_str(&value.as_binding_string()),
                None => {
                    return Err(SwitchbackError::Configuration {
                        message: format!(
                            "template references unknown parameter '{}'",
                            name
                        ),
                    })
                }
            },
        }
    }
    Ok(result)
}
