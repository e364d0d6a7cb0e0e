//! Expression language validation and auto-correction
//!
//! Property values may embed `${...}` expressions. The platform only accepts
//! chained syntax (`${a:equals('x'):and(${b:isEmpty()})}`), while hand-written
//! values often use infix logic, misspelled functions or attribute names, and
//! nested subjects. [`correct`] repairs what it can and reports the rest.
//!
//! Failures never produce partial output: an uncorrectable value comes back
//! unchanged with the reason in `errors`, which keeps [`correct`] idempotent.

mod rewrite;
mod scan;

use serde::Serialize;

use rewrite::Notes;

/// Outcome of correcting one property value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElCorrection {
    pub value: String,
    pub changed: bool,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ElCorrection {
    fn unchanged(value: &str) -> Self {
        Self {
            value: value.to_string(),
            changed: false,
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// True when the value contains an expression delimiter
pub fn contains_expression(value: &str) -> bool {
    value.contains("${")
}

/// Validate and auto-correct every expression in `value`
///
/// Text outside `${...}` is left alone, so `${first} and ${last}` stays a
/// string template.
pub fn correct(value: &str) -> ElCorrection {
    correct_with(value, false)
}

/// Like [`correct`], for values that are boolean conditions
///
/// Operators written as plain text between expressions are folded in:
/// `${a} or ${b}` becomes `${a:or(${b})}`. When they do not form a valid
/// boolean expression the text is kept as written.
pub fn correct_condition(value: &str) -> ElCorrection {
    correct_with(value, true)
}

fn correct_with(value: &str, combine: bool) -> ElCorrection {
    if !contains_expression(value) {
        return ElCorrection::unchanged(value);
    }

    if let Err(reason) = scan::check_balance(value) {
        let mut result = ElCorrection::unchanged(value);
        result.errors.push(format!("Unbalanced expression: {}", reason));
        return result;
    }

    let mut notes = Notes::default();
    match rewrite::correct_text(value, combine, &mut notes) {
        Ok(corrected) => ElCorrection {
            changed: corrected != value,
            value: corrected,
            warnings: notes.warnings,
            errors: Vec::new(),
        },
        Err(reason) => {
            let mut result = ElCorrection::unchanged(value);
            result.errors.push(reason);
            result
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn plain_values_pass_through() {
        let result = correct("just text");
        assert!(!result.changed);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn infix_and_is_rewritten() {
        let result = correct(
            "${userId:trim():length():gt(0) and orderItems:trim():length():gt(0)}",
        );
        assert_eq!(
            result.value,
            "${userId:trim():length():gt(0):and(${orderItems:trim():length():gt(0)})}"
        );
        assert!(result.warnings[0].contains("Auto-corrected EL logical operators"));
    }

    #[test]
    fn infix_between_expressions_is_combined_in_conditions() {
        let result = correct_condition("${a:equals('x')} or ${b:equals('y')}");
        assert_eq!(result.value, "${a:equals('x'):or(${b:equals('y')})}");
    }

    #[test]
    fn string_templates_keep_their_words() {
        let result = correct("${first} and ${last}");
        assert_eq!(result.value, "${first} and ${last}");
        assert!(!result.changed);
        assert!(result.is_ok());

        let result = correct("${a} not ${b}");
        assert_eq!(result.value, "${a} not ${b}");
        assert!(result.is_ok());
    }

    #[test]
    fn unparseable_condition_text_is_not_an_error() {
        let result = correct_condition("${a} not ${b}");
        assert_eq!(result.value, "${a} not ${b}");
        assert!(result.is_ok());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn function_and_attribute_names_are_fixed() {
        let result = correct("${http.status.code:ifNull(200)}");
        assert_eq!(result.value, "${http.status.code:replaceNull(200)}");

        let result = correct("${file.name:toLowerCase():contain('csv')}");
        assert_eq!(result.value, "${filename:toLower():contains('csv')}");
        assert_eq!(result.warnings.len(), 3);
    }

    #[test]
    fn literal_text_around_expressions_is_kept() {
        let result = correct("Hello ${fileName} and goodbye");
        assert_eq!(result.value, "Hello ${filename} and goodbye");
    }

    #[test]
    fn subject_function_without_colon_is_an_error() {
        let result = correct("${toUpper(filename)}");
        assert!(!result.is_ok());
        assert_eq!(result.value, "${toUpper(filename)}");
        assert!(result.errors[0].contains("needs a subject"));
    }

    #[test]
    fn unbalanced_input_is_returned_unchanged() {
        let result = correct("${a:equals('x')");
        assert_eq!(result.value, "${a:equals('x')");
        assert!(result.errors[0].starts_with("Unbalanced expression"));
    }

    #[test]
    fn correction_is_idempotent_on_samples() {
        for input in [
            "${a and b or not c}",
            "${(a or b) and c:isEmpty()}",
            "${x:gt(1) and ${y:lt(2)}}",
            "${${filename:isEmpty()}:not() and fileName:contain('x')}",
        ] {
            let once = correct(input).value;
            let twice = correct(&once).value;
            assert_eq!(once, twice, "not idempotent for {}", input);
        }

        let once = correct_condition("${a} && ${b} || ${c}").value;
        assert_eq!(once, "${a:and(${b}):or(${c})}");
        assert_eq!(correct_condition(&once).value, once);
    }
}
