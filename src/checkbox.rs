//! Mutually-exclusive option selection. A checkbox element never renders its
//! value as text: the record value is compared against each option label and
//! only the matching option's shape receives a mark. No match is a valid
//! unanswered state.

use crate::template::{CheckOption, CheckboxElement};
use crate::vars::Record;

/// The option to mark, if any. Exact string match against the record value;
/// at most one option can win because labels are unique per element.
pub fn resolve<'a>(element: &'a CheckboxElement, record: &Record) -> Option<&'a CheckOption> {
    let value = record.text(&element.data_key)?;
    element.options.iter().find(|option| option.label == value)
}

/// Id of the shape element an option is bound to. A template that declares a
/// shape under this name owns the option's box; the renderer only marks it.
pub fn shape_id(data_key: &str, label: &str) -> String {
    format!("checkbox-{}-{}", data_key, label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::CheckboxOrientation;
    use serde_json::json;

    fn course_time_element() -> CheckboxElement {
        CheckboxElement {
            id: "course-time".to_string(),
            title: "Course length".to_string(),
            data_key: "courseTime".to_string(),
            options: vec![
                CheckOption {
                    label: "4hr".to_string(),
                    x: 100.0,
                    y: 400.0,
                },
                CheckOption {
                    label: "8hr".to_string(),
                    x: 160.0,
                    y: 400.0,
                },
            ],
            orientation: CheckboxOrientation::Horizontal,
            box_size: 12.0,
        }
    }

    #[test]
    fn exact_match_selects_one_option() {
        let element = course_time_element();
        let record = Record::from_value(json!({"courseTime": "8hr"}));
        let selected = resolve(&element, &record).unwrap();
        assert_eq!(selected.label, "8hr");
    }

    #[test]
    fn no_match_is_unanswered_not_an_error() {
        let element = course_time_element();
        let record = Record::from_value(json!({"courseTime": "12hr"}));
        assert!(resolve(&element, &record).is_none());
    }

    #[test]
    fn absent_key_is_unanswered() {
        let element = course_time_element();
        assert!(resolve(&element, &Record::new()).is_none());
    }

    #[test]
    fn shape_binding_follows_the_naming_convention() {
        assert_eq!(shape_id("courseTime", "8hr"), "checkbox-courseTime-8hr");
    }

    #[test]
    fn match_is_case_sensitive_and_exact() {
        let element = course_time_element();
        let record = Record::from_value(json!({"courseTime": "8HR"}));
        assert!(resolve(&element, &record).is_none());
        let record = Record::from_value(json!({"courseTime": " 8hr"}));
        assert!(resolve(&element, &record).is_none());
    }
}
