//! Vendor inference from questionnaire answers
//!
//! Answers whose reference key names a vendor question are mapped through
//! a correction dictionary to canonical vendor names; the boolean Slack
//! question contributes the literal "Slack". Only names present in the
//! known-vendor catalog become organization vendors.

use serde::{Deserialize, Serialize};

/// One questionnaire answer, ordered as submitted
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Answer {
    Text { field_ref: String, text: String },
    Email { field_ref: String, email: String },
    Choice { field_ref: String, label: String },
    Choices { field_ref: String, labels: Vec<String> },
    Boolean { field_ref: String, value: bool },
}

impl Answer {
    pub fn field_ref(&self) -> &str {
        match self {
            Answer::Text { field_ref, .. }
            | Answer::Email { field_ref, .. }
            | Answer::Choice { field_ref, .. }
            | Answer::Choices { field_ref, .. }
            | Answer::Boolean { field_ref, .. } => field_ref,
        }
    }
}

/// Reference keys of the questions that name vendors
const VENDOR_QUESTION_KEYS: &[&str] = &[
    "cloud_provider",
    "identity_provider",
    "version_control",
    "mdm_vendor",
    "monitoring_vendor",
    "ticketing_vendor",
];

/// The one boolean vendor question
const SLACK_QUESTION_KEY: &str = "uses_slack";

/// Loose answer labels mapped to catalog names
const CORRECTIONS: &[(&str, &str)] = &[
    ("amazon web services (aws)", "Amazon Web Services"),
    ("aws", "Amazon Web Services"),
    ("google cloud platform (gcp)", "Google Cloud Platform"),
    ("gcp", "Google Cloud Platform"),
    ("azure", "Microsoft Azure"),
    ("microsoft azure (azure)", "Microsoft Azure"),
    ("g suite", "Google Workspace"),
    ("github", "GitHub"),
    ("gitlab", "GitLab"),
    ("jamf pro", "Jamf"),
    ("datadog inc", "Datadog"),
];

fn correct(label: &str) -> String {
    let needle = label.trim().to_lowercase();
    CORRECTIONS
        .iter()
        .find(|(variant, _)| *variant == needle)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or_else(|| label.trim().to_string())
}

/// Candidate vendor names from an ordered answer list, corrected and
/// de-duplicated, preserving answer order.
pub fn infer_vendor_names(answers: &[Answer]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let mut push = |name: String| {
        if !name.is_empty() && !names.iter().any(|n| n.eq_ignore_ascii_case(&name)) {
            names.push(name);
        }
    };

    for answer in answers {
        match answer {
            Answer::Choice { field_ref, label }
                if VENDOR_QUESTION_KEYS.contains(&field_ref.as_str()) =>
            {
                push(correct(label));
            }
            Answer::Choices { field_ref, labels }
                if VENDOR_QUESTION_KEYS.contains(&field_ref.as_str()) =>
            {
                for label in labels {
                    push(correct(label));
                }
            }
            Answer::Boolean { field_ref, value }
                if *value && field_ref == SLACK_QUESTION_KEY =>
            {
                push("Slack".to_string());
            }
            _ => {}
        }
    }

    names
}

/// Keep only names the catalog knows, catalog casing wins
pub fn filter_known(candidates: &[String], known: &[String]) -> Vec<String> {
    candidates
        .iter()
        .filter_map(|candidate| {
            known
                .iter()
                .find(|k| k.eq_ignore_ascii_case(candidate))
                .cloned()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn choice_and_choices_answers_contribute_corrected_names() {
        let answers = vec![
            Answer::Choice {
                field_ref: "cloud_provider".to_string(),
                label: "Amazon Web Services (AWS)".to_string(),
            },
            Answer::Choices {
                field_ref: "version_control".to_string(),
                labels: vec!["Github".to_string(), "Gitlab".to_string()],
            },
            Answer::Text {
                field_ref: "company_description".to_string(),
                text: "We use AWS".to_string(),
            },
        ];

        assert_eq!(
            infer_vendor_names(&answers),
            vec!["Amazon Web Services", "GitHub", "GitLab"]
        );
    }

    #[test]
    fn slack_boolean_contributes_slack_only_when_true() {
        let yes = vec![Answer::Boolean {
            field_ref: "uses_slack".to_string(),
            value: true,
        }];
        assert_eq!(infer_vendor_names(&yes), vec!["Slack"]);

        let no = vec![Answer::Boolean {
            field_ref: "uses_slack".to_string(),
            value: false,
        }];
        assert!(infer_vendor_names(&no).is_empty());

        let other_boolean = vec![Answer::Boolean {
            field_ref: "is_remote_first".to_string(),
            value: true,
        }];
        assert!(infer_vendor_names(&other_boolean).is_empty());
    }

    #[test]
    fn non_vendor_question_choices_are_ignored() {
        let answers = vec![Answer::Choice {
            field_ref: "company_size".to_string(),
            label: "11-50".to_string(),
        }];
        assert!(infer_vendor_names(&answers).is_empty());
    }

    #[test]
    fn known_filter_prefers_catalog_casing() {
        let candidates = vec!["github".to_string(), "Asana".to_string()];
        let known = vec!["GitHub".to_string(), "Slack".to_string()];
        assert_eq!(filter_known(&candidates, &known), vec!["GitHub"]);
    }
}
