use serde::Deserialize;
use validator::Validate;

use crate::tasks::analysis::AnalysisScope;

/// `student_ids` absent or `null` analyzes the whole class.
#[derive(Debug, Deserialize, Validate)]
pub(crate) struct AnalysisRunRequest {
    #[serde(default)]
    #[serde(alias = "studentIds")]
    #[validate(length(min = 1, message = "student_ids must list at least one student"))]
    pub(crate) student_ids: Option<Vec<String>>,
}

impl AnalysisRunRequest {
    pub(crate) fn scope(self) -> AnalysisScope {
        match self.student_ids {
            None => AnalysisScope::AllStudents,
            Some(ids) => AnalysisScope::Selected(ids),
        }
    }
}

#[cfg(test)]
mod tests {
    use validator::Validate;

    use super::AnalysisRunRequest;
    use crate::tasks::analysis::AnalysisScope;

    #[test]
    fn null_and_missing_ids_mean_whole_class() {
        let missing: AnalysisRunRequest = serde_json::from_str("{}").expect("parses");
        let null: AnalysisRunRequest =
            serde_json::from_str(r#"{"student_ids": null}"#).expect("parses");

        assert_eq!(missing.scope(), AnalysisScope::AllStudents);
        assert_eq!(null.scope(), AnalysisScope::AllStudents);
    }

    #[test]
    fn empty_selection_fails_validation() {
        let empty: AnalysisRunRequest =
            serde_json::from_str(r#"{"student_ids": []}"#).expect("parses");
        assert!(empty.validate().is_err());

        let one: AnalysisRunRequest =
            serde_json::from_str(r#"{"studentIds": ["stu-1"]}"#).expect("parses");
        assert!(one.validate().is_ok());
        assert_eq!(one.scope(), AnalysisScope::Selected(vec!["stu-1".to_string()]));
    }
}
