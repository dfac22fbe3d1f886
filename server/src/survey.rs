//! The fixed survey schema: 13 categorical fields, in the order the classifier
//! expects its features.

use std::sync::LazyLock;

use indexmap::IndexMap;

pub type SurveySchema = IndexMap<&'static str, Vec<&'static str>>;

pub const NUM_FIELDS: usize = 13;

pub static SURVEY: LazyLock<SurveySchema> = LazyLock::new(|| {
    IndexMap::from([
        ("Gender", vec!["Female", "Male"]),
        ("self_employed", vec!["No", "Yes"]),
        ("family_history", vec!["No", "Yes"]),
        ("treatment", vec!["No", "Yes"]),
        (
            "Days_Indoors",
            vec![
                "Go out Every day",
                "1-14 days",
                "15-30 days",
                "31-60 days",
                "More than 2 months",
            ],
        ),
        ("Growing_Stress", vec!["Maybe", "No", "Yes"]),
        ("Changes_Habits", vec!["Maybe", "No", "Yes"]),
        ("Mental_Health_History", vec!["Maybe", "No", "Yes"]),
        ("Coping_Struggles", vec!["No", "Yes"]),
        ("Work_Interest", vec!["Maybe", "No", "Yes"]),
        ("Social_Weakness", vec!["Maybe", "No", "Yes"]),
        ("mental_health_interview", vec!["Maybe", "No", "Yes"]),
        ("care_options", vec!["No", "Not sure", "Yes"]),
    ])
});

/// Field names in feature order
pub fn field_names() -> impl Iterator<Item = &'static str> {
    SURVEY.keys().copied()
}
