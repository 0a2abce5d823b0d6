//! Deterministic quality scoring for invention records.
//!
//! [`score`] is a pure function of the record: five weighted criteria sum to a
//! 0..=100 total, and every issue found carries exactly one recommendation.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::record::{REQUIRED_FIELDS, Record, STATUTORY_CATEGORIES};

const PLACEHOLDERS: [&str; 4] = ["n/a", "unknown", "tbd", "todo"];

const TECHNICAL_TERMS: [&str; 9] = [
    "algorithm",
    "system",
    "method",
    "process",
    "network",
    "model",
    "architecture",
    "mechanism",
    "protocol",
];

const MIN_DESCRIPTION_CHARS: usize = 50;
const MIN_PROBLEM_CHARS: usize = 30;
const MIN_SOLUTION_CHARS: usize = 30;
const MIN_FEATURES: usize = 5;
const MIN_KEYWORDS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    Completeness,
    TechnicalDepth,
    Clarity,
    PatentReadiness,
    Confidence,
}

impl Criterion {
    pub const ALL: [Criterion; 5] = [
        Criterion::Completeness,
        Criterion::TechnicalDepth,
        Criterion::Clarity,
        Criterion::PatentReadiness,
        Criterion::Confidence,
    ];

    /// Weight of the criterion, which is also the most it can earn.
    pub fn max_points(self) -> u32 {
        match self {
            Criterion::Completeness => 30,
            Criterion::TechnicalDepth => 25,
            Criterion::Clarity => 20,
            Criterion::PatentReadiness => 15,
            Criterion::Confidence => 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriterionScore {
    pub earned: u32,
    pub max: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rating {
    #[serde(rename = "5/5 Excellent")]
    Excellent,
    #[serde(rename = "4/5 Good")]
    Good,
    #[serde(rename = "3/5 Fair")]
    Fair,
    #[serde(rename = "2/5 Poor")]
    Poor,
    #[serde(rename = "1/5 Inadequate")]
    Inadequate,
}

impl Rating {
    pub fn from_total(total: u32) -> Self {
        match total {
            90.. => Rating::Excellent,
            80..=89 => Rating::Good,
            70..=79 => Rating::Fair,
            60..=69 => Rating::Poor,
            _ => Rating::Inadequate,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Rating::Excellent => "5/5 Excellent",
            Rating::Good => "4/5 Good",
            Rating::Fair => "3/5 Fair",
            Rating::Poor => "2/5 Poor",
            Rating::Inadequate => "1/5 Inadequate",
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub total_score: u32,
    pub rating: Rating,
    pub breakdown: BTreeMap<Criterion, CriterionScore>,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
}

impl ScoreResult {
    /// Result reported when nothing was extracted at all.
    pub fn empty() -> Self {
        Self {
            total_score: 0,
            rating: Rating::Inadequate,
            breakdown: Criterion::ALL
                .iter()
                .map(|c| {
                    (
                        *c,
                        CriterionScore {
                            earned: 0,
                            max: c.max_points(),
                        },
                    )
                })
                .collect(),
            issues: vec!["No invention extracted".to_string()],
            recommendations: vec!["Re-run extraction against the source document".to_string()],
        }
    }

    pub fn meets(&self, threshold: u32) -> bool {
        self.total_score >= threshold
    }
}

/// Problems the scorer reports, in reporting order.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Finding {
    MissingFields(Vec<&'static str>),
    FewFeatures,
    BriefDescription,
    InvalidCategory,
    FewKeywords,
}

impl Finding {
    fn issue(&self) -> String {
        match self {
            Finding::MissingFields(fields) => {
                format!("Missing required fields: {}", fields.join(", "))
            }
            Finding::FewFeatures => "Insufficient technical features (need 5+)".to_string(),
            Finding::BriefDescription => "Technical description too brief".to_string(),
            Finding::InvalidCategory => "Invalid statutory category".to_string(),
            Finding::FewKeywords => "Insufficient keywords (need 5+)".to_string(),
        }
    }

    fn recommendation(&self) -> String {
        match self {
            Finding::MissingFields(_) => "Populate every required field".to_string(),
            Finding::FewFeatures => "Add 2-3 more specific technical features".to_string(),
            Finding::BriefDescription => {
                "Expand technical description to 2-4 sentences".to_string()
            }
            Finding::InvalidCategory => "Correct statutory category classification".to_string(),
            Finding::FewKeywords => "Add more relevant technical keywords".to_string(),
        }
    }
}

/// Score a record.
pub fn score(record: &Record) -> ScoreResult {
    let breakdown: BTreeMap<Criterion, CriterionScore> = Criterion::ALL
        .iter()
        .map(|c| {
            let earned = match c {
                Criterion::Completeness => completeness(record),
                Criterion::TechnicalDepth => technical_depth(record),
                Criterion::Clarity => clarity(record),
                Criterion::PatentReadiness => patent_readiness(record),
                Criterion::Confidence => confidence(record),
            };
            (
                *c,
                CriterionScore {
                    earned: earned.min(c.max_points()),
                    max: c.max_points(),
                },
            )
        })
        .collect();

    let total_score = breakdown.values().map(|s| s.earned).sum::<u32>().min(100);
    let findings = findings(record);

    ScoreResult {
        total_score,
        rating: Rating::from_total(total_score),
        breakdown,
        issues: findings.iter().map(Finding::issue).collect(),
        recommendations: findings.iter().map(Finding::recommendation).collect(),
    }
}

fn completeness(record: &Record) -> u32 {
    let mut points = 0;
    if REQUIRED_FIELDS.iter().all(|field| record.contains(field)) {
        points += 10;
    }

    let description = record.text("technical_description");
    let problem = record.text("problem_statement");
    let solution = record.text("solution_approach");

    if char_len(description) >= MIN_DESCRIPTION_CHARS
        && char_len(problem) >= MIN_PROBLEM_CHARS
        && char_len(solution) >= MIN_SOLUTION_CHARS
    {
        points += 10;
    }

    // Absent prose is not placeholder-free prose.
    let prose = [description, problem, solution];
    if prose.iter().all(|text| !text.trim().is_empty() && !has_placeholder(text)) {
        points += 10;
    }
    points
}

fn has_placeholder(text: &str) -> bool {
    let lower = text.to_lowercase();
    PLACEHOLDERS.iter().any(|p| lower.contains(p))
}

fn technical_depth(record: &Record) -> u32 {
    let features = record.list("key_technical_features");
    let keywords = record.list("inventor_keywords");
    let mut points = 0;

    if features.len() >= MIN_FEATURES {
        points += 8;
    } else if features.len() >= 3 {
        points += 5;
    }

    let vocabulary = features
        .iter()
        .chain(keywords.iter())
        .map(|s| s.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");
    if TECHNICAL_TERMS.iter().any(|term| vocabulary.contains(term)) {
        points += 10;
    }

    // Specificity only counts when there is something to be specific about.
    if !features.is_empty() && features.iter().take(5).all(|f| char_len(f) > 10) {
        points += 7;
    }
    points
}

fn clarity(record: &Record) -> u32 {
    let problem = record.text("problem_statement");
    let solution = record.text("solution_approach");
    let mut points = 0;

    if sentence_count(problem) >= 2 {
        points += 7;
    }
    if sentence_count(solution) >= 2 {
        points += 7;
    }

    let problem_lower = problem.to_lowercase();
    if problem_lower.contains("problem") || problem_lower.contains("challenge") {
        points += 3;
    }
    let solution_lower = solution.to_lowercase();
    if solution_lower.contains("solution") || solution_lower.contains("approach") {
        points += 3;
    }
    points
}

fn patent_readiness(record: &Record) -> u32 {
    let mut points = 0;
    if STATUTORY_CATEGORIES.contains(&record.text("statutory_category")) {
        points += 5;
    }
    if char_len(record.text("domain_classification")) > 2 {
        points += 5;
    }
    if record.list_len("inventor_keywords") >= MIN_KEYWORDS {
        points += 5;
    }
    points
}

fn confidence(record: &Record) -> u32 {
    let Some(context) = record.get("context").and_then(|v| v.as_object()) else {
        return 0;
    };
    let mut points = 0;

    let level = context
        .get("confidence_score")
        .and_then(serde_json::Value::as_f64)
        .unwrap_or(0.0);
    if level >= 0.8 {
        points += 5;
    } else if level >= 0.6 {
        points += 3;
    }

    let section = context
        .get("document_section")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("");
    if !section.trim().is_empty() {
        points += 5;
    }
    points
}

fn findings(record: &Record) -> Vec<Finding> {
    let mut out = Vec::new();
    let missing = record.missing_fields();
    if !missing.is_empty() {
        out.push(Finding::MissingFields(missing));
    }
    if record.list_len("key_technical_features") < MIN_FEATURES {
        out.push(Finding::FewFeatures);
    }
    if char_len(record.text("technical_description")) < MIN_DESCRIPTION_CHARS {
        out.push(Finding::BriefDescription);
    }
    if !STATUTORY_CATEGORIES.contains(&record.text("statutory_category")) {
        out.push(Finding::InvalidCategory);
    }
    if record.list_len("inventor_keywords") < MIN_KEYWORDS {
        out.push(Finding::FewKeywords);
    }
    out
}

/// Non-empty sentences terminated or separated by `.`, `!` or `?`.
fn sentence_count(text: &str) -> usize {
    text.split(['.', '!', '?'])
        .filter(|s| !s.trim().is_empty())
        .count()
}

fn char_len(text: &str) -> usize {
    text.trim().chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::perfect_record;
    use serde_json::{Value, json};

    fn without(field: &str) -> Record {
        let mut value = perfect_record().into_value();
        value
            .as_object_mut()
            .expect("object")
            .remove(field)
            .expect("field present");
        Record::from_value(value).expect("object")
    }

    #[test]
    fn perfect_record_scores_full_marks() {
        let result = score(&perfect_record());
        assert_eq!(result.total_score, 100);
        assert_eq!(result.rating, Rating::Excellent);
        assert!(result.issues.is_empty());
        assert!(result.recommendations.is_empty());
        for (criterion, points) in &result.breakdown {
            assert_eq!(points.earned, criterion.max_points(), "{criterion:?}");
        }
    }

    #[test]
    fn scoring_is_deterministic() {
        let record = without("inventor_keywords");
        assert_eq!(score(&record), score(&record));
    }

    /// Verifies every required field, when removed, costs points and yields issues.
    #[test]
    fn missing_any_required_field_is_reported() {
        for field in REQUIRED_FIELDS {
            let result = score(&without(field));
            assert!(result.total_score < 100, "{field}");
            assert!(!result.issues.is_empty(), "{field}");
            assert_eq!(result.issues.len(), result.recommendations.len());
            assert!(result.issues[0].contains(field), "{field}");
        }
    }

    #[test]
    fn adding_a_missing_field_never_lowers_completeness() {
        let full = score(&perfect_record()).breakdown[&Criterion::Completeness].earned;
        for field in REQUIRED_FIELDS {
            let partial = score(&without(field)).breakdown[&Criterion::Completeness].earned;
            assert!(partial <= full, "{field}");
        }
    }

    /// Value of `field`'s shape that carries a placeholder.
    fn placeholder_value(field: &str) -> Value {
        match field {
            "key_technical_features" | "inventor_keywords" => json!(["TBD"]),
            "context" => json!({"document_section": "unknown"}),
            _ => json!("TBD"),
        }
    }

    /// Verifies that filling any absent field, with real or placeholder content,
    /// never lowers the total score of a sparse record.
    #[test]
    fn adding_a_missing_field_never_lowers_total_score() {
        let full = perfect_record();
        let seeds = [
            Record::new(),
            Record::from_value(json!({"invention_name": "X"})).expect("object"),
            Record::from_value(json!({
                "problem_statement": full.text("problem_statement"),
                "solution_approach": full.text("solution_approach"),
            }))
            .expect("object"),
            without("technical_description"),
        ];

        for seed in &seeds {
            let before = score(seed).total_score;
            for field in REQUIRED_FIELDS.iter().filter(|f| !seed.contains(f)) {
                let clean = full.get(field).cloned().expect("perfect record field");
                for value in [clean, placeholder_value(field)] {
                    let mut grown = seed.clone();
                    grown.set_field(field, value.clone());
                    let after = score(&grown).total_score;
                    assert!(after >= before, "{field} = {value}: {before} -> {after}");
                }
            }
        }
    }

    #[test]
    fn placeholder_credit_needs_all_prose() {
        let mut record = Record::new();
        record.set_field("invention_name", json!("X"));
        assert_eq!(score(&record).breakdown[&Criterion::Completeness].earned, 0);

        record.set_field("technical_description", json!("TBD"));
        assert_eq!(score(&record).total_score, 0);
    }

    #[test]
    fn empty_record_scores_low_with_issues() {
        let result = score(&Record::new());
        assert_eq!(result.breakdown[&Criterion::Completeness].earned, 0);
        assert_eq!(result.breakdown[&Criterion::TechnicalDepth].earned, 0);
        assert_eq!(result.total_score, 0);
        assert_eq!(result.rating, Rating::Inadequate);
        assert_eq!(result.issues.len(), 5);
    }

    #[test]
    fn placeholders_cost_completeness() {
        let mut record = perfect_record();
        record.set_field(
            "solution_approach",
            json!("Approach is TBD. The solution will be chosen later by the team."),
        );
        let result = score(&record);
        assert_eq!(result.breakdown[&Criterion::Completeness].earned, 20);
    }

    #[test]
    fn feature_count_bands() {
        let mut record = perfect_record();
        record.set_field(
            "key_technical_features",
            json!([
                "sliding window admission",
                "minimum interval enforcement",
                "bounded history buffer"
            ]),
        );
        let result = score(&record);
        assert_eq!(result.breakdown[&Criterion::TechnicalDepth].earned, 5 + 10 + 7);
        assert!(
            result
                .issues
                .contains(&"Insufficient technical features (need 5+)".to_string())
        );
    }

    #[test]
    fn single_sentence_prose_loses_clarity() {
        let mut record = perfect_record();
        record.set_field(
            "problem_statement",
            json!("The core problem is that callers exceed provider quotas"),
        );
        let result = score(&record);
        assert_eq!(result.breakdown[&Criterion::Clarity].earned, 13);
    }

    #[test]
    fn confidence_bands() {
        let mut record = perfect_record();
        record.set_field(
            "context",
            json!({"document_section": "", "confidence_score": 0.65}),
        );
        assert_eq!(score(&record).breakdown[&Criterion::Confidence].earned, 3);

        record.set_field(
            "context",
            json!({"document_section": "Claims", "confidence_score": 0.2}),
        );
        assert_eq!(score(&record).breakdown[&Criterion::Confidence].earned, 5);
    }

    #[test]
    fn invalid_category_is_flagged() {
        let mut record = perfect_record();
        record.set_field("statutory_category", json!("Software"));
        let result = score(&record);
        assert_eq!(result.total_score, 95);
        assert_eq!(result.issues, vec!["Invalid statutory category".to_string()]);
        assert_eq!(
            result.recommendations,
            vec!["Correct statutory category classification".to_string()]
        );
    }

    #[test]
    fn rating_bands() {
        assert_eq!(Rating::from_total(100), Rating::Excellent);
        assert_eq!(Rating::from_total(90), Rating::Excellent);
        assert_eq!(Rating::from_total(89), Rating::Good);
        assert_eq!(Rating::from_total(70), Rating::Fair);
        assert_eq!(Rating::from_total(60), Rating::Poor);
        assert_eq!(Rating::from_total(59), Rating::Inadequate);
        assert_eq!(Rating::from_total(0).to_string(), "1/5 Inadequate");
    }

    #[test]
    fn empty_result_is_zero() {
        let empty = ScoreResult::empty();
        assert_eq!(empty.total_score, 0);
        assert_eq!(empty.issues.len(), empty.recommendations.len());
        assert!(!empty.meets(1));
    }

    #[test]
    fn score_result_serializes_with_rating_labels() {
        let value = serde_json::to_value(score(&perfect_record())).expect("serialize");
        assert_eq!(value["rating"], "5/5 Excellent");
        assert_eq!(value["breakdown"]["technical_depth"]["max"], 25);
    }
}
