//! Practice exam catalog, request validation and the two exam modes.
//!
//! [`ExamMode`] owns everything that differs between MCQ and flashcard
//! generation: the system prompt, the JSON schema the model must answer with,
//! and how that answer is parsed.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{BillingError, Result};
use crate::pricing::CostBreakdown;
use crate::{ExamId, UserId};

/// Questions generated when the request does not say.
pub const DEFAULT_QUESTION_COUNT: u32 = 10;

/// Upper bound on questions per request.
pub const MAX_QUESTION_COUNT: u32 = 100;

/// Supported exams and their subjects.
pub const EXAM_SUBJECTS: &[(&str, &[&str])] = &[
    ("JEE", &["Physics", "Chemistry", "Mathematics"]),
    (
        "UPSC",
        &[
            "General Studies Paper I",
            "CSAT (General Studies Paper II)",
            "General Studies Paper III",
            "General Studies Paper IV",
            "Optional Subject Paper I",
            "Optional Subject Paper II",
            "Language Paper (Indian Language)",
            "English Language Paper",
        ],
    ),
    (
        "CLAT",
        &[
            "English Language",
            "Current Affairs & General Knowledge",
            "Legal Reasoning",
            "Logical Reasoning",
            "Quantitative Techniques (Basic Mathematics)",
        ],
    ),
    (
        "GATE",
        &[
            "Aerospace Engineering (AE)",
            "Agricultural Engineering (AG)",
            "Architecture and Planning (AR)",
            "Biomedical Engineering (BM)",
            "Biotechnology (BT)",
            "Civil Engineering (CE)",
            "Chemical Engineering (CH)",
            "Computer Science and Information Technology (CS)",
            "Chemistry (CY)",
            "Electronics and Communication Engineering (EC)",
            "Electrical Engineering (EE)",
            "Environmental Science and Engineering (ES)",
            "Ecology and Evolution (EY)",
            "Geology and Geophysics (GG)",
            "Instrumentation Engineering (IN)",
            "Mathematics (MA)",
            "Mechanical Engineering (ME)",
            "Mining Engineering (MN)",
            "Metallurgical Engineering (MT)",
            "Petroleum Engineering (PE)",
            "Physics (PH)",
            "Production and Industrial Engineering (PI)",
            "Statistics (ST)",
            "Textile Engineering and Fibre Science (TF)",
            "Engineering Sciences (XE)",
            "Life Sciences (XL)",
            "Humanities and Social Sciences (XH)",
            "Naval Architecture and Marine Engineering (NM)",
            "Geomatics Engineering (GE)",
            "Data Science and Artificial Intelligence (DA)",
        ],
    ),
    ("NEET-UG", &["Physics", "Chemistry", "Biology (Botany + Zoology)"]),
];

/// Find the canonical exam key for `exam`, ignoring case.
#[must_use]
pub fn canonical_exam(exam: &str) -> Option<(&'static str, &'static [&'static str])> {
    EXAM_SUBJECTS
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(exam.trim()))
        .copied()
}

// ============================================================================
// Request
// ============================================================================

/// Question difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    /// Easy.
    Easy,
    /// Medium.
    Medium,
    /// Hard.
    Hard,
}

impl Difficulty {
    /// Wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }
}

/// Language questions are written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// English.
    English,
    /// Hindi.
    Hindi,
}

impl Language {
    /// Wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::English => "english",
            Self::Hindi => "hindi",
        }
    }
}

macro_rules! display_as_str {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        })*
    };
}

display_as_str!(Difficulty, Language, ExamMode);

/// Body of an exam generation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamRequest {
    /// Exam key, matched case-insensitively.
    pub exam: String,
    /// Subject, which must belong to the exam.
    pub subject: String,
    /// Difficulty.
    pub difficulty: Difficulty,
    /// Language.
    pub language: Language,
    /// MCQ or flashcard.
    pub mode: ExamMode,
    /// Number of questions.
    #[serde(default = "default_count")]
    pub count: u32,
}

const fn default_count() -> u32 {
    DEFAULT_QUESTION_COUNT
}

impl ExamRequest {
    /// Validate the request and normalize the exam key to its canonical form.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an unknown exam, a subject outside the
    /// exam, or a count outside `1..=100`.
    pub fn validated(mut self) -> Result<Self> {
        let (key, subjects) = canonical_exam(&self.exam)
            .ok_or_else(|| BillingError::validation("exam", "Unknown exam"))?;

        if !subjects.contains(&self.subject.as_str()) {
            return Err(BillingError::validation(
                "subject",
                format!("'{}' is not a valid subject for exam '{key}'", self.subject),
            ));
        }
        if !(1..=MAX_QUESTION_COUNT).contains(&self.count) {
            return Err(BillingError::validation(
                "count",
                format!("must be between 1 and {MAX_QUESTION_COUNT}"),
            ));
        }

        self.exam = key.to_string();
        Ok(self)
    }
}

// ============================================================================
// Modes
// ============================================================================

/// Kind of practice material to generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExamMode {
    /// Multiple-choice questions with one or two correct options.
    Mcq,
    /// Question and answer cards with an explanation.
    Flashcard,
}

impl ExamMode {
    /// Wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Mcq => "mcq",
            Self::Flashcard => "flashcard",
        }
    }

    /// System prompt for `request`.
    #[must_use]
    pub fn system_prompt(&self, request: &ExamRequest) -> String {
        let (subject, language, difficulty) =
            (&request.subject, request.language, request.difficulty);
        match self {
            Self::Mcq => format!(
                "You are helpful MCQ based Exam Preparation Assiantant. You have to prepare the number of MCQ for subject as per user request for following: {subject} in language: {language} with difficulty-level: {difficulty}.\n\
                 Give four options where one or two can be correct answers. Provide the option with serial numbering like: 1, 2, 3, 4. Also provide the correct Answer option."
            ),
            Self::Flashcard => format!(
                "You are helpful flashcard based Exam Preparation Assiantant. You have to prepare the number of flashcard for subject as per user request for following: {subject} in language: {language} with difficulty-level: {difficulty}.\n\
                 Give the accurate and concise answer. Also provide the explaination or history of the provided answer."
            ),
        }
    }

    /// User message asking for `count` questions.
    #[must_use]
    pub fn user_prompt(count: u32) -> String {
        format!("Generate the {count} number of the questions")
    }

    /// Name of the structured output format.
    #[must_use]
    pub const fn schema_name(&self) -> &'static str {
        match self {
            Self::Mcq => "mcq_question_list",
            Self::Flashcard => "flashcard_list",
        }
    }

    /// JSON schema the model must answer with: `{"questions": [...]}`.
    #[must_use]
    pub fn output_schema(&self) -> Value {
        let item = match self {
            Self::Mcq => json!({
                "type": "object",
                "properties": {
                    "question": {"type": "string"},
                    "options": {
                        "type": "object",
                        "additionalProperties": {"type": "string"}
                    },
                    "correct_options": {
                        "description": "give the correct option.",
                        "anyOf": [
                            {"type": "integer"},
                            {"type": "array", "items": {"type": "integer"}}
                        ]
                    }
                },
                "required": ["question", "options", "correct_options"]
            }),
            Self::Flashcard => json!({
                "type": "object",
                "properties": {
                    "question": {"type": "string"},
                    "answer": {
                        "type": "string",
                        "description": "Give the accurate and concise answer"
                    },
                    "explanation": {
                        "type": "string",
                        "description": "provide the explaination or history of the provided answer."
                    }
                },
                "required": ["question", "answer", "explanation"]
            }),
        };

        json!({
            "type": "object",
            "properties": {
                "questions": {"type": "array", "items": item}
            },
            "required": ["questions"]
        })
    }

    /// Parse the model's structured answer.
    ///
    /// # Errors
    ///
    /// Returns an error if `text` does not match [`ExamMode::output_schema`].
    pub fn parse_questions(&self, text: &str) -> std::result::Result<ExamQuestions, serde_json::Error> {
        #[derive(Deserialize)]
        struct Envelope {
            questions: Value,
        }

        let envelope: Envelope = serde_json::from_str(text)?;
        self.questions_from_value(envelope.questions)
    }

    /// Interpret a stored question array.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` is not an array of this mode's questions.
    pub fn questions_from_value(
        &self,
        value: Value,
    ) -> std::result::Result<ExamQuestions, serde_json::Error> {
        Ok(match self {
            Self::Mcq => ExamQuestions::Mcq(serde_json::from_value(value)?),
            Self::Flashcard => ExamQuestions::Flashcard(serde_json::from_value(value)?),
        })
    }
}

// ============================================================================
// Questions
// ============================================================================

/// Correct answer(s) of an MCQ, as 1-based option numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CorrectOptions {
    /// One correct option.
    Single(u8),
    /// Several correct options.
    Multiple(Vec<u8>),
}

impl CorrectOptions {
    /// All correct option numbers.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        match self {
            Self::Single(option) => vec![*option],
            Self::Multiple(options) => options.clone(),
        }
    }
}

/// A multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McqQuestion {
    /// Question text.
    pub question: String,
    /// Option number to option text.
    pub options: BTreeMap<String, String>,
    /// Correct option number(s).
    pub correct_options: CorrectOptions,
}

/// A flashcard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flashcard {
    /// Front of the card.
    pub question: String,
    /// Short answer.
    pub answer: String,
    /// Explanation or background.
    pub explanation: String,
}

/// Generated questions of either mode. Serializes as a plain array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ExamQuestions {
    /// MCQ questions.
    Mcq(Vec<McqQuestion>),
    /// Flashcards.
    Flashcard(Vec<Flashcard>),
}

impl ExamQuestions {
    /// Number of questions.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Mcq(questions) => questions.len(),
            Self::Flashcard(cards) => cards.len(),
        }
    }

    /// Whether no questions were generated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mode these questions belong to.
    #[must_use]
    pub const fn mode(&self) -> ExamMode {
        match self {
            Self::Mcq(_) => ExamMode::Mcq,
            Self::Flashcard(_) => ExamMode::Flashcard,
        }
    }
}

/// A persisted practice exam.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Exam {
    /// Exam record ID.
    pub id: ExamId,
    /// Owner.
    pub user_id: UserId,
    /// Canonical exam key.
    pub exam: String,
    /// Subject.
    pub subject: String,
    /// Difficulty.
    pub difficulty: Difficulty,
    /// Language.
    pub language: Language,
    /// Mode.
    pub mode: ExamMode,
    /// Generated questions.
    pub questions: ExamQuestions,
    /// Cost of generating them.
    pub token_cost: Option<CostBreakdown>,
    /// When the exam was created.
    pub created_at: DateTime<Utc>,
    /// When the exam last changed.
    pub updated_at: DateTime<Utc>,
}

impl Exam {
    /// Record a freshly generated exam.
    #[must_use]
    pub fn new(
        user_id: UserId,
        request: &ExamRequest,
        questions: ExamQuestions,
        token_cost: Option<CostBreakdown>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ExamId::generate(),
            user_id,
            exam: request.exam.clone(),
            subject: request.subject.clone(),
            difficulty: request.difficulty,
            language: request.language,
            mode: request.mode,
            questions,
            token_cost,
            created_at: now,
            updated_at: now,
        }
    }
}
