use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use crate::identity::RecoveryQuestion;

/// A recovery question with the answer as typed by the user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct RecoveryAnswer {
    pub question: String,
    pub answer: String,
}

/// Answers are compared case-insensitively and salted with the user id.
pub(crate) fn hash_answer(user_id: &str, answer: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(b":");
    hasher.update(answer.trim().to_lowercase().as_bytes());
    format!("{:x}", hasher.finalize())
}

pub(crate) fn to_stored(user_id: &str, answers: &[RecoveryAnswer]) -> Vec<RecoveryQuestion> {
    answers
        .iter()
        .map(|a| RecoveryQuestion {
            question: a.question.clone(),
            answer_hash: hash_answer(user_id, &a.answer),
        })
        .collect()
}

/// Every stored question must be answered correctly.
pub(crate) fn answers_match(
    user_id: &str,
    stored: &[RecoveryQuestion],
    answers: &[RecoveryAnswer],
) -> bool {
    !stored.is_empty()
        && stored.iter().all(|q| {
            answers
                .iter()
                .find(|a| a.question == q.question)
                .is_some_and(|a| hash_answer(user_id, &a.answer) == q.answer_hash)
        })
}
