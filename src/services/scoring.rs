//! Score derivation from a team's answer history.

/// Apply one answer to a running score: correct adds a point, incorrect takes
/// one away without going below zero.
pub fn apply_answer(score: u32, correct: bool) -> u32 {
    if correct {
        score + 1
    } else {
        score.saturating_sub(1)
    }
}

/// Fold answers, given in canonical order, into a final score.
pub fn score<I>(answers: I) -> u32
where
    I: IntoIterator<Item = bool>,
{
    answers.into_iter().fold(0, apply_answer)
}
