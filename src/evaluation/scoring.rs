use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::model::Fragment;
use crate::pipeline::is_refusal;

pub const RETRIEVAL_HIT_THRESHOLD: f64 = 0.15;
pub const FAITHFULNESS_THRESHOLD: f64 = 0.25;

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex is valid"));
static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\w+").expect("word regex is valid"));

pub fn normalize(text: &str) -> String {
    WHITESPACE_RUN
        .replace_all(text.to_lowercase().trim(), " ")
        .into_owned()
}

pub fn tokenize(text: &str) -> HashSet<String> {
    let normalized = normalize(text);
    WORD.find_iter(&normalized)
        .map(|token| token.as_str().to_string())
        .collect()
}

pub fn overlap_score(answer_tokens: &HashSet<String>, fragment_tokens: &HashSet<String>) -> f64 {
    if answer_tokens.is_empty() {
        return 1.0;
    }

    let shared = answer_tokens.intersection(fragment_tokens).count();
    shared as f64 / answer_tokens.len() as f64
}

fn fragment_overlap(answer: &str, fragments: &[Fragment]) -> f64 {
    let fragment_tokens = fragments
        .iter()
        .flat_map(|fragment| tokenize(&fragment.text))
        .collect::<HashSet<String>>();
    overlap_score(&tokenize(answer), &fragment_tokens)
}

pub fn retrieval_hit(answer: &str, fragments: &[Fragment]) -> bool {
    let Some(first) = fragments.first() else {
        return false;
    };
    if first.text.is_empty() || is_refusal(answer) {
        return false;
    }

    fragment_overlap(answer, fragments) >= RETRIEVAL_HIT_THRESHOLD
}

pub fn faithfulness(answer: &str, fragments: &[Fragment]) -> f64 {
    if is_refusal(answer) {
        return 1.0;
    }
    if fragments.is_empty() {
        return 0.0;
    }

    fragment_overlap(answer, fragments)
}

pub fn is_hallucination(answer: &str, fragments: &[Fragment]) -> bool {
    if is_refusal(answer) {
        return false;
    }

    faithfulness(answer, fragments) < FAITHFULNESS_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::REFUSAL;

    fn fragment(text: &str) -> Fragment {
        Fragment::new("a.pdf", 0, text)
    }

    fn tokens(values: &[&str]) -> HashSet<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn normalize_lowercases_and_collapses_whitespace() {
        assert_eq!(normalize("  Engine\t\tOIL \n check "), "engine oil check");
    }

    #[test]
    fn tokenize_collapses_duplicates_and_punctuation() {
        assert_eq!(
            tokenize("The engine, the ENGINE! 50-hour"),
            tokens(&["the", "engine", "50", "hour"])
        );
        assert!(tokenize("  ... ").is_empty());
    }

    #[test]
    fn self_overlap_is_perfect() {
        let set = tokens(&["inspection", "every", "50"]);
        assert_eq!(overlap_score(&set, &set), 1.0);
    }

    #[test]
    fn empty_answer_tokens_are_vacuously_supported() {
        assert_eq!(overlap_score(&HashSet::new(), &tokens(&["x"])), 1.0);
    }

    #[test]
    fn overlap_is_fraction_of_answer_tokens() {
        let answer = tokens(&["a", "b", "c", "d"]);
        assert_eq!(overlap_score(&answer, &tokens(&["a", "z"])), 0.25);
    }

    #[test]
    fn refusal_is_faithful_and_never_hallucinated() {
        let fragment_sets = [
            Vec::new(),
            vec![fragment("")],
            vec![fragment("totally unrelated text")],
        ];
        for fragments in &fragment_sets {
            assert_eq!(faithfulness(REFUSAL, fragments), 1.0);
            assert!(!is_hallucination(REFUSAL, fragments));
            assert!(!retrieval_hit(REFUSAL, fragments));
        }
    }

    #[test]
    fn grounded_answer_is_not_hallucinated() {
        let answer = "The engine must be inspected every 50 hours as required.";
        let fragments = vec![fragment("inspection every 50 hours required")];

        let score = faithfulness(answer, &fragments);
        assert!(score >= FAITHFULNESS_THRESHOLD, "faithfulness {score}");
        assert!(!is_hallucination(answer, &fragments));
        assert!(retrieval_hit(answer, &fragments));
    }

    #[test]
    fn unrelated_answer_is_hallucinated_and_misses() {
        let answer = "Penguins migrate across Antarctica during winter months.";
        let fragments = vec![fragment("inspection every 50 hours required")];

        assert!(faithfulness(answer, &fragments) < FAITHFULNESS_THRESHOLD);
        assert!(is_hallucination(answer, &fragments));
        assert!(!retrieval_hit(answer, &fragments));
    }

    #[test]
    fn missing_fragments_zero_faithfulness_but_empty_first_text_still_scores() {
        assert_eq!(faithfulness("Every 50 hours.", &[]), 0.0);
        assert!(is_hallucination("Every 50 hours.", &[]));

        let fragments = vec![fragment(""), fragment("every 50 hours")];
        assert!(!retrieval_hit("Every 50 hours.", &fragments));
        assert_eq!(faithfulness("Every 50 hours.", &fragments), 1.0);
    }

    #[test]
    fn hit_threshold_is_lower_than_faithfulness_threshold() {
        let answer = "alpha beta gamma delta epsilon zeta";
        let fragments = vec![fragment("alpha")];

        let score = faithfulness(answer, &fragments);
        assert!(score >= RETRIEVAL_HIT_THRESHOLD);
        assert!(score < FAITHFULNESS_THRESHOLD);
        assert!(retrieval_hit(answer, &fragments));
        assert!(is_hallucination(answer, &fragments));
    }
}
