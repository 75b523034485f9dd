use std::fmt::{self, Write as _};

use serde::Serialize;

use crate::model::EvaluationCase;
use crate::pipeline::is_refusal;

use super::harness::preview;
use super::scoring::FAITHFULNESS_THRESHOLD;

pub const QUALITATIVE_SAMPLE_SIZE: usize = 5;
const QUESTION_PREVIEW_CHARS: usize = 80;
const ANSWER_PREVIEW_CHARS: usize = 300;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationSummary {
    pub total_questions: usize,
    pub answered: usize,
    pub refused: usize,
    pub answered_rate: f64,
    pub retrieval_hit_rate: f64,
    pub faithfulness_rate: f64,
    pub hallucination_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub summary: EvaluationSummary,
    pub best: Vec<EvaluationCase>,
    pub worst: Vec<EvaluationCase>,
}

pub fn summarize(cases: &[EvaluationCase]) -> EvaluationSummary {
    let total = cases.len();
    let hits = cases.iter().filter(|case| case.retrieval_hit).count();
    let faithful = cases
        .iter()
        .filter(|case| case.faithfulness >= FAITHFULNESS_THRESHOLD)
        .count();
    let hallucinations = cases.iter().filter(|case| case.hallucination).count();
    let answered = cases
        .iter()
        .filter(|case| !is_refusal(&case.answer))
        .count();

    EvaluationSummary {
        total_questions: total,
        answered,
        refused: total - answered,
        answered_rate: rate(answered, total),
        retrieval_hit_rate: rate(hits, total),
        faithfulness_rate: rate(faithful, total),
        hallucination_rate: rate(hallucinations, total),
    }
}

fn rate(count: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round4(count as f64 / total as f64)
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

pub fn composite_score(case: &EvaluationCase) -> f64 {
    let mut score = 0.0;
    if case.retrieval_hit {
        score += 1.0;
    }
    score += case.faithfulness;
    if case.hallucination {
        score -= 2.0;
    }
    if is_refusal(&case.answer) && !case.retrieval_hit {
        score += 0.5;
    }
    score
}

pub fn build_report(cases: &[EvaluationCase]) -> EvaluationReport {
    let mut ranked = cases
        .iter()
        .map(|case| (composite_score(case), case))
        .collect::<Vec<(f64, &EvaluationCase)>>();
    ranked.sort_by(|left, right| right.0.total_cmp(&left.0));

    let best = ranked
        .iter()
        .take(QUALITATIVE_SAMPLE_SIZE)
        .map(|(_, case)| (*case).clone())
        .collect();
    let worst = ranked
        .iter()
        .skip(ranked.len().saturating_sub(QUALITATIVE_SAMPLE_SIZE))
        .rev()
        .map(|(_, case)| (*case).clone())
        .collect();

    EvaluationReport {
        summary: summarize(cases),
        best,
        worst,
    }
}

pub fn render_markdown(report: &EvaluationReport) -> Result<String, fmt::Error> {
    let summary = &report.summary;
    let mut out = String::new();

    writeln!(out, "# AIRMAN RAG \u{2014} Evaluation Report\n")?;
    writeln!(out, "## Summary\n")?;
    writeln!(out, "| Metric | Value |\n|--------|-------|")?;
    writeln!(out, "| Total questions | {} |", summary.total_questions)?;
    writeln!(out, "| Answered | {} |", summary.answered)?;
    writeln!(out, "| Refused | {} |", summary.refused)?;
    writeln!(
        out,
        "| **Retrieval hit-rate** | {} |",
        percent(summary.retrieval_hit_rate)
    )?;
    writeln!(
        out,
        "| **Faithfulness rate** | {} |",
        percent(summary.faithfulness_rate)
    )?;
    writeln!(
        out,
        "| **Hallucination rate** | {} |",
        percent(summary.hallucination_rate)
    )?;

    writeln!(out, "\n## Qualitative Analysis\n")?;
    writeln!(out, "### {QUALITATIVE_SAMPLE_SIZE} Best Answers\n")?;
    render_cases(&mut out, &report.best)?;
    writeln!(out, "\n### {QUALITATIVE_SAMPLE_SIZE} Worst Answers\n")?;
    render_cases(&mut out, &report.worst)?;

    Ok(out)
}

fn render_cases(out: &mut String, cases: &[EvaluationCase]) -> fmt::Result {
    for (index, case) in cases.iter().enumerate() {
        writeln!(
            out,
            "#### {}. {}...",
            index + 1,
            preview(&case.question, QUESTION_PREVIEW_CHARS)
        )?;
        writeln!(out, "- **Type:** {}", case.question_type)?;
        writeln!(
            out,
            "- **Answer:** {}...",
            preview(&case.answer, ANSWER_PREVIEW_CHARS)
        )?;
        writeln!(
            out,
            "- **Retrieval hit:** {} | **Faithfulness:** {:.2} | **Hallucination:** {}",
            flag(case.retrieval_hit),
            case.faithfulness,
            flag(case.hallucination)
        )?;
        writeln!(
            out,
            "- **Citations:** {}",
            format_citations(&case.citations)
        )?;
        if let Some(error) = &case.error {
            writeln!(out, "- **Error:** {error}")?;
        }
        writeln!(out)?;
    }
    Ok(())
}

fn flag(value: bool) -> &'static str {
    if value { "True" } else { "False" }
}

pub fn percent(value: f64) -> String {
    format!("{:.2}%", value * 100.0)
}

fn format_citations(citations: &[String]) -> String {
    let quoted = citations
        .iter()
        .map(|citation| format!("'{citation}'"))
        .collect::<Vec<String>>();
    format!("[{}]", quoted.join(", "))
}
