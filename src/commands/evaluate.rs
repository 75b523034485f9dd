use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::{EvaluateArgs, default_db_path};
use crate::commands::ask::open_pipeline;
use crate::evaluation::{
    AnswerService, EvaluationReport, HttpAnswerService, LocalAnswerService, build_report, percent,
    render_markdown, run_cases,
};
use crate::model::{EvaluationCase, QuestionEntry};
use crate::util::{read_json, write_json_pretty, write_text};

pub fn run(args: EvaluateArgs) -> Result<()> {
    let questions: Vec<QuestionEntry> = read_json(&args.questions_path)?;
    if questions.is_empty() {
        warn!(
            path = %args.questions_path.display(),
            "question set is empty; writing an empty evaluation"
        );
    }

    let service: Box<dyn AnswerService> = match &args.endpoint {
        Some(endpoint) => {
            info!(
                endpoint = %endpoint,
                timeout_secs = args.timeout_secs,
                "evaluating remote answer service"
            );
            Box::new(HttpAnswerService::new(endpoint, Duration::from_secs(args.timeout_secs))?)
        }
        None => {
            let db_path = default_db_path(&args.cache_root, args.db_path.as_ref());
            info!(db_path = %db_path.display(), "evaluating in-process pipeline");
            Box::new(LocalAnswerService::new(open_pipeline(&db_path, &args.generation)?))
        }
    };

    info!(
        questions = questions.len(),
        path = %args.questions_path.display(),
        "starting evaluation"
    );
    let cases = run_cases(service.as_ref(), &questions);
    let report = write_artifacts(&cases, &args.results_path, &args.report_path)?;
    log_summary(&report);

    Ok(())
}

pub fn write_artifacts(
    cases: &[EvaluationCase],
    results_path: &Path,
    report_path: &Path,
) -> Result<EvaluationReport> {
    write_json_pretty(results_path, &cases)?;

    let report = build_report(cases);
    let markdown = render_markdown(&report).context("failed to render evaluation report")?;
    write_text(report_path, &markdown)?;

    info!(
        results = %results_path.display(),
        report = %report_path.display(),
        "evaluation artifacts written"
    );
    Ok(report)
}

fn log_summary(report: &EvaluationReport) {
    let summary = &report.summary;
    info!(
        total = summary.total_questions,
        answered = summary.answered,
        refused = summary.refused,
        answered_rate = %percent(summary.answered_rate),
        retrieval_hit_rate = %percent(summary.retrieval_hit_rate),
        faithfulness_rate = %percent(summary.faithfulness_rate),
        hallucination_rate = %percent(summary.hallucination_rate),
        "evaluation summary"
    );
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::model::Fragment;
    use crate::pipeline::REFUSAL;

    fn case(question: &str, answer: &str, hit: bool, faithfulness: f64) -> EvaluationCase {
        EvaluationCase {
            question: question.to_string(),
            question_type: "factual".to_string(),
            answer: answer.to_string(),
            citations: vec!["a.pdf page 1".to_string()],
            fragments: vec![Fragment::new("a.pdf", 0, "inspect every 50 hours")],
            error: None,
            retrieval_hit: hit,
            faithfulness,
            hallucination: faithfulness < 0.25,
        }
    }

    #[test]
    fn artifacts_round_trip_results_and_render_report() {
        let dir = tempfile::tempdir().expect("tempdir");
        let results_path = dir.path().join("out/evaluation_results.json");
        let report_path = dir.path().join("out/report.md");
        let cases = vec![
            case("interval?", "Inspect every 50 hours.", true, 1.0),
            case("tail number?", REFUSAL, false, 1.0),
        ];

        let report = write_artifacts(&cases, &results_path, &report_path).expect("artifacts");
        assert_eq!(report.summary.total_questions, 2);
        assert_eq!(report.summary.refused, 1);

        let stored: Vec<EvaluationCase> = read_json(&results_path).expect("results json");
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[1].answer, REFUSAL);
        assert!(stored[0].error.is_none());

        let markdown = fs::read_to_string(&report_path).expect("report");
        assert!(markdown.starts_with("# AIRMAN RAG \u{2014} Evaluation Report"));
        assert!(markdown.contains("| **Retrieval hit-rate** | 50.00% |"));
    }

    #[test]
    fn question_set_type_defaults_to_factual() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("questions.json");
        fs::write(
            &path,
            r#"[{"question": "What is Vne?", "type": "numeric"}, {"question": "Define QNH."}]"#,
        )
        .expect("fixture");

        let questions: Vec<QuestionEntry> = read_json(&path).expect("questions");
        assert_eq!(questions[0].question_type, "numeric");
        assert_eq!(questions[1].question_type, "factual");
    }

    #[test]
    fn empty_question_set_still_writes_zero_rate_artifacts() {
        use clap::Parser;

        use crate::cli::{Cli, Commands};

        let dir = tempfile::tempdir().expect("tempdir");
        let questions_path = dir.path().join("questions.json");
        let results_path = dir.path().join("evaluation_results.json");
        let report_path = dir.path().join("report.md");
        fs::write(&questions_path, "[]").expect("fixture");

        let path_arg = |path: &Path| path.to_str().expect("utf-8 temp path").to_string();
        let cli = Cli::try_parse_from([
            "airman-rag".to_string(),
            "evaluate".to_string(),
            "--endpoint".to_string(),
            "http://127.0.0.1:9/ask".to_string(),
            "--questions-path".to_string(),
            path_arg(questions_path.as_path()),
            "--results-path".to_string(),
            path_arg(results_path.as_path()),
            "--report-path".to_string(),
            path_arg(report_path.as_path()),
        ])
        .expect("evaluate parses");
        let Commands::Evaluate(args) = cli.command else {
            panic!("expected evaluate");
        };

        run(args).expect("empty evaluation succeeds");

        let stored: Vec<EvaluationCase> = read_json(&results_path).expect("results json");
        assert!(stored.is_empty());
        let markdown = fs::read_to_string(&report_path).expect("report");
        assert!(markdown.contains("| Total questions | 0 |"));
        assert!(markdown.contains("| **Hallucination rate** | 0.00% |"));
    }
}
