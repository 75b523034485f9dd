use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};

pub fn discover_pdfs(data_dir: &Path) -> Result<Vec<PathBuf>> {
    if !data_dir.is_dir() {
        bail!("data directory not found: {}", data_dir.display());
    }

    let mut pdfs = fs::read_dir(data_dir)
        .with_context(|| format!("failed to list {}", data_dir.display()))?
        .map(|entry| entry.map(|entry| entry.path()))
        .collect::<std::io::Result<Vec<PathBuf>>>()
        .with_context(|| format!("failed to list {}", data_dir.display()))?
        .into_iter()
        .filter(|path| path.is_file() && is_pdf(path))
        .collect::<Vec<PathBuf>>();
    pdfs.sort();

    Ok(pdfs)
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| extension.eq_ignore_ascii_case("pdf"))
}

pub fn extract_pages_with_pdftotext(
    pdf_path: &Path,
    max_pages_per_doc: Option<usize>,
) -> Result<Vec<String>> {
    let mut command = Command::new("pdftotext");
    command.arg("-enc").arg("UTF-8").arg("-f").arg("1");
    if let Some(max_pages) = max_pages_per_doc {
        command.arg("-l").arg(max_pages.to_string());
    }
    command.arg(pdf_path).arg("-");

    let output = command
        .output()
        .with_context(|| format!("failed to execute pdftotext for {}", pdf_path.display()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "pdftotext returned non-zero exit status for {}: {}",
            pdf_path.display(),
            stderr.trim()
        );
    }

    Ok(split_pages(&String::from_utf8_lossy(&output.stdout)))
}

pub fn split_pages(raw: &str) -> Vec<String> {
    let mut pages = raw
        .split('\u{000C}')
        .map(|page| page.replace('\u{0000}', ""))
        .collect::<Vec<String>>();

    while pages.last().is_some_and(|page| page.trim().is_empty()) {
        pages.pop();
    }

    pages
}
