//! Plain-text rendering of a checklist [`Report`].

use std::io::{self, Write};

use super::{Report, Status};

const SEPARATOR: &str =
    "================================================================================";
const QUESTION_WIDTH: usize = 40;
const FIX_QUESTION_WIDTH: usize = 80;
const ANSWER_WIDTH: usize = 12;
const COLUMN_PADDING: usize = 2;

pub fn render(report: &Report, out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "{SEPARATOR}")?;
    writeln!(
        out,
        "USER STORY CHECKLIST VALIDATION - Story {}: {}",
        report.story_number, report.story_title
    )?;
    writeln!(out, "{SEPARATOR}")?;
    writeln!(out)?;

    render_table(report, out)?;
    render_summary(report, out)?;
    render_fix_prompts(report, out)
}

pub fn render_to_string(report: &Report) -> String {
    let mut buf = Vec::new();
    // Writing into a Vec cannot fail.
    let _ = render(report, &mut buf);
    String::from_utf8_lossy(&buf).into_owned()
}

fn render_table(report: &Report, out: &mut impl Write) -> io::Result<()> {
    let mut rows: Vec<[String; 5]> = vec![
        ["SECTION", "QUESTION", "EXPECTED", "ACTUAL", "STATUS"].map(String::from),
        ["-------", "--------", "--------", "------", "------"].map(String::from),
    ];
    rows.extend(report.results.iter().map(|r| {
        [
            r.section_path.clone(),
            truncate(&r.question, QUESTION_WIDTH),
            truncate(&r.expected, ANSWER_WIDTH),
            truncate(&r.actual, ANSWER_WIDTH),
            r.status.as_str().to_string(),
        ]
    }));

    // The last column is not padded.
    let mut widths = [0usize; 4];
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row.iter()) {
            *w = (*w).max(cell.chars().count());
        }
    }
    for row in &rows {
        let mut line = String::new();
        for (cell, width) in row.iter().zip(widths) {
            line.push_str(cell);
            let fill = width + COLUMN_PADDING - cell.chars().count();
            line.extend(std::iter::repeat(' ').take(fill));
        }
        line.push_str(&row[4]);
        writeln!(out, "{line}")?;
    }
    writeln!(out)
}

fn render_summary(report: &Report, out: &mut impl Write) -> io::Result<()> {
    let s = &report.summary;
    let pct = |n: usize| {
        if s.total_prompts == 0 {
            0.0
        } else {
            n as f64 / s.total_prompts as f64 * 100.0
        }
    };
    writeln!(out, "{SEPARATOR}")?;
    writeln!(out, "SUMMARY")?;
    writeln!(out, "{SEPARATOR}")?;
    writeln!(out, "Total Prompts: {}", s.total_prompts)?;
    writeln!(out, "PASS: {} ({:.1}%)", s.pass_count, pct(s.pass_count))?;
    writeln!(out, "WARN: {} ({:.1}%)", s.warn_count, pct(s.warn_count))?;
    writeln!(out, "FAIL: {} ({:.1}%)", s.fail_count, pct(s.fail_count))?;
    writeln!(out, "SKIP: {}", s.skip_count)?;
    writeln!(out)?;
    writeln!(out, "Overall: {}", report.overall_status())?;
    writeln!(out, "{SEPARATOR}")
}

fn render_fix_prompts(report: &Report, out: &mut impl Write) -> io::Result<()> {
    let fixes: Vec<_> = report
        .results
        .iter()
        .filter(|r| r.status == Status::Fail)
        .filter_map(|r| r.fix_prompt.as_deref().map(|p| (r, p)))
        .filter(|(_, p)| !p.is_empty())
        .collect();
    if fixes.is_empty() {
        return Ok(());
    }

    writeln!(out)?;
    writeln!(out, "{SEPARATOR}")?;
    writeln!(out, "FIX PROMPTS")?;
    writeln!(out, "{SEPARATOR}")?;
    for (i, (result, prompt)) in fixes.iter().enumerate() {
        writeln!(out, "\n### Fix {}: {}", i + 1, result.section_path)?;
        writeln!(out, "Question: {}", truncate(&result.question, FIX_QUESTION_WIDTH))?;
        writeln!(out)?;
        writeln!(out, "{prompt}")?;
    }
    writeln!(out, "{SEPARATOR}")
}

/// Collapse whitespace, then cut to `max` characters ending in `...`.
fn truncate(input: &str, max: usize) -> String {
    let cleaned = input.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.chars().count() <= max {
        return cleaned;
    }
    if max <= 3 {
        return cleaned.chars().take(max).collect();
    }
    let mut cut: String = cleaned.chars().take(max - 3).collect();
    cut.push_str("...");
    cut
}
