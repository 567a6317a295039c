//! Marker-delimited blocks inside a streamed response.

pub const QUESTIONS_START: &str = "=== QUESTIONS_START ===";
pub const QUESTIONS_END: &str = "=== QUESTIONS_END ===";

fn between<'a>(text: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let from = text.find(start)? + start.len();
    let len = text[from..].find(end)?;
    Some(text[from..from + len].trim())
}

/// Content between `=== FILE_START: <path> ===` and `=== FILE_END: <path> ===`.
pub fn file_block<'a>(text: &'a str, path: &str) -> Option<&'a str> {
    between(
        text,
        &format!("=== FILE_START: {path} ==="),
        &format!("=== FILE_END: {path} ==="),
    )
}

/// The first file block of the response, whatever path it names.
pub fn any_file_block(text: &str) -> Option<(&str, &str)> {
    let start = text.find("=== FILE_START:")?;
    let rest = &text[start + "=== FILE_START:".len()..];
    let path = rest[..rest.find("===")?].trim();
    file_block(text, path).map(|content| (path, content))
}

pub fn questions_block(text: &str) -> Option<&str> {
    between(text, QUESTIONS_START, QUESTIONS_END)
}
