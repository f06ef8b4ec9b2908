/// A candidate-level problem that does not stop the run.
#[derive(Debug, Clone, Copy)]
pub struct WarnEvent<'a> {
    pub code: &'a str,
    pub stage: &'a str,
    pub dir: &'a str,
    pub candidate: &'a str,
    pub reason: &'a str,
    pub err: &'a str,
}

fn sanitize_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut prev_sep = false;
    for ch in value.chars() {
        if ch.is_whitespace() {
            if !out.is_empty() && !prev_sep {
                out.push('_');
                prev_sep = true;
            }
        } else if !ch.is_control() {
            out.push(ch);
            prev_sep = false;
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "na".to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn render(event: &WarnEvent<'_>) -> String {
    format!(
        "RESEED_WARN code={} stage={} dir={} candidate={} reason={} err={}",
        sanitize_value(event.code),
        sanitize_value(event.stage),
        sanitize_value(event.dir),
        sanitize_value(event.candidate),
        sanitize_value(event.reason),
        sanitize_value(event.err),
    )
}

pub fn emit(event: WarnEvent<'_>) {
    tracing::warn!("{}", render(&event));
}
