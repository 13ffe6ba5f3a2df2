use crate::error::{EntityFailure, StoreError};

#[derive(Debug, Clone, Copy)]
pub struct WarnEvent<'a> {
    pub code: &'a str,
    pub stage: &'a str,
    pub action: &'a str,
    pub entity: &'a str,
    pub path: &'a str,
    pub reason: &'a str,
    pub err: &'a str,
}

fn sanitize_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut prev_sep = false;
    for ch in value.chars() {
        if ch.is_ascii_whitespace() {
            if !out.is_empty() && !prev_sep {
                out.push('_');
                prev_sep = true;
            }
        } else if ch.is_ascii_graphic() {
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
        "DAMWATCH_WARN code={} stage={} action={} entity={} path={} reason={} err={}",
        sanitize_value(event.code),
        sanitize_value(event.stage),
        sanitize_value(event.action),
        sanitize_value(event.entity),
        sanitize_value(event.path),
        sanitize_value(event.reason),
        sanitize_value(event.err),
    )
}

pub fn emit(event: WarnEvent<'_>) {
    eprintln!("{}", render(&event));
}

fn error_path(error: &StoreError) -> String {
    match error {
        StoreError::CorruptLog { path, .. }
        | StoreError::CorruptChunk { path, .. }
        | StoreError::Io { path, .. } => path.display().to_string(),
        _ => String::new(),
    }
}

/// Warning line for an entity skipped during `stage`.
pub fn emit_failure(stage: &str, failure: &EntityFailure) {
    emit(WarnEvent {
        code: failure.error.code().as_str(),
        stage,
        action: "skip-entity",
        entity: &failure.entity,
        path: &error_path(&failure.error),
        reason: "entity-scoped-failure",
        err: &failure.error.to_string(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_value_rewrites_whitespace() {
        assert_eq!(sanitize_value("a b\tc"), "a_b_c");
    }

    #[test]
    fn sanitize_value_falls_back_for_empty() {
        assert_eq!(sanitize_value("   "), "na");
    }

    #[test]
    fn render_keeps_fields_in_order() {
        let line = render(&WarnEvent {
            code: "E002_UNPARSEABLE_TIMESTAMP",
            stage: "archive",
            action: "keep-record",
            entity: "E1",
            path: "",
            reason: "unparseable observed_at",
            err: "bad value",
        });
        assert_eq!(
            line,
            "DAMWATCH_WARN code=E002_UNPARSEABLE_TIMESTAMP stage=archive action=keep-record \
             entity=E1 path=na reason=unparseable_observed_at err=bad_value"
        );
    }
}
