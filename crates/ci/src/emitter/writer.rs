//! Indentation-aware text output shared by all emitters.

use crate::model::{ArgValue, RunStep, SliceSelector};
use std::fmt::Write;

/// Line-oriented writer with scoped indentation.
///
/// ```
/// use keel_ci::emitter::LineWriter;
///
/// let mut w = LineWriter::new();
/// w.section("jobs:", |w| {
///     w.section("build:", |w| w.line("runs-on: ubuntu-latest"));
/// });
/// assert_eq!(w.finish(), "jobs:\n  build:\n    runs-on: ubuntu-latest\n");
/// ```
#[derive(Debug)]
pub struct LineWriter {
    buf: String,
    depth: usize,
    width: usize,
}

impl Default for LineWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl LineWriter {
    /// Writer indenting by two spaces.
    #[must_use]
    pub const fn new() -> Self {
        Self::with_indent(2)
    }

    /// Writer indenting by `width` spaces.
    #[must_use]
    pub const fn with_indent(width: usize) -> Self {
        Self {
            buf: String::new(),
            depth: 0,
            width,
        }
    }

    /// Write one line at the current indentation.
    pub fn line(&mut self, text: impl AsRef<str>) {
        let text = text.as_ref();
        if !text.is_empty() {
            for _ in 0..self.depth * self.width {
                self.buf.push(' ');
            }
            self.buf.push_str(text);
        }
        self.buf.push('\n');
    }

    /// Write an empty line.
    pub fn blank(&mut self) {
        self.buf.push('\n');
    }

    /// Write a `#` comment line.
    pub fn comment(&mut self, text: impl AsRef<str>) {
        self.line(format!("# {}", text.as_ref()));
    }

    /// Write `header`, then `body` one level deeper.
    pub fn section(&mut self, header: impl AsRef<str>, body: impl FnOnce(&mut Self)) {
        self.line(header);
        self.indented(body);
    }

    /// Run `body` one level deeper.
    pub fn indented(&mut self, body: impl FnOnce(&mut Self)) {
        self.depth += 1;
        body(self);
        self.depth -= 1;
    }

    /// Text written so far.
    #[must_use]
    pub fn finish(self) -> String {
        self.buf
    }
}

/// Render `value` as an inline YAML scalar, quoting only when needed.
#[must_use]
pub fn yaml_scalar(value: &str) -> String {
    match serde_yaml::to_string(value) {
        Ok(text) if !text.trim_end().contains('\n') => text.trim_end().to_string(),
        _ => {
            let mut out = String::with_capacity(value.len() + 2);
            out.push('"');
            for c in value.chars() {
                match c {
                    '"' => out.push_str("\\\""),
                    '\\' => out.push_str("\\\\"),
                    '\n' => out.push_str("\\n"),
                    '\t' => out.push_str("\\t"),
                    '\r' => out.push_str("\\r"),
                    c => out.push(c),
                }
            }
            out.push('"');
            out
        }
    }
}

/// Quote `value` for a POSIX shell, leaving plain words untouched.
#[must_use]
pub fn shell_quote(value: &str) -> String {
    let plain = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./:=@%+,".contains(c));
    if plain {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}

/// Quote a path pattern for a POSIX shell, leaving glob characters
/// (`*`, `?`, `[`, `]`) unquoted so the shell still expands them.
#[must_use]
pub fn shell_glob(pattern: &str) -> String {
    let mut out = String::new();
    let mut literal = String::new();
    for c in pattern.chars() {
        if matches!(c, '*' | '?' | '[' | ']') {
            if !literal.is_empty() {
                out.push_str(&shell_quote(&literal));
                literal.clear();
            }
            out.push(c);
        } else {
            literal.push(c);
        }
    }
    if !literal.is_empty() || out.is_empty() {
        out.push_str(&shell_quote(&literal));
    }
    out
}

/// Artifact hand-off command:
/// `<entrypoint> artifacts <action> <name>... --build-id "<id>" [--slice <slice>]`.
///
/// `build_id` and `current_slice` are backend expressions, placed inside
/// double quotes.
#[must_use]
pub fn artifacts_command(
    entrypoint: &str,
    action: &str,
    names: &[String],
    slice: &SliceSelector,
    build_id: &str,
    current_slice: &str,
) -> String {
    let mut line = format!("{entrypoint} artifacts {action}");
    for name in names {
        line.push(' ');
        line.push_str(&shell_quote(name));
    }
    let _ = write!(line, " --build-id \"{build_id}\"");
    match slice {
        SliceSelector::Unsliced => {}
        SliceSelector::Current => {
            let _ = write!(line, " --slice \"{current_slice}\"");
        }
        SliceSelector::Exact(slice) => {
            let _ = write!(line, " --slice {}", shell_quote(slice));
        }
        SliceSelector::All => {
            let _ = write!(line, " --slice '{}'", keel_core::ALL_SLICES);
        }
    }
    line
}

/// Build command line for a run step:
/// `<entrypoint> run <Target> --skip-dependencies --non-interactive [--<arg> <value>]...`.
///
/// `render` supplies the backend syntax of each argument value.
pub fn command_line(entrypoint: &str, run: &RunStep, render: impl Fn(&ArgValue) -> String) -> String {
    let mut line = format!(
        "{entrypoint} run {} --skip-dependencies --non-interactive",
        shell_quote(&run.target)
    );
    for arg in &run.args {
        line.push_str(" --");
        line.push_str(&arg.name);
        line.push(' ');
        line.push_str(&render(&arg.value));
    }
    line
}
