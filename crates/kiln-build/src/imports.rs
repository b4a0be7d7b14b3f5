//! Lexical scanning and rewriting of ES module import specifiers.
//!
//! Recognises static `import ... from "x"`, `export ... from "x"`, side-effect
//! `import "x"` and dynamic `import("x")` with a string literal argument.
//! This is a token-level scan, not a parse: specifiers inside comments or
//! template strings can be picked up.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

static IMPORT_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(concat!(
        r#"(?m)(?:^|[^\w$.])(?:import|export)(?:\s*[\w*$\{\}\s,]*?\s*from)?\s*["']([^"'\r\n]+)["']"#,
        r#"|(?:^|[^\w$.])import\s*\(\s*["']([^"'\r\n]+)["']\s*\)"#,
    ))
    .ok()
});

/// One import specifier found in a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSpec {
    pub specifier: String,
    /// Byte range of the specifier text, quotes excluded.
    pub span: Range<usize>,
    pub dynamic: bool,
}

/// Find every import specifier in `code`, in source order.
pub fn scan_imports(code: &str) -> Vec<ImportSpec> {
    let Some(re) = IMPORT_RE.as_ref() else {
        return Vec::new();
    };
    re.captures_iter(code)
        .filter_map(|caps| {
            let (m, dynamic) = match (caps.get(1), caps.get(2)) {
                (Some(m), _) => (m, false),
                (None, Some(m)) => (m, true),
                (None, None) => return None,
            };
            Some(ImportSpec {
                specifier: m.as_str().to_string(),
                span: m.range(),
                dynamic,
            })
        })
        .collect()
}

/// Replace every import specifier for which `rewrite` returns `Some`.
pub fn rewrite_imports<F>(code: &str, mut rewrite: F) -> String
where
    F: FnMut(&ImportSpec) -> Option<String>,
{
    let mut out = String::with_capacity(code.len());
    let mut last = 0;

    for spec in scan_imports(code) {
        if let Some(replacement) = rewrite(&spec) {
            out.push_str(&code[last..spec.span.start]);
            out.push_str(&replacement);
            last = spec.span.end;
        }
    }

    out.push_str(&code[last..]);
    out
}
