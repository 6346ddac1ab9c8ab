// src/model/submitfile.rs

//! Value formatting for HTCondor submit files.

const KIB: i64 = 1024;
const MIB: i64 = 1024 * 1024;

fn escape_char(c: char, out: &mut String) {
    match c {
        '\t' => out.push_str(r"\t"),
        '\n' => out.push_str(r"\n"),
        '\x0c' => out.push_str(r"\f"),
        '\r' => out.push_str(r"\r"),
        '"' => out.push_str("\\\""),
        '\'' => out.push_str(r"\'"),
        '\\' => out.push_str(r"\\"),
        other => out.push(other),
    }
}

/// Render a list of strings as an HTCondor list literal: `{"a","b"}`.
///
/// Tab, newline, form feed, carriage return, double quote, apostrophe and
/// backslash are backslash-escaped; everything else is copied through.
pub fn format_list<S: AsRef<str>>(items: &[S]) -> String {
    let mut out = String::from("{");
    for (idx, item) in items.iter().enumerate() {
        if idx > 0 {
            out.push(',');
        }
        out.push('"');
        for c in item.as_ref().chars() {
            escape_char(c, &mut out);
        }
        out.push('"');
    }
    out.push('}');
    out
}

/// Render a byte count the way HTCondor resource requests expect it.
///
/// Below one MiB the value is rounded up to whole KiB, otherwise to whole MiB.
pub fn condor_bytes(bytes: i64) -> String {
    if bytes < MIB {
        format!("{}KB", ceil_div(bytes, KIB))
    } else {
        format!("{}MB", ceil_div(bytes, MIB))
    }
}

fn ceil_div(n: i64, d: i64) -> i64 {
    if n <= 0 { 0 } else { (n + d - 1) / d }
}
