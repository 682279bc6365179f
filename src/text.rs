use deunicode::deunicode;

/// Stand-in for an intentionally empty quoted literal, so it stays
/// distinguishable from a missing value once the literal is decoded.
pub const EMPTY_VALUE: &str = "NOVAL";

/// Canonicalize accented and special characters to their closest ASCII form.
pub fn normalize(s: &str) -> String {
    if s.is_ascii() {
        return s.to_string();
    }
    deunicode(s)
}

/// Text of a quoted literal as it is stored in a value tree: canonical ASCII
/// with all whitespace removed. Dashboard drilldown values (bandwidth buckets,
/// page groups) are addressed in this compacted form.
pub fn compact(s: &str) -> String {
    normalize(s).chars().filter(|c| !c.is_whitespace()).collect()
}

/// Drop thousands separators from a formatted count ("1,234" -> "1234").
pub fn strip_separators(s: &str) -> String {
    s.replace(',', "")
}
