use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::literal;
use crate::text;

static DECL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\bvar\s+|\bwindow\.)\s*([A-Za-z_]\w*)\s*=\s*\{").unwrap());
static LOAD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"span style="font-size: 4em; line-height: 1em;">([\d.]*) sec"#).unwrap()
});
static PERC_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<td>p9(\d):\s+([\d.]*) sec").unwrap());
static SAMPLES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<td>n:\s+([\d.,]*)").unwrap());
static MOE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<td>\s*&plusmn;\s*([\d.]*)").unwrap());

/// Dashboard headline numbers, read from the rendered page text rather than
/// from any embedded table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SummaryRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub perc95: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub perc98: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moe: Option<f64>,
}

impl SummaryRecord {
    /// Merge whatever summary figure `line` carries; at most one per line.
    pub fn absorb(&mut self, line: &str) {
        if let Some(caps) = LOAD_RE.captures(line) {
            merge(&mut self.load, caps[1].parse().ok());
        } else if let Some(caps) = PERC_RE.captures(line) {
            let v = caps[2].parse().ok();
            match &caps[1] {
                "5" => merge(&mut self.perc95, v),
                "8" => merge(&mut self.perc98, v),
                _ => {}
            }
        } else if let Some(caps) = SAMPLES_RE.captures(line) {
            merge(&mut self.n, text::strip_separators(&caps[1]).parse().ok());
        } else if let Some(caps) = MOE_RE.captures(line) {
            merge(&mut self.moe, caps[1].parse().ok());
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &SummaryRecord::default()
    }
}

fn merge<T>(slot: &mut Option<T>, v: Option<T>) {
    if v.is_some() {
        *slot = v;
    }
}

/// Everything recovered from one page: decoded literals by declared name,
/// plus the summary figures.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub blocks: BTreeMap<String, Value>,
    pub summary: SummaryRecord,
}

struct OpenBlock {
    name: String,
    buffer: String,
}

/// Walk the page line by line. Outside a block, lines feed the summary and
/// may open a `name = {` declaration; inside, lines accumulate until a line
/// holding only `;` (or ending the literal with `};`).
pub fn extract_lines<'a, I>(lines: I) -> Extraction
where
    I: IntoIterator<Item = &'a str>,
{
    let mut out = Extraction::default();
    let mut open: Option<OpenBlock> = None;

    for raw in lines {
        let mut line = raw;

        if open.is_none() {
            out.summary.absorb(raw);
            let Some(caps) = DECL_RE.captures(raw) else {
                continue;
            };
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            open = Some(OpenBlock {
                name: name.as_str().to_string(),
                buffer: String::new(),
            });
            // keep the opening brace
            line = &raw[whole.end() - 1..];
        }

        let Some(block) = open.as_mut() else {
            continue;
        };
        let trimmed = line.trim();
        if trimmed == ";" {
            finish(open.take(), &mut out.blocks);
        } else if let Some(body) = trimmed.strip_suffix(';').filter(|b| b.trim_end().ends_with('}')) {
            block.buffer.push_str(body);
            finish(open.take(), &mut out.blocks);
        } else {
            block.buffer.push_str(line);
            block.buffer.push('\n');
        }
    }

    if let Some(block) = open {
        warn!(block = %block.name, "page ended inside an unterminated block; discarding it");
    }

    out
}

fn finish(block: Option<OpenBlock>, blocks: &mut BTreeMap<String, Value>) {
    let Some(block) = block else {
        return;
    };
    match literal::parse(&block.buffer) {
        Ok(tree) => {
            debug!(block = %block.name, bytes = block.buffer.len(), "decoded block");
            blocks.insert(block.name, tree);
        }
        Err(e) => warn!(block = %block.name, error = %e, "skipping undecodable block"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn extract(page: &str) -> Extraction {
        extract_lines(page.lines())
    }

    #[test]
    fn multi_line_table_block() {
        let page = "<script>\nfoo = {\n  rows: [\n    { c: [ {v:\"a\"}, {v:1.2} ] },\n  ]\n}\n;\n</script>";
        let ex = extract(page);
        let rows = ex.blocks["foo"]["rows"].as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["c"][0]["v"], json!("a"));
        assert_eq!(rows[0]["c"][1]["v"], json!(1.2));
    }

    #[test]
    fn single_line_block_closes_on_brace_semicolon() {
        let ex = extract(r#"foo = { rows: [ { c: [ {v:"a"}, {v:1.2} ] } ] };"#);
        assert_eq!(ex.blocks["foo"], json!({"rows": [{"c": [{"v": "a"}, {"v": 1.2}]}]}));
    }

    #[test]
    fn var_and_window_prefixes() {
        let page = "  var intraday_data = {rows: []}\n;\nwindow.geo_data = {\nrows: []\n}\n;";
        let ex = extract(page);
        assert!(ex.blocks.contains_key("intraday_data"));
        assert!(ex.blocks.contains_key("geo_data"));
    }

    #[test]
    fn undecodable_block_is_skipped_and_later_blocks_survive() {
        let page = "bad = {\nrows: [ ( ]\n}\n;\ngood = {\nrows: []\n}\n;";
        let ex = extract(page);
        assert!(!ex.blocks.contains_key("bad"));
        assert!(ex.blocks.contains_key("good"));
    }

    #[test]
    fn unterminated_block_is_dropped() {
        let ex = extract("foo = {\nrows: [\n");
        assert!(ex.blocks.is_empty());
    }

    #[test]
    fn summary_patterns() {
        let page = concat!(
            "<span style=\"font-size: 4em; line-height: 1em;\">2.41 sec</span>\n",
            "<td>p95:  7.9 sec</td>\n",
            "<td>p98:  12.25 sec</td>\n",
            "<td>n:  1,234,567</td>\n",
            "<td> &plusmn; 0.02</td>\n",
        );
        let ex = extract(page);
        assert_eq!(
            ex.summary,
            SummaryRecord {
                load: Some(2.41),
                perc95: Some(7.9),
                perc98: Some(12.25),
                n: Some(1_234_567),
                moe: Some(0.02),
            }
        );
    }

    #[test]
    fn summary_lines_inside_blocks_are_ignored() {
        let page = "foo = {\nrows: []\n// <td>n:  99</td>\n}\n;";
        let ex = extract(page);
        assert!(ex.summary.is_empty());
    }

    #[test]
    fn empty_summary_serializes_to_empty_object() {
        assert_eq!(serde_json::to_value(SummaryRecord::default()).unwrap(), json!({}));
    }
}
