use regex::bytes::Regex;
use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{Result, TailError};
use crate::pipeline::HandoffBuffer;
use crate::types::Chunk;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKind {
    /// Keep only lines matching the rule.
    Include,
    /// Drop lines matching the rule.
    Exclude,
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterKind::Include => write!(f, "include"),
            FilterKind::Exclude => write!(f, "exclude"),
        }
    }
}

/// A set of patterns compiled into a single alternation.
#[derive(Clone)]
pub struct FilterRule {
    kind: FilterKind,
    patterns: Vec<String>,
    regex: Regex,
}

impl FilterRule {
    pub fn new(kind: FilterKind, patterns: Vec<String>) -> Result<Self> {
        if patterns.is_empty() {
            return Err(TailError::EmptyRule);
        }
        let regex = Regex::new(&patterns.join("|"))?;
        Ok(Self {
            kind,
            patterns,
            regex,
        })
    }

    pub fn kind(&self) -> FilterKind {
        self.kind
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Whether a line survives this rule.
    pub fn keeps(&self, line: &[u8]) -> bool {
        let matched = self.regex.is_match(line);
        match self.kind {
            FilterKind::Include => matched,
            FilterKind::Exclude => !matched,
        }
    }
}

impl fmt::Debug for FilterRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterRule")
            .field("kind", &self.kind)
            .field("patterns", &self.patterns)
            .finish()
    }
}

/// Outcome of running one line through the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Keep,
    /// Blank after trimming.
    Empty,
    /// Dropped by the rule at this position in the chain.
    DroppedBy(usize),
}

/// Ordered sequence of rules; each rule sees only what survived the
/// previous ones.
#[derive(Debug, Clone, Default)]
pub struct FilterChain {
    rules: Vec<FilterRule>,
}

impl FilterChain {
    pub fn new(rules: Vec<FilterRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[FilterRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn verdict(&self, line: &[u8]) -> Verdict {
        let line = trim_space(line);
        if line.is_empty() {
            return Verdict::Empty;
        }
        match self.rules.iter().position(|rule| !rule.keeps(line)) {
            Some(stage) => Verdict::DroppedBy(stage),
            None => Verdict::Keep,
        }
    }

    /// Filter a chunk line by line. Returns `None` when nothing survives.
    pub fn apply(&self, chunk: &Chunk) -> Option<Chunk> {
        let mut out = Vec::with_capacity(chunk.data.len());
        for line in chunk.data.split(|b| *b == b'\n') {
            if self.verdict(line) == Verdict::Keep {
                out.extend_from_slice(trim_space(line));
                out.push(b'\n');
            }
        }
        if out.is_empty() {
            None
        } else {
            Some(Chunk::new(chunk.source.clone(), out))
        }
    }
}

/// Strip leading and trailing Unicode whitespace. Invalid UTF-8 counts as
/// content, so trimming stops at it.
fn trim_space(line: &[u8]) -> &[u8] {
    let start = match line.utf8_chunks().next() {
        Some(first) => first.valid().len() - first.valid().trim_start().len(),
        None => return line,
    };
    let end = match line.utf8_chunks().last() {
        Some(last) if last.invalid().is_empty() => {
            line.len() - (last.valid().len() - last.valid().trim_end().len())
        }
        _ => line.len(),
    };
    if start >= end { &[] } else { &line[start..end] }
}

/// Moves chunks from `input` through `chain` into `output` until cancelled
/// or until `input` is closed and drained.
pub async fn run_filter_stage(
    chain: FilterChain,
    input: HandoffBuffer,
    output: HandoffBuffer,
    cancel: CancellationToken,
) {
    info!(
        "Filter stage started with {} rule(s): {}",
        chain.rules().len(),
        chain
            .rules()
            .iter()
            .map(|r| format!("{}={}", r.kind(), r.patterns().join(",")))
            .collect::<Vec<_>>()
            .join(" -> ")
    );

    while let Some(chunk) = input.take(&cancel).await {
        match chain.apply(&chunk) {
            Some(filtered) => output.insert(filtered),
            None => debug!("{} chunk fully filtered", chunk.source),
        }
    }

    if !cancel.is_cancelled() {
        output.close();
    }
    debug!("Filter stage stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn chunk(data: &str) -> Chunk {
        Chunk::new(Arc::from("pod"), data.as_bytes().to_vec())
    }

    fn include(patterns: &[&str]) -> FilterRule {
        FilterRule::new(
            FilterKind::Include,
            patterns.iter().map(|p| p.to_string()).collect(),
        )
        .unwrap()
    }

    fn exclude(patterns: &[&str]) -> FilterRule {
        FilterRule::new(
            FilterKind::Exclude,
            patterns.iter().map(|p| p.to_string()).collect(),
        )
        .unwrap()
    }

    fn lines(chunk: &Option<Chunk>) -> Vec<String> {
        chunk
            .as_ref()
            .map(|c| {
                String::from_utf8(c.data.clone())
                    .unwrap()
                    .lines()
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    #[test]
    fn test_alternation_rule() {
        let rule = include(&["example.com", "mysite.com"]);
        assert!(rule.keeps(b"GET example.com/"));
        assert!(rule.keeps(b"GET mysite.com/"));
        assert!(!rule.keeps(b"GET other.org/"));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        assert!(matches!(
            FilterRule::new(FilterKind::Include, vec!["(unclosed".to_string()]),
            Err(TailError::Pattern(_))
        ));
        assert!(matches!(
            FilterRule::new(FilterKind::Exclude, Vec::new()),
            Err(TailError::EmptyRule)
        ));
    }

    #[test]
    fn test_exclude_only() {
        let chain = FilterChain::new(vec![exclude(&["POST", "DELETE"])]);
        let out = chain.apply(&chunk("GET /a\nPOST /b\nDELETE /c\nPUT /d\n"));
        let survivors = lines(&out);
        assert_eq!(survivors, vec!["GET /a", "PUT /d"]);
        for line in survivors {
            assert!(!line.contains("POST") && !line.contains("DELETE"));
        }
    }

    #[test]
    fn test_include_only() {
        let chain = FilterChain::new(vec![include(&["foo", "bar"])]);
        let out = chain.apply(&chunk("foo 1\nbaz 2\nbar 3\nqux\n"));
        let survivors = lines(&out);
        assert_eq!(survivors, vec!["foo 1", "bar 3"]);
        for line in survivors {
            assert!(line.contains("foo") || line.contains("bar"));
        }
    }

    #[test]
    fn test_exclude_then_include() {
        let chain = FilterChain::new(vec![exclude(&["POST"]), include(&["foo"])]);
        let out = chain.apply(&chunk("GET /x\nPOST /y\nfoo bar\n")).unwrap();
        assert_eq!(out.data, b"foo bar\n");
        assert_eq!(&*out.source, "pod");
    }

    #[test]
    fn test_rule_order_decides_dropping_stage() {
        let exclude_first = FilterChain::new(vec![exclude(&["POST"]), include(&["foo"])]);
        let include_first = FilterChain::new(vec![include(&["foo"]), exclude(&["POST"])]);

        let line = b"POST /foo";
        assert_eq!(exclude_first.verdict(line), Verdict::DroppedBy(0));
        assert_eq!(include_first.verdict(line), Verdict::DroppedBy(1));

        // A line failing only the include rule is rejected at different stages too.
        assert_eq!(exclude_first.verdict(b"GET /x"), Verdict::DroppedBy(1));
        assert_eq!(include_first.verdict(b"GET /x"), Verdict::DroppedBy(0));
    }

    #[test]
    fn test_blank_lines_dropped_and_trimmed() {
        let chain = FilterChain::default();
        let out = chain.apply(&chunk("  one  \n\n   \n\ttwo\r\n")).unwrap();
        assert_eq!(out.data, b"one\ntwo\n");
        assert_eq!(chain.verdict(b"   "), Verdict::Empty);
    }

    #[test]
    fn test_unicode_whitespace_trimmed() {
        let chain = FilterChain::default();
        let out = chain
            .apply(&chunk("\u{a0}\u{a0}\nkeep\u{3000}\n\u{2003}indented\n"))
            .unwrap();
        assert_eq!(out.data, "keep\nindented\n".as_bytes());
        assert_eq!(chain.verdict("\u{a0}\u{3000}".as_bytes()), Verdict::Empty);
    }

    #[test]
    fn test_trim_stops_at_invalid_utf8() {
        assert_eq!(trim_space(b" \xff x \xfe "), b"\xff x \xfe");
        assert_eq!(trim_space(b"\xa0"), b"\xa0");
        assert_eq!(trim_space(b""), b"");
    }

    #[test]
    fn test_no_survivors_yields_nothing() {
        let chain = FilterChain::new(vec![include(&["nomatch"])]);
        assert!(chain.apply(&chunk("a\nb\nc\n")).is_none());
        assert!(chain.apply(&chunk("\n\n")).is_none());
    }

    #[test]
    fn test_apply_is_idempotent() {
        let chain = FilterChain::new(vec![include(&["err", "warn"]), exclude(&["healthz"])]);
        let input = chunk("warn a\nerr healthz\ninfo b\nerr c\n");
        let first = chain.apply(&input);
        let second = chain.apply(&input);
        assert_eq!(first, second);
        assert_eq!(lines(&first), vec!["warn a", "err c"]);
    }

    #[tokio::test]
    async fn test_filter_stage_forwards_and_closes() {
        let input = HandoffBuffer::new(Duration::from_millis(10));
        let output = HandoffBuffer::new(Duration::from_millis(10));
        let cancel = CancellationToken::new();
        let chain = FilterChain::new(vec![exclude(&["noise"])]);

        input.insert(chunk("keep 1\nnoise\n"));
        input.insert(chunk("noise only\n"));
        input.insert(chunk("keep 2\n"));
        input.close();

        run_filter_stage(chain, input, output.clone(), cancel.clone()).await;

        assert!(output.is_closed());
        assert_eq!(output.take(&cancel).await.unwrap().data, b"keep 1\n");
        assert_eq!(output.take(&cancel).await.unwrap().data, b"keep 2\n");
        assert!(output.take(&cancel).await.is_none());
    }
}
