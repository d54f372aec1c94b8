//! Budget-constrained context rendering.
//!
//! Renders an ordered list of [`EvidenceRecord`]s into a single text block:
//!
//! ```text
//! === TITLE ===
//! [CHUNK 1] id=a source=paper.pdf score=0.1234 page=3
//! body text…
//!
//! [CHUNK 2] id=b
//! ...
//! ```
//!
//! Packing is greedy and block-atomic: the first record whose block would
//! push the running length past `max_total_chars` stops iteration, and later
//! (possibly smaller) records are never considered in its place. Lengths are
//! counted in chars.
//!
//! # Determinism
//!
//! Rendering is deterministic: the same records and config always produce
//! byte-identical output. Sorting is stable and nothing depends on time or
//! hashing order.

use evidex_core::{BudgetConfig, ContextOrdering, EvidenceRecord};

/// Appended to a record body cut at `max_chunk_chars`.
pub const TRUNCATION_MARKER: char = '…';

/// Trim `text` and cut it to at most `max_chars` chars, appending
/// [`TRUNCATION_MARKER`] when anything was cut.
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(max_chars) {
        None => trimmed.to_string(),
        Some((cut, _)) => {
            let mut out = trimmed[..cut].trim_end().to_string();
            out.push(TRUNCATION_MARKER);
            out
        }
    }
}

// ── Block accumulation ────────────────────────────────────────────────────

/// Greedy, block-atomic accumulator shared by every evidence formatter.
///
/// The preamble is always written and counts toward the budget. A block is
/// accepted only if it fits entirely in what remains.
#[derive(Debug)]
pub struct BlockWriter {
    out: String,
    total: usize,
    blocks: usize,
    max_total_chars: usize,
    max_blocks: usize,
}

impl BlockWriter {
    pub fn new(max_total_chars: usize) -> Self {
        Self {
            out: String::new(),
            total: 0,
            blocks: 0,
            max_total_chars,
            max_blocks: usize::MAX,
        }
    }

    pub fn with_max_blocks(mut self, max_blocks: usize) -> Self {
        self.max_blocks = max_blocks;
        self
    }

    pub fn with_preamble(mut self, preamble: &str) -> Self {
        self.out.push_str(preamble);
        self.total += preamble.chars().count();
        self
    }

    /// Whether the block-count cap has been reached.
    pub fn is_full(&self) -> bool {
        self.blocks >= self.max_blocks
    }

    /// Append `block` if it fits. Returns false (and writes nothing) otherwise.
    pub fn push(&mut self, block: &str) -> bool {
        if self.is_full() {
            return false;
        }
        let len = block.chars().count();
        if self.total + len > self.max_total_chars {
            return false;
        }
        self.out.push_str(block);
        self.total += len;
        self.blocks += 1;
        true
    }

    pub fn blocks(&self) -> usize {
        self.blocks
    }

    /// The accumulated text, trimmed.
    pub fn finish(self) -> String {
        self.out.trim().to_string()
    }
}

// ── Rendering ─────────────────────────────────────────────────────────────

/// Output of [`render_with_stats`].
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub text: String,
    /// Ids of the records that made it into `text`, in rendered order.
    pub record_ids: Vec<String>,
    /// Records left out by the count cap or the character budget.
    pub dropped: usize,
}

/// Render `records` under `config`, headed by `=== {title} ===`.
///
/// Empty input yields only the header line. The header is always written
/// and counts toward `max_total_chars`; a title longer than the budget is
/// the one case where the output exceeds it, with no record blocks.
pub fn render(records: &[EvidenceRecord], config: &BudgetConfig, title: &str) -> String {
    render_with_stats(records, config, title).text
}

/// Like [`render`], also reporting which records were emitted.
pub fn render_with_stats(records: &[EvidenceRecord], config: &BudgetConfig, title: &str) -> Rendered {
    let ordered = order_records(records, config.ordering);
    let mut writer = BlockWriter::new(config.max_total_chars)
        .with_max_blocks(config.max_chunk_count)
        .with_preamble(&format!("=== {title} ===\n"));
    let mut record_ids = Vec::new();

    for (index, record) in ordered.iter().enumerate() {
        if writer.is_full() {
            break;
        }
        let block = record_block(index + 1, record, config);
        if !writer.push(&block) {
            break;
        }
        record_ids.push(record.id().to_string());
    }

    Rendered {
        text: writer.finish(),
        dropped: ordered.len() - record_ids.len(),
        record_ids,
    }
}

fn order_records(records: &[EvidenceRecord], ordering: ContextOrdering) -> Vec<&EvidenceRecord> {
    let mut ordered: Vec<&EvidenceRecord> = records.iter().collect();
    match ordering {
        ContextOrdering::AsIs => {}
        ContextOrdering::ById => ordered.sort_by(|a, b| a.id().cmp(b.id())),
        ContextOrdering::ByPageThenId => {
            ordered.sort_by(|a, b| (a.page_number(), a.id()).cmp(&(b.page_number(), b.id())))
        }
    }
    ordered
}

fn record_block(index: usize, record: &EvidenceRecord, config: &BudgetConfig) -> String {
    let mut block = String::new();

    if config.include_headers {
        block.push_str(&format!("[CHUNK {index}] id={}", record.id()));
        if let Some(source) = record.effective_source() {
            block.push_str(&format!(" source={source}"));
        }
        if let Some(score) = record.relevance() {
            block.push_str(&format!(" score={score:.4}"));
        }
        if let Some(page) = record.page().filter(|p| !p.is_blank()) {
            block.push_str(&format!(" page={page}"));
        }
        block.push('\n');
    }

    if config.include_metadata && !record.metadata().is_empty() {
        let dump = serde_json::to_string(record.metadata()).unwrap_or_default();
        block.push_str(&format!("metadata={dump}\n"));
    }

    block.push_str(&truncate_text(record.text(), config.max_chunk_chars));
    block.push_str("\n\n");
    block
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(id: &str, text: &str) -> EvidenceRecord {
        EvidenceRecord::new(id, text).unwrap()
    }

    fn roomy() -> BudgetConfig {
        BudgetConfig::try_new(10_000, 6_000, 10).unwrap()
    }

    // ── truncate_text ─────────────────────────────────────────────────

    #[test]
    fn short_text_only_trimmed() {
        assert_eq!(truncate_text("  hello  ", 10), "hello");
        assert_eq!(truncate_text("hello", 5), "hello");
    }

    #[test]
    fn long_text_cut_with_marker() {
        assert_eq!(truncate_text("hello world", 6), "hello…");
        assert_eq!(truncate_text("abcdef", 3), "abc…");
    }

    #[test]
    fn truncation_counts_chars() {
        assert_eq!(truncate_text("ééééé", 2), "éé…");
    }

    #[test]
    fn zero_limit_leaves_only_marker() {
        assert_eq!(truncate_text("abc", 0), "…");
    }

    // ── render ────────────────────────────────────────────────────────

    #[test]
    fn empty_records_yield_header_only() {
        assert_eq!(render(&[], &roomy(), "EVIDENCE"), "=== EVIDENCE ===");
    }

    #[test]
    fn two_records_in_input_order() {
        let records = vec![rec("a", "Alpha text."), rec("b", "Beta text.")];
        let text = render(&records, &roomy(), "EVIDENCE");
        assert_eq!(
            text,
            "=== EVIDENCE ===\n[CHUNK 1] id=a\nAlpha text.\n\n[CHUNK 2] id=b\nBeta text."
        );
    }

    #[test]
    fn header_includes_source_score_and_page() {
        let records = vec![
            rec("a", "body")
                .with_source("paper.pdf")
                .with_relevance(0.123456)
                .with_meta("page_number", 3_i64),
        ];
        let text = render(&records, &roomy(), "T");
        assert!(text.contains("[CHUNK 1] id=a source=paper.pdf score=0.1235 page=3\nbody"));
    }

    #[test]
    fn headers_can_be_disabled() {
        let cfg = roomy().with_headers(false);
        let text = render(&[rec("a", "body")], &cfg, "T");
        assert_eq!(text, "=== T ===\nbody");
    }

    #[test]
    fn metadata_dump_is_json() {
        let cfg = roomy().with_metadata(true);
        let records = vec![rec("a", "body").with_meta("lang", "en")];
        let text = render(&records, &cfg, "T");
        assert!(text.contains("metadata={\"lang\":\"en\"}\nbody"));
    }

    #[test]
    fn chunk_count_cap_is_respected() {
        let cfg = BudgetConfig::try_new(10_000, 100, 2).unwrap();
        let records: Vec<_> = (0..5).map(|i| rec(&format!("r{i}"), "x")).collect();
        let out = render_with_stats(&records, &cfg, "T");
        assert_eq!(out.record_ids, vec!["r0", "r1"]);
        assert_eq!(out.dropped, 3);
    }

    #[test]
    fn overflowing_block_stops_iteration() {
        // header "=== T ===\n" is 10 chars; each block "[CHUNK n] id=x\n" + body + "\n\n"
        let records = vec![rec("a", "short"), rec("b", &"y".repeat(200)), rec("c", "tiny")];
        let cfg = BudgetConfig::try_new(60, 6_000, 10).unwrap();
        let out = render_with_stats(&records, &cfg, "T");
        assert_eq!(out.record_ids, vec!["a"]);
        assert!(!out.text.contains("tiny"));
    }

    #[test]
    fn output_never_exceeds_budget() {
        let records: Vec<_> = (0..40)
            .map(|i| rec(&format!("id{i}"), &"word ".repeat(i * 7 + 1)))
            .collect();
        for max in [20, 50, 100, 333, 1_000, 5_000] {
            let cfg = BudgetConfig::try_new(max, 80, 25).unwrap().with_metadata(true);
            let out = render_with_stats(&records, &cfg, "BUDGET");
            assert!(out.text.chars().count() <= max as usize, "max={max}");
            assert!(out.record_ids.len() <= 25);
        }
    }

    #[test]
    fn oversized_title_is_kept_without_blocks() {
        let cfg = BudgetConfig::try_new(10, 80, 5).unwrap();
        let out = render_with_stats(&[rec("a", "x")], &cfg, "A VERY LONG TITLE");
        assert_eq!(out.text, "=== A VERY LONG TITLE ===");
        assert!(out.record_ids.is_empty());
        assert_eq!(out.dropped, 1);
    }

    #[test]
    fn by_id_ordering() {
        let cfg = roomy().with_ordering(ContextOrdering::ById);
        let records = vec![rec("c", "3"), rec("a", "1"), rec("b", "2")];
        let out = render_with_stats(&records, &cfg, "T");
        assert_eq!(out.record_ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn by_page_then_id_ordering() {
        let cfg = roomy().with_ordering(ContextOrdering::ByPageThenId);
        let records = vec![
            rec("z", "p2").with_meta("page", 2_i64),
            rec("y", "p1").with_meta("page_number", "1"),
            rec("x", "none"),
            rec("w", "p2").with_meta("page", 2_i64),
        ];
        let out = render_with_stats(&records, &cfg, "T");
        assert_eq!(out.record_ids, vec!["x", "y", "w", "z"]);
    }

    #[test]
    fn rendering_is_deterministic() {
        let records: Vec<_> = (0..12)
            .map(|i| {
                rec(&format!("id{}", 12 - i), &format!("text {i}"))
                    .with_meta("page", (i % 3) as i64)
                    .with_relevance(i as f64 / 10.0)
            })
            .collect();
        for ordering in [
            ContextOrdering::AsIs,
            ContextOrdering::ById,
            ContextOrdering::ByPageThenId,
        ] {
            let cfg = roomy().with_ordering(ordering).with_metadata(true);
            assert_eq!(render(&records, &cfg, "D"), render(&records, &cfg, "D"));
        }
    }

    #[test]
    fn block_writer_preamble_counts_toward_budget() {
        let mut writer = BlockWriter::new(10).with_preamble("12345");
        assert!(writer.push("abcde"));
        assert!(!writer.push("f"));
        assert_eq!(writer.blocks(), 1);
        assert_eq!(writer.finish(), "12345abcde");
    }
}
