//! Streaming merger: collapses findings across review passes and renders
//! the consolidated per-agent output.

use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use tracing::debug;

use super::normalize::{normalize_text, NormalizedFinding};
use super::parser::{parse_finding_blocks, FindingBlock};
use super::similarity::is_near_duplicate;
use crate::types::ReviewResult;

/// One deduplicated finding. The body comes from the first pass that
/// produced it; later passes only add their pass number.
#[derive(Debug, Clone)]
pub struct AggregatedFinding {
    pub title: String,
    pub body: String,
    pub pass_numbers: Vec<usize>,
    pub normalized: NormalizedFinding,
}

impl AggregatedFinding {
    fn add_pass(&mut self, pass_number: usize) {
        if !self.pass_numbers.contains(&pass_number) {
            self.pass_numbers.push(pass_number);
        }
    }
}

/// Accumulates finding blocks pass by pass, deduplicating as they stream
/// in. Exact keys are checked first, then near-duplicate candidates from a
/// two-level priority/title-prefix index.
#[derive(Default)]
pub struct FindingMerger {
    aggregated: Vec<AggregatedFinding>,
    by_key: HashMap<String, usize>,
    by_priority: HashMap<String, Vec<usize>>,
    by_priority_and_prefix: HashMap<String, Vec<usize>>,
    seen_fallback_content: HashSet<String>,
}

impl FindingMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one successful pass's content.
    pub fn add_pass(&mut self, pass_number: usize, content: &str) {
        for block in parse_finding_blocks(content) {
            self.add_block(pass_number, block);
        }
    }

    pub fn finding_count(&self) -> usize {
        self.aggregated.len()
    }

    fn add_block(&mut self, pass_number: usize, block: FindingBlock) {
        let normalized = NormalizedFinding::new(&block.title, &block.body);
        let key = derive_key(&block, &normalized);

        if block.is_fallback {
            let normalized_content = normalize_text(&block.body);
            if !self.seen_fallback_content.insert(normalized_content) {
                if let Some(&index) = self.by_key.get(&key) {
                    self.aggregated[index].add_pass(pass_number);
                }
                return;
            }
        }

        if let Some(&index) = self.by_key.get(&key) {
            self.aggregated[index].add_pass(pass_number);
            return;
        }

        if let Some(index) = self.find_near_duplicate(&normalized) {
            debug!(
                "pass {} finding \"{}\" absorbed by \"{}\"",
                pass_number, block.title, self.aggregated[index].title
            );
            self.aggregated[index].add_pass(pass_number);
            return;
        }

        let index = self.aggregated.len();
        let prefix_key = priority_prefix_key(&normalized);
        self.by_key.insert(key, index);
        self.by_priority
            .entry(normalized.priority.clone())
            .or_default()
            .push(index);
        self.by_priority_and_prefix
            .entry(prefix_key)
            .or_default()
            .push(index);
        self.aggregated.push(AggregatedFinding {
            title: block.title,
            body: block.body,
            pass_numbers: vec![pass_number],
            normalized,
        });
    }

    /// Candidates come from the priority+prefix index when it has any,
    /// otherwise from the priority index. First match wins.
    fn find_near_duplicate(&self, incoming: &NormalizedFinding) -> Option<usize> {
        let prefix_key = priority_prefix_key(incoming);
        let candidates = match self.by_priority_and_prefix.get(&prefix_key) {
            Some(indices) if !indices.is_empty() => indices,
            _ => self.by_priority.get(&incoming.priority)?,
        };
        candidates
            .iter()
            .copied()
            .find(|&index| is_near_duplicate(&self.aggregated[index].normalized, incoming))
    }

    /// Render the merged findings: numbered headings, pass annotations for
    /// anything seen more than once, and a trailing note when passes
    /// failed.
    pub fn render(&self, total_passes: usize, failed_passes: usize) -> String {
        let mut out = String::new();
        for (i, finding) in self.aggregated.iter().enumerate() {
            if i > 0 {
                out.push_str("\n\n---\n\n");
            }
            let _ = write!(out, "### {}. {}\n\n", i + 1, finding.title);
            if finding.pass_numbers.len() > 1 {
                let csv = finding
                    .pass_numbers
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                let _ = write!(out, "> 検出パス: {csv}\n\n");
            }
            out.push_str(finding.body.trim());
        }
        if failed_passes > 0 {
            let _ = write!(
                out,
                "\n\n---\n\n> **注記**: {total_passes} パス中 {failed_passes} パスが失敗しました。上記は成功したパスの結果のみです。"
            );
        }
        out
    }
}

/// Key of a parsed finding.
///
/// Structured findings use `title|priority|location|summary`; findings with
/// a title but no table fields fall back to the normalized body; heading-
/// less fallback blocks hash their normalized content.
fn derive_key(block: &FindingBlock, normalized: &NormalizedFinding) -> String {
    if block.is_fallback {
        let digest = Sha256::digest(normalize_text(&block.body).as_bytes());
        let hex: String = digest[..12].iter().map(|b| format!("{b:02x}")).collect();
        return format!("fallback|{hex}");
    }
    let has_fields = !normalized.summary.is_empty()
        || !normalized.location.is_empty()
        || !normalized.priority.is_empty();
    if !normalized.title.is_empty() && has_fields {
        format!(
            "{}|{}|{}|{}",
            normalized.title, normalized.priority, normalized.location, normalized.summary
        )
    } else {
        format!("raw|{}", normalize_text(&block.body))
    }
}

fn priority_prefix_key(normalized: &NormalizedFinding) -> String {
    format!("{}|{}", normalized.priority, normalized.title_prefix())
}

/// Collapse the flat pass-result list to one result per agent.
///
/// Input order decides agent order. An agent with a single pass flows
/// through untouched. With several passes, only successful ones are merged;
/// if every pass failed the last failure is returned verbatim.
pub fn aggregate_agent_results(results: Vec<ReviewResult>) -> Vec<ReviewResult> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<ReviewResult>> = HashMap::new();
    for result in results {
        if !groups.contains_key(&result.agent_name) {
            order.push(result.agent_name.clone());
        }
        groups.entry(result.agent_name.clone()).or_default().push(result);
    }

    let mut merged = Vec::with_capacity(order.len());
    for name in order {
        let group = groups.remove(&name).unwrap_or_default();
        merged.extend(merge_one_agent(group));
    }
    merged
}

fn merge_one_agent(group: Vec<ReviewResult>) -> Option<ReviewResult> {
    if group.len() <= 1 {
        return group.into_iter().next();
    }

    let total_passes = group.len();
    let succeeded = group.iter().filter(|r| r.success).count();
    if succeeded == 0 {
        return group.into_iter().last();
    }
    let failed_passes = total_passes - succeeded;

    let mut merger = FindingMerger::new();
    for (i, result) in group.iter().enumerate() {
        if !result.success {
            continue;
        }
        if let Some(content) = &result.content {
            merger.add_pass(i + 1, content);
        }
    }

    debug!(
        "agent {}: merged {} passes into {} findings",
        group[0].agent_name,
        succeeded,
        merger.finding_count()
    );

    let template = &group[0];
    Some(ReviewResult {
        agent_name: template.agent_name.clone(),
        agent_display_name: template.agent_display_name.clone(),
        target_display: template.target_display.clone(),
        content: Some(merger.render(total_passes, failed_passes)),
        success: true,
        error_message: None,
        timestamp: chrono::Utc::now(),
    })
}
