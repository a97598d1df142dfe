use std::path::Path;

use serde::Serialize;

use crate::admin::error::{AdminError, Result};
use crate::admin::util::RawFiles;
use crate::storage::{EdgeRecord, NodeRecord, SlotRecord};
use crate::types::SlotId;

const MAX_FINDINGS: usize = 32;

/// Indicates the severity level of a verification finding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifySeverity {
    /// Worth knowing, not a broken invariant.
    Warning,
    /// A broken invariant.
    Error,
}

/// A single issue discovered during verification.
#[derive(Clone, Debug, Serialize)]
pub struct VerifyFinding {
    /// Whether this breaks an invariant.
    pub severity: VerifySeverity,
    /// Sub-store the finding belongs to (`nodes` or `edges`).
    pub kind: &'static str,
    /// Human-readable description.
    pub message: String,
}

/// What verification looked at.
#[derive(Clone, Debug, Default, Serialize)]
pub struct VerifyCounts {
    /// Node ids whose chains were walked.
    pub nodes_indexed: u64,
    /// Node versions reached through those chains.
    pub node_versions: u64,
    /// Edge ids whose chains were walked.
    pub edges_indexed: u64,
    /// Edge versions reached through those chains.
    pub edge_versions: u64,
}

/// Complete report of a verification run.
#[derive(Clone, Debug, Serialize)]
pub struct VerifyReport {
    /// No error-severity findings.
    pub success: bool,
    /// At most 32 findings, in discovery order.
    pub findings: Vec<VerifyFinding>,
    /// Findings past this many were dropped.
    pub truncated: bool,
    /// What was covered.
    pub counts: VerifyCounts,
}

struct Findings {
    items: Vec<VerifyFinding>,
    truncated: bool,
    kind: &'static str,
}

impl Findings {
    fn push(&mut self, severity: VerifySeverity, message: impl Into<String>) {
        if self.items.len() >= MAX_FINDINGS {
            self.truncated = true;
            return;
        }
        self.items.push(VerifyFinding {
            severity,
            kind: self.kind,
            message: message.into(),
        });
    }

    fn error(&mut self, message: impl Into<String>) {
        self.push(VerifySeverity::Error, message);
    }
}

/// Checks the header, index and chain invariants of every sub-store in
/// `dir` without opening it through the engine.
///
/// Checked per sub-store: both files exist, headers decode, the records file
/// is as long as its capacity, the index covers its cursor, `next_id`
/// equals the cursor, every index entry points at the in-use head version of
/// its id, every chain is well linked, and every used slot belongs to
/// exactly one chain.
pub fn verify(dir: impl AsRef<Path>) -> Result<VerifyReport> {
    let dir = dir.as_ref();
    let nodes = RawFiles::<NodeRecord>::open(dir)?;
    let edges = RawFiles::<EdgeRecord>::open(dir)?;
    if nodes.is_absent() && edges.is_absent() {
        return Err(AdminError::missing_store(dir));
    }

    let mut findings = Findings {
        items: Vec::new(),
        truncated: false,
        kind: NodeRecord::KIND,
    };
    let mut counts = VerifyCounts::default();
    let (indexed, versions) = verify_substore(&nodes, &mut findings)?;
    counts.nodes_indexed = indexed;
    counts.node_versions = versions;

    findings.kind = EdgeRecord::KIND;
    let (indexed, versions) = verify_substore(&edges, &mut findings)?;
    counts.edges_indexed = indexed;
    counts.edge_versions = versions;

    let success = !findings
        .items
        .iter()
        .any(|finding| finding.severity == VerifySeverity::Error);
    Ok(VerifyReport {
        success,
        findings: findings.items,
        truncated: findings.truncated,
        counts,
    })
}

fn verify_substore<R: SlotRecord>(
    raw: &RawFiles<R>,
    findings: &mut Findings,
) -> Result<(u64, u64)> {
    if raw.is_absent() {
        findings.push(VerifySeverity::Warning, "sub-store not created yet");
        return Ok((0, 0));
    }
    let records_header = match raw.records_header() {
        Ok(header) => header,
        Err(err) => {
            findings.error(err.to_string());
            return Ok((0, 0));
        }
    };
    let index_header = match raw.index_header() {
        Ok(header) => header,
        Err(err) => {
            findings.error(err.to_string());
            return Ok((0, 0));
        }
    };

    let physical = raw.physical_slots()?;
    if physical < records_header.capacity {
        findings.error(format!(
            "records file holds {physical} slots but header claims capacity {}",
            records_header.capacity
        ));
    }
    if records_header.next_id != index_header.cursor {
        findings.error(format!(
            "records next_id {} disagrees with index cursor {}",
            records_header.next_id, index_header.cursor
        ));
    }
    let index_len = raw.index_len()?.unwrap_or(0);
    let covered = index_len.saturating_sub(crate::storage::INDEX_HEADER_LEN as u64)
        / crate::storage::INDEX_ENTRY_LEN as u64;
    if covered < index_header.cursor {
        findings.error(format!(
            "index holds {covered} entries but cursor is {}",
            index_header.cursor
        ));
    }

    // Slots that can be read and are meant to be in use.
    let used = records_header.next_slot.min(physical);
    let mut owner: Vec<Option<u64>> = vec![None; used as usize];
    let mut versions = 0u64;
    let indexed = index_header.cursor.min(covered);

    for id in 0..indexed {
        let head = raw.read_entry(id)?;
        let mut expected_prev: Option<SlotId> = None;
        let mut slot = Some(head);
        let mut steps = 0u64;
        while let Some(current) = slot {
            steps += 1;
            if steps > used {
                findings.error(format!("chain of id {id} does not terminate"));
                break;
            }
            if current.0 >= used {
                findings.error(format!(
                    "id {id} points at slot {} past the last used slot",
                    current.0
                ));
                break;
            }
            let record = match raw.read_slot(current) {
                Ok(record) => record,
                Err(err) => {
                    findings.error(format!("slot {} of id {id}: {err}", current.0));
                    break;
                }
            };
            if !record.in_use() || record.stable_id() != id {
                findings.error(format!(
                    "slot {} in chain of id {id} holds id {} (in_use {})",
                    current.0,
                    record.stable_id(),
                    record.in_use()
                ));
                break;
            }
            if record.links().prev != expected_prev {
                findings.error(format!(
                    "slot {} of id {id} links back to {:?}, expected {:?}",
                    current.0,
                    record.links().prev,
                    expected_prev
                ));
                break;
            }
            match owner[current.0 as usize] {
                Some(other) => {
                    findings.error(format!(
                        "slot {} is shared by ids {other} and {id}",
                        current.0
                    ));
                    break;
                }
                None => owner[current.0 as usize] = Some(id),
            }
            versions += 1;
            expected_prev = Some(current);
            slot = record.links().next;
        }
    }

    for (slot, owner) in owner.iter().enumerate() {
        if owner.is_some() {
            continue;
        }
        match raw.read_slot(SlotId(slot as u64)) {
            Ok(record) if record.in_use() => findings.error(format!(
                "slot {slot} holds id {} but no chain reaches it",
                record.stable_id()
            )),
            Ok(_) => findings.error(format!("slot {slot} below next_slot is vacant")),
            Err(err) => findings.error(format!("slot {slot}: {err}")),
        }
    }

    Ok((indexed, versions))
}
