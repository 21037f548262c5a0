//! Bytecode similarity: Hamming distance between runtime code buffers, gated by length.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Unlinked library references are 40 characters wide in both the `__$hash$__` and the older
/// `__Name____` layouts.
fn link_placeholder() -> Option<&'static Regex> {
  static PLACEHOLDER: OnceLock<Option<Regex>> = OnceLock::new();
  PLACEHOLDER
    .get_or_init(|| Regex::new(r"__.{36}__").ok())
    .as_ref()
}

/// Hex code with link placeholders zero-filled and any `0x` prefix removed.
pub fn normalize_hex(code: &str) -> String {
  let code = code.strip_prefix("0x").unwrap_or(code);
  match link_placeholder() {
    Some(placeholder) => placeholder
      .replace_all(code, "0".repeat(40).as_str())
      .into_owned(),
    None => code.to_string(),
  }
}

pub fn decode_bytecode(code: &str) -> Result<Vec<u8>, hex::FromHexError> {
  hex::decode(normalize_hex(code))
}

/// Number of differing bits, with the shorter buffer zero-padded to the longer length.
pub fn hamming_distance(left: &[u8], right: &[u8]) -> u64 {
  let (short, long) = if left.len() <= right.len() {
    (left, right)
  } else {
    (right, left)
  };
  let shared: u64 = short
    .iter()
    .zip(long)
    .map(|(a, b)| u64::from((a ^ b).count_ones()))
    .sum();
  let tail: u64 = long[short.len()..]
    .iter()
    .map(|byte| u64::from(byte.count_ones()))
    .sum();
  shared + tail
}

/// Whether `candidate_len` is within `tolerance` (a fraction) of `target_len`.
pub fn within_length_gate(target_len: usize, candidate_len: usize, tolerance: f64) -> bool {
  let delta = target_len.abs_diff(candidate_len) as f64;
  delta <= tolerance * target_len as f64
}

/// Code observed at an address while tracing a deployment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
  pub address: String,
  pub code: Vec<u8>,
}

/// Every trace entry whose `result` carries both `code` and `address`.
pub fn candidates_from_trace(trace: &Value) -> Vec<Candidate> {
  let Some(entries) = trace.as_array() else {
    return Vec::new();
  };
  entries
    .iter()
    .filter_map(|entry| {
      let result = entry.get("result")?;
      let address = result.get("address").and_then(Value::as_str)?;
      let code = result.get("code").and_then(Value::as_str)?;
      match decode_bytecode(code) {
        Ok(code) => Some(Candidate {
          address: address.to_string(),
          code,
        }),
        Err(err) => {
          tracing::debug!(address, %err, "skipping undecodable trace code");
          None
        }
      }
    })
    .collect()
}

/// The closest candidate that passes the length gate. Ties keep the earliest candidate.
pub fn best_match<'c>(
  target: &[u8],
  candidates: &'c [Candidate],
  tolerance: f64,
) -> Option<(&'c Candidate, u64)> {
  let mut best: Option<(&Candidate, u64)> = None;
  for candidate in candidates {
    if !within_length_gate(target.len(), candidate.code.len(), tolerance) {
      continue;
    }
    let distance = hamming_distance(target, &candidate.code);
    if best.map_or(true, |(_, current)| distance < current) {
      best = Some((candidate, distance));
    }
  }
  best
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Resolution {
  Resolved { address: String, distance: u64 },
  Unresolved,
}

/// Per-artifact outcome of matching targets against deployed code.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconciliationMap {
  entries: BTreeMap<String, BTreeMap<String, Resolution>>,
}

impl ReconciliationMap {
  pub fn new() -> Self {
    Self::default()
  }

  /// Record `resolution` for `file:contract`. A resolved entry is only replaced by a strictly
  /// closer match.
  pub fn record(&mut self, file: &str, contract: &str, resolution: Resolution) {
    let contracts = self.entries.entry(file.to_string()).or_default();
    match (contracts.get(contract), &resolution) {
      (None, _) | (Some(Resolution::Unresolved), Resolution::Resolved { .. }) => {}
      (
        Some(Resolution::Resolved { distance: current, .. }),
        Resolution::Resolved { distance, .. },
      ) if distance < current => {}
      _ => return,
    }
    contracts.insert(contract.to_string(), resolution);
  }

  pub fn get(&self, file: &str, contract: &str) -> Option<&Resolution> {
    self.entries.get(file).and_then(|contracts| contracts.get(contract))
  }

  /// Resolved addresses, `file -> contract -> address`.
  pub fn addresses(&self) -> BTreeMap<String, BTreeMap<String, String>> {
    let mut addresses: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
    for (file, contracts) in &self.entries {
      for (contract, resolution) in contracts {
        if let Resolution::Resolved { address, .. } = resolution {
          addresses
            .entry(file.clone())
            .or_default()
            .insert(contract.clone(), address.clone());
        }
      }
    }
    addresses
  }

  /// Unmatched targets as `file:Contract`.
  pub fn unresolved(&self) -> Vec<String> {
    self
      .entries
      .iter()
      .flat_map(|(file, contracts)| {
        contracts
          .iter()
          .filter(|(_, resolution)| matches!(resolution, Resolution::Unresolved))
          .map(move |(contract, _)| format!("{file}:{contract}"))
      })
      .collect()
  }
}
