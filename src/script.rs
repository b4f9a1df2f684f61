use std::io::BufRead;

use anyhow::{Context, Result};
use divvy_core::{AccountId, BatchId, PoolOp};
use serde::{Deserialize, Serialize};

/// Steps that only make sense outside an atomic batch.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Control {
    Withdraw {
        account: AccountId,
    },
    WithdrawAll,
    Batch {
        #[serde(default)]
        id: Option<BatchId>,
        ops: Vec<PoolOp>,
    },
}

/// One line of a replay script.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ScriptStep {
    Op(PoolOp),
    Control(Control),
}

/// Parses a JSON-lines script. Blank lines and `#` comments are skipped.
pub fn parse_script(reader: impl BufRead) -> Result<Vec<(usize, ScriptStep)>> {
    let mut steps = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.with_context(|| format!("read line {line_no}"))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let step: ScriptStep = serde_json::from_str(trimmed)
            .with_context(|| format!("line {line_no}: unrecognised step"))?;
        steps.push((line_no, step));
    }
    Ok(steps)
}
