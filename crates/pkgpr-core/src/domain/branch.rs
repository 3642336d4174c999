//! Deterministic branch naming.

/// Prefix shared by every package branch.
pub const BRANCH_PREFIX: &str = "package/";

/// Branch a package id is published on: `package/<group>/<name>`.
///
/// Pure: the same id always yields the same branch, which is what makes
/// branch and PR upserts idempotent across runs.
pub fn branch_name(id: &str) -> String {
    format!("{BRANCH_PREFIX}{}", id.replace(':', "/"))
}
