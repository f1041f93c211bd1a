//! [`SandboxResult`] and the enums that parameterize it: [`RuntimeType`],
//! [`TrapReason`], [`ErrorKind`]. Also the fuel-utilization bucketing used by
//! the error classifier (SPEC_FULL.md §4.7).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Identifies which interpreter runtime produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RuntimeType {
    /// CPython compiled to WASI.
    Python,
    /// QuickJS compiled to WASI.
    Javascript,
}

impl RuntimeType {
    /// Lowercase name used in log fields and metadata.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::Javascript => "javascript",
        }
    }
}

impl std::fmt::Display for RuntimeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a guest trap (SPEC_FULL.md §4.1 step 7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrapReason {
    /// Fuel metering hit zero before the guest finished.
    OutOfFuel,
    /// The WASI memory-size limiter refused a growth request.
    MemoryLimit,
    /// Guest called `proc_exit` with a non-zero code.
    ProcExit,
    /// Unexpected host-side failure while the guest was running.
    HostError,
    /// Any other trap kind not covered above.
    Other,
}

/// Actionable failure class attached to `metadata.error_guidance` by the
/// classifier (SPEC_FULL.md §4.7). Never affects `success`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    OutOfFuel,
    PathRestriction,
    MemoryExhausted,
    MissingVendoredPackage,
    QuickJSTupleDestructuring,
    InvalidSessionState,
    Generic,
}

/// Structured guidance attached to a `SandboxResult` by the error classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorGuidance {
    pub error_type: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_fuel_budget: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

/// Utilization bucket for fuel-consumption analysis (SPEC_FULL.md §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FuelBucket {
    Efficient,
    Moderate,
    Warning,
    Critical,
}

/// Result of analyzing fuel consumption against the budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FuelAnalysis {
    pub utilization_percent: f64,
    pub bucket: FuelBucket,
    pub recommendation: String,
    pub suggested_budget: u64,
    pub exhausted: bool,
}

impl FuelAnalysis {
    /// Compute fuel utilization and bucket it, per SPEC_FULL.md §4.7:
    /// `efficient < 50 <= moderate < 75 <= warning < 90 <= critical <= 100`.
    pub fn compute(consumed: u64, budget: u64, exhausted: bool) -> Self {
        let utilization_percent = if budget == 0 {
            0.0
        } else {
            (consumed as f64 / budget as f64) * 100.0
        };

        let bucket = if utilization_percent < 50.0 {
            FuelBucket::Efficient
        } else if utilization_percent < 75.0 {
            FuelBucket::Moderate
        } else if utilization_percent < 90.0 {
            FuelBucket::Warning
        } else {
            FuelBucket::Critical
        };

        let recommendation = match bucket {
            FuelBucket::Efficient => "fuel budget has ample headroom".to_string(),
            FuelBucket::Moderate => "fuel budget is comfortably used".to_string(),
            FuelBucket::Warning => "consider raising the fuel budget".to_string(),
            FuelBucket::Critical => "fuel budget is nearly or fully exhausted".to_string(),
        };

        let suggested_budget = if exhausted {
            consumed.max(budget).saturating_mul(2)
        } else {
            budget
        };

        Self {
            utilization_percent,
            bucket,
            recommendation,
            suggested_budget,
            exhausted,
        }
    }
}

/// Structured metadata attached to every `SandboxResult` (SPEC_FULL.md §3.1).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<RuntimeType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fuel_budget: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_limit_bytes: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_pages: Option<u64>,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
    pub exit_code: i32,
    pub trapped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trap_reason: Option<TrapReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trap_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_guidance: Option<ErrorGuidance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fuel_analysis: Option<FuelAnalysis>,
}

/// Typed outcome of one `execute` call (SPEC_FULL.md §3.1).
///
/// JSON-serializable; `SandboxResult -> JSON -> SandboxResult` is an identity
/// round trip (SPEC_FULL.md §8 invariant 7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fuel_consumed: Option<u64>,
    pub memory_used_bytes: usize,
    pub files_created: Vec<String>,
    pub files_modified: Vec<String>,
    pub workspace_path: PathBuf,
    pub metadata: ResultMetadata,
}

impl SandboxResult {
    /// `true` iff `trapped == true` implies `success == false` (SPEC_FULL.md
    /// §8 invariant 4). Used by the adapters to assert their own output
    /// before returning it to the caller.
    pub const fn trap_implies_failure(&self) -> bool {
        !self.metadata.trapped || !self.success
    }
}
