//! Error classifier (SPEC_FULL.md §4.7). Runs after every failed or trapped
//! execution and attaches structured guidance; it never changes `success`.

use sandbox_common::{ErrorGuidance, ErrorKind, RuntimeType, TrapReason};

/// Examine `(trap_reason, stderr, runtime)` and produce guidance, or `None`
/// when nothing in the known failure taxonomy matches.
#[allow(clippy::too_many_arguments)]
pub fn classify_error(
    trap_reason: Option<TrapReason>,
    stderr: &str,
    runtime: RuntimeType,
    guest_mount_path: &str,
    fuel_consumed: u64,
    fuel_budget: u64,
    state_write_failed: bool,
) -> Option<ErrorGuidance> {
    if state_write_failed {
        return Some(ErrorGuidance {
            error_type: ErrorKind::InvalidSessionState,
            message: "failed to persist session state after execution".to_string(),
            suggested_fuel_budget: None,
            snippet: None,
        });
    }

    if trap_reason == Some(TrapReason::OutOfFuel) {
        let suggested = fuel_consumed.max(fuel_budget).saturating_mul(2);
        return Some(ErrorGuidance {
            error_type: ErrorKind::OutOfFuel,
            message: "execution ran out of fuel before completing; raise the fuel budget or reduce heavy \
                      first-time imports"
                .to_string(),
            suggested_fuel_budget: Some(suggested),
            snippet: None,
        });
    }

    if trap_reason == Some(TrapReason::MemoryLimit) {
        return Some(ErrorGuidance {
            error_type: ErrorKind::MemoryExhausted,
            message: "execution hit the guest memory limit".to_string(),
            suggested_fuel_budget: None,
            snippet: None,
        });
    }

    if stderr.contains("FileNotFoundError") && !stderr.contains(guest_mount_path) {
        return Some(ErrorGuidance {
            error_type: ErrorKind::PathRestriction,
            message: "file access was attempted outside the session workspace mount".to_string(),
            suggested_fuel_budget: None,
            snippet: None,
        });
    }

    if is_missing_vendored_package(stderr) {
        let snippet = match runtime {
            RuntimeType::Python => "sys.path.insert(0, f\"{guest_data_path}/site-packages\")".to_string(),
            RuntimeType::Javascript => "const pkg = requireVendor(\"<name>\");".to_string(),
        };
        return Some(ErrorGuidance {
            error_type: ErrorKind::MissingVendoredPackage,
            message: "import failed; the package may not be present in the vendor mount".to_string(),
            suggested_fuel_budget: None,
            snippet: Some(snippet),
        });
    }

    if runtime == RuntimeType::Javascript && stderr.contains("TypeError") && stderr.contains("is not iterable") {
        return Some(ErrorGuidance {
            error_type: ErrorKind::QuickJSTupleDestructuring,
            message: "destructuring a tuple-like return value failed; QuickJS does not support iterable \
                      unpacking the same way as Node"
                .to_string(),
            suggested_fuel_budget: None,
            snippet: Some("const [a, b] = Array.from(result);".to_string()),
        });
    }

    Some(ErrorGuidance {
        error_type: ErrorKind::Generic,
        message: "execution did not complete successfully".to_string(),
        suggested_fuel_budget: None,
        snippet: None,
    })
}

fn is_missing_vendored_package(stderr: &str) -> bool {
    stderr.contains("ModuleNotFoundError") || stderr.contains("Cannot find module")
}
