//! QuickJS-on-WASI adapter (SPEC_FULL.md §4.2, §4.5.b, §4.6).

use std::path::{Path, PathBuf};

use sandbox_common::logging::event;
use sandbox_common::RuntimeType;

use crate::adapter::{guest_join, RuntimeAdapter};

const SOURCE_FILENAME: &str = "user_code.js";
const STATE_FILENAME: &str = ".session_state.json";
const STATE_BEGIN_MARKER: &str = "/*__SANDBOX_STATE_BEGIN__*/";
const STATE_END_MARKER: &str = "/*__SANDBOX_STATE_END__*/";
const FAILURE_TOKENS: &[&str] = &[
    "error",
    "exception",
    "outoffuel",
    "referenceerror",
    "typeerror",
    "syntaxerror",
];

/// Adapter for a QuickJS interpreter compiled to WASI preview-1, invoked via
/// `qjs --std`.
pub struct JavaScriptAdapter {
    wasm_binary_path: PathBuf,
}

impl JavaScriptAdapter {
    pub fn new(wasm_binary_path: impl Into<PathBuf>) -> Self {
        Self {
            wasm_binary_path: wasm_binary_path.into(),
        }
    }
}

impl RuntimeAdapter for JavaScriptAdapter {
    fn runtime_type(&self) -> RuntimeType {
        RuntimeType::Javascript
    }

    fn source_filename(&self) -> &'static str {
        SOURCE_FILENAME
    }

    fn wasm_binary_path(&self) -> &Path {
        &self.wasm_binary_path
    }

    fn build_argv(&self, guest_mount_path: &str, source_filename: &str) -> Vec<String> {
        vec![
            "qjs".to_string(),
            "--std".to_string(),
            guest_join(guest_mount_path, source_filename),
        ]
    }

    fn wrap_source(
        &self,
        code: &str,
        guest_mount_path: &str,
        vendor_guest_path: Option<&str>,
        inject_prologue: bool,
        persist_state: bool,
        existing_state_json: Option<&str>,
    ) -> String {
        if !inject_prologue && !persist_state {
            return code.to_string();
        }

        let mut out = String::new();

        out.push_str(
            "function readJson(path) { return JSON.parse(std.loadFile(path)); }\n\
             function writeJson(path, value) { var f = std.open(path, \"w\"); f.puts(JSON.stringify(value)); \
             f.close(); }\n\
             function readText(path) { return std.loadFile(path); }\n\
             function writeText(path, text) { var f = std.open(path, \"w\"); f.puts(text); f.close(); }\n\
             function fileExists(path) { var f = std.open(path, \"r\"); if (f) { f.close(); return true; } \
             return false; }\n\
             function listFiles(dir) { return os.readdir(dir)[0].filter(function(n) { return n !== \".\" && \
             n !== \"..\"; }); }\n",
        );

        if let Some(vendor_path) = vendor_guest_path {
            out.push_str(&format!(
                "function requireVendor(name) {{\n\
                 \x20   var __src = std.loadFile({:?} + \"/\" + name + \".js\");\n\
                 \x20   var module = {{ exports: {{}} }};\n\
                 \x20   var exports = module.exports;\n\
                 \x20   (function(module, exports) {{ eval(__src); }})(module, exports);\n\
                 \x20   return module.exports;\n\
                 }}\n",
                guest_join(vendor_path, "vendor")
            ));
        }

        if persist_state {
            let state_json = existing_state_json.unwrap_or("{}");
            out.push_str(&format!(
                "(function() {{\n\
                 \x20   var __sandboxBuiltins = Object.getOwnPropertyNames(globalThis);\n\
                 \x20   var __sandboxState = {state_json};\n\
                 \x20   for (var __k in __sandboxState) {{\n\
                 \x20       if (__sandboxBuiltins.indexOf(__k) === -1) {{\n\
                 \x20           globalThis[__k] = __sandboxState[__k];\n\
                 \x20       }}\n\
                 \x20   }}\n\
                 }})();\n",
            ));
        }

        out.push('\n');
        out.push_str(code);
        out.push('\n');

        if persist_state {
            out.push_str(&format!(
                "\n(function() {{\n\
                 \x20   var __sandboxBuiltins = Object.getOwnPropertyNames(globalThis);\n\
                 \x20   var __sandboxOut = {{}};\n\
                 \x20   for (var __k in globalThis) {{\n\
                 \x20       if (__sandboxBuiltins.indexOf(__k) !== -1) continue;\n\
                 \x20       if (typeof globalThis[__k] === \"function\") continue;\n\
                 \x20       try {{ JSON.stringify(globalThis[__k]); }} catch (e) {{ continue; }}\n\
                 \x20       __sandboxOut[__k] = globalThis[__k];\n\
                 \x20   }}\n\
                 \x20   print({begin:?});\n\
                 \x20   print(JSON.stringify(__sandboxOut));\n\
                 \x20   print({end:?});\n\
                 }})();\n",
                begin = STATE_BEGIN_MARKER,
                end = STATE_END_MARKER,
            ));
        }

        out
    }

    fn existing_state_for_prologue(&self, workspace: &Path, persist: bool) -> Option<String> {
        if !persist {
            return None;
        }
        match std::fs::read_to_string(workspace.join(STATE_FILENAME)) {
            Ok(content) => match serde_json::from_str::<serde_json::Value>(&content) {
                Ok(_) => Some(content),
                Err(_) => {
                    tracing::warn!(
                        event = event::SECURITY,
                        kind = "corrupt_session_state",
                        "existing .session_state.json did not parse as JSON; starting from empty state"
                    );
                    Some("{}".to_string())
                }
            },
            Err(_) => Some("{}".to_string()),
        }
    }

    fn persist_state(&self, stdout: &str, workspace: &Path, persist: bool) -> (String, bool) {
        if !persist {
            return (stdout.to_string(), false);
        }

        let lines: Vec<&str> = stdout.lines().collect();
        let begin = lines.iter().position(|line| *line == STATE_BEGIN_MARKER);
        let end = lines.iter().position(|line| *line == STATE_END_MARKER);

        let (Some(begin), Some(end)) = (begin, end) else {
            return (stdout.to_string(), false);
        };
        if end != begin + 2 {
            return (stdout.to_string(), false);
        }

        let state_line = lines[begin + 1];
        let cleaned = lines
            .iter()
            .enumerate()
            .filter(|(i, _)| *i < begin || *i > end)
            .map(|(_, line)| *line)
            .collect::<Vec<_>>()
            .join("\n");

        match serde_json::from_str::<serde_json::Value>(state_line) {
            Ok(_) => {
                let tmp_path = workspace.join(format!("{STATE_FILENAME}.tmp"));
                let final_path = workspace.join(STATE_FILENAME);
                if std::fs::write(&tmp_path, state_line).and_then(|()| std::fs::rename(&tmp_path, &final_path)).is_err()
                {
                    return (cleaned, true);
                }
                (cleaned, false)
            }
            Err(_) => {
                tracing::warn!(
                    event = event::SECURITY,
                    kind = "invalid_state_marker_payload",
                    "stdout state marker payload did not parse as JSON; state left unchanged"
                );
                (cleaned, true)
            }
        }
    }

    fn failure_tokens(&self) -> &'static [&'static str] {
        FAILURE_TOKENS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> JavaScriptAdapter {
        JavaScriptAdapter::new("/opt/interpreters/qjs.wasm")
    }

    #[test]
    fn build_argv_uses_qjs_std_flag() {
        let argv = adapter().build_argv("/app", "user_code.js");
        assert_eq!(
            argv,
            vec!["qjs".to_string(), "--std".to_string(), "/app/user_code.js".to_string()]
        );
    }

    #[test]
    fn wrap_source_embeds_existing_state() {
        let wrapped = adapter().wrap_source("print(1)", "/app", None, true, true, Some(r#"{"x":1}"#));
        assert!(wrapped.contains(r#"{"x":1}"#));
        assert!(wrapped.contains(STATE_BEGIN_MARKER));
    }

    #[test]
    fn wrap_source_with_vendor_defines_require_vendor() {
        let wrapped = adapter().wrap_source("print(1)", "/app", Some("/data"), true, false, None);
        assert!(wrapped.contains("function requireVendor"));
        assert!(wrapped.contains("/data/vendor"));
    }

    #[test]
    fn persist_state_strips_markers_and_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let stdout = format!(
            "hello\n{}\n{{\"count\":2}}\n{}\n",
            STATE_BEGIN_MARKER, STATE_END_MARKER
        );

        let (cleaned, failed) = adapter().persist_state(&stdout, dir.path(), true);
        assert!(!failed);
        assert_eq!(cleaned, "hello");
        let written = std::fs::read_to_string(dir.path().join(STATE_FILENAME)).unwrap();
        assert_eq!(written, r#"{"count":2}"#);
    }

    #[test]
    fn persist_state_is_noop_without_markers() {
        let dir = tempfile::tempdir().unwrap();
        let (cleaned, failed) = adapter().persist_state("hello\n", dir.path(), true);
        assert!(!failed);
        assert_eq!(cleaned, "hello\n");
        assert!(!dir.path().join(STATE_FILENAME).exists());
    }

    #[test]
    fn existing_state_defaults_to_empty_object_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let state = adapter().existing_state_for_prologue(dir.path(), true);
        assert_eq!(state, Some("{}".to_string()));
    }
}
