//! CPython-on-WASI adapter (SPEC_FULL.md §4.2, §4.5.a, §4.6).

use std::path::{Path, PathBuf};

use sandbox_common::RuntimeType;

use crate::adapter::{guest_join, RuntimeAdapter};

const SOURCE_FILENAME: &str = "user_code.py";
const STATE_FILENAME: &str = ".session_state.json";
const FAILURE_TOKENS: &[&str] = &["error", "exception", "outoffuel", "traceback"];

/// Adapter for a CPython interpreter compiled to WASI preview-1.
pub struct PythonAdapter {
    wasm_binary_path: PathBuf,
}

impl PythonAdapter {
    pub fn new(wasm_binary_path: impl Into<PathBuf>) -> Self {
        Self {
            wasm_binary_path: wasm_binary_path.into(),
        }
    }
}

impl RuntimeAdapter for PythonAdapter {
    fn runtime_type(&self) -> RuntimeType {
        RuntimeType::Python
    }

    fn source_filename(&self) -> &'static str {
        SOURCE_FILENAME
    }

    fn wasm_binary_path(&self) -> &Path {
        &self.wasm_binary_path
    }

    fn build_argv(&self, guest_mount_path: &str, source_filename: &str) -> Vec<String> {
        vec!["python".to_string(), guest_join(guest_mount_path, source_filename)]
    }

    fn wrap_source(
        &self,
        code: &str,
        guest_mount_path: &str,
        vendor_guest_path: Option<&str>,
        inject_prologue: bool,
        persist_state: bool,
        _existing_state_json: Option<&str>,
    ) -> String {
        if !inject_prologue && !persist_state {
            return code.to_string();
        }

        let mut out = String::new();
        let state_path = guest_join(guest_mount_path, STATE_FILENAME);

        out.push_str("import builtins as _sandbox_builtins\n");
        out.push_str("import json as _sandbox_json\n");
        out.push_str(&format!("_SANDBOX_STATE_PATH = {state_path:?}\n"));
        out.push_str("_SANDBOX_BUILTIN_NAMES = set(dir(_sandbox_builtins))\n");

        if let Some(vendor_path) = vendor_guest_path {
            out.push_str("import sys as _sandbox_sys\n");
            out.push_str(&format!(
                "_sandbox_sys.path.insert(0, {:?})\n",
                guest_join(vendor_path, "site-packages")
            ));
        }

        if persist_state {
            out.push_str(
                "try:\n\
                 \x20   with open(_SANDBOX_STATE_PATH, \"r\") as _sandbox_state_file:\n\
                 \x20       _sandbox_state = _sandbox_json.load(_sandbox_state_file)\n\
                 \x20   for _sandbox_key, _sandbox_value in _sandbox_state.items():\n\
                 \x20       if _sandbox_key not in _SANDBOX_BUILTIN_NAMES:\n\
                 \x20           globals()[_sandbox_key] = _sandbox_value\n\
                 except FileNotFoundError:\n\
                 \x20   pass\n\
                 except (_sandbox_json.JSONDecodeError, TypeError, AttributeError):\n\
                 \x20   pass\n",
            );
        }

        out.push('\n');
        out.push_str(code);
        out.push('\n');

        if persist_state {
            out.push_str(
                "\ndef _sandbox_collect_state():\n\
                 \x20   _sandbox_out = {}\n\
                 \x20   for _sandbox_key, _sandbox_value in list(globals().items()):\n\
                 \x20       if _sandbox_key.startswith(\"_sandbox_\") or _sandbox_key in _SANDBOX_BUILTIN_NAMES:\n\
                 \x20           continue\n\
                 \x20       try:\n\
                 \x20           _sandbox_json.dumps(_sandbox_value)\n\
                 \x20       except TypeError:\n\
                 \x20           continue\n\
                 \x20       _sandbox_out[_sandbox_key] = _sandbox_value\n\
                 \x20   return _sandbox_out\n\n\
                 with open(_SANDBOX_STATE_PATH, \"w\") as _sandbox_state_file:\n\
                 \x20   _sandbox_json.dump(_sandbox_collect_state(), _sandbox_state_file)\n",
            );
        }

        out
    }

    fn failure_tokens(&self) -> &'static [&'static str] {
        FAILURE_TOKENS
    }
}
