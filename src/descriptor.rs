//! Handler descriptor parsing.
//!
//! A descriptor names a module and an exported function inside it, with an
//! optional directory prefix: `dir/sub/index.nested.handler` means "file
//! `index` under `dir/sub`, export `nested.handler`". Parsing is pure; it
//! touches no filesystem and runs before any module is loaded.

use crate::error::{Error, Result};

/// Parsed form of a handler descriptor string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerDescriptor {
    /// Directory prefix relative to the task root, possibly empty.
    pub module_root: String,
    /// Module file name, without extension, never containing a dot.
    pub module_name: String,
    /// Dot-separated export path inside the module, at least one segment.
    pub function_path: Vec<String>,
}

impl HandlerDescriptor {
    /// Parse a raw descriptor string.
    ///
    /// Any `..` sequence is rejected outright so a descriptor can never
    /// escape the task root, before any filesystem access happens. The
    /// remainder after the last path separator must contain a dot splitting
    /// a non-empty module name from a non-empty export path.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.contains("..") {
            return Err(Error::malformed_handler(format!(
                "'{raw}' is not a valid handler name. Use absolute paths when \
                 specifying root directories in handler names."
            )));
        }

        let (module_root, rest) = match raw.rfind('/') {
            Some(idx) => (&raw[..=idx], &raw[idx + 1..]),
            None => ("", raw),
        };

        let (module_name, path) = rest
            .split_once('.')
            .ok_or_else(|| Error::malformed_handler(format!("Bad handler '{raw}'")))?;
        if module_name.is_empty() || path.is_empty() {
            return Err(Error::malformed_handler(format!("Bad handler '{raw}'")));
        }

        let function_path: Vec<String> = path.split('.').map(str::to_owned).collect();
        if function_path.iter().any(String::is_empty) {
            return Err(Error::malformed_handler(format!("Bad handler '{raw}'")));
        }

        Ok(Self {
            module_root: module_root.to_owned(),
            module_name: module_name.to_owned(),
            function_path,
        })
    }

    /// The export path rejoined with dots, as it appeared in the descriptor.
    pub fn function_name(&self) -> String {
        self.function_path.join(".")
    }

    /// The descriptor as originally written: directory prefix, module name,
    /// and export path.
    pub fn full_name(&self) -> String {
        format!(
            "{}{}.{}",
            self.module_root,
            self.module_name,
            self.function_name()
        )
    }
}
