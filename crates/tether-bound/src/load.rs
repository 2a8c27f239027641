//! Reading bound programs from JSON.

use std::path::{Path, PathBuf};

use rustc_hash::FxHashSet;
use thiserror::Error;

use crate::program::BoundProgram;
use crate::table::TypeTable;
use crate::ty::Protocol;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed bound program: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("type '{0}' is defined more than once")]
    DuplicateType(String),

    #[error("function '{0}' is defined more than once")]
    DuplicateFunction(String),

    #[error("entry function '{0}' is not defined")]
    MissingEntry(String),

    #[error("type '{ty}' declares {protocol} but has no {operation} implementation")]
    MissingImplementation {
        ty: String,
        protocol: Protocol,
        operation: &'static str,
    },
}

/// Parse and validate a bound program.
pub fn load_program(json: &str) -> Result<BoundProgram, LoadError> {
    let program: BoundProgram = serde_json::from_str(json)?;
    validate(&program)?;
    tracing::debug!(
        types = program.types.len(),
        functions = program.functions.len(),
        "loaded bound program"
    );
    Ok(program)
}

pub fn load_program_file(path: &Path) -> Result<BoundProgram, LoadError> {
    let json = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut program = load_program(&json)?;
    if program.file.is_none() {
        program.file = Some(path.display().to_string());
    }
    Ok(program)
}

fn validate(program: &BoundProgram) -> Result<(), LoadError> {
    let mut names = FxHashSet::default();
    for def in &program.types {
        if !names.insert(def.name.as_str()) {
            return Err(LoadError::DuplicateType(def.name.clone()));
        }
        for &protocol in &def.implements {
            if TypeTable::interface_impl(def, protocol).is_none() {
                return Err(LoadError::MissingImplementation {
                    ty: def.name.clone(),
                    protocol,
                    operation: protocol.operation(),
                });
            }
        }
    }

    let mut functions = FxHashSet::default();
    for f in &program.functions {
        if !functions.insert(f.name.as_str()) {
            return Err(LoadError::DuplicateFunction(f.name.clone()));
        }
    }
    if !functions.contains(program.entry.as_str()) {
        return Err(LoadError::MissingEntry(program.entry.clone()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::{Expr, Stmt};

    const PROGRAM: &str = r#"{
        "file": "demo.cs",
        "types": [
            {
                "name": "Res",
                "kind": "class",
                "implements": ["disposable"],
                "methods": [
                    {"name": "Dispose", "body": [{"kind": "print", "value": {"kind": "lit", "value": {"str": "disposed"}}}]}
                ]
            }
        ],
        "functions": [
            {
                "name": "main",
                "body": [
                    {
                        "kind": "using",
                        "resources": [
                            {"name": "r", "ty": {"kind": "named", "name": "Res"}, "init": {"kind": "new", "ty": "Res"}}
                        ],
                        "body": [{"kind": "print", "value": {"kind": "lit", "value": {"str": "body"}}}]
                    }
                ]
            }
        ]
    }"#;

    #[test]
    fn loads_using_program() {
        let program = load_program(PROGRAM).unwrap();
        assert_eq!(program.entry, "main");
        assert_eq!(program.file.as_deref(), Some("demo.cs"));
        let Stmt::Using {
            resources,
            body,
            is_async,
            ..
        } = &program.functions[0].body[0]
        else {
            panic!("expected a using statement");
        };
        assert!(!is_async);
        assert_eq!(resources[0].name.as_deref(), Some("r"));
        assert_eq!(body[0], Stmt::print(Expr::str("body")));
    }

    #[test]
    fn rejects_missing_entry() {
        let err = load_program(r#"{"functions": [{"name": "helper"}]}"#).unwrap_err();
        assert!(matches!(err, LoadError::MissingEntry(ref n) if n == "main"));
    }

    #[test]
    fn rejects_duplicate_types() {
        let json = r#"{
            "types": [{"name": "A", "kind": "class"}, {"name": "A", "kind": "struct"}],
            "functions": [{"name": "main"}]
        }"#;
        assert!(matches!(load_program(json), Err(LoadError::DuplicateType(ref n)) if n == "A"));
    }

    #[test]
    fn rejects_protocol_without_implementation() {
        let json = r#"{
            "types": [{"name": "A", "kind": "class", "implements": ["async_disposable"]}],
            "functions": [{"name": "main"}]
        }"#;
        let err = load_program(json).unwrap_err();
        assert_eq!(
            err.to_string(),
            "type 'A' declares AsyncDisposable but has no DisposeAsync implementation"
        );
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(load_program("{"), Err(LoadError::Parse(_))));
    }
}
