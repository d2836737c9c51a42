//! Static import scanning for Python source.
//!
//! The snippet is parsed with `ruff_python_parser` and every `import` and
//! absolute `from ... import` statement is collected, including those nested
//! in functions, classes and compound statements. Nothing is executed. Source
//! that does not parse yields no imports; the interpreter reports the real
//! error when the snippet runs.

use std::collections::BTreeSet;

use ruff_python_ast::{self as ast, ExceptHandler, Stmt};
use ruff_python_parser::{parse_module, ParseError};
use tracing::debug;

/// Where the module names for dependency resolution come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportSource {
    /// Scan this source text.
    Code(String),
    /// The caller already knows the imported modules.
    Modules(Vec<String>),
}

impl ImportSource {
    pub fn modules(&self) -> Vec<String> {
        match self {
            Self::Code(source) => scan(source),
            Self::Modules(modules) => modules.clone(),
        }
    }
}

/// Top-level module names imported by `source`, sorted and unique.
/// Returns an empty list when the source does not parse.
pub fn scan(source: &str) -> Vec<String> {
    match find_imports(source) {
        Ok(modules) => modules,
        Err(err) => {
            debug!(%err, "skipping import scan");
            Vec::new()
        }
    }
}

pub fn find_imports(source: &str) -> Result<Vec<String>, ParseError> {
    let module = parse_module(source)?.into_syntax();
    let mut found = BTreeSet::new();
    collect(&module.body, &mut found);
    Ok(found.into_iter().collect())
}

fn collect(body: &[Stmt], found: &mut BTreeSet<String>) {
    for stmt in body {
        match stmt {
            Stmt::Import(ast::StmtImport { names, .. }) => {
                for alias in names {
                    found.insert(top_level(alias.name.as_str()));
                }
            }
            // relative imports name modules of the snippet's own package, never installable ones
            Stmt::ImportFrom(ast::StmtImportFrom { module: Some(module), level: 0, .. }) => {
                found.insert(top_level(module.as_str()));
            }
            Stmt::FunctionDef(ast::StmtFunctionDef { body, .. })
            | Stmt::ClassDef(ast::StmtClassDef { body, .. })
            | Stmt::With(ast::StmtWith { body, .. }) => collect(body, found),
            Stmt::For(ast::StmtFor { body, orelse, .. })
            | Stmt::While(ast::StmtWhile { body, orelse, .. }) => {
                collect(body, found);
                collect(orelse, found);
            }
            Stmt::If(ast::StmtIf { body, elif_else_clauses, .. }) => {
                collect(body, found);
                for clause in elif_else_clauses {
                    collect(&clause.body, found);
                }
            }
            Stmt::Try(ast::StmtTry { body, handlers, orelse, finalbody, .. }) => {
                collect(body, found);
                for handler in handlers {
                    let ExceptHandler::ExceptHandler(handler) = handler;
                    collect(&handler.body, found);
                }
                collect(orelse, found);
                collect(finalbody, found);
            }
            Stmt::Match(ast::StmtMatch { cases, .. }) => {
                for case in cases {
                    collect(&case.body, found);
                }
            }
            _ => {}
        }
    }
}

fn top_level(module: &str) -> String {
    module.split('.').next().unwrap_or(module).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_and_dotted_imports() {
        let src = "import os\nimport numpy.linalg as la, json\n";
        assert_eq!(scan(src), vec!["json", "numpy", "os"]);
    }

    #[test]
    fn from_imports_with_parentheses_across_lines() {
        let src = "from pandas import (\n    DataFrame,\n    Series as S,\n)\n\
                   from sklearn.linear_model import *\n";
        assert_eq!(scan(src), vec!["pandas", "sklearn"]);
    }

    #[test]
    fn relative_imports_are_skipped() {
        assert!(scan("from . import sibling\nfrom ..pkg import thing\n").is_empty());
    }

    #[test]
    fn nested_and_compound_statements() {
        let src = "\
def f():
    import requests
try:
    import yaml
except ImportError: import json
if True: x = 1; import cv2
";
        assert_eq!(scan(src), vec!["cv2", "json", "requests", "yaml"]);
    }

    #[test]
    fn strings_and_comments_are_not_scanned() {
        let src =
            "s = 'import os'\n# import sys\nt = \"\"\"\nimport re\n\"\"\"\nu = rb'import x'\n";
        assert!(scan(src).is_empty());
    }

    #[test]
    fn line_continuation_joins_statement() {
        assert_eq!(scan("import os, \\\n    sys\n"), vec!["os", "sys"]);
    }

    #[test]
    fn yield_from_and_raise_from_are_not_imports() {
        let src = "def g():\n    yield from range(3)\n\
                   try:\n    pass\nexcept E as e:\n    raise X from e\n";
        assert!(scan(src).is_empty());
    }

    #[test]
    fn syntax_errors_yield_nothing() {
        assert!(scan("import numpy\nprint((1, 2)\n").is_empty());
        assert!(scan("import numpy\nx = 'unterminated\n").is_empty());
        assert!(scan("import numpy\nx = import json\n").is_empty());
        assert!(scan("from import x\n").is_empty());
        assert!(find_imports("import os\n]").is_err());
    }

    #[test]
    fn nested_quotes_in_f_strings() {
        let src = "import numpy\nprint(f\"{\"\\n\".join(['a'])}\")\n";
        assert_eq!(scan(src), vec!["numpy"]);
    }

    #[test]
    fn any_line_ending_separates_statements() {
        assert_eq!(scan("import os\rimport sys"), vec!["os", "sys"]);
        assert_eq!(scan("import os\r\nimport sys\r\n"), vec!["os", "sys"]);
    }

    #[test]
    fn imports_inside_match_and_loops() {
        let src = "\
match cmd:
    case 'plot':
        import matplotlib.pyplot as plt
for _ in []:
    pass
else:
    import scipy
while False:
    import toml
";
        assert_eq!(scan(src), vec!["matplotlib", "scipy", "toml"]);
    }

    #[test]
    fn duplicates_are_collapsed() {
        assert_eq!(scan("import a\nimport a.b\nfrom a.c import d\n"), vec!["a"]);
    }

    #[test]
    fn empty_source_has_no_imports() {
        assert!(scan("").is_empty());
        assert!(scan("x = 1 + 1").is_empty());
    }

    #[test]
    fn pre_supplied_modules_bypass_scan() {
        let source = ImportSource::Modules(vec!["zzz".into(), "zzz".into()]);
        assert_eq!(source.modules(), vec!["zzz", "zzz"]);
        assert_eq!(ImportSource::Code("import q".into()).modules(), vec!["q"]);
    }
}
