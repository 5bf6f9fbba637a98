//! Module transformation: source text to runtime-executable code
//!
//! The bundler only depends on the [`ModuleTransformer`] contract. The default
//! [`EsmTransformer`] parses each module with oxc and lowers its top-level
//! `import`/`export` declarations into the `require`/`exports` form the
//! generated runtime provides. All other source text is copied through
//! unchanged, and removed declarations leave their line breaks behind.

use indexmap::{IndexMap, IndexSet};
use log::trace;
use oxc_allocator::Allocator;
use oxc_ast::ast::{
    BindingPattern, BindingPatternKind, Declaration, ExportAllDeclaration,
    ExportDefaultDeclaration, ExportDefaultDeclarationKind, ExportNamedDeclaration,
    ImportDeclaration, ImportDeclarationSpecifier, ModuleExportName, Statement,
};
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType, Span};
use thiserror::Error;

/// Prefix for the variables that hold a required module's exports
const IMPORT_HOLDER_PREFIX: &str = "__weakpack_import_";

/// Result of transforming one module
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformOutput {
    pub code: String,
    /// Raw import specifiers in source order
    pub specifiers: IndexSet<String>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("line {line}: {message}")]
pub struct TransformError {
    pub line: usize,
    pub message: String,
}

impl TransformError {
    fn at(source: &str, offset: usize, message: impl Into<String>) -> Self {
        let end = offset.min(source.len());
        Self {
            line: source.as_bytes()[..end]
                .iter()
                .filter(|&&b| b == b'\n')
                .count()
                + 1,
            message: message.into(),
        }
    }
}

/// Turns module text into runtime code plus its raw import specifiers
pub trait ModuleTransformer: Send + Sync {
    fn transform(&self, source: &str, path: &str) -> Result<TransformOutput, TransformError>;
}

/// Lowers static `import`/`export` declarations to `require` calls and
/// `exports` properties
#[derive(Debug, Default, Clone, Copy)]
pub struct EsmTransformer;

impl ModuleTransformer for EsmTransformer {
    fn transform(&self, source: &str, path: &str) -> Result<TransformOutput, TransformError> {
        trace!("Lowering ES module syntax in {path}");
        let allocator = Allocator::default();
        let parsed = Parser::new(&allocator, source, SourceType::mjs()).parse();

        if let Some(error) = parsed.errors.first() {
            let offset = error
                .labels
                .as_ref()
                .and_then(|labels| labels.first())
                .map_or(0, |label| label.offset());
            return Err(TransformError::at(source, offset, error.to_string()));
        }
        if parsed.panicked {
            return Err(TransformError::at(
                source,
                source.len(),
                "parser stopped before the end of the module",
            ));
        }

        let mut lowering = Lowering::new(source);
        for statement in &parsed.program.body {
            lowering.statement(statement);
        }
        Ok(lowering.finish())
    }
}

#[derive(Debug)]
struct Edit {
    start: usize,
    end: usize,
    text: String,
}

struct Lowering<'s> {
    source: &'s str,
    edits: Vec<Edit>,
    specifiers: IndexSet<String>,
    /// Specifier -> holder variable
    holders: IndexMap<String, String>,
    /// `const` declarations binding imported names
    bindings: Vec<String>,
    /// Exported name -> expression read by its getter
    exports: IndexMap<String, String>,
    star_exports: Vec<String>,
}

impl<'s> Lowering<'s> {
    fn new(source: &'s str) -> Self {
        Self {
            source,
            edits: Vec::new(),
            specifiers: IndexSet::new(),
            holders: IndexMap::new(),
            bindings: Vec::new(),
            exports: IndexMap::new(),
            star_exports: Vec::new(),
        }
    }

    fn statement(&mut self, statement: &Statement<'_>) {
        match statement {
            Statement::ImportDeclaration(import) => self.import(import),
            Statement::ExportNamedDeclaration(export) => self.export_named(export),
            Statement::ExportDefaultDeclaration(export) => self.export_default(export),
            Statement::ExportAllDeclaration(export) => self.export_all(export),
            _ => {}
        }
    }

    fn replace(&mut self, span: Span, text: impl Into<String>) {
        self.edits.push(Edit {
            start: span.start as usize,
            end: span.end as usize,
            text: text.into(),
        });
    }

    /// Drop `span` from the output, keeping its line breaks
    fn remove(&mut self, span: Span) {
        let newlines = span.source_text(self.source).matches('\n').count();
        self.replace(span, "\n".repeat(newlines));
    }

    fn holder_for(&mut self, specifier: &str) -> String {
        self.specifiers.insert(specifier.to_owned());
        let next = self.holders.len();
        self.holders
            .entry(specifier.to_owned())
            .or_insert_with(|| format!("{IMPORT_HOLDER_PREFIX}{next}__"))
            .clone()
    }

    fn import(&mut self, import: &ImportDeclaration<'_>) {
        self.remove(import.span);
        let holder = self.holder_for(import.source.value.as_str());

        for specifier in import.specifiers.iter().flatten() {
            let (local, value) = match specifier {
                ImportDeclarationSpecifier::ImportSpecifier(named) => {
                    (&named.local, member(&holder, &named.imported))
                }
                ImportDeclarationSpecifier::ImportDefaultSpecifier(default) => {
                    (&default.local, format!("{holder}.default"))
                }
                ImportDeclarationSpecifier::ImportNamespaceSpecifier(namespace) => {
                    (&namespace.local, holder.clone())
                }
            };
            self.bindings.push(format!("const {} = {value};", local.name));
        }
    }

    fn export_named(&mut self, export: &ExportNamedDeclaration<'_>) {
        if let Some(declaration) = &export.declaration {
            self.remove(Span::new(export.span.start, declaration.span().start));
            for name in declared_names(declaration) {
                self.exports.insert(name.clone(), name);
            }
            return;
        }

        self.remove(export.span);
        let holder = export
            .source
            .as_ref()
            .map(|source| self.holder_for(source.value.as_str()));
        for specifier in &export.specifiers {
            let value = match &holder {
                Some(holder) => member(holder, &specifier.local),
                None => export_name(&specifier.local),
            };
            self.exports.insert(export_name(&specifier.exported), value);
        }
    }

    fn export_default(&mut self, export: &ExportDefaultDeclaration<'_>) {
        let keyword = Span::new(export.span.start, export.declaration.span().start);
        let (named, hoisted) = match &export.declaration {
            ExportDefaultDeclarationKind::FunctionDeclaration(function) => {
                (function.id.as_ref(), true)
            }
            ExportDefaultDeclarationKind::ClassDeclaration(class) => (class.id.as_ref(), true),
            _ => (None, false),
        };

        if let Some(id) = named {
            self.remove(keyword);
            self.exports.insert("default".to_owned(), id.name.to_string());
            return;
        }

        self.replace(keyword, "exports.default = ");
        // Anonymous declarations carry no terminator of their own
        if hoisted {
            self.replace(Span::new(export.span.end, export.span.end), ";");
        }
    }

    fn export_all(&mut self, export: &ExportAllDeclaration<'_>) {
        self.remove(export.span);
        let holder = self.holder_for(export.source.value.as_str());
        match &export.exported {
            Some(name) => {
                self.exports.insert(export_name(name), holder);
            }
            None => self.star_exports.push(holder),
        }
    }

    fn finish(mut self) -> TransformOutput {
        let mut header = Vec::with_capacity(
            self.exports.len() + self.holders.len() + self.star_exports.len() + self.bindings.len(),
        );
        header.extend(self.exports.iter().map(|(exported, expression)| {
            format!(
                "Object.defineProperty(exports, {}, {{ enumerable: true, get: function () {{ return {expression}; }} }});",
                js_string(exported)
            )
        }));
        header.extend(
            self.holders
                .iter()
                .map(|(specifier, holder)| format!("var {holder} = require({});", js_string(specifier))),
        );
        header.extend(self.star_exports.iter().map(|holder| {
            format!(
                "Object.keys({holder}).forEach(function (key) {{ if (key === \"default\" || Object.prototype.hasOwnProperty.call(exports, key)) return; Object.defineProperty(exports, key, {{ enumerable: true, get: function () {{ return {holder}[key]; }} }}); }});"
            )
        }));
        header.append(&mut self.bindings);

        let mut code = String::with_capacity(self.source.len() + 256);
        for line in &header {
            code.push_str(line);
            code.push('\n');
        }

        self.edits.sort_by_key(|edit| edit.start);
        let mut last = 0;
        for edit in &self.edits {
            code.push_str(&self.source[last..edit.start]);
            code.push_str(&edit.text);
            last = edit.end;
        }
        code.push_str(&self.source[last..]);

        TransformOutput {
            code,
            specifiers: self.specifiers,
        }
    }
}

/// Names bound by an exported declaration
fn declared_names(declaration: &Declaration<'_>) -> Vec<String> {
    match declaration {
        Declaration::VariableDeclaration(variables) => {
            let mut names = Vec::new();
            for declarator in &variables.declarations {
                collect_bindings(&declarator.id, &mut names);
            }
            names
        }
        Declaration::FunctionDeclaration(function) => {
            function.id.iter().map(|id| id.name.to_string()).collect()
        }
        Declaration::ClassDeclaration(class) => {
            class.id.iter().map(|id| id.name.to_string()).collect()
        }
        _ => Vec::new(),
    }
}

fn collect_bindings(pattern: &BindingPattern<'_>, names: &mut Vec<String>) {
    match &pattern.kind {
        BindingPatternKind::BindingIdentifier(id) => names.push(id.name.to_string()),
        BindingPatternKind::ObjectPattern(object) => {
            for property in &object.properties {
                collect_bindings(&property.value, names);
            }
            if let Some(rest) = &object.rest {
                collect_bindings(&rest.argument, names);
            }
        }
        BindingPatternKind::ArrayPattern(array) => {
            for element in array.elements.iter().flatten() {
                collect_bindings(element, names);
            }
            if let Some(rest) = &array.rest {
                collect_bindings(&rest.argument, names);
            }
        }
        BindingPatternKind::AssignmentPattern(assignment) => {
            collect_bindings(&assignment.left, names);
        }
    }
}

fn export_name(name: &ModuleExportName<'_>) -> String {
    match name {
        ModuleExportName::IdentifierName(id) => id.name.to_string(),
        ModuleExportName::IdentifierReference(id) => id.name.to_string(),
        ModuleExportName::StringLiteral(literal) => literal.value.to_string(),
    }
}

/// Property access on `object`, bracketed when the name is not an identifier
fn member(object: &str, name: &ModuleExportName<'_>) -> String {
    match name {
        ModuleExportName::StringLiteral(literal) => {
            format!("{object}[{}]", js_string(literal.value.as_str()))
        }
        other => format!("{object}.{}", export_name(other)),
    }
}

/// Quote a string as a JavaScript string literal
pub(crate) fn js_string(value: &str) -> String {
    serde_json::Value::from(value).to_string()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn lower(source: &str) -> TransformOutput {
        EsmTransformer
            .transform(source, "test.js")
            .expect("source should transform")
    }

    fn specifiers(output: &TransformOutput) -> Vec<&str> {
        output.specifiers.iter().map(String::as_str).collect()
    }

    #[test]
    fn test_module_without_imports_is_unchanged() {
        let source = "const answer = 42;\nconsole.log(answer / 2);\n";
        let output = lower(source);
        assert_eq!(output.code, source);
        assert!(output.specifiers.is_empty());
    }

    #[test]
    fn test_import_forms_are_lowered_and_hoisted() {
        let output = lower(
            "console.log(b);\nimport d, { x, y as z } from './b.js';\nimport * as ns from \"./c.js\";\nimport './side.js'\n",
        );
        assert_eq!(specifiers(&output), vec!["./b.js", "./c.js", "./side.js"]);
        assert_eq!(
            output.code,
            "var __weakpack_import_0__ = require(\"./b.js\");\n\
             var __weakpack_import_1__ = require(\"./c.js\");\n\
             var __weakpack_import_2__ = require(\"./side.js\");\n\
             const d = __weakpack_import_0__.default;\n\
             const x = __weakpack_import_0__.x;\n\
             const z = __weakpack_import_0__.y;\n\
             const ns = __weakpack_import_1__;\n\
             console.log(b);\n\n\n\n"
        );
    }

    #[test]
    fn test_multiline_import_keeps_line_count() {
        let source = "import {\n  a,\n  b,\n} from './m.js';\nconsole.log(a, b);\n";
        let output = lower(source);
        let body = output
            .code
            .split_once("const b = __weakpack_import_0__.b;\n")
            .expect("bindings precede the body")
            .1;
        assert_eq!(body, "\n\n\n\nconsole.log(a, b);\n");
    }

    #[test]
    fn test_repeated_specifier_shares_one_require() {
        let output = lower("import { a } from './m.js';\nimport { b } from './m.js';\n");
        assert_eq!(specifiers(&output), vec!["./m.js"]);
        assert_eq!(output.code.matches("require(").count(), 1);
    }

    #[test]
    fn test_export_declarations_define_getters() {
        let output = lower(
            "export const a = 1, b = [2, 3];\nexport function f() { return a; }\nexport class K {}\nexport let late\nlate = f(a, b);\n",
        );
        let code = &output.code;
        for name in ["a", "b", "f", "K", "late"] {
            assert!(
                code.contains(&format!(
                    "Object.defineProperty(exports, \"{name}\", {{ enumerable: true, get: function () {{ return {name}; }} }});"
                )),
                "missing getter for {name}:\n{code}"
            );
        }
        assert!(!code.contains("export "));
        assert!(code.contains("const a = 1, b = [2, 3];"));
        assert!(code.contains("function f() { return a; }"));
    }

    #[test]
    fn test_destructured_exports_define_every_binding() {
        let output =
            lower("const obj = { a: 1, b: [2, 3] };\nexport const { a, b: [first, ...others] } = obj;\n");
        let getters = output.code.matches("Object.defineProperty").count();
        assert_eq!(getters, 3);
        for name in ["\"a\"", "\"first\"", "\"others\""] {
            assert!(output.code.contains(name), "missing {name}");
        }
    }

    #[test]
    fn test_declaration_commas_inside_initialisers_are_ignored() {
        let output = lower("export const pick = (a, b) => ({ a, b });\nconst other = 1, more = 2;\n");
        assert_eq!(output.code.matches("Object.defineProperty").count(), 1);
        assert!(output.code.contains("\"pick\""));
    }

    #[test]
    fn test_default_exports() {
        let expression = lower("export default 40 + 2;\n");
        assert!(expression.code.ends_with("exports.default = 40 + 2;\n"));

        let named = lower("export default function main() {}\n");
        assert!(named.code.contains("return main;"));
        assert!(named.code.contains("\nfunction main() {}"));

        let anonymous = lower("export default class extends Base {}\n");
        assert!(anonymous.code.contains("exports.default = class extends Base {};"));
    }

    #[test]
    fn test_export_lists_and_reexports() {
        let output = lower(
            "const a = 1;\nexport { a, a as alias };\nexport { x as y } from './x.js';\nexport * from './all.js';\nexport * as ns from './ns.js';\n",
        );
        assert_eq!(specifiers(&output), vec!["./x.js", "./all.js", "./ns.js"]);
        let code = &output.code;
        assert!(code.contains("exports, \"alias\", { enumerable: true, get: function () { return a; } }"));
        assert!(code.contains("exports, \"y\", { enumerable: true, get: function () { return __weakpack_import_0__.x; } }"));
        assert!(code.contains("Object.keys(__weakpack_import_1__).forEach"));
        assert!(code.contains("exports, \"ns\", { enumerable: true, get: function () { return __weakpack_import_2__; } }"));
    }

    #[test]
    fn test_string_export_names_use_bracket_access() {
        let output = lower("export { \"kebab-name\" as camel } from './m.js';\n");
        assert!(output.code.contains("return __weakpack_import_0__[\"kebab-name\"];"));
    }

    #[test]
    fn test_strings_comments_and_regexes_are_not_scanned_for_imports() {
        let source = "const s = \"import x from './no.js'\";\n// import y from './no.js'\n/* export const z = 1; */\nconst t = `${s} import q from './no.js'`;\nconst re = /import '.\\/no.js'/g;\nconst ratio = total / count / 2;\n";
        let output = lower(source);
        assert!(output.specifiers.is_empty());
        assert_eq!(output.code, source);
    }

    #[test]
    fn test_division_and_regex_statements_parse() {
        let output = lower("let i = 4;\nlet y = i++ / 2;\nexport { y };\n");
        assert!(output.code.contains("let y = i++ / 2;"));
        assert!(output.code.contains("\"y\""));

        let source = "let s = 'x';\nif (s) /'/.test(s);\n";
        assert_eq!(lower(source).code, source);

        let source = "const half = (a) => a / 2 / 1;\nconst parts = 'a/b'.split(/\\//);\nx = y\n/2/g;\n";
        assert_eq!(lower(source).code, source);
    }

    #[test]
    fn test_dynamic_import_and_import_meta_are_left_alone() {
        let source = "const lazy = import('./lazy.js');\nconsole.log(import.meta.url);\nobj.import('./x.js');\n";
        let output = lower(source);
        assert!(output.specifiers.is_empty());
        assert_eq!(output.code, source);
    }

    #[test]
    fn test_nested_template_interpolation() {
        let output = lower("const s = `a${`b${c}`}d`;\nimport './after.js';\n");
        assert_eq!(specifiers(&output), vec!["./after.js"]);
    }

    #[test]
    fn test_syntax_errors_report_their_line() {
        for (source, line) in [
            ("const ok = 1;\nconst s = 'open;\n", 2),
            ("let a = 1;\nlet b = ;\n", 2),
        ] {
            let err = EsmTransformer
                .transform(source, "bad.js")
                .expect_err("source should fail");
            assert_eq!(err.line, line, "{source:?}: {err}");
        }
    }

    #[test]
    fn test_malformed_module_syntax_is_an_error() {
        for source in [
            "import { a from './a.js';\n",
            "import a './a.js';\n",
            "import a from b;\n",
            "export nonsense;\n",
            "export * from;\n",
            "function f() {\n  return 1;\n",
            "const x = ());\n",
            "const t = `never closed\n",
        ] {
            assert!(
                EsmTransformer.transform(source, "bad.js").is_err(),
                "{source:?} should be rejected"
            );
        }
    }
}
