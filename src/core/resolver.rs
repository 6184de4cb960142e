//! PF-005: Expression resolution — selector/operator trees to backend syntax.
//!
//! The resolver owns the rules shared by every backend (selector lookup,
//! overrides, extension stripping, placeholder scanning, interpolation
//! wrapping). The concrete tokens come from the backend's
//! [`ExpressionDialect`]. Resolution is pure: warnings are returned in
//! [`Resolved::diagnostics`], never logged.

use super::error::{Result, TranslateError};
use super::expr::{
    BinaryOp, Expression, InputSelector, Literal, Operator, RuntimeResource, Selector,
    StringFormatter, RUNTIME_PREFIX,
};
use super::translator::generated_filename;
use super::types::{Backend, ToolInput};
use indexmap::IndexMap;
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid")
});

/// Non-fatal finding produced while resolving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// A resolved expression.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolved {
    pub value: String,
    pub diagnostics: Vec<Diagnostic>,
    /// The expression reads file contents; output bindings must load them
    pub load_contents: bool,
}

/// Everything the resolver needs to know about where an expression lands.
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    pub backend: Backend,
    /// The surrounding text already expects a bare expression
    pub code_environment: bool,
    /// The result is embedded in a shell script body (one more escaping layer)
    pub in_shell_script: bool,
    pub inputs: Option<&'a IndexMap<String, ToolInput>>,
    pub selector_overrides: Option<&'a IndexMap<String, String>>,
    pub skip_lookup: bool,
    /// Filename inputs fall back to their generated name when unset
    pub filename_fallback: bool,
    /// Enclosing tool, for error messages
    pub tool_id: &'a str,
}

impl<'a> ResolveContext<'a> {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            code_environment: true,
            in_shell_script: false,
            inputs: None,
            selector_overrides: None,
            skip_lookup: false,
            filename_fallback: false,
            tool_id: "",
        }
    }

    pub fn code(mut self, code_environment: bool) -> Self {
        self.code_environment = code_environment;
        self
    }

    pub fn shell_script(mut self, in_shell_script: bool) -> Self {
        self.in_shell_script = in_shell_script;
        self
    }

    pub fn with_inputs(mut self, tool_id: &'a str, inputs: &'a IndexMap<String, ToolInput>) -> Self {
        self.tool_id = tool_id;
        self.inputs = Some(inputs);
        self
    }

    pub fn with_overrides(mut self, overrides: &'a IndexMap<String, String>) -> Self {
        self.selector_overrides = Some(overrides);
        self
    }

    pub fn skipping_lookup(mut self) -> Self {
        self.skip_lookup = true;
        self
    }

    pub fn with_filename_fallback(mut self) -> Self {
        self.filename_fallback = true;
        self
    }
}

/// One piece of a string template after placeholder scanning.
#[derive(Debug, Clone, PartialEq)]
pub enum FormatPart {
    /// Literal text, already escaped for the target layer
    Text(String),
    /// A placeholder and the code-form value bound to it
    Value { name: String, code: String },
}

/// Backend-specific expression syntax. Every method returns code-form text.
pub trait ExpressionDialect {
    fn backend(&self) -> Backend;

    fn quote_string(&self, s: &str) -> String;

    fn null(&self) -> &'static str {
        "null"
    }

    /// Wrap code-form text so it is evaluated inside a non-code document.
    fn wrap(&self, code: &str) -> String;

    /// Reference to a tool input. `input` is None for runtime values and aliases.
    fn input_reference(&self, name: &str, input: Option<&ToolInput>) -> String;

    /// Basename of a file reference with each extension stripped.
    fn strip_extensions(&self, reference: &str, extensions: &[String]) -> String;

    /// Same as [`Self::strip_extensions`] applied to every array element.
    /// None when the language has no way to map over an array inline.
    fn strip_extensions_each(&self, reference: &str, extensions: &[String]) -> Option<String>;

    /// A filename input that falls back to its generated name when unset.
    fn filename_fallback(&self, reference: &str, generated: &str) -> String {
        self.first(&[reference.to_string(), generated.to_string()])
    }

    /// Code form of a template that [`Self::format`] rendered in a code environment.
    fn template_code(&self, rendered: String) -> String {
        rendered
    }

    /// Reference to a workflow input; None when the backend needs an alias.
    fn workflow_input(&self, id: &str) -> Option<String>;

    fn step_output(&self, step: &str, output: &str) -> Option<String>;

    /// A glob used as a value; None when the backend only accepts globs in bindings.
    fn wildcard(&self, pattern: &str) -> Option<String> {
        Some(self.quote_string(pattern))
    }

    fn list(&self, items: &[String]) -> String {
        format!("[{}]", items.join(", "))
    }

    fn join(&self, value: &str, separator: &str) -> String;

    fn if_else(&self, condition: &str, then: &str, otherwise: &str) -> String {
        format!("{} ? {} : {}", condition, then, otherwise)
    }

    fn is_defined(&self, value: &str) -> String {
        format!("({} != null)", value)
    }

    fn read_contents(&self, value: &str) -> String;

    fn first(&self, items: &[String]) -> String;

    fn length(&self, value: &str) -> String;

    fn not(&self, value: &str) -> String {
        format!("!({})", value)
    }

    fn binary(&self, op: BinaryOp, lhs: &str, rhs: &str) -> String {
        format!("({} {} {})", lhs, op.symbol(), rhs)
    }

    /// Render a template with at least one placeholder.
    fn format(&self, parts: &[FormatPart], code_environment: bool) -> String;
}

/// Resolve an expression in the given context.
pub fn resolve(expr: &Expression, ctx: &ResolveContext<'_>) -> Result<Resolved> {
    let mut out = Resolved::default();
    out.value = if ctx.code_environment {
        code(expr, ctx, &mut out)?
    } else {
        match expr {
            Expression::Literal(lit) => lit.to_string(),
            Expression::Selector(Selector::Wildcard(w)) => w.pattern.clone(),
            Expression::Operator(Operator::Format(f)) => format(f, ctx, false, &mut out)?,
            _ => {
                let c = code(expr, ctx, &mut out)?;
                dialect(ctx.backend).wrap(&c)
            }
        }
    };
    Ok(out)
}

/// Shorthand for [`resolve`] returning only the text, dropping diagnostics.
pub fn resolve_value(expr: &Expression, ctx: &ResolveContext<'_>) -> Result<String> {
    Ok(resolve(expr, ctx)?.value)
}

fn dialect(backend: Backend) -> &'static dyn ExpressionDialect {
    crate::backends::dialect_for(backend)
}

fn unsupported(ctx: &ResolveContext<'_>, expr: &Expression) -> TranslateError {
    TranslateError::UnsupportedExpression {
        backend: ctx.backend.to_string(),
        kind: expr.kind_name(),
    }
}

fn code(expr: &Expression, ctx: &ResolveContext<'_>, out: &mut Resolved) -> Result<String> {
    let d = dialect(ctx.backend);
    match expr {
        Expression::Literal(lit) => Ok(literal(lit, d)),
        Expression::List(items) => {
            let items = codes(items, ctx, out)?;
            Ok(d.list(&items))
        }
        Expression::Selector(sel) => match sel {
            Selector::Input(s) => input_selector(s, ctx, out),
            Selector::Runtime(r) => runtime_selector(*r, ctx, out),
            Selector::Wildcard(w) => d.wildcard(&w.pattern).ok_or_else(|| unsupported(ctx, expr)),
            Selector::WorkflowInput(id) => match override_for(ctx, id) {
                Some(alias) => Ok(d.input_reference(alias, None)),
                None => d.workflow_input(id).ok_or_else(|| unsupported(ctx, expr)),
            },
            Selector::StepOutput { step, output } => {
                let key = format!("{}/{}", step, output);
                match override_for(ctx, &key) {
                    Some(alias) => Ok(d.input_reference(alias, None)),
                    None => d.step_output(step, output).ok_or_else(|| unsupported(ctx, expr)),
                }
            }
        },
        Expression::Operator(op) => match op {
            Operator::If {
                condition,
                then,
                otherwise,
            } => {
                let c = code(condition, ctx, out)?;
                let t = code(then, ctx, out)?;
                let o = code(otherwise, ctx, out)?;
                Ok(d.if_else(&c, &t, &o))
            }
            Operator::IsDefined(v) => Ok(d.is_defined(&code(v, ctx, out)?)),
            Operator::Join { value, separator } => Ok(d.join(&code(value, ctx, out)?, separator)),
            Operator::ReadContents(v) => {
                out.load_contents = true;
                Ok(d.read_contents(&code(v, ctx, out)?))
            }
            Operator::Format(f) => format(f, ctx, true, out),
            Operator::First(items) => {
                let items = codes(items, ctx, out)?;
                Ok(d.first(&items))
            }
            Operator::Length(v) => Ok(d.length(&code(v, ctx, out)?)),
            Operator::Not(v) => Ok(d.not(&code(v, ctx, out)?)),
            Operator::Binary { op, lhs, rhs } => {
                let l = code(lhs, ctx, out)?;
                let r = code(rhs, ctx, out)?;
                Ok(d.binary(*op, &l, &r))
            }
        },
    }
}

fn codes(items: &[Expression], ctx: &ResolveContext<'_>, out: &mut Resolved) -> Result<Vec<String>> {
    items.iter().map(|e| code(e, ctx, out)).collect()
}

fn literal(lit: &Literal, d: &dyn ExpressionDialect) -> String {
    match lit {
        Literal::Null => d.null().to_string(),
        Literal::String(s) => d.quote_string(s),
        other => other.to_string(),
    }
}

fn override_for<'a>(ctx: &ResolveContext<'a>, key: &str) -> Option<&'a str> {
    ctx.selector_overrides
        .and_then(|o| o.get(key))
        .map(String::as_str)
}

fn runtime_selector(
    resource: RuntimeResource,
    ctx: &ResolveContext<'_>,
    out: &mut Resolved,
) -> Result<String> {
    let sel = InputSelector {
        name: resource.input_name().to_string(),
        remove_file_extension: false,
    };
    input_selector(&sel, ctx, out)
}

fn input_selector(sel: &InputSelector, ctx: &ResolveContext<'_>, out: &mut Resolved) -> Result<String> {
    if sel.name.is_empty() {
        return Err(TranslateError::EmptySelector);
    }
    let d = dialect(ctx.backend);
    let skip = ctx.skip_lookup || sel.name.starts_with(RUNTIME_PREFIX);
    let name = override_for(ctx, &sel.name).unwrap_or(&sel.name);

    let input = if skip {
        None
    } else {
        let table = ctx.inputs.ok_or_else(|| TranslateError::MissingInputTable {
            selector: sel.name.clone(),
        })?;
        Some(
            table
                .get(&sel.name)
                .ok_or_else(|| TranslateError::UnknownInput {
                    selector: sel.name.clone(),
                    tool: ctx.tool_id.to_string(),
                })?,
        )
    };

    let mut reference = d.input_reference(name, input);
    if let (true, Some(input)) = (ctx.filename_fallback, input) {
        if let Some(generated) = generated_filename(&input.data_type) {
            let inner = ResolveContext {
                filename_fallback: false,
                ..*ctx
            };
            let mut derived = code(&generated, &inner, out)?;
            if let Expression::Operator(Operator::Format(_)) = generated {
                derived = d.template_code(derived);
            }
            reference = d.filename_fallback(&reference, &derived);
        }
    }
    let (true, Some(input)) = (sel.remove_file_extension, input) else {
        return Ok(reference);
    };

    let data_type = &input.data_type;
    if data_type.is_path() {
        Ok(d.strip_extensions(&reference, data_type.extensions()))
    } else if data_type.is_array() && data_type.fundamental().is_path() {
        match d.strip_extensions_each(&reference, data_type.extensions()) {
            Some(stripped) => Ok(stripped),
            None => {
                out.diagnostics.push(Diagnostic {
                    message: format!(
                        "InputSelector {} cannot remove_file_extension from each element on {}; kept the full paths",
                        sel.name, ctx.backend
                    ),
                });
                Ok(reference)
            }
        }
    } else {
        out.diagnostics.push(Diagnostic {
            message: format!(
                "InputSelector {} is requesting to remove_file_extension but it has type {}",
                sel.name, data_type
            ),
        });
        Ok(reference)
    }
}

fn format(
    f: &StringFormatter,
    ctx: &ResolveContext<'_>,
    code_environment: bool,
    out: &mut Resolved,
) -> Result<String> {
    if !PLACEHOLDER.is_match(&f.template) {
        return Ok(f.template.clone());
    }

    let escape = |text: &str| {
        if ctx.in_shell_script {
            text.replace('\\', "\\\\")
        } else {
            text.to_string()
        }
    };

    let mut parts = Vec::new();
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(&f.template) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let Some(slot) = f.slots.get(name.as_str()) else {
            out.diagnostics.push(Diagnostic {
                message: format!(
                    "no value for placeholder '{{{}}}' in \"{}\"; kept as text",
                    name.as_str(),
                    f.template
                ),
            });
            continue;
        };
        if whole.start() > last {
            parts.push(FormatPart::Text(escape(&f.template[last..whole.start()])));
        }
        parts.push(FormatPart::Value {
            name: name.as_str().to_string(),
            code: code(slot, ctx, out)?,
        });
        last = whole.end();
    }
    if last < f.template.len() {
        parts.push(FormatPart::Text(escape(&f.template[last..])));
    }

    Ok(dialect(ctx.backend).format(&parts, code_environment))
}
