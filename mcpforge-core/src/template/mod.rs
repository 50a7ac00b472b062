//! C5 Template Engine: a hand-written minimal text-template renderer with a
//! curated function whitelist and static pre-render validation. No
//! general-purpose templating crate is used here — the curated whitelist
//! and security scan are a bespoke contract this pipeline owns.

mod templates;

pub use templates::{cargo_manifest, manifest, readme, server_source, server_tests};

use std::collections::BTreeSet;

use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::model::{GenerationContext, ValidationDiagnostic};

const FUNCTIONS: &[&str] = &[
    "title", "upper", "lower", "trim", "replace", "contains", "hasPrefix", "hasSuffix", "split",
    "join", "printf", "len", "index",
];

const CONTROL_KEYWORDS: &[&str] = &[
    "range", "if", "else", "end", "with", "and", "or", "not", "eq", "ne", "lt", "le", "gt", "ge",
];

const FORBIDDEN_PATTERNS: &[&str] = &["exec", "system", "eval", "shell", "std::fs", "os.", "/bin/"];

const MAX_NESTING: usize = 5;

/// Every field name the bundled templates may dereference, flattened across
/// the top-level `GenerationContext` keys (see `build_context`) and the
/// per-tool keys scoped inside a `{{range .Tools}}` block. The check below
/// doesn't track scope, so both sets live in one flat whitelist.
const DECLARED_VARIABLES: &[&str] = &[
    "PackageName",
    "SpecTitle",
    "BaseUrl",
    "Tools",
    "GeneratedAt",
    "ToolVersion",
    "SourceSpecHash",
    "Name",
    "Description",
    "Method",
    "Path",
    "InputSchemaJson",
    "Last",
];

/// Run once on any template, including a user-supplied one, before it is
/// ever rendered.
pub fn validate_template(name: &str, source: &str) -> Result<Vec<ValidationDiagnostic>> {
    check_balanced_delimiters(source)?;
    check_forbidden_patterns(name, source)?;

    let mut warnings = Vec::new();
    check_function_whitelist(source)?;
    check_nesting_depth(name, source, &mut warnings);
    check_declared_variables(name, source, &mut warnings);
    Ok(warnings)
}

fn check_balanced_delimiters(source: &str) -> Result<()> {
    let mut depth: i64 = 0;
    let mut i = 0;
    let bytes = source.as_bytes();
    while i < bytes.len() {
        if bytes[i..].starts_with(b"{{") {
            depth += 1;
            i += 2;
        } else if bytes[i..].starts_with(b"}}") {
            depth -= 1;
            if depth < 0 {
                return Err(Error::UnbalancedDelimiters(i));
            }
            i += 2;
        } else {
            i += 1;
        }
    }
    if depth != 0 {
        return Err(Error::UnbalancedDelimiters(source.len()));
    }
    Ok(())
}

fn check_forbidden_patterns(name: &str, source: &str) -> Result<()> {
    for pattern in FORBIDDEN_PATTERNS {
        if source.contains(pattern) {
            return Err(Error::SecurityError(format!(
                "template `{name}` contains forbidden pattern `{pattern}`"
            )));
        }
    }
    Ok(())
}

fn check_function_whitelist(source: &str) -> Result<()> {
    for tag in iter_tags(source) {
        for token in tag.split_whitespace() {
            let ident = token.trim_start_matches('.').trim_matches(|c| c == '(' || c == ')');
            if ident.is_empty() || !ident.chars().next().unwrap().is_ascii_alphabetic() {
                continue;
            }
            if ident.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.') {
                let head = ident.split('.').next().unwrap_or(ident);
                if head.chars().next().map(|c| c.is_ascii_lowercase()).unwrap_or(false)
                    && !FUNCTIONS.contains(&head)
                    && !CONTROL_KEYWORDS.contains(&head)
                    && !is_path_reference(token)
                {
                    return Err(Error::ForbiddenFunction(head.to_string()));
                }
            }
        }
    }
    Ok(())
}

fn is_path_reference(token: &str) -> bool {
    token.starts_with('.')
}

fn check_nesting_depth(name: &str, source: &str, warnings: &mut Vec<ValidationDiagnostic>) {
    let mut depth: usize = 0;
    let mut max_seen = 0;
    for tag in iter_tags(source) {
        let trimmed = tag.trim();
        if trimmed.starts_with("if ") || trimmed.starts_with("range ") || trimmed.starts_with("with ") {
            depth += 1;
            max_seen = max_seen.max(depth);
        } else if trimmed == "end" {
            depth = depth.saturating_sub(1);
        }
    }
    if max_seen > MAX_NESTING {
        warnings.push(ValidationDiagnostic::warning(
            "TEMPLATE_NESTING",
            format!("template `{name}` nests control constructs {max_seen} levels deep (warn above {MAX_NESTING})"),
            format!("#/templates/{name}"),
        ));
    }
}

/// Warns on any `.Field` path reference whose leading segment isn't a
/// declared context key, catching typos and drift between a template and
/// `build_context` before render time.
fn check_declared_variables(name: &str, source: &str, warnings: &mut Vec<ValidationDiagnostic>) {
    let mut seen = BTreeSet::new();
    for tag in iter_tags(source) {
        for token in tag.split_whitespace() {
            let Some(path) = token.strip_prefix('.') else {
                continue;
            };
            let path = path.trim_matches(|c| c == '(' || c == ')');
            let head = path.split('.').next().unwrap_or("");
            if head.is_empty() {
                continue;
            }
            if !DECLARED_VARIABLES.contains(&head) && seen.insert(head.to_string()) {
                warnings.push(ValidationDiagnostic::warning(
                    "UNDECLARED_VARIABLE",
                    format!("template `{name}` references undeclared variable `.{head}`"),
                    format!("#/templates/{name}"),
                ));
            }
        }
    }
}

fn iter_tags(source: &str) -> Vec<&str> {
    let mut tags = Vec::new();
    let mut rest = source;
    while let Some(start) = rest.find("{{") {
        let after_open = &rest[start + 2..];
        if let Some(end) = after_open.find("}}") {
            tags.push(&after_open[..end]);
            rest = &after_open[end + 2..];
        } else {
            break;
        }
    }
    tags
}

#[derive(Debug, Clone)]
enum Node {
    Text(String),
    Expr(String),
    If { cond: String, then_branch: Vec<Node>, else_branch: Vec<Node> },
    Range { iter: String, body: Vec<Node> },
    With { cond: String, body: Vec<Node> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Terminator {
    Else,
    End,
    Eof,
}

fn parse(source: &str) -> Result<Vec<Node>> {
    let mut pos = 0;
    let (nodes, _) = parse_until(source, &mut pos, false)?;
    Ok(nodes)
}

/// Parses nodes until EOF, or, if `nested` is true, until a bare `end` or
/// `else` tag — reporting which terminator it stopped at so callers (chiefly
/// the `if` handler, which must tell `else` from `end`) can react.
fn parse_until(source: &str, pos: &mut usize, nested: bool) -> Result<(Vec<Node>, Terminator)> {
    let mut nodes = Vec::new();
    loop {
        let Some(rel_start) = source[*pos..].find("{{") else {
            nodes.push(Node::Text(source[*pos..].to_string()));
            *pos = source.len();
            return Ok((nodes, Terminator::Eof));
        };
        let tag_start = *pos + rel_start;
        if tag_start > *pos {
            nodes.push(Node::Text(source[*pos..tag_start].to_string()));
        }
        let after_open = tag_start + 2;
        let Some(rel_end) = source[after_open..].find("}}") else {
            return Err(Error::UnbalancedDelimiters(tag_start));
        };
        let tag_end = after_open + rel_end;
        let tag = source[after_open..tag_end].trim().to_string();
        *pos = tag_end + 2;

        if let Some(cond) = tag.strip_prefix("if ") {
            let (then_branch, term) = parse_until(source, pos, true)?;
            let else_branch = if term == Terminator::Else {
                let (nodes, _) = parse_until(source, pos, true)?;
                nodes
            } else {
                Vec::new()
            };
            nodes.push(Node::If {
                cond: cond.trim().to_string(),
                then_branch,
                else_branch,
            });
        } else if let Some(iter) = tag.strip_prefix("range ") {
            let (body, _) = parse_until(source, pos, true)?;
            nodes.push(Node::Range {
                iter: iter.trim().to_string(),
                body,
            });
        } else if let Some(cond) = tag.strip_prefix("with ") {
            let (body, _) = parse_until(source, pos, true)?;
            nodes.push(Node::With {
                cond: cond.trim().to_string(),
                body,
            });
        } else if tag == "else" {
            if nested {
                return Ok((nodes, Terminator::Else));
            }
        } else if tag == "end" {
            if nested {
                return Ok((nodes, Terminator::End));
            }
            // Stray `end` with no open block: ignore defensively rather
            // than failing a render over a cosmetic imbalance already
            // caught by check_balanced_delimiters.
        } else {
            nodes.push(Node::Expr(tag));
        }
    }
}

pub fn render(name: &str, source: &str, context: &Value) -> Result<String> {
    validate_template(name, source)?;
    let nodes = parse(source)?;
    let mut out = String::new();
    render_nodes(&nodes, context, &mut out)?;
    Ok(out)
}

fn render_nodes(nodes: &[Node], ctx: &Value, out: &mut String) -> Result<()> {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Expr(expr) => out.push_str(&eval_to_string(expr, ctx)?),
            Node::If { cond, then_branch, else_branch } => {
                if eval_bool(cond, ctx)? {
                    render_nodes(then_branch, ctx, out)?;
                } else {
                    render_nodes(else_branch, ctx, out)?;
                }
            }
            Node::With { cond, body } => {
                let value = eval_value(cond, ctx)?;
                if !is_falsy(&value) {
                    render_nodes(body, &value, out)?;
                }
            }
            Node::Range { iter, body } => {
                let value = eval_value(iter, ctx)?;
                if let Value::Array(items) = value {
                    for item in items {
                        render_nodes(body, &item, out)?;
                    }
                }
            }
        }
    }
    Ok(())
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Array(a) => a.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn eval_to_string(expr: &str, ctx: &Value) -> Result<String> {
    let value = eval_value(expr, ctx)?;
    Ok(match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

fn eval_bool(expr: &str, ctx: &Value) -> Result<bool> {
    Ok(!is_falsy(&eval_value(expr, ctx)?))
}

/// Evaluates a small expression: a dotted path, a quoted literal, or a
/// whitespace-separated function/comparison call whose head is in the
/// curated whitelist or control-keyword set.
fn eval_value(expr: &str, ctx: &Value) -> Result<Value> {
    let tokens: Vec<&str> = expr.split_whitespace().collect();
    if tokens.is_empty() {
        return Ok(Value::Null);
    }
    if tokens.len() == 1 {
        return Ok(resolve_token(tokens[0], ctx));
    }

    let head = tokens[0];
    let args: Vec<Value> = tokens[1..].iter().map(|t| resolve_token(t, ctx)).collect();

    match head {
        "not" => Ok(Value::Bool(is_falsy(args.first().unwrap_or(&Value::Null)))),
        "and" => Ok(Value::Bool(args.iter().all(|v| !is_falsy(v)))),
        "or" => Ok(Value::Bool(args.iter().any(|v| !is_falsy(v)))),
        "eq" => Ok(Value::Bool(args.first() == args.get(1))),
        "ne" => Ok(Value::Bool(args.first() != args.get(1))),
        "lt" | "le" | "gt" | "ge" => compare(head, &args),
        "upper" => Ok(Value::String(as_str(&args, 0).to_uppercase())),
        "lower" => Ok(Value::String(as_str(&args, 0).to_lowercase())),
        "title" => Ok(Value::String(title_case(as_str(&args, 0)))),
        "trim" => Ok(Value::String(as_str(&args, 0).trim().to_string())),
        "len" => Ok(Value::Number(len_of(args.first().unwrap_or(&Value::Null)).into())),
        "contains" => Ok(Value::Bool(as_str(&args, 0).contains(as_str(&args, 1)))),
        "hasPrefix" => Ok(Value::Bool(as_str(&args, 0).starts_with(as_str(&args, 1)))),
        "hasSuffix" => Ok(Value::Bool(as_str(&args, 0).ends_with(as_str(&args, 1)))),
        "replace" => Ok(Value::String(as_str(&args, 0).replace(as_str(&args, 1), as_str(&args, 2)))),
        "split" => Ok(Value::Array(
            as_str(&args, 0)
                .split(as_str(&args, 1))
                .map(|s| Value::String(s.to_string()))
                .collect(),
        )),
        "join" => {
            let sep = as_str(&args, 1);
            let items = args.first().and_then(|v| v.as_array()).cloned().unwrap_or_default();
            let parts: Vec<String> = items.iter().map(|v| v.as_str().unwrap_or_default().to_string()).collect();
            Ok(Value::String(parts.join(sep)))
        }
        "printf" => Ok(Value::String(args.iter().map(value_to_display).collect::<Vec<_>>().join(""))),
        "index" => {
            let target = args.first().cloned().unwrap_or(Value::Null);
            match (target, args.get(1)) {
                (Value::Array(items), Some(Value::Number(n))) => {
                    Ok(items.get(n.as_u64().unwrap_or(0) as usize).cloned().unwrap_or(Value::Null))
                }
                _ => Ok(Value::Null),
            }
        }
        other => Err(Error::ForbiddenFunction(other.to_string())),
    }
}

fn compare(op: &str, args: &[Value]) -> Result<Value> {
    let a = args.first().and_then(|v| v.as_f64()).unwrap_or(0.0);
    let b = args.get(1).and_then(|v| v.as_f64()).unwrap_or(0.0);
    Ok(Value::Bool(match op {
        "lt" => a < b,
        "le" => a <= b,
        "gt" => a > b,
        "ge" => a >= b,
        _ => false,
    }))
}

fn as_str(args: &[Value], idx: usize) -> &str {
    args.get(idx).and_then(|v| v.as_str()).unwrap_or("")
}

fn len_of(value: &Value) -> u64 {
    match value {
        Value::Array(a) => a.len() as u64,
        Value::String(s) => s.chars().count() as u64,
        Value::Object(o) => o.len() as u64,
        _ => 0,
    }
}

fn value_to_display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn resolve_token(token: &str, ctx: &Value) -> Value {
    if let Some(literal) = token.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        return Value::String(literal.to_string());
    }
    if let Ok(n) = token.parse::<f64>() {
        if let Some(num) = serde_json::Number::from_f64(n) {
            return Value::Number(num);
        }
    }
    if token == "true" {
        return Value::Bool(true);
    }
    if token == "false" {
        return Value::Bool(false);
    }
    if let Some(path) = token.strip_prefix('.') {
        return resolve_path(path, ctx);
    }
    Value::Null
}

fn resolve_path(path: &str, ctx: &Value) -> Value {
    if path.is_empty() {
        return ctx.clone();
    }
    let mut current = ctx.clone();
    for segment in path.split('.') {
        current = match current {
            Value::Object(ref map) => map.get(segment).cloned().unwrap_or(Value::Null),
            _ => Value::Null,
        };
    }
    current
}

/// Builds the PascalCase-keyed JSON tree the bundled templates render
/// against, from a fully populated GenerationContext.
pub fn build_context(ctx: &GenerationContext, source_spec_hash: &str) -> Value {
    let count = ctx.tools.len();
    let tools: Vec<Value> = ctx
        .tools
        .iter()
        .enumerate()
        .map(|(i, tool)| {
            json!({
                "Name": tool.name,
                "Description": tool.description.replace('"', "'"),
                "Method": tool.binding.method.to_string(),
                "Path": tool.binding.path,
                "InputSchemaJson": tool.input_schema.to_string(),
                "Last": i + 1 == count,
            })
        })
        .collect();

    json!({
        "PackageName": ctx.package_name,
        "SpecTitle": ctx.spec_title,
        "BaseUrl": ctx.base_url,
        "Tools": tools,
        "GeneratedAt": ctx.generated_at.to_rfc3339(),
        "ToolVersion": ctx.tool_version,
        "SourceSpecHash": source_spec_hash,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_plain_variable() {
        let out = render("t", "Hello, {{ .Name }}!", &json!({"Name": "world"})).unwrap();
        assert_eq!(out, "Hello, world!");
    }

    #[test]
    fn renders_if_else() {
        let src = "{{if .Flag}}yes{{else}}no{{end}}";
        assert_eq!(render("t", src, &json!({"Flag": true})).unwrap(), "yes");
        assert_eq!(render("t", src, &json!({"Flag": false})).unwrap(), "no");
    }

    #[test]
    fn renders_range() {
        let src = "{{range .Items}}[{{.Name}}]{{end}}";
        let ctx = json!({"Items": [{"Name": "a"}, {"Name": "b"}]});
        assert_eq!(render("t", src, &ctx).unwrap(), "[a][b]");
    }

    #[test]
    fn applies_function_whitelist() {
        let out = render("t", "{{upper .Name}}", &json!({"Name": "hi"})).unwrap();
        assert_eq!(out, "HI");
    }

    #[test]
    fn rejects_forbidden_function() {
        let err = render("t", "{{exec .Name}}", &json!({"Name": "hi"})).unwrap_err();
        assert_eq!(err.code(), "SECURITY_ERROR");
    }

    #[test]
    fn rejects_unbalanced_delimiters() {
        let err = render("t", "{{ .Name", &json!({})).unwrap_err();
        assert_eq!(err.code(), "UNBALANCED_DELIMITERS");
    }

    #[test]
    fn flags_undeclared_variable() {
        let warnings = validate_template("t", "{{ .NotARealField }}").unwrap();
        assert!(warnings.iter().any(|w| w.code == "UNDECLARED_VARIABLE"));
    }

    #[test]
    fn bundled_templates_declare_every_variable() {
        for (name, source) in [
            ("server_source", server_source()),
            ("server_tests", server_tests()),
            ("readme", readme()),
            ("manifest", manifest()),
            ("cargo_manifest", cargo_manifest()),
        ] {
            let warnings = validate_template(name, source).unwrap();
            assert!(
                warnings.iter().all(|w| w.code != "UNDECLARED_VARIABLE"),
                "template `{name}` has undeclared variables: {warnings:?}"
            );
        }
    }

    #[test]
    fn eq_comparison_works() {
        let src = "{{if eq .A .B}}same{{else}}diff{{end}}";
        assert_eq!(render("t", src, &json!({"A": "x", "B": "x"})).unwrap(), "same");
        assert_eq!(render("t", src, &json!({"A": "x", "B": "y"})).unwrap(), "diff");
    }
}
