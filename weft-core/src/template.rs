//! Configuration template rendering.
//!
//! Node configurations may contain `{{ expr }}` placeholders, rendered just
//! before the node runs. The environment exposes exactly two things: every
//! global variable as a top-level name (with dotted / attribute / index
//! traversal) and a `nodes['<id>']` accessor over recorded node outputs.
//! There is deliberately no general expression evaluator — only a minimal
//! variable/attribute/index path walker.
//!
//! Rendering is recursive: while the result still contains markers it is
//! re-rendered, up to [`MAX_RENDER_PASSES`] passes, stopping early once the
//! text is stable. Exhausting the pass budget is non-fatal: the last result
//! is returned and a warning is logged.

use crate::context::WorkflowContext;
use crate::error::{Result, WeftError};
use serde_json::Value;

/// Upper bound on recursive render passes.
pub const MAX_RENDER_PASSES: usize = 10;

/// Renders `{{ expr }}` templates against a workflow context.
pub struct TemplateResolver<'a> {
    ctx: &'a WorkflowContext,
}

impl<'a> TemplateResolver<'a> {
    /// Create a resolver over a context.
    pub fn new(ctx: &'a WorkflowContext) -> Self {
        Self { ctx }
    }

    /// Check whether a string contains template markers.
    pub fn contains_template(text: &str) -> bool {
        text.contains("{{")
    }

    /// Render a template string, recursively re-expanding the result.
    pub fn render(&self, input: &str) -> Result<String> {
        let mut current = input.to_string();
        for _ in 0..MAX_RENDER_PASSES {
            if !Self::contains_template(&current) {
                return Ok(current);
            }
            let rendered = self.render_once(&current)?;
            if rendered == current {
                return Ok(rendered);
            }
            current = rendered;
        }
        if Self::contains_template(&current) {
            self.ctx.log_warning(format!(
                "template still contains markers after {MAX_RENDER_PASSES} passes: {current}"
            ));
        }
        Ok(current)
    }

    /// Render a whole configuration tree.
    ///
    /// Strings containing markers are rendered and then coerced: results
    /// that read as integers, floats, booleans, or null become typed values
    /// (any further coercion is the consuming node's business). Maps and
    /// lists are walked recursively; everything else passes through.
    pub fn resolve(&self, config: &Value) -> Result<Value> {
        match config {
            Value::String(text) if Self::contains_template(text) => {
                Ok(coerce_rendered(self.render(text)?))
            }
            Value::Object(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (key, value) in map {
                    out.insert(key.clone(), self.resolve(value)?);
                }
                Ok(Value::Object(out))
            }
            Value::Array(items) => items.iter().map(|v| self.resolve(v)).collect(),
            other => Ok(other.clone()),
        }
    }

    /// Evaluate one path expression against the environment.
    ///
    /// Returns `None` for anything unbound, which renders as empty text.
    pub fn eval(&self, expr: &str) -> Result<Option<Value>> {
        let segments = parse_path(expr)?;
        let mut iter = segments.into_iter();
        let root = match iter.next() {
            Some(root) => root,
            None => return Ok(None),
        };

        let mut current = if root == "nodes" {
            // `nodes['<id>']` — the recorded output of another node.
            let node_id = match iter.next() {
                Some(id) => id,
                None => return Ok(None),
            };
            match self.ctx.output(&node_id) {
                Some(output) => output.as_ref().clone(),
                None => return Ok(None),
            }
        } else {
            match self.ctx.global(&root) {
                Some(value) => value,
                None => return Ok(None),
            }
        };

        for segment in iter {
            current = match step(&current, &segment) {
                Some(next) => next,
                None => return Ok(None),
            };
        }
        Ok(Some(current))
    }

    fn render_once(&self, input: &str) -> Result<String> {
        let mut out = String::with_capacity(input.len());
        let mut rest = input;
        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after.find("}}").ok_or_else(|| WeftError::Template {
                template: input.to_string(),
                cause: "unclosed '{{' marker".to_string(),
            })?;
            let expr = after[..end].trim();
            match self.eval(expr)? {
                Some(value) => out.push_str(&render_value(&value)),
                None => {
                    tracing::debug!(expr, "template expression is unbound");
                }
            }
            rest = &after[end + 2..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

/// One traversal step: object field or list index.
fn step(value: &Value, key: &str) -> Option<Value> {
    match value {
        Value::Object(map) => map.get(key).cloned(),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)).cloned(),
        _ => None,
    }
}

/// Render a value into template output text.
fn render_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Coerce a fully rendered scalar text into a typed value.
fn coerce_rendered(text: String) -> Value {
    let trimmed = text.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "null" | "none" => return Value::Null,
        _ => {}
    }
    let digits = trimmed.strip_prefix('-').unwrap_or(trimmed);
    if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(n) = trimmed.parse::<i64>() {
            return Value::from(n);
        }
    }
    if digits.matches('.').count() == 1
        && !digits.starts_with('.')
        && !digits.ends_with('.')
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
    {
        if let Ok(f) = trimmed.parse::<f64>() {
            return Value::from(f);
        }
    }
    Value::String(trimmed.to_string())
}

/// Parse `root.attr['key'][0].more` into path segments.
fn parse_path(expr: &str) -> Result<Vec<String>> {
    let bad = |cause: &str| WeftError::Template {
        template: expr.to_string(),
        cause: cause.to_string(),
    };

    let mut segments = Vec::new();
    let mut chars = expr.chars().peekable();

    let mut ident = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_ascii_alphanumeric() || c == '_' {
            ident.push(c);
            chars.next();
        } else {
            break;
        }
    }
    if ident.is_empty() {
        return Err(bad("expected a variable name"));
    }
    segments.push(ident);

    while let Some(&c) = chars.peek() {
        match c {
            '.' => {
                chars.next();
                let mut ident = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if ident.is_empty() {
                    return Err(bad("expected a field name after '.'"));
                }
                segments.push(ident);
            }
            '[' => {
                chars.next();
                let mut key = String::new();
                match chars.peek() {
                    Some(&q) if q == '\'' || q == '"' => {
                        let quote = q;
                        chars.next();
                        loop {
                            match chars.next() {
                                Some(c) if c == quote => break,
                                Some(c) => key.push(c),
                                None => return Err(bad("unterminated string index")),
                            }
                        }
                    }
                    _ => {
                        while let Some(&c) = chars.peek() {
                            if c.is_ascii_digit() {
                                key.push(c);
                                chars.next();
                            } else {
                                break;
                            }
                        }
                        if key.is_empty() {
                            return Err(bad("expected a quoted key or numeric index"));
                        }
                    }
                }
                if chars.next() != Some(']') {
                    return Err(bad("expected ']'"));
                }
                segments.push(key);
            }
            c if c.is_whitespace() => {
                chars.next();
                if chars.peek().is_some() {
                    return Err(bad("unexpected trailing content"));
                }
            }
            _ => return Err(bad("unexpected character in expression")),
        }
    }

    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn ctx() -> WorkflowContext {
        let ctx = WorkflowContext::new();
        ctx.set_global("host", json!("https://x"));
        ctx.set_global("base", json!("{{ host }}/v1"));
        ctx.set_global("user", json!({"name": "Ada", "tags": ["a", "b"]}));
        ctx.set_output("start", Arc::new(json!({"data": {"score": 85}})));
        ctx
    }

    #[test]
    fn plain_text_is_idempotent() {
        let ctx = ctx();
        let resolver = TemplateResolver::new(&ctx);
        assert_eq!(resolver.render("no markers here").unwrap(), "no markers here");
    }

    #[test]
    fn globals_and_nested_fields_resolve() {
        let ctx = ctx();
        let resolver = TemplateResolver::new(&ctx);
        assert_eq!(
            resolver.render("Hello {{ user.name }}").unwrap(),
            "Hello Ada"
        );
        assert_eq!(resolver.render("{{ user.tags[1] }}").unwrap(), "b");
        assert_eq!(resolver.render("{{ user['name'] }}").unwrap(), "Ada");
    }

    #[test]
    fn node_outputs_resolve_through_accessor() {
        let ctx = ctx();
        let resolver = TemplateResolver::new(&ctx);
        assert_eq!(
            resolver.render("score: {{ nodes['start'].data.score }}").unwrap(),
            "score: 85"
        );
    }

    #[test]
    fn recursive_rendering_terminates() {
        let ctx = ctx();
        let resolver = TemplateResolver::new(&ctx);
        assert_eq!(
            resolver.render("{{ base }}/u").unwrap(),
            "https://x/v1/u"
        );
    }

    #[test]
    fn two_level_indirection_within_pass_budget() {
        let ctx = WorkflowContext::new();
        ctx.set_global("x", json!("{{ y }}"));
        ctx.set_global("y", json!("z"));
        let resolver = TemplateResolver::new(&ctx);
        assert_eq!(resolver.render("{{ x }}").unwrap(), "z");
    }

    #[test]
    fn unbound_names_render_empty() {
        let ctx = ctx();
        let resolver = TemplateResolver::new(&ctx);
        assert_eq!(resolver.render("[{{ missing }}]").unwrap(), "[]");
        assert_eq!(resolver.render("{{ nodes['nope'].x }}").unwrap(), "");
    }

    #[test]
    fn self_referential_template_stops_at_pass_budget() {
        let ctx = WorkflowContext::new();
        ctx.set_global("loop", json!("again {{ loop }}"));
        let resolver = TemplateResolver::new(&ctx);
        let out = resolver.render("{{ loop }}").unwrap();
        assert!(out.contains("again"));
        assert!(!ctx.events().is_empty());
    }

    #[test]
    fn unclosed_marker_is_an_error() {
        let ctx = ctx();
        let resolver = TemplateResolver::new(&ctx);
        let err = resolver.render("{{ host").unwrap_err();
        assert_eq!(err.code(), "E304");
    }

    #[test]
    fn resolve_walks_and_coerces() {
        let ctx = WorkflowContext::new();
        ctx.set_global("threshold", json!(80));
        ctx.set_global("enabled", json!(true));
        ctx.set_global("name", json!("weft"));
        let resolver = TemplateResolver::new(&ctx);

        let config = json!({
            "score": "{{ threshold }}",
            "flag": "{{ enabled }}",
            "greeting": "hi {{ name }}",
            "items": ["{{ threshold }}", "plain"],
            "untouched": 7
        });
        let resolved = resolver.resolve(&config).unwrap();
        assert_eq!(resolved["score"], json!(80));
        assert_eq!(resolved["flag"], json!(true));
        assert_eq!(resolved["greeting"], json!("hi weft"));
        assert_eq!(resolved["items"][0], json!(80));
        assert_eq!(resolved["items"][1], json!("plain"));
        assert_eq!(resolved["untouched"], json!(7));
    }

    #[test]
    fn coercion_rules() {
        assert_eq!(coerce_rendered("42".into()), json!(42));
        assert_eq!(coerce_rendered("-3".into()), json!(-3));
        assert_eq!(coerce_rendered("3.5".into()), json!(3.5));
        assert_eq!(coerce_rendered("true".into()), json!(true));
        assert_eq!(coerce_rendered("null".into()), Value::Null);
        assert_eq!(coerce_rendered("3.5.1".into()), json!("3.5.1"));
        assert_eq!(coerce_rendered("abc".into()), json!("abc"));
    }

    #[test]
    fn bad_expressions_error() {
        let ctx = ctx();
        let resolver = TemplateResolver::new(&ctx);
        assert!(resolver.render("{{ user..name }}").is_err());
        assert!(resolver.render("{{ user[name }}").is_err());
        assert!(resolver.render("{{ 1 + 2 }}").is_err());
    }
}
