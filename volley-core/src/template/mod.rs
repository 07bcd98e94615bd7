//! Single-pass expansion of `${name}` / `{{ name }}` tokens.
//!
//! A token is either a variable reference (`name`, `user.id`) or a builtin
//! call (`uuid()`, `timestamp()`, `randomInt(1, 10)`, `randomString(8)`).
//! Substituted text is never scanned again, so a value containing `${` is
//! emitted as-is.

mod builtins;
mod scan;

use serde::{Deserialize, Serialize};

use crate::scope::ScopeView;
use scan::Segment;

pub use builtins::{Builtin, CallError};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("unresolved variable `{0}`")]
    Unresolved(String),

    #[error("invalid call `{expr}`: {source}")]
    Call {
        expr: String,
        #[source]
        source: CallError,
    },
}

/// Which delimiter pair a resolver scans for. One call never mixes both.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::EnumString,
    strum::Display,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum TemplateSyntax {
    /// `${name}`
    #[default]
    Dollar,
    /// `{{ name }}`
    Mustache,
}

/// What to do when a referenced variable is in no scope layer.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::EnumString,
    strum::Display,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum MissPolicy {
    /// Substitute an empty string and record the miss.
    #[default]
    Lenient,
    /// Fail the resolution.
    Strict,
}

/// Misses and warnings collected while resolving.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    /// Names that resolved to nothing.
    pub misses: Vec<String>,
    /// Malformed tokens that were passed through literally.
    pub warnings: Vec<String>,
}

impl Diagnostics {
    pub fn is_clean(&self) -> bool {
        self.misses.is_empty() && self.warnings.is_empty()
    }

    pub fn clear(&mut self) {
        self.misses.clear();
        self.warnings.clear();
    }
}

/// Template expander. Holds only configuration, so one instance can be shared
/// by every worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Resolver {
    syntax: TemplateSyntax,
    policy: MissPolicy,
}

impl Resolver {
    #[must_use]
    pub fn new(syntax: TemplateSyntax, policy: MissPolicy) -> Self {
        Self { syntax, policy }
    }

    pub fn syntax(&self) -> TemplateSyntax {
        self.syntax
    }

    pub fn policy(&self) -> MissPolicy {
        self.policy
    }

    pub fn resolve(&self, template: &str, scope: &ScopeView<'_>) -> Result<String> {
        self.resolve_with(template, scope, &mut Diagnostics::default())
    }

    pub fn resolve_with(
        &self,
        template: &str,
        scope: &ScopeView<'_>,
        diag: &mut Diagnostics,
    ) -> Result<String> {
        let (open, _) = self.syntax.delimiters();
        if !template.contains(open) {
            return Ok(template.to_string());
        }

        let mut out = String::with_capacity(template.len());
        for segment in scan::scan(template, self.syntax) {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Unbalanced(text) => {
                    diag.warnings
                        .push(format!("unbalanced delimiter near `{text}`"));
                    out.push_str(text);
                }
                Segment::Token { raw, inner } => self.expand(raw, inner, scope, diag, &mut out)?,
            }
        }
        Ok(out)
    }

    fn expand(
        &self,
        raw: &str,
        inner: &str,
        scope: &ScopeView<'_>,
        diag: &mut Diagnostics,
        out: &mut String,
    ) -> Result<()> {
        match Expr::parse(inner) {
            Some(Expr::Call { name, args }) => match builtins::call(name, &args, scope) {
                Ok(value) => out.push_str(&value),
                Err(source) => {
                    if self.policy == MissPolicy::Strict {
                        return Err(Error::Call {
                            expr: inner.to_string(),
                            source,
                        });
                    }
                    diag.warnings.push(format!("`{inner}`: {source}"));
                }
            },
            Some(Expr::Path(path)) => match lookup(path, scope) {
                Some(value) => out.push_str(value),
                None => {
                    if self.policy == MissPolicy::Strict {
                        return Err(Error::Unresolved(path.to_string()));
                    }
                    diag.misses.push(path.to_string());
                }
            },
            None => {
                diag.warnings.push(format!("invalid expression `{raw}`"));
                out.push_str(raw);
            }
        }
        Ok(())
    }
}

/// Expand with the default `${}` syntax, substituting misses with "".
pub fn resolve(template: &str, scope: &ScopeView<'_>) -> String {
    let mut diag = Diagnostics::default();
    Resolver::default()
        .resolve_with(template, scope, &mut diag)
        .unwrap_or_default()
}

/// True if `s` still contains a token of the given syntax.
pub fn has_tokens(s: &str, syntax: TemplateSyntax) -> bool {
    scan::scan(s, syntax)
        .iter()
        .any(|seg| matches!(seg, Segment::Token { .. }))
}

#[derive(Debug, PartialEq, Eq)]
enum Expr<'a> {
    Path(&'a str),
    Call { name: &'a str, args: Vec<&'a str> },
}

impl<'a> Expr<'a> {
    fn parse(inner: &'a str) -> Option<Self> {
        if let Some(open) = inner.find('(') {
            let body = inner.strip_suffix(')')?;
            let name = inner[..open].trim();
            if !is_ident(name) {
                return None;
            }
            let args_src = body[open + 1..].trim();
            let args = if args_src.is_empty() {
                Vec::new()
            } else {
                args_src.split(',').map(str::trim).collect()
            };
            return Some(Self::Call { name, args });
        }

        let valid = !inner.is_empty()
            && !inner.starts_with('.')
            && !inner.ends_with('.')
            && !inner.contains("..")
            && inner
                .chars()
                .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'));
        valid.then_some(Self::Path(inner))
    }
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// Flat name first (data-file columns may contain dots), then one mapping
/// level per dotted segment. Only text values substitute.
fn lookup<'a>(path: &str, scope: &ScopeView<'a>) -> Option<&'a str> {
    if let Some(v) = scope.get(path) {
        return v.as_text();
    }

    let mut segments = path.split('.');
    let root = scope.get(segments.next()?)?;
    root.navigate(segments)?.as_text()
}
