//! Placeholder resolution over a fully merged config tree
//!
//! Resolution runs once per composed run, strictly after every merge, so
//! an overlay can change a value that other keys interpolate. Each pass
//! captures a single timestamp: every `${now:...}` in the tree formats the
//! same instant, so a run's timestamped directories and names agree.

mod functions;
mod template;

use chrono::{DateTime, Local};
use std::collections::HashMap;

use crate::path::KeyPath;
use crate::value::{CallableRef, ConfigNode, Value};
use crate::{Error, Result};

pub use template::{Placeholder, Reference, Segment, Template, contains_placeholder};

/// Replaces placeholder expressions in a config tree with their values.
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    now: Option<DateTime<Local>>,
    env: HashMap<String, String>,
}

impl Resolver {
    /// Resolver using the wall clock and the process environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver whose `${now:...}` placeholders format `now`.
    pub fn at(now: DateTime<Local>) -> Self {
        Self {
            now: Some(now),
            env: HashMap::new(),
        }
    }

    /// Provide a value for `${oc.env:NAME}` that takes precedence over the
    /// process environment.
    pub fn with_env_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }

    /// Resolve every placeholder in `tree`, returning a new tree.
    ///
    /// The input is left untouched. Escaped `\${` sequences come out as a
    /// bare `${`, which a later pass over the output would interpolate.
    pub fn resolve(&self, tree: &ConfigNode) -> Result<ConfigNode> {
        let source = Value::Node(tree.clone());
        let mut pass = ResolutionPass {
            source: &source,
            now: self.now.unwrap_or_else(Local::now),
            env: &self.env,
            cache: HashMap::new(),
            stack: Vec::new(),
        };

        match pass.resolve_path(&KeyPath::root())? {
            Some(Value::Node(resolved)) => {
                tracing::debug!(
                    resolved_paths = pass.cache.len(),
                    "Resolved placeholder expressions"
                );
                Ok(resolved)
            }
            _ => Ok(ConfigNode::new()),
        }
    }
}

enum Lookup<'a> {
    /// Raw, unresolved value straight from the merged tree
    Raw(&'a Value),
    /// Value reached through an interpolated prefix; already resolved
    Resolved(Value),
}

struct ResolutionPass<'a> {
    source: &'a Value,
    now: DateTime<Local>,
    env: &'a HashMap<String, String>,
    cache: HashMap<KeyPath, Value>,
    stack: Vec<KeyPath>,
}

impl<'a> ResolutionPass<'a> {
    /// Resolved value at `path`, or `None` if nothing lives there.
    fn resolve_path(&mut self, path: &KeyPath) -> Result<Option<Value>> {
        if let Some(value) = self.cache.get(path) {
            return Ok(Some(value.clone()));
        }
        if let Some(start) = self.stack.iter().position(|p| p == path) {
            let mut chain: Vec<String> = self.stack[start..].iter().map(|p| p.to_string()).collect();
            chain.push(path.to_string());
            return Err(Error::CircularReference { chain });
        }

        self.stack.push(path.clone());
        let result = self.lookup(path).and_then(|found| match found {
            Some(Lookup::Raw(raw)) => self.resolve_raw(raw, path).map(Some),
            Some(Lookup::Resolved(value)) => Ok(Some(value)),
            None => Ok(None),
        });
        self.stack.pop();

        let Some(resolved) = result? else {
            return Ok(None);
        };
        self.cache.insert(path.clone(), resolved.clone());
        Ok(Some(resolved))
    }

    /// Walk the raw tree towards `path`. When the walk crosses a string
    /// placeholder, the rest of the walk continues through it:
    ///
    /// - a plain reference (`opt: ${base}`) is followed, so `opt.lr` resolves
    ///   as `base.lr` and siblings under `base` stay untouched
    /// - anything else is resolved as a whole and the walk continues in
    ///   its resolved value
    fn lookup(&mut self, path: &KeyPath) -> Result<Option<Lookup<'a>>> {
        let segments = path.segments();
        let mut current: &'a Value = self.source;

        for (depth, segment) in segments.iter().enumerate() {
            if let Value::String(s) = current {
                if contains_placeholder(s) {
                    let prefix = KeyPath::from_segments(segments[..depth].to_vec());
                    if let Some(target) = alias_target(s, &prefix) {
                        let mut redirected = target.segments().to_vec();
                        redirected.extend_from_slice(&segments[depth..]);
                        let redirected = KeyPath::from_segments(redirected);
                        return Ok(self.resolve_path(&redirected)?.map(Lookup::Resolved));
                    }
                    let Some(resolved) = self.resolve_path(&prefix)? else {
                        return Ok(None);
                    };
                    return Ok(resolved
                        .descend(&segments[depth..])
                        .cloned()
                        .map(Lookup::Resolved));
                }
            }
            match current.get_segment(segment) {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }

        Ok(Some(Lookup::Raw(current)))
    }

    fn resolve_raw(&mut self, raw: &'a Value, path: &KeyPath) -> Result<Value> {
        match raw {
            Value::Node(node) => {
                let mut out = ConfigNode::new();
                for key in node.keys() {
                    let child = path.child(key);
                    let value = self.resolve_path(&child)?.unwrap_or(Value::Null);
                    out.insert(key, value);
                }
                Ok(Value::Node(out))
            }
            Value::Sequence(items) => {
                let mut out = Vec::with_capacity(items.len());
                for index in 0..items.len() {
                    let value = self.resolve_path(&path.index(index))?.unwrap_or(Value::Null);
                    out.push(value);
                }
                Ok(Value::Sequence(out))
            }
            Value::String(s) => {
                let template = Template::parse(s).map_err(|message| Error::InvalidPlaceholder {
                    at: path.clone(),
                    expression: s.clone(),
                    message,
                })?;
                self.evaluate_template(&template, path, s)
            }
            other => Ok(other.clone()),
        }
    }

    fn evaluate_template(
        &mut self,
        template: &Template,
        path: &KeyPath,
        expression: &str,
    ) -> Result<Value> {
        if let Some(literal) = template.as_literal() {
            return Ok(Value::String(literal));
        }
        if let Some(placeholder) = template.as_single_placeholder() {
            return self.evaluate(placeholder, path, expression);
        }

        let mut out = String::new();
        for segment in template.segments() {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Placeholder(placeholder) => {
                    let value = self.evaluate(placeholder, path, expression)?;
                    let Some(rendered) = value.render_scalar() else {
                        return Err(Error::InvalidPlaceholder {
                            at: path.clone(),
                            expression: expression.to_string(),
                            message: format!("cannot embed a {} in a string", value.kind()),
                        });
                    };
                    out.push_str(&rendered);
                }
            }
        }
        Ok(Value::String(out))
    }

    fn evaluate(
        &mut self,
        placeholder: &Placeholder,
        path: &KeyPath,
        expression: &str,
    ) -> Result<Value> {
        match placeholder {
            Placeholder::Interpolation(reference) => {
                let Some(target) = reference.absolute(path) else {
                    return Err(Error::InvalidPlaceholder {
                        at: path.clone(),
                        expression: expression.to_string(),
                        message: format!("relative reference `{reference}` climbs above the root"),
                    });
                };
                self.resolve_path(&target)?
                    .ok_or_else(|| Error::UnresolvedReference {
                        reference: reference.to_string(),
                        at: path.clone(),
                    })
            }
            Placeholder::FunctionRef { path: callable } => {
                Ok(Value::Callable(CallableRef::new(callable.clone())))
            }
            Placeholder::TimeFormat { pattern } => functions::format_time(&self.now, pattern)
                .map(Value::String)
                .map_err(|message| Error::InvalidPlaceholder {
                    at: path.clone(),
                    expression: expression.to_string(),
                    message,
                }),
            Placeholder::Env { name, default } => {
                let name = self.evaluate_template(name, path, expression)?;
                let name = name.render_scalar().unwrap_or_default();
                let found = self
                    .env
                    .get(&name)
                    .cloned()
                    .or_else(|| std::env::var(&name).ok());
                match (found, default) {
                    (Some(value), _) => Ok(Value::String(value)),
                    (None, Some(default)) => self.evaluate_template(default, path, expression),
                    (None, None) => Err(Error::ResolverFailed {
                        at: path.clone(),
                        name: "oc.env".to_string(),
                        message: format!("environment variable `{name}` is not set"),
                    }),
                }
            }
            Placeholder::Call { name, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.evaluate_template(arg, path, expression)?);
                }
                match functions::call(name, &values) {
                    Some(result) => result.map_err(|message| Error::ResolverFailed {
                        at: path.clone(),
                        name: name.clone(),
                        message,
                    }),
                    None => Err(Error::UnknownResolver {
                        at: path.clone(),
                        name: name.clone(),
                    }),
                }
            }
        }
    }
}

/// Absolute target of `raw` when it is exactly one interpolation, read as
/// the value at `at`.
fn alias_target(raw: &str, at: &KeyPath) -> Option<KeyPath> {
    let template = Template::parse(raw).ok()?;
    match template.as_single_placeholder()? {
        Placeholder::Interpolation(reference) => reference.absolute(at),
        _ => None,
    }
}
