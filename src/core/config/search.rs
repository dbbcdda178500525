#![allow(clippy::result_large_err)]

use super::formatter::{self, Segment, TemplateError};
use super::ConfigStore;
use crate::core::error::{codes, AppError};
use indexmap::IndexMap;
use serde_json::Value;

/// Nested `{var}` resolution stops at this depth and reports a malformed template.
const MAX_TEMPLATE_DEPTH: usize = 32;

/// Options for a single [`ConfigStore::search`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    /// Mapping probed before anything in the store.
    pub search_obj: Option<Value>,
    /// Dynamic context: `curr_<section>` entries select subsections, and a
    /// current value named like the key overrides configuration.
    pub curvals: IndexMap<String, Value>,
    pub expand_env_vars: bool,
    pub replace_env_vars: bool,
    pub replace_vars: bool,
    pub default: Option<Value>,
    pub required: bool,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            search_obj: None,
            curvals: IndexMap::new(),
            expand_env_vars: true,
            replace_env_vars: false,
            replace_vars: true,
            default: None,
            required: false,
        }
    }
}

impl SearchRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search_obj(mut self, obj: Option<Value>) -> Self {
        self.search_obj = obj;
        self
    }

    pub fn with_curval(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.curvals.insert(key.to_string(), value.into());
        self
    }

    pub fn expand_env_vars(mut self, on: bool) -> Self {
        self.expand_env_vars = on;
        self
    }

    pub fn replace_env_vars(mut self, on: bool) -> Self {
        self.replace_env_vars = on;
        self
    }

    pub fn replace_vars(mut self, on: bool) -> Self {
        self.replace_vars = on;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn required(mut self, on: bool) -> Self {
        self.required = on;
        self
    }
}

impl ConfigStore {
    /// Resolve `key` and run string values through the template pipeline.
    ///
    /// Returns `(found, value)`. A supplied default counts as found. A missing
    /// required key is a configuration error naming the key.
    pub fn search(&self, key: &str, request: &SearchRequest) -> Result<(bool, Value), AppError> {
        self.search_at_depth(key, request, 0)
    }

    /// Shorthand for a search whose string result is wanted.
    pub fn search_str(&self, key: &str, request: &SearchRequest) -> Result<Option<String>, AppError> {
        let (found, value) = self.search(key, request)?;
        Ok(match value {
            Value::Null => None,
            _ if !found => None,
            other => Some(formatter::value_to_string(&other)),
        })
    }

    /// Run `text` through the template pipeline as if it were the value of `key`.
    pub fn format(&self, key: &str, text: &str, request: &SearchRequest) -> Result<String, AppError> {
        self.render(key, text, request, 0)
    }

    fn search_at_depth(
        &self,
        key: &str,
        request: &SearchRequest,
        depth: usize,
    ) -> Result<(bool, Value), AppError> {
        let value = match self.lookup(key, request) {
            Some(value) => value.clone(),
            None => {
                if let Some(default) = &request.default {
                    return Ok((true, default.clone()));
                }
                if request.required {
                    return Err(AppError::configuration(
                        codes::MISSING_REQUIRED,
                        format!("required configuration key '{}' not found", key),
                    )
                    .with_detail("key", key));
                }
                return Ok((false, Value::Null));
            }
        };
        match value {
            Value::String(text) => {
                let rendered = self.render(key, &text, request, depth)?;
                Ok((true, Value::String(rendered)))
            }
            other => Ok((true, other)),
        }
    }

    fn lookup<'a>(&'a self, key: &str, request: &'a SearchRequest) -> Option<&'a Value> {
        if key.starts_with('.') {
            return self.get(key);
        }
        if let Some(found) = request
            .search_obj
            .as_ref()
            .and_then(Value::as_object)
            .and_then(|obj| obj.get(key))
        {
            return Some(found);
        }
        if let Some(found) = request.curvals.get(key) {
            return Some(found);
        }
        for name in &self.search_order {
            let Some(section) = self.section(name) else {
                continue;
            };
            let current = request
                .curvals
                .get(&format!("curr_{}", name))
                .map(formatter::value_to_string);
            if let Some(found) = current
                .and_then(|sub| section.get(&sub))
                .and_then(Value::as_object)
                .and_then(|sub| sub.get(key))
            {
                return Some(found);
            }
            if let Some(found) = section.get(key) {
                return Some(found);
            }
        }
        self.root.get(key)
    }

    fn render(
        &self,
        key: &str,
        text: &str,
        request: &SearchRequest,
        depth: usize,
    ) -> Result<String, AppError> {
        let mut out = text.to_string();
        // Deferral runs first so that `${VAR}` stays deferred when both are requested.
        if request.replace_env_vars {
            out = formatter::defer_env(&out);
        }
        if request.expand_env_vars {
            out = formatter::expand_env(&out, &self.env);
        }
        if request.replace_vars {
            out = self.replace_vars(key, &out, request, depth)?;
        }
        Ok(out)
    }

    fn replace_vars(
        &self,
        key: &str,
        text: &str,
        request: &SearchRequest,
        depth: usize,
    ) -> Result<String, AppError> {
        if !text.contains('{') && !text.contains('}') {
            return Ok(text.to_string());
        }
        if depth >= MAX_TEMPLATE_DEPTH {
            return Err(malformed(
                key,
                text,
                format!("variable nesting deeper than {}", MAX_TEMPLATE_DEPTH),
            ));
        }
        let segments =
            formatter::parse_template(text).map_err(|e| template_error(key, text, e))?;
        let nested = SearchRequest {
            default: None,
            required: false,
            ..request.clone()
        };

        let mut out = String::with_capacity(text.len());
        for segment in segments {
            match segment {
                Segment::Literal(literal) => out.push_str(&literal),
                Segment::Field { name, spec, raw } => {
                    let (found, value) = self.search_at_depth(name, &nested, depth + 1)?;
                    if !found || value.is_null() {
                        out.push_str(raw);
                        continue;
                    }
                    let rendered = formatter::format_value(&value, spec)
                        .map_err(|e| template_error(key, text, e))?;
                    out.push_str(&rendered);
                }
            }
        }
        Ok(out)
    }
}

fn malformed(key: &str, text: &str, reason: String) -> AppError {
    AppError::configuration(
        codes::MALFORMED_TEMPLATE,
        format!("malformed template for key '{}': {}", key, reason),
    )
    .with_detail("key", key)
    .with_detail("template", text)
}

fn template_error(key: &str, text: &str, error: TemplateError) -> AppError {
    malformed(key, text, error.to_string())
}
