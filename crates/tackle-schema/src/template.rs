//! Asset, URL and file-path templates.
//!
//! Registries describe download locations with placeholders such as
//! `gh_{{trimV .Version}}_{{.OS}}_{{.Arch}}.tar.gz`. Only field references
//! and the `trimV` function are understood; anything else is rejected.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*(.*?)\s*\}\}").expect("placeholder pattern is valid")
});

/// Errors produced while rendering a template.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// The template refers to a field that is not defined.
    #[error("unknown template field '{field}' in '{template}'")]
    UnknownField {
        /// The offending field name.
        field: String,
        /// The full template text.
        template: String,
    },

    /// The template expression is not a field or supported function call.
    #[error("unsupported template expression '{expr}' in '{template}'")]
    Unsupported {
        /// The offending expression.
        expr: String,
        /// The full template text.
        template: String,
    },

    /// A `{{` was never closed.
    #[error("unterminated template action in '{0}'")]
    Unterminated(String),
}

/// Values available to a template.
#[derive(Debug, Clone, Default)]
pub struct TemplateVars {
    /// Package version as pinned in the configuration.
    pub version: String,
    /// Operating system after replacements.
    pub os: String,
    /// Architecture after replacements.
    pub arch: String,
    /// Archive format name (e.g. `tar.gz`).
    pub format: String,
    /// Rendered asset name, when already known.
    pub asset: String,
}

impl TemplateVars {
    fn lookup(&self, field: &str) -> Option<String> {
        let value = match field {
            "Version" => self.version.clone(),
            "SemVer" => trim_v(&self.version).to_string(),
            "OS" => self.os.clone(),
            "Arch" => self.arch.clone(),
            "Format" => self.format.clone(),
            "Asset" => self.asset.clone(),
            _ => return None,
        };
        Some(value)
    }

    /// Render `template`, substituting every `{{ ... }}` action.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError`] for unknown fields, unsupported expressions
    /// or an unterminated action.
    ///
    /// # Example
    ///
    /// ```
    /// use tackle_schema::TemplateVars;
    ///
    /// let vars = TemplateVars {
    ///     version: "v2.1.0".into(),
    ///     os: "linux".into(),
    ///     arch: "amd64".into(),
    ///     ..Default::default()
    /// };
    /// let asset = vars.render("gh_{{trimV .Version}}_{{.OS}}_{{.Arch}}.tar.gz").unwrap();
    /// assert_eq!(asset, "gh_2.1.0_linux_amd64.tar.gz");
    /// ```
    pub fn render(&self, template: &str) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(template.len());
        let mut last = 0;
        for caps in PLACEHOLDER.captures_iter(template) {
            let (Some(whole), Some(expr)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            out.push_str(&template[last..whole.start()]);
            out.push_str(&self.eval(expr.as_str(), template)?);
            last = whole.end();
        }
        let rest = &template[last..];
        if rest.contains("{{") {
            return Err(TemplateError::Unterminated(template.to_string()));
        }
        out.push_str(rest);
        Ok(out)
    }

    fn eval(&self, expr: &str, template: &str) -> Result<String, TemplateError> {
        let unsupported = || TemplateError::Unsupported {
            expr: expr.to_string(),
            template: template.to_string(),
        };
        let mut words = expr.split_whitespace();
        let (func, arg) = match (words.next(), words.next(), words.next()) {
            (Some(field), None, None) => (None, field),
            (Some(func), Some(field), None) => (Some(func), field),
            _ => return Err(unsupported()),
        };
        let field = arg.strip_prefix('.').ok_or_else(unsupported)?;
        let value = self
            .lookup(field)
            .ok_or_else(|| TemplateError::UnknownField {
                field: field.to_string(),
                template: template.to_string(),
            })?;
        match func {
            None => Ok(value),
            Some("trimV") => Ok(trim_v(&value).to_string()),
            Some(_) => Err(unsupported()),
        }
    }
}

fn trim_v(s: &str) -> &str {
    s.strip_prefix('v').unwrap_or(s)
}
