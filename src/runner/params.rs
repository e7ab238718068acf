use std::collections::HashMap;

use regex::Regex;

use crate::parser::types::DatasetRow;

/// Prefix selecting the static parameter table.
const STATIC_PREFIX: &str = "param.";

/// Prefix selecting the current dataset row.
const ROW_PREFIX: &str = "data.";

/// Substitutes `${...}` placeholders in templated string fields.
///
/// Two namespaces: `${param.name}` reads the suite's static parameter
/// table; `${data.column}` reads the current dataset row. Unresolved
/// placeholders are left literally in place rather than dropped or
/// rejected; authored templates may carry markers for namespaces the
/// current replay does not supply.
pub struct ParamResolver {
    statics: HashMap<String, String>,
    pattern: Regex,
}

impl ParamResolver {
    pub fn new(statics: HashMap<String, String>) -> Self {
        ParamResolver {
            statics,
            pattern: Regex::new(r"\$\{([^}]+)\}").unwrap(),
        }
    }

    /// Resolve an optional template; `None` passes through.
    pub fn resolve_opt(&self, template: Option<&str>, row: Option<&DatasetRow>) -> Option<String> {
        template.map(|t| self.resolve(t, row))
    }

    pub fn resolve(&self, template: &str, row: Option<&DatasetRow>) -> String {
        // Fast path: nothing to substitute.
        if !template.contains("${") {
            return template.to_string();
        }
        self.pattern
            .replace_all(template, |caps: &regex::Captures| {
                let name = &caps[1];
                if let Some(rest) = name.strip_prefix(STATIC_PREFIX) {
                    if let Some(value) = self.statics.get(rest) {
                        return value.clone();
                    }
                } else if let Some(rest) = name.strip_prefix(ROW_PREFIX) {
                    if let Some(value) = row.and_then(|r| r.get(rest)) {
                        return value.clone();
                    }
                }
                // Unknown name or no row supplied: keep the marker.
                format!("${{{name}}}")
            })
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> ParamResolver {
        let mut statics = HashMap::new();
        statics.insert("adminUser".to_string(), "root".to_string());
        statics.insert("env".to_string(), "staging".to_string());
        ParamResolver::new(statics)
    }

    fn row() -> DatasetRow {
        let mut row = DatasetRow::new();
        row.insert("username".to_string(), "alice".to_string());
        row
    }

    #[test]
    fn test_placeholder_free_template_is_identity() {
        let r = resolver();
        assert_eq!(r.resolve("plain text", None), "plain text");
        assert_eq!(r.resolve("", None), "");
    }

    #[test]
    fn test_static_and_row_namespaces() {
        let r = resolver();
        let row = row();
        assert_eq!(
            r.resolve("login ${param.adminUser} as ${data.username}", Some(&row)),
            "login root as alice"
        );
    }

    #[test]
    fn test_unresolved_placeholders_stay_verbatim() {
        let r = resolver();
        // Unknown static name.
        assert_eq!(r.resolve("${param.missing}", None), "${param.missing}");
        // Row-prefixed lookup with no row supplied.
        assert_eq!(r.resolve("${data.username}", None), "${data.username}");
        // Name outside both namespaces.
        assert_eq!(r.resolve("${other.thing}", None), "${other.thing}");
    }

    #[test]
    fn test_resolution_is_idempotent_once_substituted() {
        let r = resolver();
        let row = row();
        let once = r.resolve("${data.username}-${param.env}", Some(&row));
        assert_eq!(once, "alice-staging");
        assert_eq!(r.resolve(&once, Some(&row)), once);
    }

    #[test]
    fn test_repeated_placeholders_in_one_string() {
        let r = resolver();
        assert_eq!(
            r.resolve("${param.env}/${param.env}/${param.env}", None),
            "staging/staging/staging"
        );
    }

    #[test]
    fn test_resolve_opt_passes_none_through() {
        let r = resolver();
        assert_eq!(r.resolve_opt(None, None), None);
        assert_eq!(
            r.resolve_opt(Some("${param.env}"), None),
            Some("staging".to_string())
        );
    }
}
