//! SQL identifier quoting, parameter naming and default names.
//!
//! Every identifier that reaches generated command text goes through
//! [`quote_ident`]; every parameter name is built from a sanitized column
//! name, so a hostile column name can never appear unquoted.

/// Quote a SQL identifier using ANSI double-quoting.
///
/// Embedded double-quotes are escaped by doubling them (`"` → `""`).
/// This function is safe against SQL injection for any input string.
///
/// # Examples
///
/// ```
/// use sqlbulk_core::quote_ident;
///
/// assert_eq!(quote_ident("users"), "\"users\"");
/// assert_eq!(quote_ident("user\"name"), "\"user\"\"name\"");
/// assert_eq!(quote_ident("select"), "\"select\""); // SQL keyword
/// ```
#[inline]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a table name, qualified by its schema when one is set.
///
/// ```
/// use sqlbulk_core::quote_qualified;
///
/// assert_eq!(quote_qualified(Some("sales"), "orders"), "\"sales\".\"orders\"");
/// assert_eq!(quote_qualified(None, "orders"), "\"orders\"");
/// ```
pub fn quote_qualified(schema: Option<&str>, name: &str) -> String {
    match schema {
        Some(schema) => format!("{}.{}", quote_ident(schema), quote_ident(name)),
        None => quote_ident(name),
    }
}

/// Sanitize a SQL identifier by removing non-alphanumeric/underscore characters.
///
/// Used where quoting is not possible, i.e. inside bound parameter names.
///
/// **Note:** This function strips characters rather than erroring. If the input
/// contains only invalid characters, the result will be an empty string.
///
/// # Examples
///
/// ```
/// use sqlbulk_core::sanitize_identifier;
///
/// assert_eq!(sanitize_identifier("users"), "users");
/// assert_eq!(sanitize_identifier("user\"name"), "username");
/// assert_eq!(sanitize_identifier("user;DROP TABLE--"), "userDROPTABLE");
/// ```
#[inline]
pub fn sanitize_identifier(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}

/// Name of the bound parameter carrying `column` for the element at
/// `index` within one command unit.
///
/// ```
/// use sqlbulk_core::parameter_name;
///
/// assert_eq!(parameter_name("email", 3), "@param_email_3");
/// assert_eq!(parameter_name("e-mail", 0), "@param_email_0");
/// ```
pub fn parameter_name(column: &str, index: usize) -> String {
    format!("@param_{}_{}", sanitize_identifier(column), index)
}

/// One distinct, non-empty parameter stem per column, in column order.
///
/// A column keeps its sanitized name when no other column sanitizes to the
/// same text. Otherwise (and for names with no ASCII left at all) the
/// column's ordinal is appended until the stem is unique, so two columns
/// never share a parameter name within one element.
///
/// ```
/// use sqlbulk_core::parameter_stems;
///
/// assert_eq!(parameter_stems(&["id", "email"]), ["id", "email"]);
/// assert_eq!(parameter_stems(&["email", "e-mail"]), ["email_0", "email_1"]);
/// assert_eq!(parameter_stems(&["id", "用户"]), ["id", "_1"]);
/// ```
pub fn parameter_stems(columns: &[&str]) -> Vec<String> {
    let sanitized: Vec<String> = columns.iter().map(|c| sanitize_identifier(c)).collect();
    let mut stems: Vec<String> = Vec::with_capacity(sanitized.len());
    for (i, base) in sanitized.iter().enumerate() {
        let shared = sanitized.iter().filter(|s| *s == base).count() > 1;
        let mut stem = if base.is_empty() || shared {
            format!("{base}_{i}")
        } else {
            base.clone()
        };
        // A generated stem must not take a later column's natural name.
        while stems.contains(&stem) || (stem != *base && sanitized.contains(&stem)) {
            stem = format!("{stem}_{i}");
        }
        stems.push(stem);
    }
    stems
}

/// Convert a Rust identifier to snake_case.
///
/// "FooBar" → "foo_bar", "HTTPStatus" → "http_status", "userId" → "user_id".
pub fn to_snake_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 4);
    let chars: Vec<char> = s.chars().collect();
    for (i, &ch) in chars.iter().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                let prev_lower = chars[i - 1].is_lowercase() || chars[i - 1].is_ascii_digit();
                let next_lower = chars.get(i + 1).is_some_and(|c| c.is_lowercase());
                if prev_lower || (next_lower && chars[i - 1].is_uppercase()) {
                    result.push('_');
                }
            }
            result.extend(ch.to_lowercase());
        } else {
            result.push(ch);
        }
    }
    result
}

/// Default table name for an entity type: the snake-cased type name,
/// without its module path or generic arguments.
///
/// ```
/// use sqlbulk_core::default_table_name;
///
/// struct CustomerOrder;
/// assert_eq!(default_table_name::<CustomerOrder>(), "customer_order");
/// ```
pub fn default_table_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    let last = base.rsplit("::").next().unwrap_or(base);
    to_snake_case(last)
}
