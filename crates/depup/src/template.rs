//! Substitution of `${name}` and `${version}` in command templates.
//!
//! These are the only recognized placeholders; any other `$...` sequence is
//! passed through literally so ecosystem commands may use their own shell
//! or environment syntax.

/// Placeholder for the package name.
pub const NAME: &str = "name";
/// Placeholder for the target version.
pub const VERSION: &str = "version";

/// Replace every `${key}` occurrence with its value from `vars`.
///
/// Unknown `${...}` placeholders and bare `$` text are left untouched.
#[must_use]
pub fn substitute(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let key = &after[..end];
                match vars.iter().find(|(name, _)| *name == key) {
                    Some((_, value)) => out.push_str(value),
                    None => {
                        out.push_str("${");
                        out.push_str(key);
                        out.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                // unterminated placeholder, keep literally
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Substitute only the package name, for outdated-command templates.
#[must_use]
pub fn substitute_name(template: &str, name: &str) -> String {
    substitute(template, &[(NAME, name)])
}

/// Substitute package name and target version, for update and lock commands.
#[must_use]
pub fn substitute_update(template: &str, name: &str, version: &str) -> String {
    substitute(template, &[(NAME, name), (VERSION, version)])
}
