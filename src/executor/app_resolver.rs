// App name -> package resolution for `open`.
use std::collections::HashMap;

/// How a package name was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Mapping,
    Pattern,
    Search,
    /// Nothing matched; the launch is attempted anyway and may fail.
    Fallback,
}

/// Resolves `name` to a package.
///
/// Order: explicit `mapping` (case-insensitive key), a `com.android.*` or
/// `com.google.android.*` guess that is installed, the shortest installed
/// package containing the name (lexical tie-break), then the first guess.
/// A name that already looks like a package is used as is.
pub fn resolve(
    name: &str,
    mapping: &HashMap<String, String>,
    installed: &[String],
) -> (String, Resolution) {
    let trimmed = name.trim();
    let lowered = trimmed.to_lowercase();

    if let Some(pkg) = mapping
        .iter()
        .find(|(k, _)| k.trim().to_lowercase() == lowered)
        .map(|(_, v)| v.clone())
    {
        return (pkg, Resolution::Mapping);
    }

    if trimmed.contains('.') && !trimmed.contains(' ') {
        return (trimmed.to_string(), Resolution::Pattern);
    }

    let compact: String = lowered.chars().filter(|c| !c.is_whitespace()).collect();
    let guesses = [
        format!("com.android.{compact}"),
        format!("com.google.android.{compact}"),
    ];
    if let Some(hit) = guesses.iter().find(|g| installed.contains(g)) {
        return (hit.clone(), Resolution::Pattern);
    }

    if !compact.is_empty() {
        let best = installed
            .iter()
            .filter(|p| p.to_lowercase().contains(&compact))
            .min_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
        if let Some(pkg) = best {
            return (pkg.clone(), Resolution::Search);
        }
    }

    let [first, _] = guesses;
    (first, Resolution::Fallback)
}
