/// Placeholder written wherever the service token would otherwise appear.
pub const REDACTED: &str = "pscale_tkn_***";

/// Replace every occurrence of `secret` in `text` with [`REDACTED`].
///
/// An empty secret leaves the text untouched; `str::replace` with an empty
/// pattern would otherwise interleave the placeholder between every char.
///
/// The output never contains `secret`. When the placeholder itself would
/// reintroduce it (a secret such as `tkn`), occurrences are removed instead.
pub fn redact(text: &str, secret: &str) -> String {
    if secret.is_empty() {
        return text.to_string();
    }
    let replaced = text.replace(secret, REDACTED);
    if !replaced.contains(secret) {
        return replaced;
    }
    let mut stripped = text.to_string();
    while stripped.contains(secret) {
        stripped = stripped.replace(secret, "");
    }
    stripped
}
