use std::sync::OnceLock;
use chrono::Utc;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;


/// Name used for an upload whose original name has no usable ASCII characters
const FALLBACK_STEM: &'static str = "photo";


/// Return the lowercased extension of the given filename, if any
pub fn extension(filename: &str) -> Option<String> {
    filename.rsplit_once('.').map(|(_, ext)| ext.to_lowercase())
}

/// Check that the extension of the given filename is one of the allowed ones (case-insensitive)
pub fn allowed_file(filename: &str, allowed_extensions: &[String]) -> bool {
    match extension(filename) {
        Some(ext) => allowed_extensions.iter().any(|allowed| allowed.to_lowercase() == ext),
        None => false,
    }
}

/// Turn a client-provided filename into a safe one : ASCII only, no path separators, no spaces,
/// only `[A-Za-z0-9_.-]` characters, and no leading or trailing dots or underscores.
/// If nothing is left of the original extension, the file is renamed `photo.<ext>`.
pub fn secure_filename(filename: &str) -> String {
    static UNSAFE_CHARS: OnceLock<Regex> = OnceLock::new();
    let unsafe_chars = UNSAFE_CHARS.get_or_init(|| Regex::new(r"[^A-Za-z0-9_.-]").unwrap());

    let ascii: String = filename.nfkd().filter(char::is_ascii).collect();
    let ascii = ascii.replace(['/', '\\'], " ");
    let joined = ascii.split_whitespace().collect::<Vec<&str>>().join("_");
    let secured = unsafe_chars.replace_all(&joined, "").trim_matches(|c: char| c == '.' || c == '_').to_string();

    match extension(filename) {
        Some(ext) if extension(&secured).as_deref() != Some(ext.as_str()) => {
            let ext = unsafe_chars.replace_all(&ext, "");
            format!("{}.{}", FALLBACK_STEM, ext)
        }
        _ => secured,
    }
}

/// Prefix the given filename with the current Unix time to avoid collisions between uploads
pub fn unique_filename(filename: &str) -> String {
    format!("{}_{}", Utc::now().timestamp(), filename)
}
