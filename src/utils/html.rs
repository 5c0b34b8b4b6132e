use ammonia;

/// Clean HTML content using the ammonia library.
///
/// Whitelist-based sanitization: safe tags (like <b>, <p>) survive,
/// dangerous tags (<script>, <iframe>) and attributes (onclick) are
/// stripped. Applied to user-authored rich text: course descriptions,
/// lesson content, comments.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}
