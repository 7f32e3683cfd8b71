use std::collections::HashSet;

/// Strips every tag from untrusted text before it enters a history.
///
/// `script` and `style` bodies are dropped entirely. The result is plain text:
/// entities produced by the cleaner are decoded again, so `&` and `<` typed by
/// the user survive unchanged. Escaping happens only when markup is rendered.
pub fn sanitize_text(raw: &str) -> String {
    let mut builder = ammonia::Builder::empty();
    builder.clean_content_tags(HashSet::from(["script", "style"]));
    let cleaned = builder.clean(raw).to_string();
    html_escape::decode_html_entities(&cleaned).into_owned()
}

/// Cleans rendered markup, keeping only ammonia's default safe tag set.
pub fn sanitize_markup(html: &str) -> String {
    ammonia::clean(html)
}
