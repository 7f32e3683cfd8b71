use concierge_core::sanitize_markup;
use pulldown_cmark::{Options, Parser, html};

/// Markdown to HTML, passed through the markup sanitizer before it is kept.
pub fn markdown_to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let mut rendered = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut rendered, Parser::new_ext(markdown, options));
    sanitize_markup(&rendered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_common_markdown() {
        let html = markdown_to_html("**Discord** の[サーバー](https://example.com)です\n\n- one\n- two");

        assert!(html.contains("<strong>Discord</strong>"));
        assert!(html.contains("<li>one</li>"));
        assert!(html.contains("href=\"https://example.com\""));
    }

    #[test]
    fn raw_script_in_reply_does_not_survive() {
        let html = markdown_to_html("hello <script>alert(1)</script>");

        assert!(html.contains("hello"));
        assert!(!html.contains("<script"));
        assert!(!html.contains("alert(1)"));
    }
}
