//! Server-rendered HTML fragments.

use axum::response::Html;
use uitid_connect_identity::{ExternalUser, PageMembership};

/// Escapes text for HTML element content and attribute values.
pub fn escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

fn layout(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{}</title></head>\n<body>\n{}\n</body>\n</html>\n",
        escape(title),
        body
    ))
}

/// Home page. Shows the flash message and the linked user, or a login link.
pub fn home(user_name: Option<&str>, flash: Option<&str>) -> Html<String> {
    let mut body = String::new();
    if let Some(message) = flash {
        body.push_str(&format!(
            "<p class=\"messages error\">{}</p>\n",
            escape(message)
        ));
    }
    match user_name {
        Some(name) => body.push_str(&format!(
            "<p>Logged in as {}.</p>\n<ul>\n<li><a href=\"/uitid/profile\">Profile</a></li>\n<li><a href=\"/uitid/pages\">Pages</a></li>\n</ul>",
            escape(name)
        )),
        None => body.push_str("<p><a href=\"/uitid/connect\">Log in with UiTID</a></p>"),
    }
    layout("Home", &body)
}

/// Landing page for visitors who still have to log in.
pub fn landing() -> Html<String> {
    layout(
        "Log in",
        "<h1>Log in</h1>\n<p>This page requires a UiTID account.</p>\n<p><a href=\"/uitid/connect\">Log in with UiTID</a></p>",
    )
}

/// Rendered for every 403 produced by the link-status gate.
pub fn access_denied() -> Html<String> {
    layout(
        "Access denied",
        "<h1>Access denied</h1>\n<p>You are not authorized to access this page.</p>",
    )
}

pub fn profile(user: &ExternalUser) -> Html<String> {
    let body = format!(
        "<h1>{}</h1>\n<dl>\n<dt>UiTID</dt><dd>{}</dd>\n<dt>Nickname</dt><dd>{}</dd>\n</dl>",
        escape(&user.display_name()),
        escape(&user.id),
        escape(&user.nick)
    );
    layout("Profile", &body)
}

/// Lists administered pages under the view's summary title.
pub fn admin_pages(
    summary: &str,
    category: Option<&str>,
    memberships: &[PageMembership],
) -> Html<String> {
    let mut body = format!("<h1>Pages</h1>\n<p class=\"access\">{}</p>\n", escape(summary));
    if let Some(category) = category {
        body.push_str(&format!(
            "<p class=\"category\">Category: {}</p>\n",
            escape(category)
        ));
    }
    if memberships.is_empty() {
        body.push_str("<p>No pages.</p>");
    } else {
        body.push_str("<ul>\n");
        for membership in memberships {
            body.push_str(&format!(
                "<li data-page=\"{}\">{}</li>\n",
                escape(&membership.page.id),
                escape(&membership.page.name)
            ));
        }
        body.push_str("</ul>");
    }
    layout("Pages", &body)
}
