//! Server-rendered pages.
//!
//! Pages are small enough to render with `format!`. Every value that comes
//! from the identity provider goes through [`escape_html`].

use axum::{
    Extension,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use axum_extra::extract::cookie::SignedCookieJar;
use rolegate_access::UserInfo;

use crate::auth::{AppState, AuthenticatedSession, found, session::load_session};

/// Landing page, or a redirect to the dashboard for signed-in users.
pub async fn home(State(state): State<AppState>, jar: SignedCookieJar) -> Response {
    match load_session(&state, &jar).await {
        Ok(Some(ctx)) if ctx.is_authenticated() => return found("/dashboard"),
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "Failed to load session for landing page"),
    }

    let body = r#"<p>You are not signed in.</p>
<p><a href="/login">Sign in</a></p>"#;
    Html(layout(&state.tenant.name, "Welcome", body)).into_response()
}

/// Shows the signed-in user's claims.
pub async fn dashboard(
    State(state): State<AppState>,
    Extension(session): Extension<AuthenticatedSession>,
) -> Html<String> {
    let userinfo = &session.userinfo;
    let mut body = format!(
        "<p>Signed in as <strong>{}</strong>.</p>\n<p>Roles: {}</p>\n",
        escape_html(userinfo.display_name().unwrap_or("unknown user")),
        escape_html(&role_list(userinfo)),
    );

    body.push_str(&session_summary(&session));

    if state.tenant.role_views {
        body.push_str(
            "<nav><a href=\"/admin\">Admin</a> | <a href=\"/moderator\">Moderator</a></nav>\n",
        );
    }
    body.push_str(&claims_table(userinfo));
    body.push_str("<p><a href=\"/logout\">Sign out</a></p>");

    Html(layout(&state.tenant.name, "Dashboard", &body))
}

/// Admin-only view.
pub async fn admin(
    State(state): State<AppState>,
    Extension(session): Extension<AuthenticatedSession>,
) -> Html<String> {
    let body = format!(
        "<p>Welcome, administrator {}.</p>\n{}<p><a href=\"/dashboard\">Back</a></p>",
        escape_html(session.userinfo.display_name().unwrap_or("")),
        claims_table(&session.userinfo),
    );
    Html(layout(&state.tenant.name, "Admin", &body))
}

/// Moderator view, also open to admins.
pub async fn moderator(
    State(state): State<AppState>,
    Extension(session): Extension<AuthenticatedSession>,
) -> Html<String> {
    let body = format!(
        "<p>Welcome, moderator {}.</p>\n<p>Roles: {}</p>\n<p><a href=\"/dashboard\">Back</a></p>",
        escape_html(session.userinfo.display_name().unwrap_or("")),
        escape_html(&role_list(&session.userinfo)),
    );
    Html(layout(&state.tenant.name, "Moderator", &body))
}

/// Liveness probe; reports whether the identity provider is usable.
pub async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        format!("ok\nprovider: {}\n", state.provider.status()),
    )
}

fn session_summary(session: &AuthenticatedSession) -> String {
    let userinfo = &session.userinfo;
    let tokens = &session.tokens;
    let token_expiry = tokens
        .expires_at()
        .map_or_else(|| "not given".to_string(), |at| at.to_rfc3339());

    format!(
        "<dl>\n\
         <dt>Subject</dt><dd>{}</dd>\n\
         <dt>Email</dt><dd>{}</dd>\n\
         <dt>Signed in at</dt><dd>{}</dd>\n\
         <dt>Token type</dt><dd>{}</dd>\n\
         <dt>Access token expires</dt><dd>{}</dd>\n\
         </dl>\n",
        escape_html(userinfo.subject().unwrap_or("unknown")),
        escape_html(userinfo.email().unwrap_or("not shared")),
        session.signed_in_at.to_rfc3339(),
        escape_html(tokens.token_type().unwrap_or("unknown")),
        token_expiry,
    )
}

fn role_list(userinfo: &UserInfo) -> String {
    if userinfo.roles().is_empty() {
        return "none".to_string();
    }
    userinfo.roles().iter().collect::<Vec<_>>().join(", ")
}

fn claims_table(userinfo: &UserInfo) -> String {
    let rows: String = userinfo
        .claims()
        .iter()
        .map(|(name, value)| {
            let value = match value.as_str() {
                Some(s) => s.to_string(),
                None => value.to_string(),
            };
            format!(
                "<tr><th>{}</th><td>{}</td></tr>\n",
                escape_html(name),
                escape_html(&value)
            )
        })
        .collect();
    format!("<table>\n{rows}</table>\n")
}

fn layout(tenant: &str, title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>{title} - {tenant}</title>
</head>
<body>
    <h1>{title}</h1>
{body}
</body>
</html>
"#,
        title = escape_html(title),
        tenant = escape_html(tenant),
    )
}

/// Escapes text for use in HTML element content and attribute values.
fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#039;")
}
