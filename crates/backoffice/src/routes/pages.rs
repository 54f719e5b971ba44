//! Section pages behind the navigation tabs.

use askama::Template;
use axum::{Router, response::Html, routing::get};

use table1837_core::Tab;

use crate::components::LayoutView;
use crate::filters;
use crate::middleware::{RequireAdmin, RequireSession};
use crate::services::CurrentUser;
use crate::state::AppState;

/// Section page template.
#[derive(Template)]
#[template(path = "pages/section.html")]
struct SectionTemplate {
    layout: LayoutView,
    title: &'static str,
    summary: &'static str,
}

/// Build the section router. Guarded by the caller.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/cocktails", get(cocktails))
        .route("/staff", get(staff))
        .route("/admin", get(admin))
        .route("/wine", get(wine))
        .route("/inventory", get(inventory))
}

fn render_section(user: &CurrentUser, tab: Tab, summary: &'static str) -> Html<String> {
    let template = SectionTemplate {
        layout: LayoutView::new(user, &tab.href()),
        title: tab.label(),
        summary,
    };
    Html(template.render().unwrap_or_else(|e| {
        tracing::error!("Template render error: {}", e);
        "Internal Server Error".to_string()
    }))
}

/// GET /cocktails
async fn cocktails(RequireSession(user): RequireSession) -> Html<String> {
    render_section(&user, Tab::Cocktails, "Cocktail recipes and the seasonal menu.")
}

/// GET /staff
async fn staff(RequireSession(user): RequireSession) -> Html<String> {
    render_section(&user, Tab::Staff, "Shift notes and the staff roster.")
}

/// GET /admin
///
/// Admins only; other roles get 403.
async fn admin(RequireAdmin(user): RequireAdmin) -> Html<String> {
    render_section(&user, Tab::Admin, "User roles and system settings.")
}

/// GET /wine
async fn wine(RequireSession(user): RequireSession) -> Html<String> {
    render_section(&user, Tab::Wine, "The wine list by category.")
}

/// GET /inventory
async fn inventory(RequireSession(user): RequireSession) -> Html<String> {
    render_section(&user, Tab::Inventory, "Bar stock and par levels.")
}
