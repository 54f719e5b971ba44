//! Daily dashboard and its live 86'd stream.

use std::convert::Infallible;

use askama::Template;
use axum::{
    Router,
    extract::State,
    response::{
        Html,
        sse::{Event, KeepAlive, Sse},
    },
    routing::get,
};
use chrono::{Datelike, Local};
use futures::Stream;
use tracing::instrument;

use table1837_core::{DisplaySpecial, Item86, Wine};

use crate::components::LayoutView;
use crate::error::AppError;
use crate::filters;
use crate::middleware::{Client, RequireSession};
use crate::services::LiveItems86;
use crate::state::AppState;

/// SSE event name carrying a re-rendered 86'd panel.
pub const ITEMS_86_EVENT: &str = "items86";

/// Build the dashboard router. Guarded by the caller.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(dashboard))
        .route("/dashboard/items-86/stream", get(items_86_stream))
}

// =============================================================================
// View models
// =============================================================================

/// One featured wine card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeaturedWineView {
    pub heading: &'static str,
    pub name: String,
    pub origin: String,
    pub price: String,
    pub code: Option<String>,
}

impl FeaturedWineView {
    fn from_wine(index: usize, wine: &Wine) -> Self {
        Self {
            heading: wine_heading(index),
            name: wine.name.clone(),
            origin: wine.origin_line(),
            price: wine.display_price(),
            code: wine.code.clone(),
        }
    }
}

const fn wine_heading(index: usize) -> &'static str {
    if index == 0 {
        "Featured Red Wine"
    } else {
        "Featured White Wine"
    }
}

/// The house pours shown when the wine list cannot be read.
fn default_wines() -> Vec<FeaturedWineView> {
    vec![
        FeaturedWineView {
            heading: wine_heading(0),
            name: "CRISTOM, EILEEN VYD., PINOT NOIR".to_string(),
            origin: "Eola-Amity Hills, Willamette Valley, OR, 2019".to_string(),
            price: "$185".to_string(),
            code: Some("R013".to_string()),
        },
        FeaturedWineView {
            heading: wine_heading(1),
            name: "NEYERS, CARNEROS CHARDONNAY".to_string(),
            origin: "Sonoma County, CA, 2019".to_string(),
            price: "$100".to_string(),
            code: Some("C004".to_string()),
        },
    ]
}

/// Cards for a successful read, in read order. An empty list shows none.
fn wine_views(wines: Option<&[Wine]>) -> Vec<FeaturedWineView> {
    wines.map_or_else(default_wines, |wines| {
        wines
            .iter()
            .enumerate()
            .map(|(index, wine)| FeaturedWineView::from_wine(index, wine))
            .collect()
    })
}

/// One row of the 86'd panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemView {
    pub name: String,
    pub date: String,
}

impl From<&Item86> for ItemView {
    fn from(item: &Item86) -> Self {
        Self {
            name: item.name.clone(),
            date: item
                .created_at
                .with_timezone(&Local)
                .format("%-m/%-d/%Y")
                .to_string(),
        }
    }
}

fn item_views(items: Option<&[Item86]>) -> Option<Vec<ItemView>> {
    items.map(|items| items.iter().map(ItemView::from).collect())
}

/// A line on the food specials panel.
#[derive(Debug, Clone, Copy)]
pub struct FoodSpecial {
    pub course: &'static str,
    pub dish: &'static str,
}

const FOOD_SPECIALS: [FoodSpecial; 3] = [
    FoodSpecial {
        course: "Hors d'oeuvre",
        dish: "Salmon Tartare with Avocado Mousse",
    },
    FoodSpecial {
        course: "Intermezzo",
        dish: "Lemon Basil Sorbet",
    },
    FoodSpecial {
        course: "Soup of the Day",
        dish: "Wild Mushroom Bisque",
    },
];

// =============================================================================
// Templates
// =============================================================================

/// Dashboard page template.
#[derive(Template)]
#[template(path = "dashboard.html")]
pub struct DashboardTemplate {
    pub layout: LayoutView,
    pub wines: Vec<FeaturedWineView>,
    /// `None` when the 86'd list could not be read.
    pub items: Option<Vec<ItemView>>,
    pub special: Option<DisplaySpecial>,
    pub food_specials: &'static [FoodSpecial],
    pub stream_url: &'static str,
}

/// The 86'd panel on its own, pushed over the live stream.
#[derive(Template)]
#[template(path = "partials/items_86.html")]
pub struct Items86Template {
    pub items: Option<Vec<ItemView>>,
}

// =============================================================================
// Handlers
// =============================================================================

/// Dashboard page handler.
///
/// GET /dashboard
#[instrument(skip_all)]
pub async fn dashboard(
    State(state): State<AppState>,
    RequireSession(user): RequireSession,
    client: Client,
) -> Html<String> {
    let weekday = Local::now().weekday();
    let data = state
        .dashboard()
        .load(&client.context.queries, weekday, Some(user.access_token()))
        .await;

    let template = DashboardTemplate {
        layout: LayoutView::new(&user, "/dashboard"),
        wines: wine_views(data.wines.as_deref().map(Vec::as_slice)),
        items: item_views(data.items_86.as_deref().map(Vec::as_slice)),
        special: data.special,
        food_specials: &FOOD_SPECIALS,
        stream_url: "/dashboard/items-86/stream",
    };

    Html(template.render().unwrap_or_else(|e| {
        tracing::error!("Template render error: {}", e);
        "Internal Server Error".to_string()
    }))
}

/// Live 86'd panel.
///
/// GET /dashboard/items-86/stream
///
/// Pushes a freshly read panel once subscribed, then again after each
/// change on `items_86`. Closing the connection drops the subscription.
#[instrument(skip_all)]
pub async fn items_86_stream(
    State(state): State<AppState>,
    RequireSession(_): RequireSession,
    client: Client,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let mut live = LiveItems86::start(
        state.changes(),
        state.dashboard().clone(),
        client.context.queries.clone(),
        client.context.auth.subscribe(),
    )
    .await?;
    tracing::debug!(client_id = %client.context.id, "86'd stream opened");

    let stream = async_stream::stream! {
        while let Some(update) = live.next().await {
            let items = match update {
                Ok(items) => Some(items.iter().map(ItemView::from).collect()),
                Err(e) => {
                    tracing::error!("Failed to refresh 86'd items: {e}");
                    None
                }
            };
            let html = Items86Template { items }.render().unwrap_or_else(|e| {
                tracing::error!("Template render error: {}", e);
                String::new()
            });
            yield Ok(Event::default().event(ITEMS_86_EVENT).data(html.replace('\r', "")));
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
