// Axum handlers: parse the request, run panel work off the async runtime,
// render the page.

use axum::{
    extract::{RawQuery, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
};
use tracing::{error, info, warn};
use url::form_urlencoded;

use super::render::{self, FormValues, UF_FILTER_PARAM};
use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::map::{self, MapView};
use crate::panel::{select_ufs, Lookup, Panel, UfSelection};
use crate::query::Query;
use crate::storage::HistoryEntry;

/// Query parameters shared by the dashboard pages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Params {
    pub year: Option<String>,
    pub br: Option<String>,
    pub ufs: Vec<String>,
    pub uf_filter: bool,
    pub cleared: bool,
}

impl Params {
    /// Parse a raw query string. `uf` may repeat; unknown keys are ignored.
    pub fn parse(raw: Option<&str>) -> Self {
        let mut params = Self::default();
        for (key, value) in form_urlencoded::parse(raw.unwrap_or_default().as_bytes()) {
            match key.as_ref() {
                "year" => params.year = Some(value.into_owned()),
                "br" => params.br = Some(value.into_owned()),
                "uf" => params.ufs.push(value.into_owned()),
                "cleared" => params.cleared = value == "1",
                UF_FILTER_PARAM => params.uf_filter = true,
                _ => {}
            }
        }
        params
    }

    /// The requested query, or `None` when the form was not submitted.
    pub fn query(&self) -> Option<Result<Query>> {
        match (&self.year, &self.br) {
            (Some(year), Some(br)) => Some(Query::parse(year, br)),
            _ => None,
        }
    }

    /// The UFs asked for, `None` when no selection was made.
    pub fn requested_ufs(&self) -> Option<&[String]> {
        (self.uf_filter || !self.ufs.is_empty()).then_some(self.ufs.as_slice())
    }

    fn form_values(&self) -> FormValues {
        let defaults = FormValues::default();
        FormValues {
            year: self.year.clone().unwrap_or(defaults.year),
            br: self.br.clone().unwrap_or(defaults.br),
        }
    }
}

/// Run blocking panel work on the blocking thread pool.
async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| Error::internal(format!("dashboard task failed: {e}")))?
}

fn log_failure(err: &Error) {
    if err.is_operational() {
        warn!("Request failed: {}", err);
    } else {
        error!("Unhandled error: {:?}", err);
    }
}

/// Look up the query's table and apply the UF filter.
fn load(panel: &Panel, query: &Query, ufs: Option<&[String]>) -> Result<(Lookup, UfSelection)> {
    let lookup = panel.lookup(query, false)?;
    let selection = select_ufs(&lookup.dataset, ufs);
    Ok((lookup, selection))
}

/// The stored table for a derived view, downloading only if nothing is
/// stored yet. Does not touch the history.
fn load_view(panel: &Panel, query: &Query, ufs: Option<&[String]>) -> Result<Dataset> {
    let dataset = match panel.stored(query) {
        Ok(stored) => stored.dataset,
        Err(Error::NotStored { .. }) => panel.lookup(query, false)?.dataset,
        Err(e) => return Err(e),
    };
    Ok(select_ufs(&dataset, ufs).filtered)
}

/// GET / - form, history and, when a query is given, its results.
pub(crate) async fn index(State(panel): State<Panel>, RawQuery(raw): RawQuery) -> Html<String> {
    let params = Params::parse(raw.as_deref());
    let form = params.form_values();
    let preview_rows = panel.config().dashboard.preview_rows;
    let history_limit = panel.config().storage.history_limit;

    let request = params.clone();
    let outcome = blocking(move || {
        let result = request
            .query()
            .map(|query| load(&panel, &query?, request.requested_ufs()));
        let history = panel.history(history_limit);
        Ok((result, history))
    })
    .await;

    let (result, history): (Option<Result<(Lookup, UfSelection)>>, Result<Vec<HistoryEntry>>) =
        match outcome {
            Ok(pair) => pair,
            Err(e) => (Some(Err(e)), Err(Error::internal("history unavailable"))),
        };

    let history = match history {
        Ok(entries) => Some(entries),
        Err(e) => {
            warn!("Failed to load history: {}", e);
            None
        }
    };

    let content = match result {
        None => String::new(),
        Some(Ok((lookup, selection))) => render::results(&lookup, &selection, preview_rows),
        Some(Err(e)) => {
            log_failure(&e);
            render::error_block(&e)
        }
    };

    Html(render::index_page(
        &form,
        history.as_deref(),
        params.cleared,
        &content,
    ))
}

fn requested_query(params: &Params) -> Result<Query> {
    params
        .query()
        .unwrap_or_else(|| Err(Error::invalid_query("year and br are required")))
}

fn error_response(err: &Error) -> Response {
    log_failure(err);
    let status = if err.is_not_found() {
        StatusCode::NOT_FOUND
    } else if matches!(err, Error::InvalidQuery { .. }) {
        StatusCode::BAD_REQUEST
    } else if err.is_operational() {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Html(render::error_page(err))).into_response()
}

/// GET /map - Leaflet page of the selected stations.
pub(crate) async fn map_page(State(panel): State<Panel>, RawQuery(raw): RawQuery) -> Response {
    let params = Params::parse(raw.as_deref());
    let view = MapView::from_config(&panel.config().dashboard);

    let result = blocking(move || {
        let query = requested_query(&params)?;
        let filtered = load_view(&panel, &query, params.requested_ufs())?;
        Ok((query, filtered))
    })
    .await;

    let (query, filtered) = match result {
        Ok(pair) => pair,
        Err(e) => return error_response(&e),
    };

    let markers = match map::markers(&filtered) {
        Ok(markers) if !markers.is_empty() => markers,
        Ok(_) => return Html(render::map_unavailable()).into_response(),
        Err(e) => {
            warn!("Map unavailable for {}: {}", query, e);
            return Html(render::map_unavailable()).into_response();
        }
    };

    match view.render_html(&format!("Mapa {}", query.label()), &markers) {
        Ok(html) => Html(html).into_response(),
        Err(e) => error_response(&e),
    }
}

/// GET /export - the selected rows as a CSV attachment.
pub(crate) async fn export(State(panel): State<Panel>, RawQuery(raw): RawQuery) -> Response {
    let params = Params::parse(raw.as_deref());

    let result = blocking(move || {
        let query = requested_query(&params)?;
        let csv = load_view(&panel, &query, params.requested_ufs())?.to_csv()?;
        Ok((query, csv))
    })
    .await;

    match result {
        Ok((query, csv)) => (
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", query.export_file_name()),
                ),
            ],
            csv,
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

/// POST /admin/clear - drop every stored table and the history.
pub(crate) async fn clear(State(panel): State<Panel>) -> Response {
    match blocking(move || panel.clear()).await {
        Ok(report) => {
            info!(
                "Cleared {} tables and {} history entries",
                report.datasets, report.history
            );
            Redirect::to("/?cleared=1").into_response()
        }
        Err(e) => error_response(&e),
    }
}
