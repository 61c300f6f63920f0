//! HTML for the dashboard pages.

use std::fmt::Write;

use url::form_urlencoded;

use crate::dataset::Dataset;
use crate::error::Error;
use crate::html::{escape, page};
use crate::panel::{Lookup, UfSelection};
use crate::query::Query;
use crate::storage::HistoryEntry;

/// Title of every dashboard page.
pub const TITLE: &str = "Painel PNCT - DNIT";

const DEFAULT_YEAR: &str = "2023";
const DEFAULT_BR: &str = "101";

/// Sent with every UF selection so that an empty one is not read as absent.
pub const UF_FILTER_PARAM: &str = "uf_filter";

const CHART_WIDTH: usize = 600;
const CHART_HEIGHT: usize = 240;
const CHART_MARGIN: usize = 30;
const MIN_SLOT: usize = 10;

const STYLE: &str = "<style>\
body { font-family: sans-serif; margin: 0; display: flex; }\
aside { width: 260px; padding: 1em; background: #f3f4f6; min-height: 100vh; }\
main { flex: 1; padding: 1em 2em; }\
table { border-collapse: collapse; font-size: 0.9em; }\
th, td { border: 1px solid #d1d5db; padding: 2px 6px; }\
.success { background: #dcfce7; padding: 0.5em; }\
.warning { background: #fef9c3; padding: 0.5em; }\
.error { background: #fee2e2; padding: 0.5em; }\
iframe { width: 100%; height: 480px; border: 0; }\
</style>";

/// Values shown in the search form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormValues {
    /// Year field.
    pub year: String,
    /// BR field.
    pub br: String,
}

impl Default for FormValues {
    fn default() -> Self {
        Self {
            year: DEFAULT_YEAR.to_string(),
            br: DEFAULT_BR.to_string(),
        }
    }
}

/// Query string selecting `query` and `ufs`, without the leading `?`.
#[must_use]
pub fn query_string(query: &Query, ufs: &[String]) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    serializer.append_pair("year", &query.year().to_string());
    serializer.append_pair("br", &query.highway().to_string());
    for uf in ufs {
        serializer.append_pair("uf", uf);
    }
    serializer.append_pair(UF_FILTER_PARAM, "1");
    serializer.finish()
}

/// The main page: form, sidebar and `content`.
#[must_use]
pub fn index_page(
    form: &FormValues,
    history: Option<&[HistoryEntry]>,
    cleared: bool,
    content: &str,
) -> String {
    let mut body = String::new();
    body.push_str(&sidebar(history, cleared));
    let _ = write!(
        body,
        "<main>\n<h1>🚦 {title}</h1>\n<h3>Dados Rodoviários Integrados</h3>\n\
         <form method=\"get\" action=\"/\">\n\
         <label>Ano <input type=\"number\" name=\"year\" min=\"2000\" value=\"{year}\"></label>\n\
         <label>Número da BR <input type=\"number\" name=\"br\" min=\"1\" max=\"999\" value=\"{br}\"></label>\n\
         <button type=\"submit\">Buscar Dados</button>\n</form>\n{content}\n</main>",
        title = escape(TITLE),
        year = escape(&form.year),
        br = escape(&form.br),
    );
    page(TITLE, STYLE, &body)
}

fn sidebar(history: Option<&[HistoryEntry]>, cleared: bool) -> String {
    let mut out = String::from("<aside>\n<h3>📚 Histórico de Consultas</h3>\n");
    match history {
        None => out.push_str("<p class=\"error\">Erro ao carregar histórico</p>\n"),
        Some([]) => out.push_str("<p>Nenhuma consulta recente</p>\n"),
        Some(entries) => {
            out.push_str("<ul>\n");
            for entry in entries {
                let _ = writeln!(
                    out,
                    "<li>🗓️ {} - {}</li>",
                    entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    escape(&entry.query)
                );
            }
            out.push_str("</ul>\n");
        }
    }
    out.push_str(
        "<h3>⚙️ Administração</h3>\n\
         <form method=\"post\" action=\"/admin/clear\">\
         <button type=\"submit\">🔄 Limpar Cache e Histórico</button></form>\n",
    );
    if cleared {
        out.push_str("<p class=\"success\">Cache e histórico resetados</p>\n");
    }
    out.push_str("</aside>");
    out
}

/// The results of a successful lookup.
#[must_use]
pub fn results(lookup: &Lookup, selection: &UfSelection, preview_rows: usize) -> String {
    let query = &lookup.query;
    let mut out = String::new();

    let origin = if lookup.from_cache {
        " (banco local)"
    } else {
        ""
    };
    let _ = writeln!(
        out,
        "<p class=\"success\">✅ {} registros carregados com sucesso!{origin}</p>",
        lookup.dataset.len()
    );

    out.push_str("<h2>📊 Visualização dos Dados</h2>\n");
    out.push_str(&table(&lookup.dataset.head(preview_rows)));

    out.push_str(&uf_filter(query, selection));

    let params = query_string(query, &selection.selected);
    let _ = writeln!(
        out,
        "<h2>🗺️ Mapa Georreferenciado</h2>\n<iframe src=\"/map?{}\" title=\"Mapa\"></iframe>",
        escape(&params)
    );

    out.push_str("<h2>📈 Análise Estatística</h2>\n");
    match selection.filtered.value_counts(crate::dataset::UF) {
        Ok(counts) => out.push_str(&histogram("Distribuição por UF", &counts)),
        Err(_) => out.push_str("<p class=\"warning\">Coluna UF ausente</p>\n"),
    }

    let _ = writeln!(
        out,
        "<h2>📥 Exportação de Dados</h2>\n<a href=\"/export?{}\" download=\"{}\">Baixar CSV Filtrado</a>",
        escape(&params),
        escape(&query.export_file_name())
    );
    out
}

fn uf_filter(query: &Query, selection: &UfSelection) -> String {
    if selection.available.is_empty() {
        return String::new();
    }
    let mut out = String::from(
        "<h2>⚙️ Filtros Avançados</h2>\n<form method=\"get\" action=\"/\">\n",
    );
    let _ = writeln!(
        out,
        "<input type=\"hidden\" name=\"year\" value=\"{}\">\
         <input type=\"hidden\" name=\"br\" value=\"{}\">\
         <input type=\"hidden\" name=\"{UF_FILTER_PARAM}\" value=\"1\">",
        query.year(),
        query.highway()
    );
    out.push_str("<fieldset><legend>Estados (UF)</legend>\n");
    for uf in &selection.available {
        let checked = if selection.selected.contains(uf) {
            " checked"
        } else {
            ""
        };
        let _ = writeln!(
            out,
            "<label><input type=\"checkbox\" name=\"uf\" value=\"{uf}\"{checked}> {uf}</label>",
            uf = escape(uf)
        );
    }
    out.push_str("</fieldset>\n<button type=\"submit\">Aplicar</button>\n</form>\n");
    out
}

/// A dataset as an HTML table.
#[must_use]
pub fn table(dataset: &Dataset) -> String {
    let mut out = String::from("<table>\n<tr>");
    for column in dataset.columns() {
        let _ = write!(out, "<th>{}</th>", escape(column));
    }
    out.push_str("</tr>\n");
    for row in dataset.rows() {
        out.push_str("<tr>");
        for cell in row {
            let _ = write!(out, "<td>{}</td>", escape(cell));
        }
        out.push_str("</tr>\n");
    }
    out.push_str("</table>\n");
    out
}

/// A vertical bar chart as inline SVG.
#[must_use]
pub fn histogram(title: &str, counts: &[(String, usize)]) -> String {
    let max = counts.iter().map(|(_, n)| *n).max().unwrap_or(0);
    // Many labels widen the chart instead of shrinking bars below MIN_SLOT.
    let slot = if counts.is_empty() {
        CHART_WIDTH
    } else {
        (CHART_WIDTH / counts.len()).max(MIN_SLOT)
    };
    let width = (slot * counts.len()).max(CHART_WIDTH);
    let bar_width = slot.saturating_sub(8).max(2);
    let total_height = CHART_HEIGHT + 2 * CHART_MARGIN;

    let mut out = String::new();
    let _ = writeln!(
        out,
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{width}\" height=\"{total_height}\" \
         role=\"img\" aria-label=\"{title}\">\n<title>{title}</title>\n\
         <text x=\"{cx}\" y=\"18\" text-anchor=\"middle\">{title}</text>",
        cx = width / 2,
        title = escape(title),
    );
    for (i, (label, count)) in counts.iter().enumerate() {
        let height = if max == 0 {
            0
        } else {
            count * CHART_HEIGHT / max
        };
        let x = i * slot + slot.saturating_sub(bar_width) / 2;
        let y = CHART_MARGIN + CHART_HEIGHT - height;
        let cx = i * slot + slot / 2;
        let _ = writeln!(
            out,
            "<rect x=\"{x}\" y=\"{y}\" width=\"{bar_width}\" height=\"{height}\" fill=\"#636efa\">\
             <title>{label}: {count}</title></rect>\
             <text x=\"{cx}\" y=\"{ty}\" text-anchor=\"middle\" font-size=\"11\">{count}</text>\
             <text x=\"{cx}\" y=\"{ly}\" text-anchor=\"middle\" font-size=\"12\">{label}</text>",
            ty = y.saturating_sub(3),
            ly = CHART_MARGIN + CHART_HEIGHT + 16,
            label = escape(label),
        );
    }
    out.push_str("</svg>\n");
    out
}

/// How a failed lookup is shown.
#[must_use]
pub fn error_block(err: &Error) -> String {
    if err.is_not_found() {
        format!(
            "<div class=\"error\"><p>🚫 Dados não encontrados: {}</p>\n\
             <p>Verifique:</p>\n<ol>\n<li>A BR selecionada existe</li>\n\
             <li>O ano possui dados disponíveis</li>\n<li>Conexão com internet ativa</li>\n</ol>\n\
             <p>Consulte <a href=\"https://servicos.dnit.gov.br/dadospnct/mapa\">o mapa do PNCT</a>.</p></div>",
            escape(&err.to_string())
        )
    } else if err.is_operational() {
        format!(
            "<p class=\"error\">⚠️ Erro crítico: {}</p>",
            escape(&err.to_string())
        )
    } else {
        "<p class=\"error\">❌ Erro inesperado. Consulte os logs técnicos.</p>".to_string()
    }
}

/// Shown in the map frame when there is nothing to plot.
#[must_use]
pub fn map_unavailable() -> String {
    page(
        TITLE,
        STYLE,
        "<p class=\"warning\">Dados geográficos não disponíveis para visualização</p>",
    )
}

/// A standalone error page for the map and export endpoints.
#[must_use]
pub fn error_page(err: &Error) -> String {
    page(TITLE, STYLE, &error_block(err))
}
