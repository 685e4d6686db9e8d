//! # Ledger gateway (MoneyForward ME)
//!
//! Drives the target application's manual-asset screens over an
//! authenticated cookie session: the two-step sign-in flow, scraping the
//! rendered asset tables, resolving the per-row asset id from the modify
//! link, and submitting the update / create / delete forms.
//!
//! Every mutation is followed by a fixed settle delay and a fresh page
//! fetch before the next operation, because each mutation can shift the
//! row positions and modal ids later lookups rely on. One narrowly-matched
//! failure is tolerated: a response saying the asset was already handled
//! (e.g. deleted in a concurrent session) is logged and swallowed; every
//! other actuation failure aborts the run.

use crate::domain::entities::ledger_record::LedgerTable;
use crate::domain::errors::LedgerError;
use crate::domain::repositories::ledger_gateway::{LedgerGateway, ScrapedRow};
use crate::domain::value_objects::asset_type::AssetType;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use url::Url;

const DEFAULT_ID_BASE: &str = "https://id.moneyforward.com";
const DEFAULT_APP_BASE: &str = "https://moneyforward.com";
const PORTFOLIO_PATH: &str = "/bs/portfolio";

/// The sign-in screen is not served to unrecognized clients.
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// The name input accepts at most 20 characters, the price inputs 12.
const NAME_FIELD_LIMIT: usize = 20;
const PRICE_FIELD_LIMIT: usize = 12;

/// Action columns of the asset tables, dropped from scraped cells.
const ACTION_HEADERS: [&str; 2] = ["変更", "削除"];

/// Modify links point at their modal as `#modal_asset{id}`.
const MODAL_HREF_PREFIX: &str = "#modal_asset";

const EMAIL_FIELD: &str = r#"input[name="mfid_user[email]"]"#;
const PASSWORD_FIELD: &str = r#"input[name="mfid_user[password]"]"#;
const ASSET_TYPE_FIELD: &str = r#"select[name="user_asset_det[asset_subclass_id]"]"#;
const DELETE_LINKS: &str = r#"a.btn-asset-action[data-method="delete"]"#;

#[derive(Debug, Clone)]
pub struct MoneyForwardConfig {
    pub id_base: String,
    pub app_base: String,
    /// Override for the ledger page URL (e.g. an institution-scoped page).
    pub portfolio_url: Option<String>,
    /// Wait after each mutation before the page is considered settled.
    pub settle_delay: Duration,
}

impl Default for MoneyForwardConfig {
    fn default() -> Self {
        Self {
            id_base: DEFAULT_ID_BASE.to_string(),
            app_base: DEFAULT_APP_BASE.to_string(),
            portfolio_url: None,
            settle_delay: Duration::from_secs(3),
        }
    }
}

/// Cookie-session gateway to the manual-asset ledger.
pub struct MoneyForwardGateway {
    client: Client,
    config: MoneyForwardConfig,
    /// Last fetched ledger page; refreshed after every mutation.
    page: Mutex<Option<String>>,
}

impl MoneyForwardGateway {
    pub fn new(config: MoneyForwardConfig) -> Result<Self, LedgerError> {
        let client = Client::builder()
            .cookie_store(true)
            .user_agent(BROWSER_USER_AGENT)
            .build()
            .map_err(|e| LedgerError::Request(e.to_string()))?;
        Ok(Self {
            client,
            config,
            page: Mutex::new(None),
        })
    }

    fn portfolio_url(&self) -> String {
        self.config
            .portfolio_url
            .clone()
            .unwrap_or_else(|| format!("{}{}", self.config.app_base, PORTFOLIO_PATH))
    }

    async fn get_text(&self, url: &str) -> Result<String, LedgerError> {
        self.client
            .get(url)
            .send()
            .await
            .map_err(|e| LedgerError::Request(e.to_string()))?
            .text()
            .await
            .map_err(|e| LedgerError::Request(e.to_string()))
    }

    /// Fetch the ledger page and replace the cached snapshot.
    async fn load_page(&self) -> Result<String, LedgerError> {
        let html = self.get_text(&self.portfolio_url()).await?;
        *self.page.lock().await = Some(html.clone());
        Ok(html)
    }

    async fn current_page(&self) -> Result<String, LedgerError> {
        let cached = self.page.lock().await.clone();
        match cached {
            Some(html) => Ok(html),
            None => self.load_page().await,
        }
    }

    /// Resolve a (possibly relative) form action against a base URL.
    fn absolute_url(base: &str, action: &str) -> Result<Url, LedgerError> {
        let base = Url::parse(base).map_err(|e| LedgerError::Request(e.to_string()))?;
        base.join(action)
            .map_err(|e| LedgerError::Request(e.to_string()))
    }

    /// Submit a scraped form with some fields overridden.
    async fn submit_form(
        &self,
        base: &str,
        form: ScrapedForm,
        overrides: Vec<(String, String)>,
    ) -> Result<reqwest::Response, LedgerError> {
        let url = Self::absolute_url(base, &form.action)?;
        let mut fields = form.fields;
        for (key, value) in overrides {
            match fields.iter_mut().find(|(name, _)| *name == key) {
                Some(field) => field.1 = value,
                None => fields.push((key, value)),
            }
        }
        self.client
            .post(url)
            .form(&fields)
            .send()
            .await
            .map_err(|e| LedgerError::Request(e.to_string()))
    }

    /// Check a mutation response, tolerating exactly the already-handled
    /// condition.
    async fn ensure_actuated(
        &self,
        response: reqwest::Response,
        operation: &str,
    ) -> Result<(), LedgerError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LedgerError::Request(e.to_string()))?;
        if status.is_success() || status.is_redirection() {
            return Ok(());
        }
        if is_already_handled(&body) {
            warn!(operation, "asset already handled, continuing");
            return Ok(());
        }
        Err(LedgerError::ActuationFailed(format!(
            "{operation} returned HTTP {status}"
        )))
    }

    /// Wait for the application to settle, then re-fetch the page so the
    /// next lookup sees fresh row positions and modal ids.
    async fn settle(&self) -> Result<(), LedgerError> {
        sleep(self.config.settle_delay).await;
        self.load_page().await?;
        Ok(())
    }

    async fn post_delete(&self, page_html: &str, href: &str) -> Result<(), LedgerError> {
        let mut fields: Vec<(String, String)> =
            vec![("_method".to_string(), "delete".to_string())];
        if let Some(token) = csrf_token(page_html) {
            fields.push(("authenticity_token".to_string(), token));
        }
        let url = Self::absolute_url(&self.config.app_base, href)?;
        let response = self
            .client
            .post(url)
            .form(&fields)
            .send()
            .await
            .map_err(|e| LedgerError::Request(e.to_string()))?;
        self.ensure_actuated(response, "delete").await
    }
}

#[async_trait]
impl LedgerGateway for MoneyForwardGateway {
    async fn login(&self, email: &str, password: &str) -> Result<(), LedgerError> {
        let sign_in_url = format!("{}/sign_in", self.config.id_base);
        let html = self.get_text(&sign_in_url).await?;
        let email_form = form_containing(&html, EMAIL_FIELD)
            .map_err(|_| LedgerError::LoginFailed("sign-in page without email form".to_string()))?;
        let response = self
            .submit_form(
                &self.config.id_base,
                email_form,
                vec![("mfid_user[email]".to_string(), email.to_string())],
            )
            .await?;
        let html = response
            .text()
            .await
            .map_err(|e| LedgerError::Request(e.to_string()))?;

        let password_form = form_containing(&html, PASSWORD_FIELD).map_err(|_| {
            LedgerError::LoginFailed("password step not presented, check the account email".to_string())
        })?;
        let response = self
            .submit_form(
                &self.config.id_base,
                password_form,
                vec![("mfid_user[password]".to_string(), password.to_string())],
            )
            .await?;
        // Drain the body so the session cookies are fully established.
        response
            .text()
            .await
            .map_err(|e| LedgerError::Request(e.to_string()))?;

        let page = self.load_page().await?;
        if page.contains("mfid_user[password]") {
            return Err(LedgerError::LoginFailed("credentials rejected".to_string()));
        }
        info!("ledger session established");
        Ok(())
    }

    async fn scrape_table(&self, table: LedgerTable) -> Result<Vec<ScrapedRow>, LedgerError> {
        let html = self.current_page().await?;
        let rows = parse_table(&html, table_class(table))?;
        debug!(table = %table, rows = rows.len(), "scraped ledger table");
        Ok(rows)
    }

    async fn resolve_asset_id(
        &self,
        table: LedgerTable,
        row_position: usize,
    ) -> Result<String, LedgerError> {
        let html = self.current_page().await?;
        row_asset_id(&html, table_class(table), row_position)
    }

    async fn update_asset(
        &self,
        table: LedgerTable,
        asset_id: &str,
        name: &str,
        value_jpy: i64,
        cost_basis_jpy: Option<i64>,
    ) -> Result<(), LedgerError> {
        let html = self.current_page().await?;
        let form = modal_form(&html, asset_id)?;
        let mut overrides = vec![
            (
                "user_asset_det[name]".to_string(),
                truncate_chars(name, NAME_FIELD_LIMIT),
            ),
            (
                "user_asset_det[value]".to_string(),
                clamp_digits(value_jpy),
            ),
        ];
        if let Some(cost) = cost_basis_jpy {
            overrides.push((
                "user_asset_det[entried_price]".to_string(),
                clamp_digits(cost),
            ));
        }
        debug!(table = %table, asset_id, value_jpy, "submitting asset update");
        let response = self
            .submit_form(&self.config.app_base, form, overrides)
            .await?;
        self.ensure_actuated(response, "update").await?;
        self.settle().await
    }

    async fn create_asset(
        &self,
        asset_type: AssetType,
        name: &str,
        value_jpy: i64,
        cost_basis_jpy: i64,
    ) -> Result<(), LedgerError> {
        let html = self.current_page().await?;
        let form = form_containing(&html, ASSET_TYPE_FIELD)?;
        let overrides = vec![
            (
                "user_asset_det[asset_subclass_id]".to_string(),
                asset_type.subclass_id().to_string(),
            ),
            (
                "user_asset_det[name]".to_string(),
                truncate_chars(name, NAME_FIELD_LIMIT),
            ),
            (
                "user_asset_det[value]".to_string(),
                clamp_digits(value_jpy),
            ),
            (
                "user_asset_det[entried_price]".to_string(),
                clamp_digits(cost_basis_jpy),
            ),
        ];
        debug!(asset_type = %asset_type, value_jpy, "submitting asset creation");
        let response = self
            .submit_form(&self.config.app_base, form, overrides)
            .await?;
        self.ensure_actuated(response, "create").await?;
        self.settle().await
    }

    async fn delete_asset(&self, table: LedgerTable, asset_id: &str) -> Result<(), LedgerError> {
        let html = self.current_page().await?;
        let href = delete_hrefs(&html, table_class(table))?
            .into_iter()
            .find(|href| href.contains(asset_id))
            .ok_or_else(|| {
                LedgerError::MissingElement(format!(
                    "delete link for asset {asset_id} in {table}"
                ))
            })?;
        self.post_delete(&html, &href).await?;
        self.settle().await
    }

    async fn delete_all(&self, table: LedgerTable) -> Result<usize, LedgerError> {
        let class = table_class(table);
        let initial = delete_hrefs(&self.current_page().await?, class)?.len();
        let mut removed = 0;
        // Positions shift after every deletion, so always take the first
        // remaining link from a fresh page.
        for _ in 0..initial {
            let html = self.current_page().await?;
            let Some(href) = delete_hrefs(&html, class)?.into_iter().next() else {
                break;
            };
            self.post_delete(&html, &href).await?;
            self.settle().await?;
            removed += 1;
        }
        info!(table = %table, removed, "deleted ledger rows");
        Ok(removed)
    }
}

fn table_class(table: LedgerTable) -> &'static str {
    match table {
        LedgerTable::CashDeposits => "table-depo",
        LedgerTable::Equities => "table-eq",
    }
}

fn table_selector(table_class: &str) -> String {
    format!("table.table.table-bordered.{table_class}")
}

/// Parse a dynamically built selector.
fn selector(css: &str) -> Result<Selector, LedgerError> {
    Selector::parse(css)
        .map_err(|e| LedgerError::MissingElement(format!("invalid selector `{css}`: {e:?}")))
}

static TR: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").expect("valid selector"));
static TH: Lazy<Selector> = Lazy::new(|| Selector::parse("th").expect("valid selector"));
static TD: Lazy<Selector> = Lazy::new(|| Selector::parse("td").expect("valid selector"));
static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a").expect("valid selector"));
static FORM: Lazy<Selector> = Lazy::new(|| Selector::parse("form").expect("valid selector"));
static INPUT: Lazy<Selector> = Lazy::new(|| Selector::parse("input").expect("valid selector"));
static CSRF_META: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[name="csrf-token"]"#).expect("valid selector"));

fn cell_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Scrape one asset table into header-keyed rows.
///
/// An absent table is an empty result. A data row with fewer cells than
/// the header row is structurally malformed and rejected.
fn parse_table(html: &str, table_class: &str) -> Result<Vec<ScrapedRow>, LedgerError> {
    let document = Html::parse_document(html);
    let table_sel = selector(&table_selector(table_class))?;

    let Some(table) = document.select(&table_sel).next() else {
        return Ok(Vec::new());
    };

    let mut headers: Vec<String> = Vec::new();
    let mut rows = Vec::new();
    let mut position = 0usize;
    for tr in table.select(&TR) {
        let header_cells: Vec<String> = tr.select(&TH).map(cell_text).collect();
        if !header_cells.is_empty() {
            if headers.is_empty() {
                headers = header_cells;
            }
            continue;
        }
        let cells: Vec<String> = tr.select(&TD).map(cell_text).collect();
        if cells.is_empty() {
            continue;
        }
        if cells.len() < headers.len() {
            return Err(LedgerError::MalformedTable(format!(
                "row {} of {} has {} cells for {} headers",
                position + 1,
                table_class,
                cells.len(),
                headers.len()
            )));
        }
        position += 1;
        let cells: HashMap<String, String> = headers
            .iter()
            .cloned()
            .zip(cells)
            .filter(|(header, _)| !ACTION_HEADERS.contains(&header.as_str()))
            .collect();
        rows.push(ScrapedRow { position, cells });
    }
    Ok(rows)
}

/// The asset id is carried by the row's modify link (`#modal_asset{id}`).
fn row_asset_id(html: &str, table_class: &str, row_position: usize) -> Result<String, LedgerError> {
    let document = Html::parse_document(html);
    let table_sel = selector(&table_selector(table_class))?;

    let table = document
        .select(&table_sel)
        .next()
        .ok_or_else(|| LedgerError::MissingElement(format!("table {table_class}")))?;

    let mut position = 0usize;
    for tr in table.select(&TR) {
        if tr.select(&TD).next().is_none() {
            continue;
        }
        position += 1;
        if position != row_position {
            continue;
        }
        for anchor in tr.select(&ANCHOR) {
            if let Some(id) = anchor
                .value()
                .attr("href")
                .and_then(|href| href.strip_prefix(MODAL_HREF_PREFIX))
            {
                return Ok(id.to_string());
            }
        }
        return Err(LedgerError::MissingElement(format!(
            "modify link in row {row_position} of {table_class}"
        )));
    }
    Err(LedgerError::MissingElement(format!(
        "row {row_position} of {table_class}"
    )))
}

/// A scraped form: its action plus every named input's current value.
#[derive(Debug, Clone, PartialEq)]
struct ScrapedForm {
    action: String,
    fields: Vec<(String, String)>,
}

/// Find the form containing a matching descendant and collect its inputs.
fn form_containing(html: &str, descendant: &str) -> Result<ScrapedForm, LedgerError> {
    let document = Html::parse_document(html);
    let needle = selector(descendant)?;

    for form in document.select(&FORM) {
        if form.select(&needle).next().is_none() {
            continue;
        }
        return scraped_form(form);
    }
    Err(LedgerError::MissingElement(format!(
        "form containing {descendant}"
    )))
}

/// The edit form inside an asset's modal.
fn modal_form(html: &str, asset_id: &str) -> Result<ScrapedForm, LedgerError> {
    let document = Html::parse_document(html);
    let modal_sel = selector(&format!(r#"div[id="modal_asset{asset_id}"]"#))?;

    let modal = document
        .select(&modal_sel)
        .next()
        .ok_or_else(|| LedgerError::MissingElement(format!("edit modal for asset {asset_id}")))?;
    let form = modal
        .select(&FORM)
        .next()
        .ok_or_else(|| LedgerError::MissingElement(format!("form in modal for asset {asset_id}")))?;
    scraped_form(form)
}

fn scraped_form(form: ElementRef<'_>) -> Result<ScrapedForm, LedgerError> {
    let action = form
        .value()
        .attr("action")
        .ok_or_else(|| LedgerError::MissingElement("form without an action".to_string()))?
        .to_string();
    let fields = form
        .select(&INPUT)
        .filter_map(|input| {
            let name = input.value().attr("name")?;
            let value = input.value().attr("value").unwrap_or("");
            Some((name.to_string(), value.to_string()))
        })
        .collect();
    Ok(ScrapedForm { action, fields })
}

/// Delete links of one table, in rendered order.
fn delete_hrefs(html: &str, table_class: &str) -> Result<Vec<String>, LedgerError> {
    let document = Html::parse_document(html);
    let table_sel = selector(&table_selector(table_class))?;
    let link_sel = selector(DELETE_LINKS)?;

    let Some(table) = document.select(&table_sel).next() else {
        return Ok(Vec::new());
    };
    Ok(table
        .select(&link_sel)
        .filter_map(|anchor| anchor.value().attr("href"))
        .map(str::to_string)
        .collect())
}

fn csrf_token(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    document
        .select(&CSRF_META)
        .next()
        .and_then(|meta| meta.value().attr("content"))
        .map(str::to_string)
}

fn is_already_handled(body: &str) -> bool {
    body.contains("既に削除") || body.contains("already been deleted")
}

fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

fn clamp_digits(value: i64) -> String {
    truncate_chars(&value.to_string(), PRICE_FIELD_LIMIT)
}
