//! Resource commands - Search, get and delete platform entities
//!
//! Provides the `bracelet search`, `bracelet get` and `bracelet delete`
//! commands. Filters use the `field.OP:value` syntax understood by the query
//! encoder, e.g. `-f age.GE:18 -f status.IN:active,blocked`.

use anyhow::Result;
use bracelet_api::fetch::{Fetch, RequestOptions};
use bracelet_api::transformer::Identity;
use bracelet_core::domain::{
    Alarm, Chat, Filter, FilterTerm, Instrument, Message, Pathology, Patient, PatientPathology,
    Projection, QueryParams, Resource, SortTerm, Study, User, UserPermission,
};
use clap::{Args, ValueEnum};
use serde_json::Value;
use tracing::info;

use super::CliContext;
use crate::output::{get_formatter, OutputFormat, OutputFormatter};

/// Collections reachable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ResourceKind {
    Users,
    Permissions,
    Patients,
    Pathologies,
    PatientPathologies,
    Studies,
    Alarms,
    Instruments,
    Chats,
    Messages,
}

impl ResourceKind {
    /// Collection path and error entity of the resource.
    pub fn target(self) -> (&'static str, &'static str) {
        fn of<T: Resource>() -> (&'static str, &'static str) {
            (T::PATH, T::ENTITY)
        }
        match self {
            ResourceKind::Users => of::<User>(),
            ResourceKind::Permissions => of::<UserPermission>(),
            ResourceKind::Patients => of::<Patient>(),
            ResourceKind::Pathologies => of::<Pathology>(),
            ResourceKind::PatientPathologies => of::<PatientPathology>(),
            ResourceKind::Studies => of::<Study>(),
            ResourceKind::Alarms => of::<Alarm>(),
            ResourceKind::Instruments => of::<Instrument>(),
            ResourceKind::Chats => of::<Chat>(),
            ResourceKind::Messages => of::<Message>(),
        }
    }

    fn fetch(self, ctx: &CliContext) -> Fetch {
        let (path, entity) = self.target();
        Fetch::new(ctx.api.clone(), path, entity).with_auth(ctx.session.clone())
    }
}

// ============================================================================
// search
// ============================================================================

#[derive(Debug, Args)]
pub struct SearchCommand {
    /// Collection to search
    #[arg(value_enum)]
    pub resource: ResourceKind,

    /// Filter term `field.OP:value` (repeatable)
    #[arg(short, long = "filter")]
    pub filters: Vec<FilterTerm>,

    /// Join filter terms with OR instead of AND
    #[arg(long)]
    pub any: bool,

    /// Sort term `field[:ASC|DESC]` (repeatable)
    #[arg(short, long = "sort")]
    pub sort: Vec<SortTerm>,

    /// Page size
    #[arg(short, long)]
    pub limit: Option<u32>,

    /// Comma-separated list of fields to return
    #[arg(long, value_delimiter = ',')]
    pub fields: Vec<String>,

    /// Follow a pagination link returned by a previous search
    #[arg(long, conflicts_with_all = ["filters", "sort", "limit", "fields"])]
    pub page: Option<String>,
}

impl SearchCommand {
    pub async fn execute(&self, ctx: &CliContext, format: OutputFormat) -> Result<()> {
        let fmt = get_formatter(format);
        let fetch = self.resource.fetch(ctx);

        let mut opts = RequestOptions::new().params(self.params());
        if let Some(page) = &self.page {
            opts = opts.page(page.clone());
        }

        let results = fetch.search(&opts, &Identity).await?;
        info!(
            entity = fetch.entity(),
            count = results.items.len(),
            has_next = results.next.is_some(),
            "Search finished"
        );

        if format == OutputFormat::Json {
            fmt.print_json(&serde_json::json!({
                "items": results.items,
                "first": results.first,
                "next": results.next,
                "previous": results.previous,
            }));
            return Ok(());
        }

        if results.items.is_empty() {
            fmt.info("No results");
            return Ok(());
        }
        fmt.success(&format!("{} result(s)", results.items.len()));
        for item in &results.items {
            print_summary(&*fmt, item);
        }
        if let Some(next) = &results.next {
            fmt.info("");
            fmt.info(&format!(
                "Next page: bracelet search {} --page '{next}'",
                self.resource_name()
            ));
        }
        Ok(())
    }

    /// Query parameters built from the command-line flags.
    pub fn params(&self) -> QueryParams {
        let mut params = QueryParams::new();
        let terms = self.filters.iter().cloned();
        let filter = if self.any {
            Filter::any(terms)
        } else {
            Filter::all(terms)
        };
        if let Some(filter) = filter {
            params = params.with_q(filter);
        }
        if !self.sort.is_empty() {
            params = params.with_sort(self.sort.clone());
        }
        if let Some(limit) = self.limit {
            params = params.with_limit(limit);
        }
        if !self.fields.is_empty() {
            params = params.with_fields(Projection::of(self.fields.iter().cloned()));
        }
        params
    }

    fn resource_name(&self) -> String {
        self.resource
            .to_possible_value()
            .map(|v| v.get_name().to_string())
            .unwrap_or_default()
    }
}

// ============================================================================
// get / delete
// ============================================================================

#[derive(Debug, Args)]
pub struct GetCommand {
    #[arg(value_enum)]
    pub resource: ResourceKind,
    /// Resource id
    pub id: String,
}

impl GetCommand {
    pub async fn execute(&self, ctx: &CliContext, format: OutputFormat) -> Result<()> {
        let fmt = get_formatter(format);
        let item: Value = self
            .resource
            .fetch(ctx)
            .get(&self.id, &RequestOptions::new(), &Identity)
            .await?;

        if format == OutputFormat::Json {
            fmt.print_json(&item);
        } else {
            let yaml = serde_yaml::to_string(&item).unwrap_or_else(|_| item.to_string());
            for line in yaml.lines() {
                fmt.info(line);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Args)]
pub struct DeleteCommand {
    #[arg(value_enum)]
    pub resource: ResourceKind,
    /// Resource id
    pub id: String,
}

impl DeleteCommand {
    pub async fn execute(&self, ctx: &CliContext, format: OutputFormat) -> Result<()> {
        let fmt = get_formatter(format);
        let fetch = self.resource.fetch(ctx);
        fetch.delete(&self.id, &RequestOptions::new()).await?;
        info!(entity = fetch.entity(), id = %self.id, "Deleted");

        if format == OutputFormat::Json {
            fmt.print_json(&serde_json::json!({"success": true, "id": self.id}));
        } else {
            fmt.success(&format!("Deleted {} {}", fetch.entity(), self.id));
        }
        Ok(())
    }
}

/// One line per item: id followed by the most descriptive field present.
fn print_summary(fmt: &dyn OutputFormatter, item: &Value) {
    let id = item
        .get("id")
        .map(|v| v.to_string())
        .unwrap_or_else(|| "-".to_string());
    let label = ["name", "code", "email", "filename", "entity_name", "last_message"]
        .iter()
        .find_map(|k| item.get(*k).and_then(Value::as_str))
        .unwrap_or("");
    fmt.info(&format!("{id:>8}  {label}"));
}
