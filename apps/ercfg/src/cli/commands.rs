//! # CLI Command Implementations
//!
//! [`apply`] runs one command against a loaded store and returns a
//! [`Report`]; [`execute`] wraps it with settings, document I/O and output.

use super::{Cli, Commands};
use crate::document_io::{load_store, save_store};
use crate::settings::Settings;
use ercfg_core::request::{
    self, AttributeSpec, DataSourceSpec, ElementSpec, EntityClassSpec, EntityTypeSpec,
    FeatureElementRef, FeatureElementSpec, FeatureSpec, FeatureUpdate, FragmentSpec, RuleSpec,
};
use ercfg_core::{
    AttributeSelector, CfgError, ConfigStore, Deletion, FunctionKind, RedbMirror, RowId, Selector,
    Template,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

// =============================================================================
// REPORT
// =============================================================================

/// Outcome of one command: a one-line message plus structured data.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub message: String,
    pub data: Value,
}

impl Report {
    fn new(message: impl Into<String>, data: Value) -> Self {
        Self {
            message: message.into(),
            data,
        }
    }

    fn added(what: &str, code: &str, id: RowId) -> Self {
        Self::new(
            format!("{what} {code} added with id {id}"),
            json!({ "code": code, "id": id.value() }),
        )
    }

    fn deleted(what: &str, code: &str, deletion: &Deletion) -> Result<Self, CfgError> {
        Ok(Self::new(
            format!("{what} {code} deleted ({} rows)", deletion.total()),
            to_json(deletion)?,
        ))
    }

    fn listing<T: serde::Serialize>(what: &str, rows: &[T]) -> Result<Self, CfgError> {
        Ok(Self::new(format!("{} {what}", rows.len()), to_json(rows)?))
    }

    /// Human-readable rendering: the message, then one compact JSON line
    /// per row (or the pretty object for single results).
    pub fn render_text(&self) -> Result<String, CfgError> {
        let mut out = self.message.clone();
        match &self.data {
            Value::Array(rows) => {
                for row in rows {
                    out.push('\n');
                    out.push_str(&row.to_string());
                }
            }
            Value::Null => {}
            other => {
                out.push('\n');
                out.push_str(&to_pretty(other)?);
            }
        }
        Ok(out)
    }

    /// JSON rendering for `--json-mode`.
    pub fn render_json(&self) -> Result<String, CfgError> {
        to_pretty(&json!({
            "message": self.message,
            "data": self.data,
        }))
    }
}

fn to_pretty(value: &Value) -> Result<String, CfgError> {
    serde_json::to_string_pretty(value).map_err(|e| CfgError::Document(e.to_string()))
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<Value, CfgError> {
    serde_json::to_value(value).map_err(|e| CfgError::Document(e.to_string()))
}

// =============================================================================
// ARGUMENT PARSING
// =============================================================================

/// A JSON object argument, or a bare code wrapped as `{key: code}`.
pub fn code_or_json<T: DeserializeOwned>(arg: &str, key: &str) -> Result<T, CfgError> {
    if arg.trim_start().starts_with('{') {
        request::parse_str(arg)
    } else {
        request::parse(json!({ key: arg }))
    }
}

/// A JSON object argument; bare codes are not accepted.
fn json_only<T: DeserializeOwned>(arg: &str) -> Result<T, CfgError> {
    if !arg.trim_start().starts_with('{') {
        return Err(CfgError::MalformedInput(format!(
            "expected a JSON object, got: {arg}"
        )));
    }
    request::parse_str(arg)
}

/// A numeric argument selects by id, anything else by code.
#[must_use]
pub fn parse_selector(arg: &str) -> Selector {
    arg.trim()
        .parse::<i64>()
        .map_or_else(|_| Selector::Code(arg.to_string()), Selector::Id)
}

#[derive(Debug, Default, Deserialize)]
struct AttributeQuery {
    #[serde(default)]
    attribute: Option<String>,
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    feature: Option<String>,
}

/// `CODE`, `ID`, or a JSON object with exactly one of
/// `attribute`, `id` or `feature`.
pub fn parse_attribute_selector(arg: &str) -> Result<AttributeSelector, CfgError> {
    if !arg.trim_start().starts_with('{') {
        return Ok(match parse_selector(arg) {
            Selector::Id(id) => AttributeSelector::Id(id),
            Selector::Code(code) => AttributeSelector::Code(code),
        });
    }
    let query: AttributeQuery = request::parse_str(arg)?;
    match (query.attribute, query.id, query.feature) {
        (Some(code), None, None) => Ok(AttributeSelector::Code(code)),
        (None, Some(id), None) => Ok(AttributeSelector::Id(id)),
        (None, None, Some(feature)) => Ok(AttributeSelector::Feature(feature)),
        _ => Err(CfgError::MalformedInput(
            "select attributes by exactly one of attribute, id or feature".to_string(),
        )),
    }
}

fn selector_label(selector: &Selector) -> String {
    match selector {
        Selector::Code(code) => code.clone(),
        Selector::Id(id) => id.to_string(),
    }
}

// =============================================================================
// DISPATCH
// =============================================================================

/// Run one command against the store.
///
/// The caller saves the store afterwards if [`ConfigStore::is_updated`];
/// `mirror-load` replaces the store and saves it itself.
pub fn apply(
    store: &mut ConfigStore,
    command: &Commands,
    settings: &Settings,
) -> Result<Report, CfgError> {
    match command {
        // ---- data sources, entity classes and types ----
        Commands::ListDataSources => Report::listing("data sources", &store.data_sources().sorted_by_id()),
        Commands::AddDataSource { args } => {
            let spec: DataSourceSpec = code_or_json(args, "datasource")?;
            let id = store.add_data_source(&spec)?;
            Ok(Report::added("data source", &spec.code.trim().to_uppercase(), id))
        }
        Commands::DeleteDataSource { code } => {
            let deletion = store.delete_data_source(code)?;
            Report::deleted("data source", code, &deletion)
        }

        Commands::ListEntityClasses => {
            Report::listing("entity classes", &store.entity_classes().sorted_by_id())
        }
        Commands::AddEntityClass { args } => {
            let spec: EntityClassSpec = code_or_json(args, "entityclass")?;
            let id = store.add_entity_class(&spec)?;
            Ok(Report::added("entity class", &spec.code.trim().to_uppercase(), id))
        }
        Commands::DeleteEntityClass { code } => {
            let deletion = store.delete_entity_class(code)?;
            Report::deleted("entity class", code, &deletion)
        }

        Commands::ListEntityTypes => Report::listing("entity types", &store.list_entity_types()),
        Commands::AddEntityType { args } => {
            let spec: EntityTypeSpec = code_or_json(args, "entitytype")?;
            let id = store.add_entity_type(&spec)?;
            Ok(Report::added("entity type", &spec.code.trim().to_uppercase(), id))
        }
        Commands::DeleteEntityType { code } => {
            let deletion = store.delete_entity_type(code)?;
            Report::deleted("entity type", code, &deletion)
        }

        // ---- elements and features ----
        Commands::ListElements => Report::listing("elements", &store.elements().sorted_by_id()),
        Commands::AddElement { args } => {
            let spec: ElementSpec = code_or_json(args, "element")?;
            let id = store.add_element(&spec)?;
            Ok(Report::added("element", &spec.code.trim().to_uppercase(), id))
        }
        Commands::DeleteElement { code } => {
            let deletion = store.delete_element(code)?;
            Report::deleted("element", code, &deletion)
        }

        Commands::ListFeatureClasses => {
            Report::listing("feature classes", &store.feature_classes().sorted_by_id())
        }
        Commands::ListFeatures => Report::listing("features", &store.list_features()?),
        Commands::GetFeature { code } => {
            let view = store.get_feature(code)?;
            Ok(Report::new(format!("feature {}", view.feature), to_json(&view)?))
        }
        Commands::AddFeature { args } => {
            let spec: FeatureSpec = json_only(args)?;
            let id = store.add_feature(&spec)?;
            Ok(Report::added("feature", &spec.code.trim().to_uppercase(), id))
        }
        Commands::SetFeature { args } => {
            let update: FeatureUpdate = json_only(args)?;
            store.set_feature(&update)?;
            let view = store.get_feature(&update.code)?;
            Ok(Report::new(format!("feature {} updated", view.feature), to_json(&view)?))
        }
        Commands::DeleteFeature { code } => {
            let deletion = store.delete_feature(code)?;
            Report::deleted("feature", code, &deletion)
        }
        Commands::AddElementToFeature { args } => {
            let spec: FeatureElementSpec = json_only(args)?;
            let id = store.add_element_to_feature(&spec)?;
            Ok(Report::new(
                format!("element {} added to feature {}", spec.element, spec.feature),
                json!({ "feature": spec.feature, "element": spec.element, "id": id.value() }),
            ))
        }
        Commands::DeleteElementFromFeature { args } => {
            let pair: FeatureElementRef = json_only(args)?;
            let deletion = store.delete_element_from_feature(&pair)?;
            Ok(Report::new(
                format!(
                    "element {} removed from feature {} ({} rows)",
                    pair.element,
                    pair.feature,
                    deletion.total()
                ),
                to_json(&deletion)?,
            ))
        }
        Commands::AddToNameHash { args } => {
            let pair: FeatureElementRef = json_only(args)?;
            store.add_to_name_hash(&pair)?;
            Ok(Report::new(
                format!("{}.{} added to the name hasher", pair.feature, pair.element),
                Value::Null,
            ))
        }
        Commands::SetDistinct { state } => {
            store.set_distinct(state.is_on())?;
            let on = store.is_distinct_on();
            Ok(Report::new(
                format!("distinct processing is {}", if on { "on" } else { "off" }),
                json!({ "distinct": on }),
            ))
        }
        Commands::VerifyExpressionCalls => {
            Report::listing("expression call elements", &store.verify_expression_calls()?)
        }
        Commands::TemplateAdd { template, code } => {
            let template = Template::parse(template)?;
            let id = store.template_add(template, code)?;
            Ok(Report::added("feature", &code.trim().to_uppercase(), id))
        }
        Commands::ListFunctions { kind } => {
            let kind = FunctionKind::from(*kind);
            let functions = store.functions(kind).functions().sorted_by_id();
            Report::listing(&format!("{kind} functions"), &functions)
        }

        // ---- attributes ----
        Commands::ListAttributes => Report::listing("attributes", &store.attributes().sorted_by_id()),
        Commands::GetAttribute { selector } => {
            let selector = parse_attribute_selector(selector)?;
            Report::listing("attributes", &store.get_attributes(&selector)?)
        }
        Commands::AddAttribute { args } => {
            let spec: AttributeSpec = json_only(args)?;
            let id = store.add_attribute(&spec)?;
            Ok(Report::added("attribute", &spec.code.trim().to_uppercase(), id))
        }
        Commands::DeleteAttribute { selector } => {
            let parsed = parse_attribute_selector(selector)?;
            let deletion = store.delete_attributes(&parsed)?;
            Report::deleted("attribute", selector, &deletion)
        }

        // ---- fragments and rules ----
        Commands::ListFragments => Report::listing("fragments", &store.fragments().sorted_by_id()),
        Commands::GetFragment { selector } => {
            let fragment = store.get_fragment(&parse_selector(selector))?;
            Ok(Report::new(format!("fragment {}", fragment.code), to_json(fragment)?))
        }
        Commands::AddFragment { args } => {
            let spec: FragmentSpec = json_only(args)?;
            let id = store.add_fragment(&spec)?;
            Ok(Report::added("fragment", &spec.code.trim().to_uppercase(), id))
        }
        Commands::DeleteFragment { selector } => {
            let parsed = parse_selector(selector);
            let deletion = store.delete_fragment(&parsed)?;
            Report::deleted("fragment", &selector_label(&parsed), &deletion)
        }

        Commands::ListRules => Report::listing("rules", &store.rules().sorted_by_id()),
        Commands::GetRule { selector } => {
            let rule = store.get_rule(&parse_selector(selector))?;
            Ok(Report::new(format!("rule {}", rule.code), to_json(rule)?))
        }
        Commands::AddRule { args } => {
            let spec: RuleSpec = json_only(args)?;
            let id = store.add_rule(&spec)?;
            let code = store
                .rules()
                .by_id(id)
                .map_or_else(|| id.to_string(), |rule| rule.code.clone());
            Ok(Report::added("rule", &code, id))
        }
        Commands::DeleteRule { selector } => {
            let parsed = parse_selector(selector);
            let deletion = store.delete_rule(&parsed)?;
            Report::deleted("rule", &selector_label(&parsed), &deletion)
        }

        // ---- system ----
        Commands::ListSystemParameters => {
            let params = store.system_parameters();
            Ok(Report::new("system parameters", to_json(&params)?))
        }
        Commands::SetSystemParameter { name, value } => {
            let touched = store.set_system_parameter(name, value)?;
            Ok(Report::new(
                format!("{name} set to {value} on {touched} relationship types"),
                to_json(&store.system_parameters())?,
            ))
        }
        Commands::Check => {
            store.verify_keys()?;
            let features = store.list_features()?.len();
            let expression_links = store.verify_expression_calls()?.len();
            Ok(Report::new(
                format!("configuration ok: {features} features, {expression_links} expression links"),
                json!({ "features": features, "expressionLinks": expression_links }),
            ))
        }
        Commands::Hash => {
            let hash = ercfg_core::formats::document_hash(store)?;
            Ok(Report::new(hash.clone(), json!({ "blake3": hash })))
        }

        // ---- mirror ----
        Commands::MirrorSync => {
            let mirror = RedbMirror::open(settings.mirror_path()?)?;
            let report = mirror.sync(store)?;
            let synced: Vec<Value> = report
                .synced
                .iter()
                .map(|(table, rows)| json!({ "table": table, "rows": rows }))
                .collect();
            let message = if report.is_complete() {
                format!("{} rows mirrored in {} tables", report.total_rows(), synced.len())
            } else {
                format!(
                    "{} rows mirrored, {} tables failed",
                    report.total_rows(),
                    report.failed.len()
                )
            };
            let failed: Vec<Value> = report
                .failed
                .iter()
                .map(|(table, error)| json!({ "table": table, "error": error }))
                .collect();
            Ok(Report::new(message, json!({ "synced": synced, "failed": failed })))
        }
        Commands::MirrorLoad => {
            let mirror = RedbMirror::open(settings.mirror_path()?)?;
            *store = mirror.load()?;
            let backup = save_store(store, settings.config_path()?, settings.backup)?;
            Ok(Report::new(
                format!("configuration replaced from mirror ({} features)", store.features().len()),
                json!({ "backup": backup.map(|p| p.display().to_string()) }),
            ))
        }
    }
}

// =============================================================================
// EXECUTE
// =============================================================================

/// Resolve settings, load the document, run the command, save if it
/// changed, and print the report.
pub fn execute(cli: Cli) -> Result<(), CfgError> {
    let settings = Settings::resolve(cli.settings.as_deref())?
        .with_overrides(cli.config, cli.mirror);
    let path = settings.config_path()?.to_path_buf();

    let mut store = load_store(&path)?;
    let report = apply(&mut store, &cli.command, &settings)?;
    if store.is_updated() {
        save_store(&mut store, &path, settings.backup)?;
    }

    if cli.json_mode {
        println!("{}", report.render_json()?);
    } else {
        println!("{}", report.render_text()?);
    }
    Ok(())
}
