//! Reference evaluation engine.
//!
//! Evaluates a practical subset of the configuration language: variables,
//! locals, providers with aliases, resources and data sources with `count`,
//! `for_each` and `provider`, nested blocks shaped by the provider schema,
//! and outputs. Modules and `dynamic` blocks are rejected.
//!
//! Declarations are resolved in waves. Each wave evaluates every pending
//! declaration whose references are available; the provider calls of all
//! resources that became ready run concurrently. A wave without progress
//! reports the diagnostic of the first unresolved declaration.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use hcl::eval::{Context, Evaluate};
use hcl::expr::TraversalOperator;
use hcl::{Block, Body, Expression};
use indexmap::IndexMap;
use tracing::{debug, info, warn};
use tspec_provider::{
    errors, BlockSchema, ConfigureRequest, Diagnostic, NestingMode, PlanRequest,
    ReadDataRequest, ReadResourceRequest, Schema, Transport, ValidateRequest,
};
use tspec_spec::{
    Address, InstanceKey, ProviderIdentity, ResourceMode, Value, ValueMap, UNKNOWN_SENTINEL,
};

use super::configuration::Configuration;
use super::functions;
use super::version::{Version, VersionConstraint};
use super::{Engine, EvaluationRequest, TransportFactory};
use crate::error::{EngineError, EngineResult};
use crate::plan::{OutputValue, Plan, PlannedInstance};

/// Version reported by [`HclEngine`].
pub const ENGINE_VERSION: Version = Version {
    major: 1,
    minor: 6,
    patch: 0,
};

/// Arguments handled by the engine itself rather than the provider.
const META_ARGUMENTS: &[&str] = &["count", "for_each", "provider", "depends_on"];
const META_BLOCKS: &[&str] = &["lifecycle", "provisioner", "connection"];
const PROVIDER_META_ARGUMENTS: &[&str] = &["alias", "version"];

/// Upper bound on `count`; larger values are an evaluation error.
pub const MAX_COUNT: i64 = 10_000;

/// Engine evaluating `*.tf` files directly.
#[derive(Debug, Clone)]
pub struct HclEngine {
    version: Version,
}

impl Default for HclEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl HclEngine {
    pub fn new() -> Self {
        Self {
            version: ENGINE_VERSION,
        }
    }

    /// Report a different engine version.
    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    fn check_required_version(&self, configuration: &Configuration) -> EngineResult<()> {
        let Some(constraint) = &configuration.required_version else {
            return Ok(());
        };
        let parsed = VersionConstraint::parse(constraint)
            .map_err(|e| EngineError::evaluation("terraform", e))?;
        if !parsed.matches(&self.version) {
            return Err(EngineError::evaluation(
                "terraform",
                format!(
                    "this configuration requires version {}, but the engine is {}",
                    constraint, self.version
                ),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Engine for HclEngine {
    fn version(&self) -> Version {
        self.version
    }

    async fn compute_plan(
        &self,
        request: &EvaluationRequest,
        transports: &dyn TransportFactory,
    ) -> EngineResult<Plan> {
        self.check_required_version(&request.configuration)?;
        let model = Model::build(&request.configuration)?;
        let mut evaluation = Evaluation::new(model, request, transports)?;
        evaluation.run().await?;
        let plan = evaluation.into_plan();
        info!(
            instances = plan.instances.len(),
            outputs = plan.outputs.len(),
            "Computed plan"
        );
        Ok(plan)
    }
}

struct VariableDecl {
    name: String,
    default: Option<Expression>,
}

struct ResourceDecl {
    mode: ResourceMode,
    type_name: String,
    name: String,
    provider: ProviderIdentity,
    count: Option<Expression>,
    for_each: Option<Expression>,
    body: Body,
}

impl ResourceDecl {
    fn address(&self) -> Address {
        Address {
            mode: self.mode,
            type_name: self.type_name.clone(),
            name: self.name.clone(),
            key: None,
        }
    }
}

struct OutputDecl {
    name: String,
    value: Expression,
    sensitive: bool,
}

/// Declarations of a configuration.
#[derive(Default)]
struct Model {
    variables: Vec<VariableDecl>,
    locals: Vec<(String, Expression)>,
    providers: HashMap<ProviderIdentity, Body>,
    resources: Vec<ResourceDecl>,
    outputs: Vec<OutputDecl>,
    /// Provider identities used by resources, in order of first use.
    used_providers: Vec<ProviderIdentity>,
}

impl Model {
    fn build(configuration: &Configuration) -> EngineResult<Self> {
        let mut model = Model::default();
        let empty = Context::new();

        for (_, block) in configuration.blocks() {
            let labels: Vec<&str> = block.labels().iter().map(|l| l.as_str()).collect();
            match (block.identifier(), labels.as_slice()) {
                ("terraform", _) => {}
                ("variable", [name]) => model.variables.push(VariableDecl {
                    name: name.to_string(),
                    default: attribute(block.body(), "default").cloned(),
                }),
                ("locals", []) => {
                    for attr in block.body().attributes() {
                        if model.locals.iter().any(|(name, _)| name == attr.key()) {
                            return Err(EngineError::evaluation(
                                format!("local.{}", attr.key()),
                                "duplicate local value",
                            ));
                        }
                        model.locals.push((attr.key().to_string(), attr.expr().clone()));
                    }
                }
                ("provider", [provider_type]) => {
                    let mut identity = ProviderIdentity::new(*provider_type);
                    if let Some(expr) = attribute(block.body(), "alias") {
                        match expr.evaluate(&empty) {
                            Ok(hcl::Value::String(alias)) => identity = identity.with_alias(alias),
                            _ => {
                                return Err(EngineError::evaluation(
                                    provider_label(&identity),
                                    "alias must be a literal string",
                                ))
                            }
                        }
                    }
                    if model.providers.contains_key(&identity) {
                        return Err(EngineError::evaluation(
                            provider_label(&identity),
                            "duplicate provider configuration",
                        ));
                    }
                    model.providers.insert(identity, block.body().clone());
                }
                (keyword @ ("resource" | "data"), [type_name, name]) => {
                    let mode = if keyword == "data" {
                        ResourceMode::Data
                    } else {
                        ResourceMode::Managed
                    };
                    let decl = Self::resource(mode, type_name, name, block)?;
                    if model.resources.iter().any(|r| r.address() == decl.address()) {
                        return Err(EngineError::evaluation(
                            decl.address().to_string(),
                            "duplicate resource declaration",
                        ));
                    }
                    model.resources.push(decl);
                }
                ("output", [name]) => {
                    let value = attribute(block.body(), "value").cloned().ok_or_else(|| {
                        EngineError::evaluation(format!("output.{}", name), "missing `value`")
                    })?;
                    let sensitive = match attribute(block.body(), "sensitive") {
                        Some(expr) => matches!(expr.evaluate(&empty), Ok(hcl::Value::Bool(true))),
                        None => false,
                    };
                    model.outputs.push(OutputDecl {
                        name: name.to_string(),
                        value,
                        sensitive,
                    });
                }
                ("module", labels) => {
                    return Err(EngineError::evaluation(
                        format!("module.{}", labels.first().copied().unwrap_or_default()),
                        "modules are not supported",
                    ))
                }
                (keyword @ ("variable" | "locals" | "provider" | "resource" | "data" | "output"), labels) => {
                    return Err(EngineError::evaluation(
                        keyword,
                        format!("unexpected number of labels ({})", labels.len()),
                    ))
                }
                (other, _) => debug!("Ignoring unsupported block `{}`", other),
            }
        }

        for decl in &model.resources {
            if decl.provider.alias.is_some() && !model.providers.contains_key(&decl.provider) {
                return Err(EngineError::evaluation(
                    decl.address().to_string(),
                    format!("provider {} is not declared", decl.provider),
                ));
            }
            if !model.used_providers.contains(&decl.provider) {
                model.used_providers.push(decl.provider.clone());
            }
        }
        Ok(model)
    }

    fn resource(mode: ResourceMode, type_name: &str, name: &str, block: &Block) -> EngineResult<ResourceDecl> {
        let address = Address {
            mode,
            type_name: type_name.to_string(),
            name: name.to_string(),
            key: None,
        };
        let body = block.body();
        if contains_dynamic(body) {
            return Err(EngineError::evaluation(
                address.to_string(),
                "dynamic blocks are not supported",
            ));
        }
        let count = attribute(body, "count").cloned();
        let for_each = attribute(body, "for_each").cloned();
        if count.is_some() && for_each.is_some() {
            return Err(EngineError::evaluation(
                address.to_string(),
                "`count` and `for_each` are mutually exclusive",
            ));
        }
        let provider = match attribute(body, "provider") {
            Some(expr) => provider_reference(expr).ok_or_else(|| {
                EngineError::evaluation(
                    address.to_string(),
                    "`provider` must reference a provider such as `widget` or `widget.alias`",
                )
            })?,
            None => address.implied_provider(),
        };
        Ok(ResourceDecl {
            mode,
            type_name: type_name.to_string(),
            name: name.to_string(),
            provider,
            count,
            for_each,
            body: body.clone(),
        })
    }
}

fn attribute<'b>(body: &'b Body, key: &str) -> Option<&'b Expression> {
    body.attributes().find(|a| a.key() == key).map(|a| a.expr())
}

fn contains_dynamic(body: &Body) -> bool {
    body.blocks()
        .any(|b| b.identifier() == "dynamic" || contains_dynamic(b.body()))
}

/// Parse a `provider` meta-argument: `widget`, `widget.alias` or a string.
fn provider_reference(expr: &Expression) -> Option<ProviderIdentity> {
    match expr {
        Expression::Variable(var) => Some(ProviderIdentity::new(var.as_str())),
        Expression::Traversal(traversal) => {
            let Expression::Variable(var) = &traversal.expr else {
                return None;
            };
            match traversal.operators.as_slice() {
                [TraversalOperator::GetAttr(alias)] => {
                    Some(ProviderIdentity::new(var.as_str()).with_alias(alias.as_str()))
                }
                _ => None,
            }
        }
        Expression::String(s) => ProviderIdentity::parse(s),
        _ => None,
    }
}

fn provider_label(identity: &ProviderIdentity) -> String {
    match &identity.alias {
        Some(alias) => format!("provider[\"{}\"].{}", identity.provider_type, alias),
        None => format!("provider[\"{}\"]", identity.provider_type),
    }
}

fn check_diagnostics(label: &str, diagnostics: &[Diagnostic]) -> EngineResult<()> {
    for diagnostic in diagnostics.iter().filter(|d| !d.is_error()) {
        warn!(address = %label, "{}", diagnostic);
    }
    let failures = errors(diagnostics);
    if failures.is_empty() {
        return Ok(());
    }
    let message = failures
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join("; ");
    Err(EngineError::evaluation(label, message))
}

/// Why a declaration could not be evaluated in this wave.
enum NodeError {
    /// A reference is not available yet; retried next wave.
    Pending(EngineError),
    /// The declaration can never evaluate.
    Fatal(EngineError),
}

/// How the instances of a resource are exposed to references.
#[derive(Clone, Copy)]
enum Shape {
    Single,
    Counted,
    Keyed,
}

struct ProviderState {
    transport: Arc<dyn Transport>,
    schema: Schema,
    configured: bool,
}

struct Evaluation<'a> {
    model: Model,
    transports: &'a dyn TransportFactory,
    workspace: String,
    root: String,
    vars: hcl::Map<String, hcl::Value>,
    locals: hcl::Map<String, hcl::Value>,
    providers: HashMap<ProviderIdentity, ProviderState>,
    /// Values of resolved resources, by declaration index.
    resolved: HashMap<usize, hcl::Value>,
    instances: Vec<PlannedInstance>,
    outputs: Vec<(usize, OutputValue)>,
}

impl<'a> Evaluation<'a> {
    fn new(model: Model, request: &EvaluationRequest, transports: &'a dyn TransportFactory) -> EngineResult<Self> {
        let empty = Context::new();
        let mut vars = hcl::Map::new();
        for decl in &model.variables {
            let value = match (request.variables.get(&decl.name), &decl.default) {
                (Some(value), _) => hcl::Value::from(value.clone()),
                (None, Some(default)) => default.evaluate(&empty).map_err(|e| {
                    EngineError::evaluation(format!("var.{}", decl.name), e.to_string())
                })?,
                (None, None) => {
                    return Err(EngineError::evaluation(
                        format!("var.{}", decl.name),
                        "no value given for required variable",
                    ))
                }
            };
            vars.insert(decl.name.clone(), value);
        }
        for name in request.variables.keys() {
            if !model.variables.iter().any(|v| &v.name == name) {
                warn!("Value given for undeclared variable `{}`", name);
            }
        }

        Ok(Self {
            model,
            transports,
            workspace: request.workspace.clone(),
            root: request.configuration.dir.display().to_string(),
            vars,
            locals: hcl::Map::new(),
            providers: HashMap::new(),
            resolved: HashMap::new(),
            instances: Vec::new(),
            outputs: Vec::new(),
        })
    }

    fn into_plan(mut self) -> Plan {
        self.instances.sort_by(|a, b| a.address.cmp(&b.address));
        self.outputs.sort_by_key(|(index, _)| *index);
        Plan {
            instances: self.instances,
            outputs: self.outputs.into_iter().map(|(_, output)| output).collect(),
        }
    }

    /// Evaluation context holding everything resolved so far.
    fn context(&self) -> Context<'static> {
        let mut ctx = Context::new();
        functions::declare(&mut ctx);
        ctx.declare_var("var", hcl::Value::Object(self.vars.clone()));
        ctx.declare_var("local", hcl::Value::Object(self.locals.clone()));
        ctx.declare_var(
            "terraform",
            object([("workspace", hcl::Value::String(self.workspace.clone()))]),
        );
        let cwd = std::env::current_dir()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| self.root.clone());
        ctx.declare_var(
            "path",
            object([
                ("module", hcl::Value::String(self.root.clone())),
                ("root", hcl::Value::String(self.root.clone())),
                ("cwd", hcl::Value::String(cwd)),
            ]),
        );

        let mut managed: BTreeMap<&str, hcl::Map<String, hcl::Value>> = BTreeMap::new();
        let mut data: BTreeMap<&str, hcl::Map<String, hcl::Value>> = BTreeMap::new();
        for (index, value) in &self.resolved {
            let decl = &self.model.resources[*index];
            let bucket = match decl.mode {
                ResourceMode::Managed => managed.entry(decl.type_name.as_str()).or_default(),
                ResourceMode::Data => data.entry(decl.type_name.as_str()).or_default(),
            };
            bucket.insert(decl.name.clone(), value.clone());
        }
        let mut data_object = hcl::Map::new();
        for (type_name, names) in data {
            data_object.insert(type_name.to_string(), hcl::Value::Object(names));
        }
        ctx.declare_var("data", hcl::Value::Object(data_object));
        for (type_name, names) in managed {
            ctx.declare_var(type_name.to_string(), hcl::Value::Object(names));
        }
        ctx
    }

    async fn run(&mut self) -> EngineResult<()> {
        self.connect_providers().await?;

        let mut pending_locals: Vec<usize> = (0..self.model.locals.len()).collect();
        let mut pending_providers: Vec<ProviderIdentity> = self.model.used_providers.clone();
        let mut pending_resources: Vec<usize> = (0..self.model.resources.len()).collect();
        let mut pending_outputs: Vec<usize> = (0..self.model.outputs.len()).collect();
        let mut wave = 0;

        while !(pending_locals.is_empty()
            && pending_providers.is_empty()
            && pending_resources.is_empty()
            && pending_outputs.is_empty())
        {
            wave += 1;
            let mut progress = false;
            let mut blocked: Vec<EngineError> = Vec::new();
            let mut provider_configs = Vec::new();
            let mut ready = Vec::new();

            {
                let ctx = self.context();

                let mut still = Vec::new();
                for index in pending_locals {
                    let (name, expr) = &self.model.locals[index];
                    match expr.evaluate(&ctx) {
                        Ok(value) => {
                            self.locals.insert(name.clone(), value);
                            progress = true;
                        }
                        Err(e) => {
                            blocked.push(EngineError::evaluation(format!("local.{}", name), e.to_string()));
                            still.push(index);
                        }
                    }
                }
                pending_locals = still;

                let mut still = Vec::new();
                for identity in pending_providers {
                    match self.provider_config(&identity, &ctx) {
                        Ok(config) => provider_configs.push((identity, config)),
                        Err(NodeError::Pending(e)) => {
                            blocked.push(e);
                            still.push(identity);
                        }
                        Err(NodeError::Fatal(e)) => return Err(e),
                    }
                }
                pending_providers = still;

                let mut still = Vec::new();
                for index in pending_resources {
                    let decl = &self.model.resources[index];
                    if !self.is_configured(&decl.provider) {
                        blocked.push(EngineError::evaluation(
                            decl.address().to_string(),
                            format!("provider {} is not configured", decl.provider),
                        ));
                        still.push(index);
                        continue;
                    }
                    match self.expand(decl, &ctx) {
                        Ok((shape, instances)) => ready.push((index, shape, instances)),
                        Err(NodeError::Pending(e)) => {
                            blocked.push(e);
                            still.push(index);
                        }
                        Err(NodeError::Fatal(e)) => return Err(e),
                    }
                }
                pending_resources = still;

                let mut still = Vec::new();
                for index in pending_outputs {
                    let decl = &self.model.outputs[index];
                    match decl.value.evaluate(&ctx) {
                        Ok(value) => {
                            self.outputs.push((
                                index,
                                OutputValue {
                                    name: decl.name.clone(),
                                    value: Value::from(value),
                                    sensitive: decl.sensitive,
                                },
                            ));
                            progress = true;
                        }
                        Err(e) => {
                            blocked.push(EngineError::evaluation(
                                format!("output.{}", decl.name),
                                e.to_string(),
                            ));
                            still.push(index);
                        }
                    }
                }
                pending_outputs = still;
            }

            for (identity, config) in provider_configs {
                self.configure(&identity, config).await?;
                progress = true;
            }

            if !ready.is_empty() {
                progress = true;
                let results = {
                    let this = &*self;
                    join_all(
                        ready
                            .iter()
                            .map(|(index, _, instances)| this.plan_instances(*index, instances.clone())),
                    )
                    .await
                };
                for ((index, shape, _), result) in ready.into_iter().zip(results) {
                    self.store(index, shape, result?);
                }
            }

            if !progress {
                return Err(blocked
                    .into_iter()
                    .next()
                    .unwrap_or_else(|| EngineError::evaluation("configuration", "evaluation stalled")));
            }
            debug!(wave, "Evaluation wave complete");
        }
        Ok(())
    }

    async fn connect_providers(&mut self) -> EngineResult<()> {
        for identity in self.model.used_providers.clone() {
            let label = provider_label(&identity);
            let transport = self
                .transports
                .transport(&identity)
                .await
                .map_err(|e| EngineError::transport(&label, e))?;
            let schema = transport
                .get_schema()
                .await
                .map_err(|e| EngineError::transport(&label, e))?;
            debug!(provider = %identity, resources = schema.resource_schemas.len(), "Fetched provider schema");
            self.providers.insert(
                identity,
                ProviderState {
                    transport,
                    schema,
                    configured: false,
                },
            );
        }
        Ok(())
    }

    fn is_configured(&self, identity: &ProviderIdentity) -> bool {
        self.providers.get(identity).map_or(false, |p| p.configured)
    }

    fn provider_config(&self, identity: &ProviderIdentity, ctx: &Context<'_>) -> Result<Value, NodeError> {
        let label = provider_label(identity);
        let state = self.providers.get(identity).ok_or_else(|| {
            NodeError::Fatal(EngineError::evaluation(&label, "provider is not connected"))
        })?;
        let empty = Body::default();
        let body = self.model.providers.get(identity).unwrap_or(&empty);
        let schema = if state.schema.provider == BlockSchema::default() {
            None
        } else {
            Some(&state.schema.provider)
        };
        evaluate_body(body, schema, ctx, PROVIDER_META_ARGUMENTS, &[], &label)
    }

    async fn configure(&mut self, identity: &ProviderIdentity, config: Value) -> EngineResult<()> {
        let label = provider_label(identity);
        let transport = self
            .providers
            .get(identity)
            .map(|p| p.transport.clone())
            .ok_or_else(|| EngineError::evaluation(&label, "provider is not connected"))?;
        let diagnostics = transport
            .configure(ConfigureRequest { config })
            .await
            .map_err(|e| EngineError::transport(&label, e))?;
        check_diagnostics(&label, &diagnostics)?;
        if let Some(state) = self.providers.get_mut(identity) {
            state.configured = true;
        }
        debug!(provider = %identity, "Configured provider");
        Ok(())
    }

    fn schema_for(&self, decl: &ResourceDecl) -> Option<&BlockSchema> {
        let schema = &self.providers.get(&decl.provider)?.schema;
        let block = match decl.mode {
            ResourceMode::Managed => schema.resource_schemas.get(&decl.type_name),
            ResourceMode::Data => schema.data_source_schemas.get(&decl.type_name),
        };
        if block.is_none() {
            debug!(address = %decl.address(), "Provider has no schema for this type");
        }
        block
    }

    /// Instance addresses and configuration values of a resource.
    fn expand(&self, decl: &ResourceDecl, ctx: &Context<'_>) -> Result<(Shape, Vec<(Address, Value)>), NodeError> {
        let address = decl.address();
        let label = address.to_string();
        let schema = self.schema_for(decl);
        let config = |scope: &Context<'_>| {
            evaluate_body(&decl.body, schema, scope, META_ARGUMENTS, META_BLOCKS, &label)
        };

        if let Some(expr) = &decl.count {
            let value = expr
                .evaluate(ctx)
                .map_err(|e| NodeError::Pending(EngineError::evaluation(&label, format!("count: {}", e))))?;
            let count = count_value(&value).map_err(|message| {
                NodeError::Fatal(EngineError::evaluation(&label, format!("count: {}", message)))
            })?;
            let mut instances = Vec::new();
            for index in 0..count {
                let mut scope = ctx.clone();
                scope.declare_var("count", object([("index", hcl::Value::from(index))]));
                instances.push((
                    address.clone().with_key(InstanceKey::Int(index)),
                    config(&scope)?,
                ));
            }
            return Ok((Shape::Counted, instances));
        }

        if let Some(expr) = &decl.for_each {
            let value = expr
                .evaluate(ctx)
                .map_err(|e| NodeError::Pending(EngineError::evaluation(&label, format!("for_each: {}", e))))?;
            let entries = for_each_entries(value).map_err(|message| {
                NodeError::Fatal(EngineError::evaluation(&label, format!("for_each: {}", message)))
            })?;
            let mut instances = Vec::with_capacity(entries.len());
            for (key, value) in entries {
                let mut scope = ctx.clone();
                scope.declare_var(
                    "each",
                    object([("key", hcl::Value::String(key.clone())), ("value", value)]),
                );
                instances.push((address.clone().with_key(InstanceKey::Str(key)), config(&scope)?));
            }
            return Ok((Shape::Keyed, instances));
        }

        Ok((Shape::Single, vec![(address, config(ctx)?)]))
    }

    /// Run the provider calls for every instance of one resource.
    async fn plan_instances(&self, index: usize, instances: Vec<(Address, Value)>) -> EngineResult<Vec<(Address, Value)>> {
        let decl = &self.model.resources[index];
        let transport = self
            .providers
            .get(&decl.provider)
            .map(|p| p.transport.clone())
            .ok_or_else(|| {
                EngineError::evaluation(decl.address().to_string(), "provider is not connected")
            })?;

        let mut planned = Vec::with_capacity(instances.len());
        for (address, config) in instances {
            let label = address.to_string();
            let state = match decl.mode {
                ResourceMode::Managed => plan_managed(transport.as_ref(), &label, address.clone(), config).await?,
                ResourceMode::Data => read_data(transport.as_ref(), &label, address.clone(), config).await?,
            };
            planned.push((address, state));
        }
        Ok(planned)
    }

    fn store(&mut self, index: usize, shape: Shape, planned: Vec<(Address, Value)>) {
        let value = match shape {
            Shape::Single => planned
                .first()
                .map(|(_, v)| hcl::Value::from(v.clone()))
                .unwrap_or(hcl::Value::Null),
            Shape::Counted => hcl::Value::Array(planned.iter().map(|(_, v)| v.clone().into()).collect()),
            Shape::Keyed => {
                let mut map = hcl::Map::new();
                for (address, value) in &planned {
                    if let Some(InstanceKey::Str(key)) = &address.key {
                        map.insert(key.clone(), value.clone().into());
                    }
                }
                hcl::Value::Object(map)
            }
        };

        let provider = self.model.resources[index].provider.clone();
        for (address, values) in planned {
            self.instances.push(PlannedInstance {
                address,
                provider: provider.clone(),
                values,
            });
        }
        self.resolved.insert(index, value);
    }
}

async fn plan_managed(transport: &dyn Transport, label: &str, address: Address, config: Value) -> EngineResult<Value> {
    let diagnostics = transport
        .validate_resource_config(ValidateRequest {
            address: address.clone(),
            config: config.clone(),
        })
        .await
        .map_err(|e| EngineError::transport(label, e))?;
    check_diagnostics(label, &diagnostics)?;

    let refreshed = transport
        .read_resource(ReadResourceRequest {
            address: address.clone(),
            current_state: Value::Null,
        })
        .await
        .map_err(|e| EngineError::transport(label, e))?;
    check_diagnostics(label, &refreshed.diagnostics)?;

    let response = transport
        .plan_resource_change(PlanRequest {
            address,
            prior_state: refreshed.new_state.unwrap_or(Value::Null),
            proposed_new_state: config.clone(),
            config,
        })
        .await
        .map_err(|e| EngineError::transport(label, e))?;
    check_diagnostics(label, &response.diagnostics)?;
    Ok(response.planned_state)
}

async fn read_data(transport: &dyn Transport, label: &str, address: Address, config: Value) -> EngineResult<Value> {
    let diagnostics = transport
        .validate_data_source_config(ValidateRequest {
            address: address.clone(),
            config: config.clone(),
        })
        .await
        .map_err(|e| EngineError::transport(label, e))?;
    check_diagnostics(label, &diagnostics)?;

    let response = transport
        .read_data_source(ReadDataRequest { address, config })
        .await
        .map_err(|e| EngineError::transport(label, e))?;
    check_diagnostics(label, &response.diagnostics)?;
    Ok(response.state)
}

fn object<const N: usize>(entries: [(&str, hcl::Value); N]) -> hcl::Value {
    let mut map = hcl::Map::new();
    for (key, value) in entries {
        map.insert(key.to_string(), value);
    }
    hcl::Value::Object(map)
}

fn is_unknown(value: &hcl::Value) -> bool {
    matches!(value, hcl::Value::String(s) if s.contains(UNKNOWN_SENTINEL))
}

fn count_value(value: &hcl::Value) -> Result<i64, String> {
    if is_unknown(value) {
        return Err("value depends on attributes known only after apply".to_string());
    }
    let hcl::Value::Number(n) = value else {
        return Err(format!("expected a number, found {:?}", value));
    };
    let count = n
        .as_i64()
        .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
        .ok_or_else(|| format!("expected a whole number, found {}", n))?;
    if count < 0 {
        return Err(format!("must not be negative, found {}", count));
    }
    if count > MAX_COUNT {
        return Err(format!("must not exceed {}, found {}", MAX_COUNT, count));
    }
    Ok(count)
}

fn for_each_entries(value: hcl::Value) -> Result<Vec<(String, hcl::Value)>, String> {
    if is_unknown(&value) {
        return Err("value depends on attributes known only after apply".to_string());
    }
    match value {
        hcl::Value::Object(map) => Ok(map.into_iter().collect()),
        hcl::Value::Array(items) => {
            let mut entries: Vec<(String, hcl::Value)> = Vec::new();
            for item in items {
                let hcl::Value::String(key) = item else {
                    return Err("a list must contain only strings".to_string());
                };
                if !entries.iter().any(|(k, _)| k == &key) {
                    entries.push((key.clone(), hcl::Value::String(key)));
                }
            }
            Ok(entries)
        }
        other => Err(format!("expected a map or a set of strings, found {:?}", other)),
    }
}

/// Evaluate a block body into an object value shaped by `schema`.
fn evaluate_body(
    body: &Body,
    schema: Option<&BlockSchema>,
    ctx: &Context<'_>,
    skip_attributes: &[&str],
    skip_blocks: &[&str],
    label: &str,
) -> Result<Value, NodeError> {
    let mut object = ValueMap::new();
    for attr in body.attributes() {
        let key = attr.key();
        if skip_attributes.contains(&key) {
            continue;
        }
        if let Some(schema) = schema {
            if !schema.attributes.contains_key(key) {
                return Err(NodeError::Fatal(EngineError::evaluation(
                    label,
                    format!("unsupported argument `{}`", key),
                )));
            }
        }
        let value = attr.expr().evaluate(ctx).map_err(|e| {
            NodeError::Pending(EngineError::evaluation(label, format!("{}: {}", key, e)))
        })?;
        object.insert(key.to_string(), Value::from(value));
    }

    let mut blocks: IndexMap<String, Vec<Value>> = IndexMap::new();
    for block in body.blocks() {
        let name = block.identifier();
        if skip_blocks.contains(&name) {
            continue;
        }
        let nested = match schema {
            Some(schema) => match schema.block_types.get(name) {
                Some(nested) => Some(&nested.block),
                None => {
                    return Err(NodeError::Fatal(EngineError::evaluation(
                        label,
                        format!("unsupported block type `{}`", name),
                    )))
                }
            },
            None => None,
        };
        let value = evaluate_body(block.body(), nested, ctx, &[], &[], label)?;
        blocks.entry(name.to_string()).or_default().push(value);
    }

    if let Some(schema) = schema {
        for (name, nested) in &schema.block_types {
            let values = blocks.shift_remove(name).unwrap_or_default();
            let value = match nested.nesting {
                NestingMode::Single => {
                    if values.len() > 1 {
                        return Err(NodeError::Fatal(EngineError::evaluation(
                            label,
                            format!("at most one `{}` block is allowed", name),
                        )));
                    }
                    values.into_iter().next().unwrap_or(Value::Null)
                }
                NestingMode::List | NestingMode::Set => Value::List(values),
            };
            object.insert(name.clone(), value);
        }
        for name in schema.attributes.keys() {
            object.entry(name.clone()).or_insert(Value::Null);
        }
    }
    for (name, values) in blocks {
        object.insert(name, Value::List(values));
    }
    Ok(Value::Map(object))
}
