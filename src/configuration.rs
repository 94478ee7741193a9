//! Compiles mapping definitions into an immutable [`Configuration`].
//!
//! Definitions arrive already parsed, grouped in [`SqlMapDef`] documents that
//! may carry a namespace. With statement namespaces enabled every id is
//! qualified as `namespace.id`, and a reference is first looked up in its own
//! namespace, then as written. Everything that can be checked without a live
//! parameter object is checked here.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::cache::{CacheModel, CacheModelDef};
use crate::config::MapperSettings;
use crate::errors::ConfigurationError;
use crate::parameters::{ParameterMap, ParameterMapDef, ParameterProperty, Registries};
use crate::results::{AutoResultMap, ResultMap, ResultMapDef, ResultMaps};
use crate::statement::{MappedStatement, SelectKey, StatementDef, StatementKind};
use crate::template::TemplateBuilder;
use crate::type_handlers::TypeHandlerRegistry;
use crate::types::{ClassDef, ResolutionError, TypeKind, TypeRegistry};

/// One mapping document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqlMapDef {
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub parameter_maps: Vec<ParameterMapDef>,
    #[serde(default)]
    pub result_maps: Vec<ResultMapDef>,
    #[serde(default)]
    pub cache_models: Vec<CacheModelDef>,
    #[serde(default)]
    pub statements: Vec<StatementDef>,
}

impl SqlMapDef {
    pub fn new(namespace: Option<&str>) -> Self {
        SqlMapDef {
            namespace: namespace.map(str::to_string),
            ..Default::default()
        }
    }

    /// Parses a mapping document written in YAML.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigurationError> {
        serde_yaml::from_str(content).map_err(|e| ConfigurationError::Invalid {
            kind: "sql map",
            id: "yaml".to_string(),
            message: e.to_string(),
        })
    }

    pub fn parameter_map(mut self, def: ParameterMapDef) -> Self {
        self.parameter_maps.push(def);
        self
    }

    pub fn result_map(mut self, def: ResultMapDef) -> Self {
        self.result_maps.push(def);
        self
    }

    pub fn cache_model(mut self, def: CacheModelDef) -> Self {
        self.cache_models.push(def);
        self
    }

    pub fn statement(mut self, def: StatementDef) -> Self {
        self.statements.push(def);
        self
    }
}

pub struct ConfigurationBuilder {
    settings: MapperSettings,
    types: TypeRegistry,
    handlers: TypeHandlerRegistry,
    sql_maps: Vec<SqlMapDef>,
}

impl Default for ConfigurationBuilder {
    fn default() -> Self {
        Self::new(MapperSettings::default())
    }
}

impl ConfigurationBuilder {
    pub fn new(settings: MapperSettings) -> Self {
        ConfigurationBuilder {
            settings,
            types: TypeRegistry::new(),
            handlers: TypeHandlerRegistry::new(),
            sql_maps: Vec::new(),
        }
    }

    pub fn settings(&self) -> &MapperSettings {
        &self.settings
    }

    pub fn types_mut(&mut self) -> &mut TypeRegistry {
        &mut self.types
    }

    pub fn handlers_mut(&mut self) -> &mut TypeHandlerRegistry {
        &mut self.handlers
    }

    pub fn register_class(&mut self, class: ClassDef) -> Result<&mut Self, ConfigurationError> {
        let name = class.name().to_string();
        self.types
            .register_class(class)
            .map_err(|source| ConfigurationError::Resolution {
                kind: "class",
                id: name,
                source,
            })?;
        Ok(self)
    }

    pub fn register_alias(&mut self, alias: &str, target: &str) -> &mut Self {
        self.types.register_alias(alias, target);
        self
    }

    pub fn add_sql_map(&mut self, sql_map: SqlMapDef) -> &mut Self {
        self.sql_maps.push(sql_map);
        self
    }

    /// Definitions added one by one go to an unnamed document.
    fn default_map(&mut self) -> &mut SqlMapDef {
        let index = match self.sql_maps.iter().position(|m| m.namespace.is_none()) {
            Some(index) => index,
            None => {
                self.sql_maps.push(SqlMapDef::default());
                self.sql_maps.len() - 1
            }
        };
        &mut self.sql_maps[index]
    }

    pub fn add_statement(&mut self, def: StatementDef) -> &mut Self {
        self.default_map().statements.push(def);
        self
    }

    pub fn add_result_map(&mut self, def: ResultMapDef) -> &mut Self {
        self.default_map().result_maps.push(def);
        self
    }

    pub fn add_parameter_map(&mut self, def: ParameterMapDef) -> &mut Self {
        self.default_map().parameter_maps.push(def);
        self
    }

    pub fn add_cache_model(&mut self, def: CacheModelDef) -> &mut Self {
        self.default_map().cache_models.push(def);
        self
    }

    pub fn build(self) -> Result<Configuration, ConfigurationError> {
        let ConfigurationBuilder {
            settings,
            types,
            handlers,
            sql_maps,
        } = self;
        let registries = Registries {
            types: &types,
            handlers: &handlers,
        };
        let ids = Qualifier::collect(&sql_maps, settings.use_statement_namespaces)?;
        let defs = ids.qualify_all(sql_maps);

        let mut parameter_maps = HashMap::new();
        for id in defs.parameter_maps.keys() {
            compile_parameter_map(id, &defs.parameter_maps, &mut parameter_maps, &mut Vec::new(), registries)?;
        }

        let mut merged = HashMap::new();
        for id in defs.result_maps.keys() {
            merge_result_map(id, &defs.result_maps, &mut merged, &mut Vec::new())?;
        }
        let mut result_maps: ResultMaps = HashMap::with_capacity(merged.len());
        for (id, def) in &merged {
            let map = ResultMap::build(def, registries).map_err(|source| {
                ConfigurationError::Resolution {
                    kind: "result map",
                    id: id.clone(),
                    source,
                }
            })?;
            result_maps.insert(id.clone(), Arc::new(map));
        }
        for map in result_maps.values() {
            for nested in map.referenced_maps() {
                if !result_maps.contains_key(nested) {
                    return Err(unknown("result map", nested, map.id()));
                }
            }
            for statement in map.referenced_statements() {
                if !defs.statements.contains_key(statement) {
                    return Err(unknown("statement", statement, map.id()));
                }
            }
        }

        let mut cache_models = HashMap::new();
        for (id, def) in &defs.cache_models {
            def.validate()
                .map_err(|source| ConfigurationError::Validation {
                    kind: "cache model",
                    id: id.clone(),
                    source,
                })?;
            for statement in &def.flush_on_execute {
                if !defs.statements.contains_key(statement) {
                    return Err(unknown("statement", statement, id));
                }
            }
            cache_models.insert(
                id.clone(),
                Arc::new(CacheModel::new(def, settings.default_cache_size)),
            );
        }

        let mut statements = HashMap::with_capacity(defs.statements.len());
        for (id, def) in &defs.statements {
            let statement = compile_statement(
                def,
                registries,
                &parameter_maps,
                &result_maps,
                &cache_models,
            )?;
            statements.insert(id.clone(), Arc::new(statement));
        }

        let mut flush_triggers: HashMap<String, Vec<Arc<CacheModel>>> = HashMap::new();
        for model in cache_models.values() {
            for statement in model.flush_on_execute() {
                flush_triggers
                    .entry(statement.clone())
                    .or_default()
                    .push(model.clone());
            }
        }

        log::info!(
            "Compiled {} statements, {} result maps, {} parameter maps, {} cache models",
            statements.len(),
            result_maps.len(),
            parameter_maps.len(),
            cache_models.len()
        );
        Ok(Configuration {
            settings,
            types,
            handlers,
            statements,
            result_maps,
            parameter_maps,
            cache_models,
            flush_triggers,
        })
    }
}

fn unknown(kind: &'static str, id: &str, referenced_by: &str) -> ConfigurationError {
    ConfigurationError::UnknownReference {
        kind,
        id: id.to_string(),
        referenced_by: referenced_by.to_string(),
    }
}

fn resolution(kind: &'static str, id: &str) -> impl FnOnce(ResolutionError) -> ConfigurationError {
    let id = id.to_string();
    move |source| ConfigurationError::Resolution { kind, id, source }
}

/// Qualified ids of every definition, by kind.
struct Qualifier {
    namespaces: bool,
    parameter_maps: HashSet<String>,
    result_maps: HashSet<String>,
    cache_models: HashSet<String>,
    statements: HashSet<String>,
}

/// Definitions keyed by qualified id, references rewritten to qualified ids.
struct QualifiedDefs {
    parameter_maps: HashMap<String, ParameterMapDef>,
    result_maps: HashMap<String, ResultMapDef>,
    cache_models: HashMap<String, CacheModelDef>,
    statements: HashMap<String, StatementDef>,
}

impl Qualifier {
    fn collect(sql_maps: &[SqlMapDef], namespaces: bool) -> Result<Self, ConfigurationError> {
        let mut ids = Qualifier {
            namespaces,
            parameter_maps: HashSet::new(),
            result_maps: HashSet::new(),
            cache_models: HashSet::new(),
            statements: HashSet::new(),
        };
        for map in sql_maps {
            let ns = map.namespace.as_deref();
            for def in &map.parameter_maps {
                insert_unique(&mut ids.parameter_maps, ids_qualified(namespaces, ns, &def.id), "parameter map")?;
            }
            for def in &map.result_maps {
                insert_unique(&mut ids.result_maps, ids_qualified(namespaces, ns, &def.id), "result map")?;
            }
            for def in &map.cache_models {
                insert_unique(&mut ids.cache_models, ids_qualified(namespaces, ns, &def.id), "cache model")?;
            }
            for def in &map.statements {
                insert_unique(&mut ids.statements, ids_qualified(namespaces, ns, &def.id), "statement")?;
            }
        }
        Ok(ids)
    }

    /// Id of `name` referenced from namespace `ns`: the namespace-local id
    /// when it exists, otherwise `name` as written.
    fn reference(&self, known: &HashSet<String>, ns: Option<&str>, name: &str) -> String {
        let name = name.trim();
        match ns {
            Some(ns) if self.namespaces => {
                let local = format!("{}.{}", ns, name);
                if known.contains(&local) {
                    local
                } else {
                    name.to_string()
                }
            }
            _ => name.to_string(),
        }
    }

    fn qualify_all(&self, sql_maps: Vec<SqlMapDef>) -> QualifiedDefs {
        let mut defs = QualifiedDefs {
            parameter_maps: HashMap::new(),
            result_maps: HashMap::new(),
            cache_models: HashMap::new(),
            statements: HashMap::new(),
        };
        for map in sql_maps {
            let ns = map.namespace.as_deref();
            let qualify = |id: &str| ids_qualified(self.namespaces, ns, id);

            for mut def in map.parameter_maps {
                def.id = qualify(&def.id);
                def.extends = def.extends.map(|b| self.reference(&self.parameter_maps, ns, &b));
                defs.parameter_maps.insert(def.id.clone(), def);
            }
            for mut def in map.result_maps {
                def.id = qualify(&def.id);
                def.extends = def.extends.map(|b| self.reference(&self.result_maps, ns, &b));
                for result in def.constructor.iter_mut().chain(def.results.iter_mut()) {
                    result.result_map = result
                        .result_map
                        .take()
                        .map(|m| self.reference(&self.result_maps, ns, &m));
                    result.select = result
                        .select
                        .take()
                        .map(|s| self.reference(&self.statements, ns, &s));
                }
                if let Some(discriminator) = &mut def.discriminator {
                    for case in &mut discriminator.cases {
                        case.result_map = self.reference(&self.result_maps, ns, &case.result_map);
                    }
                }
                defs.result_maps.insert(def.id.clone(), def);
            }
            for mut def in map.cache_models {
                def.id = qualify(&def.id);
                def.flush_on_execute = def
                    .flush_on_execute
                    .iter()
                    .map(|s| self.reference(&self.statements, ns, s))
                    .collect();
                defs.cache_models.insert(def.id.clone(), def);
            }
            for mut def in map.statements {
                def.id = qualify(&def.id);
                def.parameter_map = def
                    .parameter_map
                    .map(|m| self.reference(&self.parameter_maps, ns, &m));
                def.result_maps = def
                    .result_maps
                    .iter()
                    .map(|m| self.reference(&self.result_maps, ns, m))
                    .collect();
                def.cache_model = def
                    .cache_model
                    .map(|c| self.reference(&self.cache_models, ns, &c));
                defs.statements.insert(def.id.clone(), def);
            }
        }
        defs
    }
}

fn ids_qualified(namespaces: bool, ns: Option<&str>, id: &str) -> String {
    match ns {
        Some(ns) if namespaces => format!("{}.{}", ns, id.trim()),
        _ => id.trim().to_string(),
    }
}

fn insert_unique(
    ids: &mut HashSet<String>,
    id: String,
    kind: &'static str,
) -> Result<(), ConfigurationError> {
    if ids.contains(&id) {
        return Err(ConfigurationError::DuplicateId { kind, id });
    }
    ids.insert(id);
    Ok(())
}

/// Compiles `id` after its base. `chain` holds the maps being compiled.
fn compile_parameter_map(
    id: &str,
    defs: &HashMap<String, ParameterMapDef>,
    done: &mut HashMap<String, Arc<ParameterMap>>,
    chain: &mut Vec<String>,
    registries: Registries<'_>,
) -> Result<Arc<ParameterMap>, ConfigurationError> {
    if let Some(map) = done.get(id) {
        return Ok(map.clone());
    }
    if chain.iter().any(|c| c == id) {
        return Err(ConfigurationError::CyclicExtends {
            kind: "parameter map",
            id: id.to_string(),
        });
    }
    let referenced_by = chain.last().cloned().unwrap_or_default();
    let def = defs
        .get(id)
        .ok_or_else(|| unknown("parameter map", id, &referenced_by))?;

    chain.push(id.to_string());
    let base = match &def.extends {
        Some(base) => Some(compile_parameter_map(base, defs, done, chain, registries)?),
        None => None,
    };
    chain.pop();

    let class = match &def.class {
        Some(name) => Some(
            registries
                .types
                .resolve(name)
                .map_err(resolution("parameter map", id))?,
        ),
        None => base.as_ref().and_then(|b| b.class().cloned()),
    };
    let mut map = ParameterMap::new(id, class.clone());
    for parameter in &def.parameters {
        let property = ParameterProperty::resolve(parameter, class.as_ref(), registries)
            .map_err(resolution("parameter map", id))?;
        map.add_property(property);
    }
    if let Some(base) = &base {
        map.extend_from(base);
    }
    let map = Arc::new(map);
    done.insert(id.to_string(), map.clone());
    Ok(map)
}

fn merge_result_map(
    id: &str,
    defs: &HashMap<String, ResultMapDef>,
    merged: &mut HashMap<String, ResultMapDef>,
    chain: &mut Vec<String>,
) -> Result<ResultMapDef, ConfigurationError> {
    if let Some(def) = merged.get(id) {
        return Ok(def.clone());
    }
    if chain.iter().any(|c| c == id) {
        return Err(ConfigurationError::CyclicExtends {
            kind: "result map",
            id: id.to_string(),
        });
    }
    let referenced_by = chain.last().cloned().unwrap_or_default();
    let def = defs
        .get(id)
        .ok_or_else(|| unknown("result map", id, &referenced_by))?;
    let result = match &def.extends {
        Some(base) => {
            chain.push(id.to_string());
            let base = merge_result_map(base, defs, merged, chain)?;
            chain.pop();
            def.merged_with(&base)
        }
        None => def.clone(),
    };
    merged.insert(id.to_string(), result.clone());
    Ok(result)
}

fn compile_statement(
    def: &StatementDef,
    registries: Registries<'_>,
    parameter_maps: &HashMap<String, Arc<ParameterMap>>,
    result_maps: &ResultMaps,
    cache_models: &HashMap<String, Arc<CacheModel>>,
) -> Result<MappedStatement, ConfigurationError> {
    let id = def.id.as_str();
    let parameter_map = match &def.parameter_map {
        Some(name) => Some(
            parameter_maps
                .get(name)
                .cloned()
                .ok_or_else(|| unknown("parameter map", name, id))?,
        ),
        None => None,
    };
    let parameter_class = match &def.parameter_class {
        Some(name) => Some(
            registries
                .types
                .resolve(name)
                .map_err(resolution("statement", id))?,
        ),
        None => parameter_map.as_ref().and_then(|m| m.class().cloned()),
    };

    let mut builder = TemplateBuilder::new(registries, parameter_class.clone());
    if parameter_map.is_some() {
        builder = builder.without_inline_parameters();
    }
    let template = builder
        .build(&def.body)
        .map_err(|source| ConfigurationError::Template {
            statement: id.to_string(),
            source,
        })?;

    let mut maps = Vec::with_capacity(def.result_maps.len());
    for name in &def.result_maps {
        maps.push(
            result_maps
                .get(name)
                .cloned()
                .ok_or_else(|| unknown("result map", name, id))?,
        );
    }
    let result_class = match &def.result_class {
        Some(name) => Some(
            registries
                .types
                .resolve(name)
                .map_err(resolution("statement", id))?,
        ),
        None => None,
    };
    let auto_map = match &result_class {
        Some(class @ TypeKind::Class(_)) => Some(AutoResultMap::new(class.clone())),
        _ => None,
    };

    let cache_model = match &def.cache_model {
        Some(name) => Some(
            cache_models
                .get(name)
                .cloned()
                .ok_or_else(|| unknown("cache model", name, id))?,
        ),
        None => None,
    };

    let select_key = match &def.select_key {
        Some(key) => {
            if def.kind != StatementKind::Insert {
                return Err(ConfigurationError::Invalid {
                    kind: "statement",
                    id: id.to_string(),
                    message: format!("selectKey is only allowed on insert, not on {}", def.kind),
                });
            }
            let owner = match &parameter_class {
                Some(kind @ TypeKind::Class(_)) => Some(kind),
                _ => None,
            };
            let accessor = registries
                .types
                .accessor(owner, &key.property)
                .map_err(resolution("statement", id))?;
            let result_class = match &key.result_class {
                Some(name) => Some(
                    registries
                        .types
                        .resolve(name)
                        .map_err(resolution("statement", id))?,
                ),
                None => None,
            };
            let template = TemplateBuilder::new(registries, parameter_class.clone())
                .build(&key.body)
                .map_err(|source| ConfigurationError::Template {
                    statement: format!("{}.selectKey", id),
                    source,
                })?;
            Some(SelectKey {
                accessor,
                kind: key.kind,
                result_class,
                template,
            })
        }
        None => None,
    };

    log::debug!(
        "Compiled {} statement '{}' ({})",
        def.kind,
        id,
        if template.is_dynamic() { "dynamic" } else { "static" }
    );
    Ok(MappedStatement {
        id: id.to_string(),
        kind: def.kind,
        template,
        parameter_map,
        result_maps: maps,
        result_class,
        auto_map,
        remap_results: def.remap_results,
        cache_model,
        select_key,
    })
}

/// Compiled definitions plus the registries they were resolved against.
pub struct Configuration {
    settings: MapperSettings,
    types: TypeRegistry,
    handlers: TypeHandlerRegistry,
    statements: HashMap<String, Arc<MappedStatement>>,
    result_maps: ResultMaps,
    parameter_maps: HashMap<String, Arc<ParameterMap>>,
    cache_models: HashMap<String, Arc<CacheModel>>,
    /// Statement id to the cache models its execution flushes.
    flush_triggers: HashMap<String, Vec<Arc<CacheModel>>>,
}

impl Configuration {
    pub fn builder(settings: MapperSettings) -> ConfigurationBuilder {
        ConfigurationBuilder::new(settings)
    }

    pub fn settings(&self) -> &MapperSettings {
        &self.settings
    }

    pub fn registries(&self) -> Registries<'_> {
        Registries {
            types: &self.types,
            handlers: &self.handlers,
        }
    }

    pub fn statement(&self, id: &str) -> Option<&Arc<MappedStatement>> {
        self.statements.get(id)
    }

    pub fn statement_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.statements.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn result_maps(&self) -> &ResultMaps {
        &self.result_maps
    }

    pub fn result_map(&self, id: &str) -> Option<&Arc<ResultMap>> {
        self.result_maps.get(id)
    }

    pub fn parameter_map(&self, id: &str) -> Option<&Arc<ParameterMap>> {
        self.parameter_maps.get(id)
    }

    pub fn cache_model(&self, id: &str) -> Option<&Arc<CacheModel>> {
        self.cache_models.get(id)
    }

    pub fn cache_models(&self) -> impl Iterator<Item = &Arc<CacheModel>> {
        self.cache_models.values()
    }

    pub fn flush_triggers(&self, statement: &str) -> &[Arc<CacheModel>] {
        self.flush_triggers
            .get(statement)
            .map_or(&[], Vec::as_slice)
    }
}
